use crate::domain::baseline::{BaselineRecord, PartialBaseline};
use crate::domain::history::HistoryEntry;
use crate::optimizer::OptimizerClient;
use crate::storage::history::HistoryStore;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    /// Position in the import, zero-based.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub submitted: usize,
    pub skipped: Vec<SkippedRow>,
    /// Stored ids in import order.
    pub ids: Vec<i64>,
}

/// Rows ready to send, tagged with their import position.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub rows: Vec<(usize, BaselineRecord)>,
    pub skipped: Vec<SkippedRow>,
}

impl PreparedBatch {
    /// Splits imported rows into sendable records and skipped rows. A row is skipped when it
    /// lacks Year or Budget or its quarter is outside 1..=4.
    pub fn from_rows(rows: &[PartialBaseline]) -> Self {
        let mut out = Self::default();
        for (index, row) in rows.iter().enumerate() {
            match BaselineRecord::try_from_partial(row) {
                Ok(record) => out.rows.push((index, record)),
                Err(err) => {
                    tracing::warn!(index, error = %err, "skipping batch row");
                    out.skipped.push(SkippedRow {
                        index,
                        reason: err.to_string(),
                    });
                }
            }
        }
        out
    }
}

/// Runs one optimizer call for a whole import and folds the results into history.
pub struct BatchRunner<'a> {
    optimizer: &'a dyn OptimizerClient,
}

impl<'a> BatchRunner<'a> {
    pub fn new(optimizer: &'a dyn OptimizerClient) -> Self {
        Self { optimizer }
    }

    /// Prices every row and builds history entries without touching any store.
    ///
    /// Entry ids are `now` in milliseconds plus the row's import index. Each row is priced at
    /// its own budget, which is also its target budget. Any optimizer failure fails the whole
    /// batch.
    pub async fn collect(
        &self,
        prepared: &PreparedBatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoryEntry>> {
        if prepared.rows.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<BaselineRecord> = prepared.rows.iter().map(|(_, r)| r.clone()).collect();
        let results = self.optimizer.optimize_batch(&records).await?;
        anyhow::ensure!(
            results.len() == records.len(),
            "optimizer returned {} results for {} rows",
            results.len(),
            records.len()
        );

        let base_id = now.timestamp_millis();
        let mut entries = Vec::with_capacity(results.len());
        for ((index, baseline), result) in prepared.rows.iter().zip(results) {
            let target = baseline.target_period()?;
            entries.push(HistoryEntry {
                id: base_id + *index as i64,
                created_at: now,
                baseline: baseline.clone(),
                target,
                target_budget: baseline.budget,
                basis_budget: baseline.budget,
                result,
            });
        }
        Ok(entries)
    }

    /// Collects the batch and appends it to `store` in one write. On failure `store` is
    /// unchanged.
    pub async fn run(
        &self,
        rows: &[PartialBaseline],
        store: &mut HistoryStore,
        now: DateTime<Utc>,
    ) -> anyhow::Result<BatchReport> {
        let prepared = PreparedBatch::from_rows(rows);
        let entries = self.collect(&prepared, now).await?;
        let ids = store.append_batch(entries)?;

        tracing::info!(
            optimizer = self.optimizer.name(),
            submitted = prepared.rows.len(),
            skipped = prepared.skipped.len(),
            stored = ids.len(),
            "batch run stored"
        );

        Ok(BatchReport {
            submitted: prepared.rows.len(),
            skipped: prepared.skipped,
            ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::baseline::Period;
    use crate::domain::contract::{AllocationSplit, OptimizerResult, RevenueFigures};
    use crate::optimizer::error::OptimizerError;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeOptimizer {
        fail: bool,
        seen: Mutex<Vec<BaselineRecord>>,
    }

    impl FakeOptimizer {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    fn priced(row: &BaselineRecord) -> OptimizerResult {
        OptimizerResult {
            expected: RevenueFigures::new(row.budget, row.budget / 2.0, row.budget / 4.0),
            risk: RevenueFigures::new(1.0, 2.0, 3.0),
            allocation: AllocationSplit::new(50.0, 30.0, 20.0),
            total_growth: Some(0.4),
        }
    }

    #[async_trait::async_trait]
    impl OptimizerClient for FakeOptimizer {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn optimize(&self, request: &BaselineRecord) -> anyhow::Result<OptimizerResult> {
            Ok(priced(request))
        }

        async fn optimize_batch(
            &self,
            rows: &[BaselineRecord],
        ) -> anyhow::Result<Vec<OptimizerResult>> {
            self.seen.lock().unwrap().extend(rows.iter().cloned());
            if self.fail {
                return Err(OptimizerError::new("transport", "connection refused").into());
            }
            Ok(rows.iter().map(priced).collect())
        }
    }

    fn row(year: i32, quarter: u32, budget: Option<f64>) -> PartialBaseline {
        PartialBaseline {
            year: Some(year),
            quarter: Some(quarter),
            budget,
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn stores_one_entry_per_row_with_sequential_ids() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();
        let optimizer = FakeOptimizer::new(false);
        let rows = vec![
            row(2024, 1, Some(100.0)),
            row(2024, 2, Some(200.0)),
            row(2024, 4, Some(300.0)),
        ];

        let report = BatchRunner::new(&optimizer)
            .run(&rows, &mut store, now())
            .await
            .unwrap();

        let base = now().timestamp_millis();
        assert_eq!(report.ids, vec![base, base + 1, base + 2]);
        assert_eq!(report.submitted, 3);
        assert!(report.skipped.is_empty());

        // Most-recent-first: the last imported row is on top.
        let all = store.all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, base + 2);
        assert_eq!(all[0].target, Period::new(2025, 1).unwrap());
        assert_eq!(all[0].target_budget, 300.0);
        assert_eq!(all[0].basis_budget, 300.0);
        assert_eq!(all[2].baseline.quarter, 1);

        // Each row was priced at its own budget.
        let seen = optimizer.seen.lock().unwrap();
        let budgets: Vec<f64> = seen.iter().map(|r| r.budget).collect();
        assert_eq!(budgets, vec![100.0, 200.0, 300.0]);
    }

    #[tokio::test]
    async fn failing_batch_leaves_history_unchanged() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();
        let ok = FakeOptimizer::new(false);
        BatchRunner::new(&ok)
            .run(&[row(2023, 4, Some(10.0))], &mut store, now())
            .await
            .unwrap();
        let before = store.all().to_vec();

        let failing = FakeOptimizer::new(true);
        let err = BatchRunner::new(&failing)
            .run(
                &[row(2024, 1, Some(1.0)), row(2024, 2, Some(2.0))],
                &mut store,
                now(),
            )
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<OptimizerError>().is_some());
        assert_eq!(store.all(), before.as_slice());
        assert_eq!(HistoryStore::open(dir.path()).unwrap().all(), before.as_slice());
    }

    #[tokio::test]
    async fn skips_rows_without_budget_or_valid_quarter() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();
        let optimizer = FakeOptimizer::new(false);
        let rows = vec![
            row(2024, 1, None),
            row(2024, 0, Some(5.0)),
            row(2024, 3, Some(7.0)),
        ];

        let report = BatchRunner::new(&optimizer)
            .run(&rows, &mut store, now())
            .await
            .unwrap();

        assert_eq!(report.submitted, 1);
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![0, 1]);
        assert_eq!(report.ids, vec![now().timestamp_millis() + 2]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();
        let optimizer = FakeOptimizer::new(true);

        let report = BatchRunner::new(&optimizer)
            .run(&[row(2024, 1, None)], &mut store, now())
            .await
            .unwrap();
        assert!(report.ids.is_empty());
        assert!(optimizer.seen.lock().unwrap().is_empty());
        assert!(store.is_empty());
    }
}
