use crate::domain::baseline::{BaselineField, BaselineRecord, PartialBaseline, Period};
use crate::domain::contract::{OptimizerResult, RevenueFigures};
use crate::domain::history::HistoryEntry;
use crate::forecast::reconcile::{reconcile, ReconciledForecast};
use crate::import::{csv, select};
use crate::optimizer::OptimizerClient;
use crate::storage::history::HistoryStore;
use chrono::{DateTime, Utc};

const DEFAULT_TARGET_BUDGET: f64 = 2_500_000_000.0;

/// Prices `baseline` at `target_budget` and builds the history entry for the run.
///
/// The optimizer receives the baseline with `Budget` replaced by the target budget, so the
/// returned entry's basis budget equals its target budget.
pub async fn request_forecast(
    optimizer: &dyn OptimizerClient,
    baseline: &BaselineRecord,
    target_budget: f64,
    now: DateTime<Utc>,
) -> anyhow::Result<HistoryEntry> {
    let target = baseline.target_period()?;
    let request = baseline.with_budget(target_budget);
    let result = optimizer.optimize(&request).await?;

    Ok(HistoryEntry {
        id: now.timestamp_millis(),
        created_at: now,
        baseline: baseline.clone(),
        target,
        target_budget,
        basis_budget: target_budget,
        result,
    })
}

/// The last successful run, kept for display.
#[derive(Debug, Clone)]
struct LastRun {
    result: OptimizerResult,
    basis_budget: f64,
}

/// Interactive planning state: the baseline being edited, the budget planned for the next
/// quarter, the last import, and the last optimizer result.
#[derive(Debug, Clone)]
pub struct PlanningSession {
    baseline: BaselineRecord,
    target_budget: f64,
    imported: Vec<PartialBaseline>,
    last_run: Option<LastRun>,
}

impl Default for PlanningSession {
    fn default() -> Self {
        Self::new(BaselineRecord::default(), DEFAULT_TARGET_BUDGET)
    }
}

impl PlanningSession {
    pub fn new(baseline: BaselineRecord, target_budget: f64) -> Self {
        Self {
            baseline,
            target_budget: sanitize_budget(target_budget),
            imported: Vec::new(),
            last_run: None,
        }
    }

    pub fn baseline(&self) -> &BaselineRecord {
        &self.baseline
    }

    pub fn target_budget(&self) -> f64 {
        self.target_budget
    }

    pub fn imported_rows(&self) -> &[PartialBaseline] {
        &self.imported
    }

    pub fn last_result(&self) -> Option<&OptimizerResult> {
        self.last_run.as_ref().map(|r| &r.result)
    }

    pub fn target_period(&self) -> anyhow::Result<Period> {
        self.baseline.target_period()
    }

    /// Imports a historical file and adopts its latest row as the baseline. The target budget
    /// defaults to that row's budget. Returns the adopted row's period.
    ///
    /// On a format error nothing changes.
    pub fn import(&mut self, text: &str) -> anyhow::Result<Option<(i32, u32)>> {
        let rows = csv::parse_import(text)?;

        let mut adopted = None;
        if let Some((baseline, row)) = select::apply_latest(&self.baseline, &rows) {
            self.baseline = baseline;
            if let Some(budget) = row.budget {
                self.target_budget = sanitize_budget(budget);
            }
            adopted = Some(row.sort_key());
            tracing::info!(
                year = self.baseline.year,
                quarter = self.baseline.quarter,
                rows = rows.len(),
                "loaded baseline from import"
            );
        }
        self.imported = rows;
        Ok(adopted)
    }

    /// Moves the baseline to `period`, filling it from the matching imported row if there is
    /// one. Returns whether a row matched.
    pub fn set_period(&mut self, period: Period) -> bool {
        self.baseline.year = period.year;
        self.baseline.quarter = period.quarter;
        match select::select_for_period(&self.imported, period) {
            Some(row) => {
                self.baseline.merge(row);
                true
            }
            None => false,
        }
    }

    pub fn set_field(&mut self, field: BaselineField, value: f64) {
        self.baseline.set(field, value);
    }

    pub fn set_target_budget(&mut self, value: f64) {
        self.target_budget = sanitize_budget(value);
    }

    /// Runs the optimizer for the current baseline and target budget and archives the run.
    ///
    /// The session stays mutably borrowed until the call resolves, so runs cannot overlap.
    /// On failure the baseline, target budget, last result and history are left as they were.
    pub async fn run(
        &mut self,
        optimizer: &dyn OptimizerClient,
        store: &mut HistoryStore,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HistoryEntry> {
        let outcome = self.run_inner(optimizer, store, now).await;

        match &outcome {
            Ok(entry) => tracing::info!(
                id = entry.id,
                target = %entry.target,
                target_budget = entry.target_budget,
                "forecast run stored"
            ),
            Err(err) => tracing::error!(error = %err, "forecast run failed"),
        }
        outcome
    }

    async fn run_inner(
        &mut self,
        optimizer: &dyn OptimizerClient,
        store: &mut HistoryStore,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HistoryEntry> {
        let mut entry = request_forecast(optimizer, &self.baseline, self.target_budget, now).await?;
        entry.id = store.append(entry.clone())?;

        self.last_run = Some(LastRun {
            result: entry.result.clone(),
            basis_budget: entry.basis_budget,
        });
        Ok(entry)
    }

    /// The last result reconciled against the current target budget.
    pub fn reconciled(&self) -> Option<ReconciledForecast> {
        let run = self.last_run.as_ref()?;
        Some(reconcile(&run.result, self.target_budget, run.basis_budget))
    }

    /// The current target budget split by the last result's allocation percentages.
    pub fn allocation_amounts(&self) -> Option<RevenueFigures> {
        let run = self.last_run.as_ref()?;
        Some(run.result.allocation.amounts(self.target_budget))
    }
}

fn sanitize_budget(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
