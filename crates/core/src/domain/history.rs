use crate::domain::baseline::{BaselineRecord, Period};
use crate::domain::contract::OptimizerResult;
use crate::forecast::reconcile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archived run. Immutable once appended to the history ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub baseline: BaselineRecord,
    pub target: Period,
    pub target_budget: f64,
    /// Budget sent to the optimizer; `result.expected` is priced against it.
    pub basis_budget: f64,
    pub result: OptimizerResult,
}

impl HistoryEntry {
    pub fn baseline_period(&self) -> Period {
        Period {
            year: self.baseline.year,
            quarter: self.baseline.quarter,
        }
    }

    pub fn predicted_revenue(&self) -> f64 {
        reconcile::reconcile(&self.result, self.target_budget, self.basis_budget)
            .total_expected_revenue
    }
}

/// Flat listing row for the run history table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub target: Period,
    pub budget: f64,
    pub predicted_revenue: f64,
    pub based_on: Period,
}

impl From<&HistoryEntry> for HistoryRow {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at,
            target: entry.target,
            budget: entry.target_budget,
            predicted_revenue: entry.predicted_revenue(),
            based_on: entry.baseline_period(),
        }
    }
}
