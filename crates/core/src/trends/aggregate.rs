use crate::domain::baseline::{Department, Period};
use crate::domain::contract::AllocationSplit;
use crate::domain::history::HistoryEntry;
use crate::forecast::reconcile::reconcile;
use crate::trends::PeriodKey;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period: Period,
    pub entry_id: i64,
    pub budget: f64,
    pub predicted_revenue: f64,
    /// Change in predicted revenue from the previous point; `None` for the first.
    pub revenue_delta: Option<f64>,
    pub allocation: AllocationSplit,
    pub best_department: Department,
    pub riskiest_department: Department,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub key: PeriodKey,
    pub points: Vec<TrendPoint>,
    pub cumulative_revenue: f64,
    pub average_revenue: f64,
    /// Percent change first → last. `None` when undefined (no points, or a zero first value).
    pub growth_pct: Option<f64>,
    /// Last allocation minus first allocation, per department.
    pub allocation_drift: Option<AllocationSplit>,
}

/// Keeps the first entry seen for each period. Input is most-recent-first, so this is the
/// latest-appended run per period. Input order is preserved.
pub fn dedup_by_period(entries: &[HistoryEntry], key: PeriodKey) -> Vec<&HistoryEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(key.of(e)))
        .collect()
}

/// Deduplicated entries in ascending period order.
pub fn chronological(entries: &[HistoryEntry], key: PeriodKey) -> Vec<&HistoryEntry> {
    let mut out = dedup_by_period(entries, key);
    out.sort_by_key(|e| key.of(e));
    out
}

pub fn summarize(entries: &[HistoryEntry], key: PeriodKey) -> TrendReport {
    let series = chronological(entries, key);

    let mut points: Vec<TrendPoint> = Vec::with_capacity(series.len());
    for entry in series {
        let forecast = reconcile(&entry.result, entry.target_budget, entry.basis_budget);
        let predicted_revenue = forecast.total_expected_revenue;
        let revenue_delta = points.last().map(|p| predicted_revenue - p.predicted_revenue);
        points.push(TrendPoint {
            period: key.of(entry),
            entry_id: entry.id,
            budget: entry.target_budget,
            predicted_revenue,
            revenue_delta,
            allocation: entry.result.allocation,
            best_department: forecast.best_department,
            riskiest_department: Department::argmax(|d| entry.result.risk.get(d)),
        });
    }

    let cumulative_revenue: f64 = points.iter().map(|p| p.predicted_revenue).sum();
    let average_revenue = if points.is_empty() {
        0.0
    } else {
        cumulative_revenue / points.len() as f64
    };

    let growth_pct = match (points.first(), points.last()) {
        (Some(first), Some(last)) if first.predicted_revenue != 0.0 => Some(
            (last.predicted_revenue - first.predicted_revenue) / first.predicted_revenue * 100.0,
        ),
        _ => None,
    };

    let allocation_drift = match (points.first(), points.last()) {
        (Some(first), Some(last)) => Some(last.allocation.drift_from(&first.allocation)),
        _ => None,
    };

    TrendReport {
        key,
        points,
        cumulative_revenue,
        average_revenue,
        growth_pct,
        allocation_drift,
    }
}
