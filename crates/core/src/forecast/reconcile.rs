use crate::domain::baseline::Department;
use crate::domain::contract::{OptimizerResult, RevenueFigures};
use serde::Serialize;

/// Growth premium applied uniformly to every department during reconciliation.
pub const UPLIFT_FACTOR: f64 = 1.10;

/// Relative tolerance for treating the basis and target budgets as equal.
const BUDGET_MATCH_EPSILON: f64 = 1e-9;

/// Optimizer revenue breakdown rescaled to a target budget. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledForecast {
    pub revenue: RevenueFigures,
    pub total_expected_revenue: f64,
    pub best_department: Department,
    pub scale: f64,
    pub target_budget: f64,
    pub basis_budget: f64,
    /// True when the result was priced at a different budget than the target.
    pub basis_mismatch: bool,
}

/// Rescales `result.expected` so that its total equals `target_budget * UPLIFT_FACTOR`.
///
/// `basis_budget` is the budget the optimizer priced `result` at. It only feeds
/// `basis_mismatch`; the rescale is always relative to the expected-revenue total.
/// A non-positive total leaves the figures unscaled (scale 1) apart from the uplift.
pub fn reconcile(
    result: &OptimizerResult,
    target_budget: f64,
    basis_budget: f64,
) -> ReconciledForecast {
    let total_base = result.expected.total();
    let scale = if total_base > 0.0 {
        target_budget / total_base
    } else {
        tracing::debug!(total_base, "degenerate expected-revenue basis; skipping rescale");
        1.0
    };

    let revenue = result.expected.map(|raw| raw * UPLIFT_FACTOR * scale);
    let total_expected_revenue = revenue.total();
    let best_department = Department::argmax(|d| revenue.get(d));

    let tolerance = BUDGET_MATCH_EPSILON * target_budget.abs().max(basis_budget.abs()).max(1.0);
    let basis_mismatch = (target_budget - basis_budget).abs() > tolerance;
    if basis_mismatch {
        tracing::debug!(
            target_budget,
            basis_budget,
            "optimizer result priced at a different budget; rescaled to target"
        );
    }

    ReconciledForecast {
        revenue,
        total_expected_revenue,
        best_department,
        scale,
        target_budget,
        basis_budget,
        basis_mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::AllocationSplit;

    fn result(m: f64, r: f64, o: f64) -> OptimizerResult {
        OptimizerResult {
            expected: RevenueFigures::new(m, r, o),
            risk: RevenueFigures::default(),
            allocation: AllocationSplit::new(40.0, 30.0, 30.0),
            total_growth: None,
        }
    }

    fn assert_close(a: f64, b: f64) {
        let tol = 1e-9 * a.abs().max(b.abs()).max(1.0);
        assert!((a - b).abs() <= tol, "{a} != {b}");
    }

    #[test]
    fn total_matches_uplifted_target_budget() {
        let splits = [
            (5.0e9, 3.0e9, 4.0e9),
            (1.0, 0.0, 0.0),
            (1.0e12, 3.0, 0.5),
            (0.1, 0.2, 0.3),
        ];
        for (m, r, o) in splits {
            for target in [0.0, 1.0, 2_500_000_000.0, 7.3e11] {
                let f = reconcile(&result(m, r, o), target, 2_000_000_000.0);
                assert_close(f.total_expected_revenue, target * UPLIFT_FACTOR);
            }
        }
    }

    #[test]
    fn preserves_department_proportions() {
        let f = reconcile(&result(6.0, 3.0, 1.0), 1000.0, 1000.0);
        assert_close(f.revenue.marketing, 660.0);
        assert_close(f.revenue.rnd, 330.0);
        assert_close(f.revenue.ops, 110.0);
        assert_eq!(f.best_department, Department::Marketing);
    }

    #[test]
    fn zero_basis_yields_zeros_without_rescale() {
        let f = reconcile(&result(0.0, 0.0, 0.0), 2_500_000_000.0, 2_000_000_000.0);
        assert_eq!(f.scale, 1.0);
        assert_eq!(f.revenue, RevenueFigures::default());
        assert_eq!(f.total_expected_revenue, 0.0);
        assert_eq!(f.best_department, Department::Marketing);
    }

    #[test]
    fn best_department_ties_go_to_enumeration_order() {
        let f = reconcile(&result(1.0, 5.0, 5.0), 100.0, 100.0);
        assert_eq!(f.best_department, Department::RnD);
    }

    #[test]
    fn flags_basis_mismatch() {
        assert!(!reconcile(&result(1.0, 1.0, 1.0), 100.0, 100.0).basis_mismatch);
        assert!(reconcile(&result(1.0, 1.0, 1.0), 150.0, 100.0).basis_mismatch);
    }
}
