use crate::domain::baseline::Department;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Allowed deviation of the allocation sum from 100 (optimizer percentages may be rounded).
pub const ALLOCATION_SUM_TOLERANCE: f64 = 1.0;

/// Per-department revenue-denominated figures (`expected` and `risk`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueFigures {
    #[serde(rename = "Marketing_Revenue", default)]
    pub marketing: f64,
    #[serde(rename = "RnD_Revenue", default)]
    pub rnd: f64,
    #[serde(rename = "Ops_Revenue", default)]
    pub ops: f64,
}

impl RevenueFigures {
    pub fn new(marketing: f64, rnd: f64, ops: f64) -> Self {
        Self {
            marketing,
            rnd,
            ops,
        }
    }

    pub fn get(&self, dept: Department) -> f64 {
        match dept {
            Department::Marketing => self.marketing,
            Department::RnD => self.rnd,
            Department::Ops => self.ops,
        }
    }

    pub fn total(&self) -> f64 {
        self.marketing + self.rnd + self.ops
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.marketing), f(self.rnd), f(self.ops))
    }
}

/// Allocation percentages per department.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationSplit {
    #[serde(rename = "Marketing")]
    pub marketing: f64,
    #[serde(rename = "RnD")]
    pub rnd: f64,
    #[serde(rename = "Operations")]
    pub ops: f64,
}

impl AllocationSplit {
    pub fn new(marketing: f64, rnd: f64, ops: f64) -> Self {
        Self {
            marketing,
            rnd,
            ops,
        }
    }

    pub fn get(&self, dept: Department) -> f64 {
        match dept {
            Department::Marketing => self.marketing,
            Department::RnD => self.rnd,
            Department::Ops => self.ops,
        }
    }

    pub fn total(&self) -> f64 {
        self.marketing + self.rnd + self.ops
    }

    /// Splits `budget` by these percentages, rounded to whole currency units.
    pub fn amounts(&self, budget: f64) -> RevenueFigures {
        RevenueFigures::new(
            (budget * self.marketing / 100.0).round(),
            (budget * self.rnd / 100.0).round(),
            (budget * self.ops / 100.0).round(),
        )
    }

    /// Per-department difference `self - earlier`.
    pub fn drift_from(&self, earlier: &AllocationSplit) -> AllocationSplit {
        AllocationSplit::new(
            self.marketing - earlier.marketing,
            self.rnd - earlier.rnd,
            self.ops - earlier.ops,
        )
    }
}

/// Optimizer response as it arrives on the wire. `risk` and `total_growth` may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerResponse {
    pub expected: RevenueFigures,
    #[serde(default)]
    pub risk: Option<RevenueFigures>,
    pub allocation: AllocationSplit,
    #[serde(default)]
    pub total_growth: Option<f64>,
}

/// Validated optimizer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerResult {
    pub expected: RevenueFigures,
    pub risk: RevenueFigures,
    pub allocation: AllocationSplit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_growth: Option<f64>,
}

impl OptimizerResponse {
    pub fn validate_and_into_result(self, allocation_cap_pct: f64) -> anyhow::Result<OptimizerResult> {
        for dept in Department::ALL {
            let expected = self.expected.get(dept);
            ensure!(
                expected.is_finite() && expected >= 0.0,
                "expected revenue for {dept} must be a non-negative number (got {expected})"
            );
        }

        let risk = self.risk.unwrap_or_default();
        for dept in Department::ALL {
            let r = risk.get(dept);
            ensure!(
                r.is_finite() && r >= 0.0,
                "risk for {dept} must be a non-negative number (got {r})"
            );
        }

        for dept in Department::ALL {
            let pct = self.allocation.get(dept);
            ensure!(
                pct.is_finite() && (0.0..=allocation_cap_pct).contains(&pct),
                "allocation for {dept} must be within 0..={allocation_cap_pct} (got {pct})"
            );
        }
        let sum = self.allocation.total();
        ensure!(
            (sum - 100.0).abs() <= ALLOCATION_SUM_TOLERANCE,
            "allocation must sum to 100 (got {sum})"
        );

        let total_growth = self.total_growth.filter(|v| v.is_finite());

        Ok(OptimizerResult {
            expected: self.expected,
            risk,
            allocation: self.allocation,
            total_growth,
        })
    }
}
