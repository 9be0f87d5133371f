use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Department {
    Marketing,
    RnD,
    Ops,
}

impl Department {
    /// Enumeration order. Every argmax in the engine breaks ties by this order.
    pub const ALL: [Department; 3] = [Department::Marketing, Department::RnD, Department::Ops];

    pub fn label(self) -> &'static str {
        match self {
            Department::Marketing => "Marketing",
            Department::RnD => "RnD",
            Department::Ops => "Operations",
        }
    }

    /// Returns the first department holding the largest value.
    pub fn argmax(value_of: impl Fn(Department) -> f64) -> Department {
        let mut best = Department::ALL[0];
        let mut best_value = value_of(best);
        for dept in &Department::ALL[1..] {
            let v = value_of(*dept);
            if v > best_value {
                best = *dept;
                best_value = v;
            }
        }
        best
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub quarter: u32,
}

impl Period {
    pub fn new(year: i32, quarter: u32) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (1..=4).contains(&quarter),
            "quarter must be 1..=4 (got {quarter})"
        );
        Ok(Self { year, quarter })
    }

    /// The following quarter; Q4 rolls over to Q1 of the next year.
    pub fn next(self) -> Self {
        if self.quarter >= 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{} {}", self.quarter, self.year)
    }
}

/// Fields a baseline import or manual edit may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineField {
    Year,
    Quarter,
    MarketingRevenue,
    RndRevenue,
    OpsRevenue,
    MarketingSpend,
    RndSpend,
    OpsSpend,
    Budget,
}

impl BaselineField {
    pub const ALL: [BaselineField; 9] = [
        BaselineField::Year,
        BaselineField::Quarter,
        BaselineField::MarketingRevenue,
        BaselineField::RndRevenue,
        BaselineField::OpsRevenue,
        BaselineField::MarketingSpend,
        BaselineField::RndSpend,
        BaselineField::OpsSpend,
        BaselineField::Budget,
    ];

    /// Header / wire name. Matching is case-sensitive.
    pub fn name(self) -> &'static str {
        match self {
            BaselineField::Year => "Year",
            BaselineField::Quarter => "Quarter",
            BaselineField::MarketingRevenue => "Marketing_Revenue",
            BaselineField::RndRevenue => "RnD_Revenue",
            BaselineField::OpsRevenue => "Ops_Revenue",
            BaselineField::MarketingSpend => "Marketing_Spend",
            BaselineField::RndSpend => "RnD_Spend",
            BaselineField::OpsSpend => "Ops_Spend",
            BaselineField::Budget => "Budget",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// One quarter of observed financials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Quarter")]
    pub quarter: u32,
    #[serde(rename = "Marketing_Revenue")]
    pub marketing_revenue: f64,
    #[serde(rename = "RnD_Revenue")]
    pub rnd_revenue: f64,
    #[serde(rename = "Ops_Revenue")]
    pub ops_revenue: f64,
    #[serde(rename = "Marketing_Spend")]
    pub marketing_spend: f64,
    #[serde(rename = "RnD_Spend")]
    pub rnd_spend: f64,
    #[serde(rename = "Ops_Spend")]
    pub ops_spend: f64,
    #[serde(rename = "Budget")]
    pub budget: f64,
}

impl Default for BaselineRecord {
    fn default() -> Self {
        Self {
            year: 2024,
            quarter: 4,
            marketing_revenue: 5_000_000_000.0,
            rnd_revenue: 3_000_000_000.0,
            ops_revenue: 4_000_000_000.0,
            marketing_spend: 500_000_000.0,
            rnd_spend: 400_000_000.0,
            ops_spend: 600_000_000.0,
            budget: 2_000_000_000.0,
        }
    }
}

impl BaselineRecord {
    pub fn period(&self) -> anyhow::Result<Period> {
        Period::new(self.year, self.quarter)
    }

    pub fn target_period(&self) -> anyhow::Result<Period> {
        Ok(self.period()?.next())
    }

    /// Sets one field. Year and quarter are truncated toward zero; negative amounts clamp to 0.
    pub fn set(&mut self, field: BaselineField, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        let amount = value.max(0.0);
        match field {
            BaselineField::Year => self.year = value as i32,
            BaselineField::Quarter => self.quarter = value as u32,
            BaselineField::MarketingRevenue => self.marketing_revenue = amount,
            BaselineField::RndRevenue => self.rnd_revenue = amount,
            BaselineField::OpsRevenue => self.ops_revenue = amount,
            BaselineField::MarketingSpend => self.marketing_spend = amount,
            BaselineField::RndSpend => self.rnd_spend = amount,
            BaselineField::OpsSpend => self.ops_spend = amount,
            BaselineField::Budget => self.budget = amount,
        }
    }

    /// Overwrites only the fields present in `partial`.
    pub fn merge(&mut self, partial: &PartialBaseline) {
        if let Some(v) = partial.year {
            self.year = v;
        }
        if let Some(v) = partial.quarter {
            self.quarter = v;
        }
        let amounts = [
            (partial.marketing_revenue, &mut self.marketing_revenue),
            (partial.rnd_revenue, &mut self.rnd_revenue),
            (partial.ops_revenue, &mut self.ops_revenue),
            (partial.marketing_spend, &mut self.marketing_spend),
            (partial.rnd_spend, &mut self.rnd_spend),
            (partial.ops_spend, &mut self.ops_spend),
            (partial.budget, &mut self.budget),
        ];
        for (src, dst) in amounts {
            if let Some(v) = src {
                *dst = v;
            }
        }
    }

    /// Builds a full record from an imported row. Year, a valid quarter, and Budget are
    /// required; other amounts default to zero.
    pub fn try_from_partial(partial: &PartialBaseline) -> anyhow::Result<Self> {
        let year = partial
            .year
            .ok_or_else(|| anyhow::anyhow!("row is missing Year"))?;
        let quarter = partial
            .quarter
            .ok_or_else(|| anyhow::anyhow!("row is missing Quarter"))?;
        let budget = partial
            .budget
            .ok_or_else(|| anyhow::anyhow!("row is missing Budget"))?;
        Period::new(year, quarter)?;

        Ok(Self {
            year,
            quarter,
            marketing_revenue: partial.marketing_revenue.unwrap_or(0.0),
            rnd_revenue: partial.rnd_revenue.unwrap_or(0.0),
            ops_revenue: partial.ops_revenue.unwrap_or(0.0),
            marketing_spend: partial.marketing_spend.unwrap_or(0.0),
            rnd_spend: partial.rnd_spend.unwrap_or(0.0),
            ops_spend: partial.ops_spend.unwrap_or(0.0),
            budget,
        })
    }

    /// Copy of this record with `Budget` overridden, as sent to the optimizer.
    pub fn with_budget(&self, budget: f64) -> Self {
        Self {
            budget,
            ..self.clone()
        }
    }
}

/// An imported row. Only the columns recognized in the header are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialBaseline {
    #[serde(rename = "Year", default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(rename = "Quarter", default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u32>,
    #[serde(rename = "Marketing_Revenue", default, skip_serializing_if = "Option::is_none")]
    pub marketing_revenue: Option<f64>,
    #[serde(rename = "RnD_Revenue", default, skip_serializing_if = "Option::is_none")]
    pub rnd_revenue: Option<f64>,
    #[serde(rename = "Ops_Revenue", default, skip_serializing_if = "Option::is_none")]
    pub ops_revenue: Option<f64>,
    #[serde(rename = "Marketing_Spend", default, skip_serializing_if = "Option::is_none")]
    pub marketing_spend: Option<f64>,
    #[serde(rename = "RnD_Spend", default, skip_serializing_if = "Option::is_none")]
    pub rnd_spend: Option<f64>,
    #[serde(rename = "Ops_Spend", default, skip_serializing_if = "Option::is_none")]
    pub ops_spend: Option<f64>,
    #[serde(rename = "Budget", default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
}

impl PartialBaseline {
    /// Year/quarter with missing values read as 0, used for chronological ordering.
    pub fn sort_key(&self) -> (i32, u32) {
        (self.year.unwrap_or(0), self.quarter.unwrap_or(0))
    }

    pub fn set(&mut self, field: BaselineField, value: f64) {
        match field {
            BaselineField::Year => self.year = Some(value as i32),
            BaselineField::Quarter => self.quarter = Some(value as u32),
            BaselineField::MarketingRevenue => self.marketing_revenue = Some(value),
            BaselineField::RndRevenue => self.rnd_revenue = Some(value),
            BaselineField::OpsRevenue => self.ops_revenue = Some(value),
            BaselineField::MarketingSpend => self.marketing_spend = Some(value),
            BaselineField::RndSpend => self.rnd_spend = Some(value),
            BaselineField::OpsSpend => self.ops_spend = Some(value),
            BaselineField::Budget => self.budget = Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_period_rolls_over_year() {
        let q4 = Period::new(2024, 4).unwrap();
        assert_eq!(q4.next(), Period::new(2025, 1).unwrap());
        let q2 = Period::new(2024, 2).unwrap();
        assert_eq!(q2.next(), Period::new(2024, 3).unwrap());
    }

    #[test]
    fn rejects_out_of_range_quarter() {
        assert!(Period::new(2024, 0).is_err());
        assert!(Period::new(2024, 5).is_err());
    }

    #[test]
    fn periods_order_by_year_then_quarter() {
        let mut periods = vec![
            Period::new(2024, 3).unwrap(),
            Period::new(2023, 4).unwrap(),
            Period::new(2024, 1).unwrap(),
        ];
        periods.sort();
        assert_eq!(periods[0], Period::new(2023, 4).unwrap());
        assert_eq!(periods[2], Period::new(2024, 3).unwrap());
    }

    #[test]
    fn merge_overwrites_only_present_fields() {
        let mut base = BaselineRecord::default();
        let partial = PartialBaseline {
            year: Some(2025),
            budget: Some(7.0),
            ..Default::default()
        };
        base.merge(&partial);
        assert_eq!(base.year, 2025);
        assert_eq!(base.quarter, 4);
        assert_eq!(base.budget, 7.0);
        assert_eq!(base.marketing_revenue, 5_000_000_000.0);
    }

    #[test]
    fn try_from_partial_requires_budget_and_valid_quarter() {
        let mut row = PartialBaseline {
            year: Some(2024),
            quarter: Some(2),
            ..Default::default()
        };
        assert!(BaselineRecord::try_from_partial(&row).is_err());

        row.budget = Some(100.0);
        let rec = BaselineRecord::try_from_partial(&row).unwrap();
        assert_eq!(rec.budget, 100.0);
        assert_eq!(rec.ops_spend, 0.0);

        row.quarter = Some(0);
        assert!(BaselineRecord::try_from_partial(&row).is_err());
    }

    #[test]
    fn argmax_breaks_ties_by_enumeration_order() {
        assert_eq!(Department::argmax(|_| 1.0), Department::Marketing);
        assert_eq!(
            Department::argmax(|d| if d == Department::Marketing { 0.0 } else { 2.0 }),
            Department::RnD
        );
    }

    #[test]
    fn record_serializes_with_wire_keys() {
        let v = serde_json::to_value(BaselineRecord::default().with_budget(1.0)).unwrap();
        assert_eq!(v["Budget"], 1.0);
        assert_eq!(v["RnD_Spend"], 400_000_000.0);
        assert_eq!(v["Quarter"], 4);
    }
}
