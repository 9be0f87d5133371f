pub mod aggregate;

use crate::domain::baseline::Period;
use crate::domain::history::HistoryEntry;
use serde::{Deserialize, Serialize};

/// Which period of an entry trend series are keyed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKey {
    /// The forecast quarter.
    #[default]
    Target,
    /// The baseline quarter the forecast was built from.
    Baseline,
}

impl PeriodKey {
    pub fn of(self, entry: &HistoryEntry) -> Period {
        match self {
            PeriodKey::Target => entry.target,
            PeriodKey::Baseline => entry.baseline_period(),
        }
    }
}

impl std::str::FromStr for PeriodKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "target" => Ok(PeriodKey::Target),
            "baseline" => Ok(PeriodKey::Baseline),
            other => anyhow::bail!("unknown period key: {other} (expected target|baseline)"),
        }
    }
}
