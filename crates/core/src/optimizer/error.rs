use std::fmt;

/// The optimizer could not be reached or did not produce a usable result.
#[derive(Debug, Clone)]
pub struct OptimizerError {
    pub stage: &'static str,
    pub detail: String,
    pub status: Option<u16>,
    pub raw_output: Option<String>,
}

impl OptimizerError {
    pub fn new(stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
            status: None,
            raw_output: None,
        }
    }
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "optimizer connectivity error (stage={}): {}",
            self.stage, self.detail
        )
    }
}

impl std::error::Error for OptimizerError {}
