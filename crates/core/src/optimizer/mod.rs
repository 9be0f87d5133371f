pub mod error;
pub mod http;

use crate::domain::baseline::BaselineRecord;
use crate::domain::contract::OptimizerResult;

/// Remote allocation optimizer. Every failure surfaces as an [`error::OptimizerError`].
#[async_trait::async_trait]
pub trait OptimizerClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prices one baseline at the budget it carries.
    async fn optimize(&self, request: &BaselineRecord) -> anyhow::Result<OptimizerResult>;

    /// Prices every row in one call. Results are in request order.
    async fn optimize_batch(&self, rows: &[BaselineRecord])
        -> anyhow::Result<Vec<OptimizerResult>>;
}
