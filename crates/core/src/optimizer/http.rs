use crate::config::Settings;
use crate::domain::baseline::BaselineRecord;
use crate::domain::contract::{OptimizerResponse, OptimizerResult};
use crate::optimizer::error::OptimizerError;
use crate::optimizer::OptimizerClient;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const SINGLE_PATH: &str = "/run-optimization";
const BATCH_PATH: &str = "/run-batch-optimization";

#[derive(Debug, Clone)]
pub struct HttpOptimizerClient {
    http: reqwest::Client,
    base_url: String,
    allocation_cap_pct: f64,
}

impl HttpOptimizerClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        // No timeout unless configured: a run resolves only on response or transport failure.
        if let Some(secs) = settings.optimizer_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .context("failed to build optimizer http client")?;

        Ok(Self {
            http,
            base_url: settings.optimizer_base_url().to_string(),
            allocation_cap_pct: settings.allocation_cap_pct,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let res = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| OptimizerError::new("transport", format!("POST {url} failed: {e}")))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| {
            OptimizerError::new("transport", format!("failed to read optimizer response: {e}"))
        })?;

        if !status.is_success() {
            return Err(OptimizerError {
                stage: "status",
                detail: format!("status={status}"),
                status: Some(status.as_u16()),
                raw_output: Some(text),
            }
            .into());
        }

        serde_json::from_str::<T>(&text).map_err(|e| {
            OptimizerError {
                stage: "decode",
                detail: format!("optimizer response does not match the result contract: {e}"),
                status: Some(status.as_u16()),
                raw_output: Some(text),
            }
            .into()
        })
    }

    fn validate(&self, response: OptimizerResponse) -> anyhow::Result<OptimizerResult> {
        response
            .validate_and_into_result(self.allocation_cap_pct)
            .map_err(|e| OptimizerError::new("contract", format!("{e:#}")).into())
    }
}

#[async_trait::async_trait]
impl OptimizerClient for HttpOptimizerClient {
    fn name(&self) -> &'static str {
        "http_json"
    }

    async fn optimize(&self, request: &BaselineRecord) -> anyhow::Result<OptimizerResult> {
        let t0 = std::time::Instant::now();
        let response: OptimizerResponse = self.post_json(SINGLE_PATH, request).await?;
        let result = self.validate(response)?;
        tracing::debug!(
            year = request.year,
            quarter = request.quarter,
            budget = request.budget,
            elapsed_ms = t0.elapsed().as_millis(),
            "optimizer call completed"
        );
        Ok(result)
    }

    async fn optimize_batch(
        &self,
        rows: &[BaselineRecord],
    ) -> anyhow::Result<Vec<OptimizerResult>> {
        let t0 = std::time::Instant::now();
        let responses: Vec<OptimizerResponse> = self.post_json(BATCH_PATH, rows).await?;
        if responses.len() != rows.len() {
            return Err(OptimizerError::new(
                "contract",
                format!(
                    "batch response has {} results for {} rows",
                    responses.len(),
                    rows.len()
                ),
            )
            .into());
        }

        let mut out = Vec::with_capacity(responses.len());
        for (idx, response) in responses.into_iter().enumerate() {
            let result = response
                .validate_and_into_result(self.allocation_cap_pct)
                .map_err(|e| OptimizerError::new("contract", format!("batch row {idx}: {e:#}")))?;
            out.push(result);
        }

        tracing::debug!(
            rows = rows.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "optimizer batch call completed"
        );
        Ok(out)
    }
}
