pub mod batch;
pub mod domain;
pub mod export;
pub mod forecast;
pub mod import;
pub mod optimizer;
pub mod planner;
pub mod storage;
pub mod trends;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_OPTIMIZER_BASE_URL: &str = "http://127.0.0.1:5000";
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_ALLOCATION_CAP_PCT: f64 = 100.0;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub optimizer_base_url: Option<String>,
        pub optimizer_timeout_secs: Option<u64>,
        pub allocation_cap_pct: f64,
        pub data_dir: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let optimizer_timeout_secs = match std::env::var("OPTIMIZER_TIMEOUT_SECS") {
                Ok(s) if !s.trim().is_empty() => Some(
                    s.trim()
                        .parse::<u64>()
                        .with_context(|| format!("OPTIMIZER_TIMEOUT_SECS is not an integer: {s}"))?,
                ),
                _ => None,
            };

            let allocation_cap_pct = std::env::var("OPTIMIZER_ALLOCATION_CAP_PCT")
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(DEFAULT_ALLOCATION_CAP_PCT);

            Ok(Self {
                optimizer_base_url: std::env::var("OPTIMIZER_BASE_URL").ok(),
                optimizer_timeout_secs,
                allocation_cap_pct,
                data_dir: std::env::var("BUDGETOPT_DATA_DIR").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn optimizer_base_url(&self) -> &str {
            self.optimizer_base_url
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_OPTIMIZER_BASE_URL)
        }

        pub fn data_dir(&self) -> PathBuf {
            PathBuf::from(
                self.data_dir
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_DATA_DIR),
            )
        }
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                optimizer_base_url: None,
                optimizer_timeout_secs: None,
                allocation_cap_pct: DEFAULT_ALLOCATION_CAP_PCT,
                data_dir: None,
                sentry_dsn: None,
            }
        }
    }
}
