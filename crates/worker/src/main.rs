use anyhow::Context;
use budgetopt_core::batch::{BatchRunner, PreparedBatch};
use budgetopt_core::domain::baseline::Period;
use budgetopt_core::domain::history::HistoryRow;
use budgetopt_core::import::error::ImportFormatError;
use budgetopt_core::optimizer::error::OptimizerError;
use budgetopt_core::optimizer::http::HttpOptimizerClient;
use budgetopt_core::planner::PlanningSession;
use budgetopt_core::storage::history::HistoryStore;
use budgetopt_core::trends::PeriodKey;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "budgetopt_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forecast the quarter after the baseline and archive the run.
    Run {
        /// Historical CSV; its latest row becomes the baseline.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Override the baseline year (auto-fills from the CSV row for that period if any).
        #[arg(long, requires = "quarter")]
        year: Option<i32>,

        #[arg(long, requires = "year")]
        quarter: Option<u32>,

        /// Budget to deploy next quarter. Defaults to the baseline row's budget.
        #[arg(long)]
        budget: Option<f64>,
    },

    /// Forecast every row of a CSV in one optimizer call.
    Batch {
        #[arg(long)]
        csv: PathBuf,

        /// Parse and validate rows without calling the optimizer or writing history.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print trend statistics over the run history.
    Trends {
        #[arg(long, default_value = "target")]
        by: PeriodKey,
    },

    /// List the run history, most recent first.
    History,

    /// Write one run's export CSV.
    Export {
        #[arg(long)]
        id: i64,

        /// Destination file. Prints to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Delete the whole run history.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = budgetopt_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let outcome = execute(args.command, &settings).await;
    if let Err(err) = &outcome {
        if is_reportable(err) {
            sentry_anyhow::capture_anyhow(err);
        }
    }
    outcome
}

/// Optimizer outages and rejected imports are logged here instead of going to sentry.
fn is_reportable(err: &anyhow::Error) -> bool {
    if let Some(diag) = err.downcast_ref::<OptimizerError>() {
        tracing::error!(stage = diag.stage, status = ?diag.status, "optimizer unreachable; nothing was written");
        return false;
    }
    if let Some(diag) = err.downcast_ref::<ImportFormatError>() {
        tracing::error!(line_count = diag.line_count, "import rejected: {diag}");
        return false;
    }
    true
}

async fn execute(command: Command, settings: &budgetopt_core::config::Settings) -> anyhow::Result<()> {
    let mut store = HistoryStore::open(settings.data_dir())?;

    match command {
        Command::Run {
            csv,
            year,
            quarter,
            budget,
        } => {
            let mut session = PlanningSession::default();
            if let Some(path) = csv {
                let text = read_text(&path)?;
                session.import(&text)?;
            }
            if let (Some(year), Some(quarter)) = (year, quarter) {
                let matched = session.set_period(Period::new(year, quarter)?);
                tracing::info!(year, quarter, matched, "baseline period set");
            }
            if let Some(budget) = budget {
                session.set_target_budget(budget);
            }

            let optimizer = HttpOptimizerClient::from_settings(settings)?;
            let entry = session
                .run(&optimizer, &mut store, chrono::Utc::now())
                .await?;

            let out = serde_json::json!({
                "entry": entry,
                "forecast": session.reconciled(),
                "allocation_amounts": session.allocation_amounts(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Batch { csv, dry_run } => {
            let text = read_text(&csv)?;
            let rows = budgetopt_core::import::csv::parse_import(&text)?;

            if dry_run {
                let prepared = PreparedBatch::from_rows(&rows);
                tracing::info!(
                    rows = rows.len(),
                    sendable = prepared.rows.len(),
                    skipped = prepared.skipped.len(),
                    dry_run = true,
                    "batch validated"
                );
                println!("{}", serde_json::to_string_pretty(&prepared.skipped)?);
                return Ok(());
            }

            let optimizer = HttpOptimizerClient::from_settings(settings)?;
            let report = BatchRunner::new(&optimizer)
                .run(&rows, &mut store, chrono::Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Trends { by } => {
            let report = budgetopt_core::trends::aggregate::summarize(store.all(), by);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::History => {
            let rows: Vec<HistoryRow> = store.all().iter().map(HistoryRow::from).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Export { id, out } => {
            let entry = store
                .get(id)
                .with_context(|| format!("no history entry with id={id}"))?;
            let body = budgetopt_core::export::render_run_csv(entry)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, body)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(id, path = %path.display(), "export written");
                }
                None => print!("{body}"),
            }
        }
        Command::Clear => {
            store.clear()?;
        }
    }

    Ok(())
}

fn read_text(path: &std::path::Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(budgetopt_core::import::csv::decode_import(&bytes).into_owned())
}

fn init_sentry(settings: &budgetopt_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_imports_and_optimizer_outages_are_not_reported() {
        let err = budgetopt_core::import::csv::parse_import("Year,Quarter").unwrap_err();
        assert!(!is_reportable(&err));

        let err: anyhow::Error = OptimizerError::new("transport", "connection refused").into();
        assert!(!is_reportable(&err));

        let err = anyhow::anyhow!("failed to write ledger");
        assert!(is_reportable(&err));
    }
}
