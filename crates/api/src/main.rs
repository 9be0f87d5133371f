use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use budgetopt_core::batch::{BatchReport, BatchRunner, PreparedBatch};
use budgetopt_core::domain::baseline::BaselineRecord;
use budgetopt_core::domain::contract::OptimizerResult;
use budgetopt_core::domain::history::{HistoryEntry, HistoryRow};
use budgetopt_core::forecast::reconcile::{reconcile, ReconciledForecast};
use budgetopt_core::import::csv::parse_import_bytes;
use budgetopt_core::import::error::ImportFormatError;
use budgetopt_core::optimizer::error::OptimizerError;
use budgetopt_core::optimizer::http::HttpOptimizerClient;
use budgetopt_core::optimizer::OptimizerClient;
use budgetopt_core::storage::history::HistoryStore;
use budgetopt_core::trends::aggregate::{summarize, TrendReport};
use budgetopt_core::trends::PeriodKey;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = budgetopt_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store = HistoryStore::open(settings.data_dir())?;
    tracing::info!(path = %store.path().display(), entries = store.len(), "history ledger opened");

    let optimizer = HttpOptimizerClient::from_settings(&settings)?;

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        optimizer: Arc::new(optimizer),
        run_guard: Arc::new(Mutex::new(())),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/history", get(list_history).delete(clear_history))
        .route("/history/:id/export", get(export_entry))
        .route("/trends", get(get_trends))
        .route("/runs", post(create_run))
        .route("/batches", post(create_batch))
        .route("/reconcile", post(reconcile_forecast))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, optimizer = %settings.optimizer_base_url(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<HistoryStore>>,
    optimizer: Arc<dyn OptimizerClient>,
    // Held for the whole optimizer round trip; a second run gets 409 instead of queueing.
    run_guard: Arc<Mutex<()>>,
}

async fn list_history(State(state): State<AppState>) -> Json<Vec<HistoryRow>> {
    let store = state.store.lock().await;
    Json(store.all().iter().map(HistoryRow::from).collect())
}

async fn clear_history(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    let Ok(_running) = state.run_guard.try_lock() else {
        return Err(StatusCode::CONFLICT);
    };
    let mut store = state.store.lock().await;
    tokio::task::block_in_place(|| store.clear()).map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StatusCode> {
    let store = state.store.lock().await;
    let entry = store.get(id).ok_or(StatusCode::NOT_FOUND)?;
    let body = budgetopt_core::export::render_run_csv(entry).map_err(internal_error)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        budgetopt_core::export::export_file_name(entry)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

#[derive(Debug, Deserialize)]
struct TrendsQuery {
    #[serde(default)]
    by: PeriodKey,
}

async fn get_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> Json<TrendReport> {
    let store = state.store.lock().await;
    Json(summarize(store.all(), query.by))
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    baseline: BaselineRecord,
    target_budget: f64,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    entry: HistoryEntry,
    forecast: ReconciledForecast,
}

async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, StatusCode> {
    let Ok(_running) = state.run_guard.try_lock() else {
        tracing::warn!("run rejected: another run is in progress");
        return Err(StatusCode::CONFLICT);
    };

    if req.baseline.period().is_err() || !req.target_budget.is_finite() || req.target_budget < 0.0
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut entry = budgetopt_core::planner::request_forecast(
        state.optimizer.as_ref(),
        &req.baseline,
        req.target_budget,
        chrono::Utc::now(),
    )
    .await
    .map_err(upstream_error)?;

    let mut store = state.store.lock().await;
    entry.id = tokio::task::block_in_place(|| store.append(entry.clone()))
        .map_err(internal_error)?;
    drop(store);

    let forecast = reconcile(&entry.result, entry.target_budget, entry.basis_budget);
    tracing::info!(id = entry.id, target = %entry.target, "run stored");

    Ok(Json(RunResponse { entry, forecast }))
}

async fn create_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchReport>, StatusCode> {
    let rows = parse_import_bytes(&body).map_err(|e| {
        if e.downcast_ref::<ImportFormatError>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            internal_error(e)
        }
    })?;

    let Ok(_running) = state.run_guard.try_lock() else {
        return Err(StatusCode::CONFLICT);
    };

    let prepared = PreparedBatch::from_rows(&rows);
    let entries = BatchRunner::new(state.optimizer.as_ref())
        .collect(&prepared, chrono::Utc::now())
        .await
        .map_err(upstream_error)?;

    let mut store = state.store.lock().await;
    let ids = tokio::task::block_in_place(|| store.append_batch(entries))
        .map_err(internal_error)?;
    drop(store);

    tracing::info!(stored = ids.len(), skipped = prepared.skipped.len(), "batch stored");

    Ok(Json(BatchReport {
        submitted: prepared.rows.len(),
        skipped: prepared.skipped,
        ids,
    }))
}

#[derive(Debug, Deserialize)]
struct ReconcileRequest {
    result: OptimizerResult,
    target_budget: f64,
    basis_budget: f64,
}

async fn reconcile_forecast(Json(req): Json<ReconcileRequest>) -> Json<ReconciledForecast> {
    Json(reconcile(&req.result, req.target_budget, req.basis_budget))
}

fn upstream_error(err: anyhow::Error) -> StatusCode {
    if let Some(diag) = err.downcast_ref::<OptimizerError>() {
        tracing::error!(stage = diag.stage, status = ?diag.status, error = %diag, "optimizer call failed");
        return StatusCode::BAD_GATEWAY;
    }
    internal_error(err)
}

fn internal_error(err: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %format!("{err:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
