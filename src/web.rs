//! JSON API over the sync orchestrator
//!
//! Lets a dashboard trigger a refresh, read the latest reconciliation and
//! request an explicit sync. Errors are returned as summaries, never as raw
//! failures.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::error::SyncError;
use crate::orchestrator::{SyncOrchestrator, SyncOutcome, SyncState};
use crate::reconcile::ReconciliationResult;

/// Shared application state (orchestrator behind an async lock)
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Mutex<SyncOrchestrator>>,
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(err: &SyncError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }
    }
}

/// Current state plus the latest results
#[derive(Serialize)]
struct StatusData {
    tenant_id: String,
    #[serde(flatten)]
    state: SyncState,
    sheet_rows_skipped: usize,
    reconciliation: Option<ReconciliationResult>,
    last_sync: Option<SyncOutcome>,
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// HTTP status for a whole-operation failure
fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::InvalidState(_) => StatusCode::CONFLICT,
        SyncError::ConfigMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SyncError::LoadFailure { .. } | SyncError::Network(_) | SyncError::HttpStatus(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T>(result: crate::Result<T>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => (status_for(&e), Json(ApiResponse::failed(&e))),
    }
}

/// GET /api/status
async fn status_handler(State(state): State<AppState>) -> Json<ApiResponse<StatusData>> {
    let orchestrator = state.orchestrator.lock().await;
    let snapshot = orchestrator.snapshot();

    Json(ApiResponse::ok(StatusData {
        tenant_id: orchestrator.config().tenant_id.clone(),
        state: orchestrator.state().clone(),
        sheet_rows_skipped: snapshot.sheet_rows_skipped,
        reconciliation: snapshot.reconciliation.clone(),
        last_sync: snapshot.last_sync.clone(),
    }))
}

/// POST /api/refresh - reload both sides and reconcile
async fn refresh_handler(State(state): State<AppState>) -> ApiResult<ReconciliationResult> {
    let mut orchestrator = state.orchestrator.lock().await;
    respond(orchestrator.refresh().await)
}

/// POST /api/sync - write the loaded sheet into the store
async fn sync_handler(State(state): State<AppState>) -> ApiResult<SyncOutcome> {
    let mut orchestrator = state.orchestrator.lock().await;
    respond(orchestrator.sync().await)
}

/// Build the web server router
pub fn create_router(orchestrator: Arc<Mutex<SyncOrchestrator>>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/sync", post(sync_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down web API");
}

/// Start the web server (async)
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
pub async fn serve(
    orchestrator: Arc<Mutex<SyncOrchestrator>>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(orchestrator);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("Web API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
