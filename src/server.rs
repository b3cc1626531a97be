//! HTTP front-end API.
//!
//! Exposes the engine to editor/CLI front ends over a small JSON API. The
//! transport is deliberately plain request/response: the engine's
//! broadcast events drive in-process consumers, and remote front ends
//! poll `GET /suggestions/{id}` for transitions.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/queries` | Submit a query, returns the gated suggestion |
//! | `POST` | `/suggestions/{id}/respond` | Relay a human approve/decline |
//! | `GET`  | `/suggestions/{id}` | Fetch a suggestion's current state |
//! | `POST` | `/files/changed` | File-watcher collaborator event |
//! | `GET`  | `/sessions/{project_id}` | List a project's sessions |
//! | `GET`  | `/stats/{project_id}` | Acceptance statistics |
//! | `GET`  | `/health` | Health check (version + degraded flag) |
//!
//! # Error Contract
//!
//! All error responses use the envelope:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # Disconnects
//!
//! If a client drops the connection while its query is in flight, the
//! model call is cancelled and the suggestion is recorded as rejected
//! with reason `client_disconnected` — the compute is not wasted on a
//! result nobody will read.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use suggestion_gate_core::error::EngineError;
use suggestion_gate_core::gate::ApprovalDecision;
use suggestion_gate_core::models::{AcceptanceStats, Session, Suggestion, UpsertOutcome};

use crate::engine::{Engine, QueryRequest};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Start the HTTP server and the background expiry sweeper.
pub async fn run_server(engine: Arc<Engine>, bind_addr: &str) -> anyhow::Result<()> {
    // Sweep overdue approvals on a fraction of the timeout window so an
    // expiry lands close to its deadline.
    let sweep_interval = (engine.settings().approval_timeout / 4)
        .clamp(Duration::from_secs(1), Duration::from_secs(30));
    let sweeper_engine = engine.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper_engine.expire_overdue().await {
                warn!(error = %format!("{e:#}"), "expiry sweep failed");
            }
        }
    });

    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/queries", post(handle_query))
        .route("/suggestions/{id}", get(handle_get_suggestion))
        .route("/suggestions/{id}/respond", post(handle_respond))
        .route("/files/changed", post(handle_file_changed))
        .route("/sessions/{project_id}", get(handle_sessions))
        .route("/stats/{project_id}", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("suggestion engine listening on http://{}", bind_addr);
    println!("suggestion engine listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map engine failures onto the HTTP error contract.
fn classify_error(err: anyhow::Error) -> AppError {
    if let Some(engine_err) = err.downcast_ref::<EngineError>() {
        if matches!(engine_err, EngineError::SuggestionNotFound(_)) {
            return not_found(engine_err.to_string());
        }
    }
    internal(format!("{err:#}"))
}

// ============ Cancellation guard ============

/// Cancels the wrapped token when dropped without being disarmed — which
/// is exactly what happens when Axum drops a handler future because the
/// client went away.
struct DisconnectGuard {
    token: CancellationToken,
    armed: bool,
}

impl DisconnectGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    degraded: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        degraded: state.engine.is_degraded(),
    })
}

// ============ POST /queries ============

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Suggestion>, AppError> {
    if request.project_id.trim().is_empty() {
        return Err(bad_request("project_id must not be empty"));
    }
    if request.query_text.trim().is_empty() {
        return Err(bad_request("query_text must not be empty"));
    }

    let cancel = CancellationToken::new();
    let guard = DisconnectGuard::new(cancel.clone());

    // Run the pipeline on its own task: if this handler is dropped on
    // disconnect, the guard cancels the token and the detached task still
    // records the rejected suggestion.
    let engine = state.engine.clone();
    let task = tokio::spawn(async move { engine.submit_query_with_cancel(request, cancel).await });

    let result = task.await;
    guard.disarm();

    match result {
        Ok(Ok(suggestion)) => Ok(Json(suggestion)),
        Ok(Err(e)) => Err(classify_error(e)),
        Err(join_err) => Err(internal(format!("query task failed: {join_err}"))),
    }
}

// ============ GET /suggestions/{id} ============

async fn handle_get_suggestion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Suggestion>, AppError> {
    match state.engine.suggestion(&id).await {
        Ok(Some(suggestion)) => Ok(Json(suggestion)),
        Ok(None) => Err(not_found(format!("suggestion not found: {id}"))),
        Err(e) => Err(classify_error(e)),
    }
}

// ============ POST /suggestions/{id}/respond ============

#[derive(Deserialize)]
struct RespondRequest {
    decision: ApprovalDecision,
}

async fn handle_respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<Suggestion>, AppError> {
    state
        .engine
        .respond_to_approval(&id, request.decision)
        .await
        .map(Json)
        .map_err(classify_error)
}

// ============ POST /files/changed ============

#[derive(Deserialize)]
struct FileChangedRequest {
    project_id: String,
    file_path: String,
    content: String,
}

#[derive(Serialize)]
struct FileChangedResponse {
    created: usize,
    invalidated: usize,
}

impl From<UpsertOutcome> for FileChangedResponse {
    fn from(outcome: UpsertOutcome) -> Self {
        Self {
            created: outcome.created.len(),
            invalidated: outcome.invalidated.len(),
        }
    }
}

async fn handle_file_changed(
    State(state): State<AppState>,
    Json(request): Json<FileChangedRequest>,
) -> Result<Json<FileChangedResponse>, AppError> {
    if request.project_id.trim().is_empty() {
        return Err(bad_request("project_id must not be empty"));
    }
    if request.file_path.trim().is_empty() {
        return Err(bad_request("file_path must not be empty"));
    }

    state
        .engine
        .on_file_changed(&request.project_id, &request.file_path, &request.content)
        .await
        .map(|outcome| Json(outcome.into()))
        .map_err(classify_error)
}

// ============ GET /sessions/{project_id} ============

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<Session>,
}

async fn handle_sessions(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<SessionsResponse>, AppError> {
    state
        .engine
        .list_sessions(Some(&project_id))
        .await
        .map(|sessions| Json(SessionsResponse { sessions }))
        .map_err(classify_error)
}

// ============ GET /stats/{project_id} ============

#[derive(Serialize)]
struct StatsResponse {
    project_id: String,
    #[serde(flatten)]
    stats: AcceptanceStats,
}

async fn handle_stats(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<StatsResponse>, AppError> {
    // Stats live on the session store; reuse the engine's degraded-aware
    // accessor through a tiny helper.
    state
        .engine
        .acceptance_stats(&project_id)
        .await
        .map(|stats| {
            Json(StatsResponse {
                project_id,
                stats,
            })
        })
        .map_err(classify_error)
}
