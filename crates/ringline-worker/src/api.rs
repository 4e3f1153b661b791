//! HTTP handlers for call intake.

use crate::worker::WorkerError;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ringline_types::{CallAssignment, SessionSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Response body for an accepted call.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignResponse {
    pub session_id: String,
    pub call_id: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub agent_id: String,
    pub active_sessions: usize,
    pub max_sessions: usize,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        let msg = e.to_string();
        match e {
            WorkerError::AtCapacity(_) | WorkerError::ShuttingDown => ApiError::Unavailable(msg),
            WorkerError::DuplicateCall(_) => ApiError::Conflict(msg),
            WorkerError::InvalidAssignment(_) => ApiError::BadRequest(msg),
            WorkerError::UnknownCall(_) => ApiError::NotFound(msg),
            WorkerError::Session(_) => ApiError::InternalServerError(msg),
        }
    }
}

/// Handler for `GET /health`.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponse> {
    let worker = &state.worker;
    Json(HealthResponse {
        status: if worker.is_shutting_down() {
            "draining".to_string()
        } else {
            "ok".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        agent_id: worker.agent().id().to_string(),
        active_sessions: worker.active_sessions(),
        max_sessions: worker.max_sessions(),
    })
}

/// Handler for `POST /api/calls`.
pub async fn assign_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<CallAssignment>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignResponse>), ApiError> {
    let Json(call) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let summary = state.worker.assign(call).map_err(|e| {
        tracing::warn!(error = %e, "call assignment rejected");
        ApiError::from(e)
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AssignResponse {
            session_id: summary.session_id,
            call_id: summary.call_id,
        }),
    ))
}

/// Handler for `GET /api/calls`.
pub async fn list_calls_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<SessionSummary>> {
    Json(state.worker.sessions())
}

/// Handler for `GET /api/calls/{callId}`.
pub async fn get_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    state
        .worker
        .session(&call_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no active session for call '{}'", call_id)))
}

/// Handler for `POST /api/calls/{callId}/end`.
pub async fn end_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.worker.end_call(&call_id)?;
    tracing::info!(call_id = %call_id, "call end signalled");
    Ok(StatusCode::ACCEPTED)
}
