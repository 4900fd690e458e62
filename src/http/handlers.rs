use super::state::AppState;
use crate::session::{SessionError, SessionState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub session_id: String,
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind: configuration, capture_arming, remote, timeout, transport
    pub kind: String,
    pub error: String,
}

fn transition_response(state: &AppState, session_state: SessionState, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(TransitionResponse {
            session_id: state.controller.config().session_id.clone(),
            state: session_state,
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn error_response(err: &SessionError) -> Response {
    let status = match err {
        SessionError::Configuration(_) => StatusCode::BAD_REQUEST,
        SessionError::CaptureArming(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::Remote(_) | SessionError::Transport(_) => StatusCode::BAD_GATEWAY,
        SessionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    };

    (
        status,
        Json(ErrorResponse {
            kind: err.kind().to_string(),
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start the session, or resume it when paused
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested over HTTP");

    match state.controller.start().await {
        Ok(()) => {
            let session_state = state.controller.state();
            transition_response(&state, session_state, "Session started")
        }
        Err(e) => {
            error!("Failed to start session: {}", e);
            error_response(&e)
        }
    }
}

/// POST /session/pause
/// Pause chunk production
pub async fn pause_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Pause requested over HTTP");

    state.controller.pause();
    let session_state = state.controller.state();
    let message = match session_state {
        SessionState::Paused => "Session paused",
        SessionState::Idle => "No session to pause",
        _ => "Session could not be paused",
    };
    transition_response(&state, session_state, message)
}

/// POST /session/stop
/// Stop the session
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested over HTTP");

    match state.controller.stop().await {
        Ok(()) => {
            let session_state = state.controller.state();
            transition_response(&state, session_state, "Session stopped")
        }
        Err(e) => {
            error!("Failed to stop session: {}", e);
            error_response(&e)
        }
    }
}

/// GET /session/status
/// Get status of the session
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.status()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
