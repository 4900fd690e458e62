//! HTTP API for driving a session from an embedding application
//!
//! This module provides a small REST API over one `SessionController`:
//! - POST /session/start - Start or resume the session
//! - POST /session/pause - Pause chunk production
//! - POST /session/stop - Stop the session
//! - GET /session/status - Query session status
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, TransitionResponse};
pub use routes::create_router;
pub use state::AppState;
