use crate::session::SessionController;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The session this API controls
    pub controller: Arc<SessionController>,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }
}
