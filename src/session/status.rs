use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the session controller is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recorder, no remote session
    Idle,
    /// Waiting for the remote to acknowledge `start`
    Starting,
    Active,
    Paused,
    /// Production halted, waiting for the remote to acknowledge `stop`
    Stopping,
}

/// Snapshot of a session controller
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,

    pub state: SessionState,

    /// Where the transport is connected (socket scheme, host and port)
    pub connection_target: String,

    /// When the current session was armed, if one is running
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Chunks the remote acknowledged without error
    pub chunks_sent: u64,

    /// Chunk acknowledgements that carried an error descriptor
    pub chunk_errors: u64,
}
