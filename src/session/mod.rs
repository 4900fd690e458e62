//! Session management
//!
//! This module provides the `SessionController` that keeps a local recorder
//! and a remote transcoding session in step:
//! - Configuration normalization (defaults, derived values, endpoint scheme)
//! - Start/pause/stop transitions with remote acknowledgements
//! - Chunk forwarding with per-chunk error feedback
//! - Remote error and diagnostic fan-out to subscribers

mod config;
mod controller;
mod error;
mod events;
mod status;

pub use config::{
    normalize_host, SessionConfig, SessionOptions, TransportOptions, DEFAULT_ACK_TIMEOUT_MS,
    DEFAULT_AUDIO_BITRATE, DEFAULT_FRAME_RATE, DEFAULT_PORT, DEFAULT_RECONNECTION_DELAY_MAX_MS,
    DEFAULT_VIDEO_BITRATE,
};
pub use controller::{SessionController, CHUNK_TIMESLICE};
pub use error::SessionError;
pub use events::SessionEvent;
pub use status::{SessionState, SessionStatus};
