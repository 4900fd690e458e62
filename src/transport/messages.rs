use crate::session::SessionConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EVENT_START: &str = "start";
pub const EVENT_BINARY_STREAM: &str = "binarystream";
pub const EVENT_STOP: &str = "stop";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_FFMPEG_OUTPUT: &str = "ffmpegOutput";

/// Error reported by the remote transcoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub message: String,

    /// A fatal error means the remote has already ended the session
    #[serde(default)]
    pub fatal: bool,
}

impl ErrorDescriptor {
    pub fn new(message: impl Into<String>, fatal: bool) -> Self {
        Self {
            message: message.into(),
            fatal,
        }
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "{} (fatal)", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Event sent from the client to the remote
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Begin remote-side handling with the full session configuration
    Start(Box<SessionConfig>),
    /// One encoded media chunk
    BinaryStream(Vec<u8>),
    /// End remote-side handling
    Stop,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Start(_) => EVENT_START,
            ClientEvent::BinaryStream(_) => EVENT_BINARY_STREAM,
            ClientEvent::Stop => EVENT_STOP,
        }
    }

    /// Wire payload for this event
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            ClientEvent::Start(config) => {
                serde_json::to_vec(config).context("Failed to encode start payload")
            }
            ClientEvent::BinaryStream(chunk) => Ok(chunk.clone()),
            ClientEvent::Stop => Ok(Vec::new()),
        }
    }
}

/// Event pushed by the remote to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    Error(ErrorDescriptor),
    FfmpegOutput(String),
}

impl RemoteEvent {
    /// Decode an inbound event from its name and raw payload
    pub fn decode(event: &str, payload: &[u8]) -> Result<Self> {
        match event {
            EVENT_ERROR => {
                let descriptor = serde_json::from_slice(payload)
                    .context("Failed to parse remote error descriptor")?;
                Ok(RemoteEvent::Error(descriptor))
            }
            EVENT_FFMPEG_OUTPUT => Ok(RemoteEvent::FfmpegOutput(
                String::from_utf8_lossy(payload).into_owned(),
            )),
            other => anyhow::bail!("Unknown remote event '{}'", other),
        }
    }
}

/// Acknowledgement of a client event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    pub error: Option<ErrorDescriptor>,
}

impl Ack {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_error(error: ErrorDescriptor) -> Self {
        Self { error: Some(error) }
    }

    /// Parse an acknowledgement body: empty or `null` means success,
    /// anything else must be an error descriptor.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let trimmed = payload.trim_ascii();
        if trimmed.is_empty() || trimmed == b"null" {
            return Ok(Self::ok());
        }

        let error = serde_json::from_slice(trimmed).context("Failed to parse acknowledgement")?;
        Ok(Self { error: Some(error) })
    }
}
