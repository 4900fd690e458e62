use crate::transport::ErrorDescriptor;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the session controller.
///
/// Each variant answers a different question for the caller: whether the
/// session was misconfigured, whether capture could not begin locally, or
/// whether the remote side rejected or ended the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Required configuration is missing or invalid. No controller is built
    /// and no connection is opened.
    #[error("invalid session configuration: {0}")]
    Configuration(String),

    /// The capture subsystem could not begin producing chunks.
    #[error("capture could not be armed: {0:#}")]
    CaptureArming(#[source] anyhow::Error),

    /// The remote service reported an error.
    #[error("remote error: {0}")]
    Remote(ErrorDescriptor),

    /// An acknowledgement did not arrive in time.
    #[error("no acknowledgement for '{operation}' after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The transport failed to connect or to deliver a request.
    #[error("transport failure: {0:#}")]
    Transport(#[source] anyhow::Error),
}

impl SessionError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::CaptureArming(_) => "capture_arming",
            Self::Remote(_) => "remote",
            Self::Timeout { .. } => "timeout",
            Self::Transport(_) => "transport",
        }
    }

    /// Whether the failure happened locally, before or while arming capture.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::CaptureArming(_))
    }
}
