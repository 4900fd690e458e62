use crate::transport::ErrorDescriptor;

/// Events published by a session controller to its subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The remote reported an error, standalone or on a chunk acknowledgement
    Error(ErrorDescriptor),
    /// The controller has been torn down. Sent once.
    Destroyed,
    /// Diagnostic output from the remote transcoder, verbatim
    FfmpegOutput(String),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Error(_) => "error",
            SessionEvent::Destroyed => "destroyed",
            SessionEvent::FfmpegOutput(_) => "ffmpegOutput",
        }
    }
}
