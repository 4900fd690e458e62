use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One piece of encoded media produced by a recorder
#[derive(Debug, Clone)]
pub struct MediaChunk {
    /// Encoded bytes, opaque to the relay
    pub data: Vec<u8>,
    /// Chunk number within the recording (0-indexed)
    pub sequence: u64,
    /// Capture time in milliseconds since the recording started
    pub timestamp_ms: u64,
}

/// Encoder settings a recorder is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSettings {
    pub audio_bitrate: u32,
    pub video_bitrate: u32,
}

/// Production state of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// Not producing chunks (never started, stopped, or source exhausted)
    Inactive,
    Recording,
    Paused,
}

impl RecorderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecorderState::Recording,
            2 => RecorderState::Paused,
            _ => RecorderState::Inactive,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RecorderState::Inactive => 0,
            RecorderState::Recording => 1,
            RecorderState::Paused => 2,
        }
    }
}

/// Recorder state readable from the production task and the owner alike
#[derive(Debug, Clone)]
pub struct SharedRecorderState(Arc<AtomicU8>);

impl SharedRecorderState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RecorderState::Inactive.as_u8())))
    }

    pub fn get(&self) -> RecorderState {
        RecorderState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: RecorderState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Move to `to` only if currently in `from`
    pub fn transition(&self, from: RecorderState, to: RecorderState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for SharedRecorderState {
    fn default() -> Self {
        Self::new()
    }
}

/// Capture/encoding instance driven by the session controller
///
/// Methods take `&self`; the controller shares one handle between tasks.
///
/// Implementations:
/// - `WavFileRecorder`: relays PCM from a WAV file at real-time pace
/// - test doubles scripted by the integration tests
#[async_trait::async_trait]
pub trait Recorder: Send + Sync {
    /// Begin producing chunks, at least one every `timeslice`
    ///
    /// Returns a channel receiver that will receive encoded chunks. The
    /// channel closes once production ends.
    async fn start(&self, timeslice: Duration) -> Result<mpsc::Receiver<MediaChunk>>;

    /// Suspend production; no-op unless recording
    fn pause(&self);

    /// Continue production after a pause; no-op unless paused
    fn resume(&self);

    /// Stop production
    ///
    /// Returns once production has fully ceased. Must not wait for the chunk
    /// receiver to be drained.
    async fn stop(&self) -> Result<()>;

    fn state(&self) -> RecorderState;

    /// Recorder name for logging
    fn name(&self) -> &str;
}

/// A live media source recorders can be opened on
pub trait CaptureSource: Send + Sync {
    fn open_recorder(&self, settings: &RecorderSettings) -> Result<Box<dyn Recorder>>;

    fn name(&self) -> &str;
}
