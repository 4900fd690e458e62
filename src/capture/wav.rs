// WAV file capture source: replays a recording as if it were live

use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::recorder::{
    CaptureSource, MediaChunk, Recorder, RecorderSettings, RecorderState, SharedRecorderState,
};

/// PCM audio loaded from a WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Unsupported WAV format: {}-bit {:?} (expected 16-bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into little-endian PCM chunks covering `timeslice` each
    pub fn pcm_chunks(&self, timeslice: Duration) -> Vec<Vec<u8>> {
        let samples_per_chunk = ((self.sample_rate as u128
            * self.channels as u128
            * timeslice.as_millis())
            / 1000)
            .max(self.channels as u128) as usize;

        self.samples
            .chunks(samples_per_chunk)
            .map(|chunk| chunk.iter().flat_map(|s| s.to_le_bytes()).collect())
            .collect()
    }
}

/// Capture source backed by a WAV file
#[derive(Debug, Clone)]
pub struct WavFileSource {
    path: PathBuf,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSource for WavFileSource {
    fn open_recorder(&self, settings: &RecorderSettings) -> Result<Box<dyn Recorder>> {
        Ok(Box::new(WavFileRecorder::new(self.path.clone(), *settings)))
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// Recorder emitting raw PCM from a WAV file, paced in real time
///
/// The file is read when production starts, so a missing or unreadable file
/// surfaces as a start failure.
pub struct WavFileRecorder {
    path: PathBuf,
    settings: RecorderSettings,
    state: SharedRecorderState,
    relay: Mutex<Option<Relay>>,
}

/// The running relay task and its stop signal
struct Relay {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WavFileRecorder {
    pub fn new(path: PathBuf, settings: RecorderSettings) -> Self {
        Self {
            path,
            settings,
            state: SharedRecorderState::new(),
            relay: Mutex::new(None),
        }
    }

    fn relay(&self) -> MutexGuard<'_, Option<Relay>> {
        self.relay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Recorder for WavFileRecorder {
    async fn start(&self, timeslice: Duration) -> Result<mpsc::Receiver<MediaChunk>> {
        if timeslice.is_zero() {
            bail!("Timeslice must be greater than zero");
        }
        if !self
            .state
            .transition(RecorderState::Inactive, RecorderState::Recording)
        {
            bail!("Already recording");
        }

        let chunks = match AudioFile::open(&self.path) {
            Ok(audio) => audio.pcm_chunks(timeslice),
            Err(e) => {
                self.state.set(RecorderState::Inactive);
                return Err(e);
            }
        };

        info!(
            "Starting WAV relay: {} chunks of {}ms (audio bitrate hint {})",
            chunks.len(),
            timeslice.as_millis(),
            self.settings.audio_bitrate
        );

        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = self.state.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeslice);
            let mut pending = chunks.into_iter();
            let mut sequence = 0u64;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                if state.get() == RecorderState::Paused {
                    continue;
                }

                let Some(data) = pending.next() else {
                    info!("WAV source exhausted after {} chunks", sequence);
                    break;
                };

                let chunk = MediaChunk {
                    data,
                    sequence,
                    timestamp_ms: sequence * timeslice.as_millis() as u64,
                };
                sequence += 1;

                tokio::select! {
                    _ = stop_rx.changed() => break,
                    sent = tx.send(chunk) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }

            state.set(RecorderState::Inactive);
        });

        // Replaces a relay that already ran dry
        *self.relay() = Some(Relay { stop_tx, task });

        Ok(rx)
    }

    fn pause(&self) {
        self.state
            .transition(RecorderState::Recording, RecorderState::Paused);
    }

    fn resume(&self) {
        self.state
            .transition(RecorderState::Paused, RecorderState::Recording);
    }

    async fn stop(&self) -> Result<()> {
        let relay = self.relay().take();

        if let Some(Relay { stop_tx, task }) = relay {
            let _ = stop_tx.send(true);
            if let Err(e) = task.await {
                error!("WAV relay task panicked: {}", e);
            }
        }

        self.state.set(RecorderState::Inactive);
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.state.get()
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

impl Drop for WavFileRecorder {
    fn drop(&mut self) {
        let relay = self
            .relay
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(relay) = relay {
            relay.task.abort();
        }
    }
}
