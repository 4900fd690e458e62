use super::config::{SessionConfig, SessionOptions};
use super::error::SessionError;
use super::events::SessionEvent;
use super::status::{SessionState, SessionStatus};
use crate::capture::{CaptureSource, MediaChunk, Recorder, RecorderSettings, RecorderState};
use crate::transport::{Ack, ClientEvent, Connector, ErrorDescriptor, RemoteEvent, Transport};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Recorders are asked for a chunk at least this often
pub const CHUNK_TIMESLICE: Duration = Duration::from_millis(250);

/// Chunk sends awaiting acknowledgement at once
const MAX_CHUNKS_IN_FLIGHT: usize = 8;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Relays one capture source to one remote session
///
/// The controller keeps the local recorder and the remote session in step:
/// `start` creates a recorder and waits for the remote before producing
/// chunks, `stop` halts production before telling the remote, and a fatal
/// remote error tears the recorder down without further negotiation. When a
/// finite source runs dry the remote is told to stop as well.
///
/// Overlapping `start` calls, or overlapping `stop` calls, are not queued.
/// Callers must wait for one to settle before issuing the next of the same
/// kind; interleaving them leaves the outcome undefined.
///
/// Dropping the controller without `stop` or `destroy` abandons the remote
/// session but halts local production and relaying.
pub struct SessionController {
    shared: Arc<Shared>,
    source: Weak<dyn CaptureSource>,
    listener: JoinHandle<()>,
}

struct Shared {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<SessionEvent>,
    /// Never held across an await
    inner: Mutex<Inner>,
    chunks_sent: AtomicU64,
    chunk_errors: AtomicU64,
}

struct Inner {
    state: SessionState,
    /// The recorder handle; at most one per controller
    recorder: Option<Arc<dyn Recorder>>,
    forwarder: Option<JoinHandle<()>>,
    /// Bumped every time production is armed
    generation: u64,
    started_at: Option<DateTime<Utc>>,
}

impl SessionController {
    /// Validate `options`, connect to the remote and start listening for its
    /// events.
    ///
    /// The controller only keeps a weak reference to `source`; the caller
    /// owns it.
    pub async fn connect(
        options: SessionOptions,
        source: Weak<dyn CaptureSource>,
        connector: &dyn Connector,
    ) -> Result<Self, SessionError> {
        let config = options.normalize()?;
        let target = config.connection_target();

        info!("Creating session {} -> {}", config.session_id, target);

        let transport = connector
            .connect(&target, &config.session_id, &config.transport)
            .await
            .map_err(SessionError::Transport)?;

        let remote_events = transport
            .subscribe()
            .await
            .context("Failed to subscribe to remote events")
            .map_err(SessionError::Transport)?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            config,
            transport,
            events,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                recorder: None,
                forwarder: None,
                generation: 0,
                started_at: None,
            }),
            chunks_sent: AtomicU64::new(0),
            chunk_errors: AtomicU64::new(0),
        });

        let listener = tokio::spawn(listen_remote(Arc::clone(&shared), remote_events));

        Ok(Self {
            shared,
            source,
            listener,
        })
    }

    /// Start the session, or resume it if a recorder already exists
    pub async fn start(&self) -> Result<(), SessionError> {
        let existing = self.shared.lock().recorder.clone();

        if let Some(recorder) = existing {
            match recorder.state() {
                RecorderState::Recording => {
                    debug!("Session already recording");
                    return Ok(());
                }
                RecorderState::Paused => {
                    recorder.resume();
                    self.shared.lock().state = SessionState::Active;
                    info!("Session resumed");
                    return Ok(());
                }
                RecorderState::Inactive => {
                    info!("Re-arming inactive recorder");
                    return self
                        .shared
                        .arm(&recorder)
                        .await
                        .map_err(SessionError::CaptureArming);
                }
            }
        }

        let source = self.source.upgrade().ok_or_else(|| {
            SessionError::CaptureArming(anyhow!("capture source has been dropped"))
        })?;

        let settings = RecorderSettings {
            audio_bitrate: self.shared.config.audio_bitrate,
            video_bitrate: self.shared.config.video_bitrate,
        };

        let recorder: Arc<dyn Recorder> = source
            .open_recorder(&settings)
            .with_context(|| format!("Failed to open recorder on {}", source.name()))
            .map_err(SessionError::CaptureArming)?
            .into();
        drop(source);

        info!(
            "Starting session {} with {} recorder",
            self.shared.config.session_id,
            recorder.name()
        );

        {
            let mut inner = self.shared.lock();
            inner.recorder = Some(Arc::clone(&recorder));
            inner.state = SessionState::Starting;
        }

        let ack = self
            .shared
            .request(ClientEvent::Start(Box::new(self.shared.config.clone())))
            .await;

        let ack = match ack {
            Ok(ack) => ack,
            Err(e) => {
                error!("Remote did not accept start: {}", e);
                self.shared.lock().discard();
                return Err(e);
            }
        };

        if let Some(descriptor) = ack.error {
            self.shared.lock().discard();
            self.shared.handle_remote_error(descriptor.clone()).await;
            return Err(SessionError::Remote(descriptor));
        }

        match self.shared.arm(&recorder).await {
            Ok(()) => {
                info!("Session {} started", self.shared.config.session_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to arm capture: {:#}", e);
                self.shared.lock().discard();

                // Fire-and-forget: the remote must not keep a session with no media
                if let Err(notify_err) = self.shared.transport.emit(ClientEvent::Stop).await {
                    warn!("Failed to notify remote of aborted start: {:#}", notify_err);
                }

                Err(SessionError::CaptureArming(e))
            }
        }
    }

    /// Pause chunk production. The remote is not told.
    pub fn pause(&self) {
        let mut inner = self.shared.lock();

        let Some(recorder) = inner.recorder.clone() else {
            debug!("No recorder to pause");
            return;
        };

        recorder.pause();
        if recorder.state() == RecorderState::Paused {
            inner.state = SessionState::Paused;
            info!("Session paused");
        }
    }

    /// Stop production, then end the remote session
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (recorder, forwarder) = {
            let mut inner = self.shared.lock();

            let Some(recorder) = inner.recorder.clone() else {
                debug!("No recorder to stop");
                return Ok(());
            };
            if recorder.state() == RecorderState::Inactive {
                debug!("Recorder already inactive");
                return Ok(());
            }

            inner.state = SessionState::Stopping;
            (recorder, inner.forwarder.take())
        };

        info!("Stopping session {}", self.shared.config.session_id);

        if let Err(e) = recorder.stop().await {
            warn!("Recorder did not stop cleanly: {:#}", e);
        }
        drop(recorder);

        // Chunks already produced go out before the remote is told to stop
        if let Some(forwarder) = forwarder {
            self.shared.drain_forwarder(forwarder).await;
        }

        let ack = self.shared.request(ClientEvent::Stop).await;

        self.shared.lock().discard();

        match ack {
            Ok(Ack { error: None }) => {
                info!("Session {} stopped", self.shared.config.session_id);
                Ok(())
            }
            Ok(Ack {
                error: Some(descriptor),
            }) => {
                self.shared.handle_remote_error(descriptor.clone()).await;
                Err(SessionError::Remote(descriptor))
            }
            Err(e) => {
                error!("Remote did not acknowledge stop: {}", e);
                Err(e)
            }
        }
    }

    /// Tear the controller down: stop local production, stop listening to
    /// the remote, close the transport and announce `Destroyed`.
    pub async fn destroy(self) {
        info!("Destroying session {}", self.shared.config.session_id);

        let (recorder, forwarder) = {
            let mut inner = self.shared.lock();
            let taken = (inner.recorder.take(), inner.forwarder.take());
            inner.discard();
            taken
        };

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }

        if let Some(recorder) = recorder {
            if recorder.state() != RecorderState::Inactive {
                if let Err(e) = recorder.stop().await {
                    warn!("Recorder did not stop cleanly: {:#}", e);
                }
            }
        }

        self.listener.abort();

        if let Err(e) = self.shared.transport.close().await {
            warn!("Failed to close {} transport: {:#}", self.shared.transport.name(), e);
        }

        self.shared.publish(SessionEvent::Destroyed);
    }

    /// Receive the controller's events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.shared.lock();
        let duration_secs = inner
            .started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStatus {
            session_id: self.shared.config.session_id.clone(),
            state: inner.state,
            connection_target: self.shared.config.connection_target(),
            started_at: inner.started_at,
            duration_secs,
            chunks_sent: self.shared.chunks_sent.load(Ordering::SeqCst),
            chunk_errors: self.shared.chunk_errors.load(Ordering::SeqCst),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.listener.abort();

        let mut inner = self.shared.lock();
        if let Some(forwarder) = inner.forwarder.take() {
            forwarder.abort();
        }
        inner.discard();
    }
}

impl Inner {
    /// Drop the recorder handle and return to idle. No-op without a recorder.
    fn discard(&mut self) {
        self.recorder = None;
        // Detached: the forwarder ends when its chunk channel closes
        self.forwarder = None;
        self.state = SessionState::Idle;
        self.started_at = None;
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Send an acknowledged event, bounded by the configured ack timeout
    async fn request(&self, event: ClientEvent) -> Result<Ack, SessionError> {
        let operation = event.name();
        let pending = self.transport.emit_with_ack(event);

        let ack = match self.config.ack_timeout {
            Some(after) => tokio::time::timeout(after, pending)
                .await
                .map_err(|_| SessionError::Timeout { operation, after })?,
            None => pending.await,
        };

        ack.map_err(SessionError::Transport)
    }

    /// Begin chunk production on `recorder` and relay what it produces
    async fn arm(self: &Arc<Self>, recorder: &Arc<dyn Recorder>) -> anyhow::Result<()> {
        // Bumped first: re-arming closes the previous chunk channel, and that
        // forwarder must not mistake it for the source running dry
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.generation
        };

        let chunks = recorder.start(CHUNK_TIMESLICE).await?;

        let mut inner = self.lock();
        let forwarder = tokio::spawn(forward_chunks(
            Arc::downgrade(self),
            Arc::clone(&self.transport),
            generation,
            chunks,
        ));
        // A forwarder from an earlier arming drains on its own
        inner.forwarder = Some(forwarder);
        inner.state = SessionState::Active;
        if inner.started_at.is_none() {
            inner.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn drain_forwarder(&self, mut forwarder: JoinHandle<()>) {
        let joined = match self.config.ack_timeout {
            Some(after) => match tokio::time::timeout(after, &mut forwarder).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Chunk acknowledgements still pending after {:?}", after);
                    forwarder.abort();
                    return;
                }
            },
            None => forwarder.await,
        };

        if let Err(e) = joined {
            error!("Chunk forwarder panicked: {}", e);
        }
    }

    /// Handle an error reported by the remote
    ///
    /// Subscribers always see the error. A fatal error also stops and drops
    /// an active recorder; the remote already considers the session over, so
    /// it is not notified.
    async fn handle_remote_error(&self, descriptor: ErrorDescriptor) {
        if descriptor.fatal {
            let teardown = {
                let mut inner = self.lock();
                let producing = inner
                    .recorder
                    .as_ref()
                    .is_some_and(|r| r.state() != RecorderState::Inactive);

                if producing {
                    let recorder = inner.recorder.take();
                    inner.discard();
                    recorder
                } else {
                    None
                }
            };

            match teardown {
                Some(recorder) => {
                    warn!("Fatal remote error, tearing down recording: {}", descriptor.message);
                    if let Err(e) = recorder.stop().await {
                        warn!("Recorder did not stop cleanly: {:#}", e);
                    }
                }
                None => {
                    warn!("Fatal remote error with no active recording: {}", descriptor.message);
                }
            }
        } else {
            warn!("Remote error: {}", descriptor.message);
        }

        self.publish(SessionEvent::Error(descriptor));
    }

    /// The recorder armed as `generation` ran out of media on its own
    ///
    /// Ends the remote session so both sides agree production is over. Does
    /// nothing if the session was stopped, torn down or re-armed meanwhile.
    async fn finish_production(&self, generation: u64) {
        let recorder = {
            let mut inner = self.lock();
            let current = inner.generation == generation
                && matches!(inner.state, SessionState::Active | SessionState::Paused);
            if !current {
                return;
            }

            inner.state = SessionState::Stopping;
            inner.forwarder = None;
            inner.recorder.clone()
        };

        info!(
            "Capture source finished, ending session {}",
            self.config.session_id
        );

        if let Some(recorder) = recorder {
            if recorder.state() != RecorderState::Inactive {
                if let Err(e) = recorder.stop().await {
                    warn!("Recorder did not stop cleanly: {:#}", e);
                }
            }
        }

        let ack = self.request(ClientEvent::Stop).await;

        self.lock().discard();

        match ack {
            Ok(Ack { error: None }) => {
                info!("Session {} ended", self.config.session_id);
            }
            Ok(Ack {
                error: Some(descriptor),
            }) => self.handle_remote_error(descriptor).await,
            Err(e) => error!("Remote did not acknowledge stop: {}", e),
        }
    }
}

/// Route remote events to the controller
async fn listen_remote(shared: Arc<Shared>, mut remote_events: mpsc::Receiver<RemoteEvent>) {
    while let Some(event) = remote_events.recv().await {
        match event {
            RemoteEvent::Error(descriptor) => shared.handle_remote_error(descriptor).await,
            RemoteEvent::FfmpegOutput(text) => shared.publish(SessionEvent::FfmpegOutput(text)),
        }
    }

    debug!("Remote event stream closed");
}

/// Send every produced chunk as `binarystream`, handling acknowledgements in
/// production order
///
/// Holds the controller weakly, so a dropped controller does not keep its
/// recorder alive through this task.
async fn forward_chunks(
    shared: Weak<Shared>,
    transport: Arc<dyn Transport>,
    generation: u64,
    chunks: mpsc::Receiver<MediaChunk>,
) {
    debug!("Chunk forwarder {} started", generation);

    let mut acks = Box::pin(
        stream::unfold(chunks, |mut rx| async move { rx.recv().await.map(|c| (c, rx)) })
            .map(move |chunk| {
                let transport = Arc::clone(&transport);
                async move {
                    let sequence = chunk.sequence;
                    let ack = transport
                        .emit_with_ack(ClientEvent::BinaryStream(chunk.data))
                        .await;
                    (sequence, ack)
                }
            })
            .buffered(MAX_CHUNKS_IN_FLIGHT),
    );

    while let Some((sequence, ack)) = acks.next().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };

        match ack {
            Ok(Ack { error: None }) => {
                shared.chunks_sent.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Ack {
                error: Some(descriptor),
            }) => {
                shared.chunk_errors.fetch_add(1, Ordering::SeqCst);
                shared.handle_remote_error(descriptor).await;
            }
            Err(e) => warn!("Failed to send chunk {}: {:#}", sequence, e),
        }
    }

    debug!("Chunk forwarder {} stopped", generation);

    if let Some(shared) = shared.upgrade() {
        shared.finish_production(generation).await;
    }
}
