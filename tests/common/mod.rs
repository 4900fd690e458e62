// Scripted collaborators for driving a SessionController in tests
//
// MockTransport records every event the controller sends and lets a test
// hold acknowledgements back or push remote events. MockSource/MockRecorder
// expose a RecorderProbe the test uses to emit chunks and observe calls.

#![allow(dead_code)]

use anyhow::{bail, Result};
use media_relay::capture::SharedRecorderState;
use media_relay::{
    Ack, CaptureSource, ClientEvent, Connector, ErrorDescriptor, MediaChunk, Recorder,
    RecorderSettings, RecorderState, RemoteEvent, SessionController, SessionEvent,
    SessionOptions, Transport, TransportOptions,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

// ============================================================================
// Transport
// ============================================================================

/// One event the controller sent to the remote
#[derive(Debug, Clone)]
pub struct SentEvent {
    pub name: &'static str,
    pub payload: Vec<u8>,
    /// Whether the controller asked for an acknowledgement
    pub acked: bool,
}

impl SentEvent {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("payload is not JSON")
    }
}

#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentEvent>>,
    hold_acks: AtomicBool,
    pending: Mutex<VecDeque<oneshot::Sender<Ack>>>,
    chunk_ack_error: Mutex<Option<ErrorDescriptor>>,
    start_ack_error: Mutex<Option<ErrorDescriptor>>,
    remote_tx: Mutex<Option<mpsc::Sender<RemoteEvent>>>,
    pub subscribes: AtomicUsize,
    pub closed: AtomicBool,
}

impl MockTransport {
    /// Keep acknowledgements pending until released with [`release_ack`]
    pub fn hold_acks(&self, hold: bool) {
        self.hold_acks.store(hold, Ordering::SeqCst);
    }

    pub fn set_chunk_ack_error(&self, error: Option<ErrorDescriptor>) {
        *self.chunk_ack_error.lock().unwrap() = error;
    }

    pub fn set_start_ack_error(&self, error: Option<ErrorDescriptor>) {
        *self.start_ack_error.lock().unwrap() = error;
    }

    pub fn sent(&self) -> Vec<SentEvent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_named(&self, name: &str) -> Vec<SentEvent> {
        self.sent().into_iter().filter(|e| e.name == name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.sent_named(name).len()
    }

    pub fn pending_acks(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Wait until `n` acknowledgements are being held
    pub async fn wait_for_pending(&self, n: usize) {
        wait_until(|| self.pending_acks() >= n).await;
    }

    /// Acknowledge the oldest held request
    pub fn release_ack(&self, ack: Ack) {
        let tx = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pending acknowledgement");
        let _ = tx.send(ack);
    }

    /// Deliver an event as if pushed by the remote
    pub async fn push_remote(&self, event: RemoteEvent) {
        let tx = self
            .remote_tx
            .lock()
            .unwrap()
            .clone()
            .expect("controller has not subscribed");
        tx.send(event).await.expect("controller stopped listening");
    }

    fn record(&self, event: &ClientEvent, acked: bool) -> Result<()> {
        self.sent.lock().unwrap().push(SentEvent {
            name: event.name(),
            payload: event.encode()?,
            acked,
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn emit_with_ack(&self, event: ClientEvent) -> Result<Ack> {
        self.record(&event, true)?;

        let scripted_error = match &event {
            ClientEvent::Start(_) => self.start_ack_error.lock().unwrap().clone(),
            ClientEvent::BinaryStream(_) => self.chunk_ack_error.lock().unwrap().clone(),
            ClientEvent::Stop => None,
        };
        let ack = Ack {
            error: scripted_error,
        };

        // Chunks are never held so tests can script start/stop round-trips
        if !self.hold_acks.load(Ordering::SeqCst) || matches!(event, ClientEvent::BinaryStream(_))
        {
            return Ok(ack);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push_back(tx);
        match rx.await {
            Ok(released) => Ok(released),
            Err(_) => bail!("connection closed before acknowledgement"),
        }
    }

    async fn emit(&self, event: ClientEvent) -> Result<()> {
        self.record(&event, false)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<RemoteEvent>> {
        let (tx, rx) = mpsc::channel(16);
        *self.remote_tx.lock().unwrap() = Some(tx);
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.remote_tx.lock().unwrap().take();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub transport: Arc<MockTransport>,
    pub connects: AtomicUsize,
    pub last_target: Mutex<Option<String>>,
    pub last_options: Mutex<Option<TransportOptions>>,
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        target: &str,
        _session_id: &str,
        options: &TransportOptions,
    ) -> Result<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_target.lock().unwrap() = Some(target.to_string());
        *self.last_options.lock().unwrap() = Some(options.clone());
        Ok(Arc::clone(&self.transport) as Arc<dyn Transport>)
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Observes and drives the recorders a MockSource hands out
#[derive(Default)]
pub struct RecorderProbe {
    pub state: SharedRecorderState,
    pub opened: AtomicUsize,
    pub starts: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_start: AtomicBool,
    pub last_timeslice: Mutex<Option<Duration>>,
    pub last_settings: Mutex<Option<RecorderSettings>>,
    chunk_tx: Mutex<Option<mpsc::Sender<MediaChunk>>>,
    sequence: AtomicUsize,
}

impl RecorderProbe {
    pub fn recorder_state(&self) -> RecorderState {
        self.state.get()
    }

    /// Produce a chunk as the capture subsystem would
    pub async fn emit_chunk(&self, data: Vec<u8>) {
        assert!(self.offer_chunk(data).await, "recorder is not producing");
    }

    /// Produce a chunk if anything is still receiving; returns whether it
    /// was accepted
    pub async fn offer_chunk(&self, data: Vec<u8>) -> bool {
        let Some(tx) = self.chunk_tx.lock().unwrap().clone() else {
            return false;
        };
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) as u64;
        tx.send(MediaChunk {
            data,
            sequence,
            timestamp_ms: sequence * 250,
        })
        .await
        .is_ok()
    }
}

pub struct MockRecorder {
    probe: Arc<RecorderProbe>,
}

#[async_trait::async_trait]
impl Recorder for MockRecorder {
    async fn start(&self, timeslice: Duration) -> Result<mpsc::Receiver<MediaChunk>> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_timeslice.lock().unwrap() = Some(timeslice);

        if self.probe.fail_start.load(Ordering::SeqCst) {
            bail!("camera is busy");
        }

        let (tx, rx) = mpsc::channel(16);
        *self.probe.chunk_tx.lock().unwrap() = Some(tx);
        self.probe.state.set(RecorderState::Recording);
        Ok(rx)
    }

    fn pause(&self) {
        self.probe.pauses.fetch_add(1, Ordering::SeqCst);
        self.probe
            .state
            .transition(RecorderState::Recording, RecorderState::Paused);
    }

    fn resume(&self) {
        self.probe.resumes.fetch_add(1, Ordering::SeqCst);
        self.probe
            .state
            .transition(RecorderState::Paused, RecorderState::Recording);
    }

    async fn stop(&self) -> Result<()> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.probe.chunk_tx.lock().unwrap().take();
        self.probe.state.set(RecorderState::Inactive);
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.probe.state.get()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockSource {
    pub probe: Arc<RecorderProbe>,
}

impl CaptureSource for MockSource {
    fn open_recorder(&self, settings: &RecorderSettings) -> Result<Box<dyn Recorder>> {
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_settings.lock().unwrap() = Some(*settings);
        // Every recorder starts out inactive
        self.probe.state.set(RecorderState::Inactive);
        Ok(Box::new(MockRecorder {
            probe: Arc::clone(&self.probe),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub controller: Arc<SessionController>,
    pub connector: MockConnector,
    pub transport: Arc<MockTransport>,
    pub probe: Arc<RecorderProbe>,
    pub source: Option<Arc<dyn CaptureSource>>,
}

pub async fn harness(options: SessionOptions) -> Harness {
    let probe = Arc::new(RecorderProbe::default());
    let source: Arc<dyn CaptureSource> = Arc::new(MockSource {
        probe: Arc::clone(&probe),
    });
    let connector = MockConnector::default();

    let controller = SessionController::connect(options, Arc::downgrade(&source), &connector)
        .await
        .expect("controller should connect");

    Harness {
        controller: Arc::new(controller),
        transport: Arc::clone(&connector.transport),
        connector,
        probe,
        source: Some(source),
    }
}

pub fn example_options() -> SessionOptions {
    SessionOptions {
        host: Some("example.com".to_string()),
        https: true,
        ..Default::default()
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Next controller event, failing the test after two seconds
pub async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no session event within 2s")
        .expect("event channel closed")
}
