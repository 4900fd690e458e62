use super::messages::{Ack, ClientEvent, RemoteEvent, EVENT_ERROR, EVENT_FFMPEG_OUTPUT};
use super::{Connector, Transport};
use crate::session::TransportOptions;
use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_SUBJECT_PREFIX: &str = "relay";

/// Transport over NATS
///
/// Every event travels on `<prefix>.<session_id>.<event>`. Acknowledged
/// events are NATS requests and the reply body is the acknowledgement.
pub struct NatsTransport {
    client: Client,
    subject_base: String,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl NatsTransport {
    fn listeners(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect to a NATS server
    pub async fn connect(url: &str, session_id: &str, options: &TransportOptions) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let delay_max = options.reconnection_delay_max();
        let mut connect_options = async_nats::ConnectOptions::new()
            // Acknowledgement deadlines belong to the session controller
            .request_timeout(None)
            .reconnect_delay_callback(move |attempts| reconnect_delay(attempts, delay_max));

        if let Some(timeout) = options.connection_timeout() {
            connect_options = connect_options.connection_timeout(timeout);
        }
        if let Some(max) = options.max_reconnects {
            connect_options = connect_options.max_reconnects(max);
        }
        if let Some(name) = &options.client_name {
            connect_options = connect_options.name(name);
        }

        let client = connect_options
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        let prefix = options
            .subject_prefix
            .as_deref()
            .unwrap_or(DEFAULT_SUBJECT_PREFIX);

        Ok(Self {
            client,
            subject_base: format!("{}.{}", prefix, session_id),
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn subject(&self, event: &str) -> String {
        format!("{}.{}", self.subject_base, event)
    }

    async fn listen(
        &self,
        event: &'static str,
        tx: mpsc::Sender<RemoteEvent>,
    ) -> Result<JoinHandle<()>> {
        let subject = self.subject(event);
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        info!("Subscribed to {}", subject);

        Ok(tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match RemoteEvent::decode(event, &msg.payload) {
                    Ok(remote_event) => {
                        if tx.send(remote_event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping malformed '{}' event: {:#}", event, e),
                }
            }

            debug!("Listener for {} stopped", subject);
        }))
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn emit_with_ack(&self, event: ClientEvent) -> Result<Ack> {
        let subject = self.subject(event.name());
        let payload = event.encode()?;

        let reply = self
            .client
            .request(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Request on {} failed", subject))?;

        Ack::decode(&reply.payload)
    }

    async fn emit(&self, event: ClientEvent) -> Result<()> {
        let subject = self.subject(event.name());
        let payload = event.encode()?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<RemoteEvent>> {
        let (tx, rx) = mpsc::channel(64);

        let error_listener = self.listen(EVENT_ERROR, tx.clone()).await?;
        let output_listener = self.listen(EVENT_FFMPEG_OUTPUT, tx).await?;

        self.listeners().extend([error_listener, output_listener]);

        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");

        let listeners: Vec<_> = self.listeners().drain(..).collect();
        for listener in listeners {
            listener.abort();
        }

        // async-nats disconnects once the last client handle is dropped
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;

        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Connects [`NatsTransport`]s
#[derive(Debug, Clone, Default)]
pub struct NatsConnector;

#[async_trait::async_trait]
impl Connector for NatsConnector {
    async fn connect(
        &self,
        target: &str,
        session_id: &str,
        options: &TransportOptions,
    ) -> Result<Arc<dyn Transport>> {
        let transport = NatsTransport::connect(target, session_id, options).await?;
        Ok(Arc::new(transport))
    }
}

/// Exponential backoff starting at 100ms, capped at `max`
pub fn reconnect_delay(attempts: usize, max: Duration) -> Duration {
    let exponent = attempts.min(16) as u32;
    Duration::from_millis(100u64.saturating_mul(1u64 << exponent)).min(max)
}
