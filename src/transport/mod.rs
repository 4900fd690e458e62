//! Bidirectional message transport to the remote transcoder
//!
//! The controller only needs three things from a transport: send an event
//! and wait for its acknowledgement, send an event without waiting, and
//! receive events pushed by the remote. Reconnection is the transport's job.

pub mod messages;
pub mod nats;

pub use messages::{Ack, ClientEvent, ErrorDescriptor, RemoteEvent};
pub use nats::{NatsConnector, NatsTransport};

use crate::session::TransportOptions;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An open connection to the remote service
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send an event and wait until the remote acknowledges it
    async fn emit_with_ack(&self, event: ClientEvent) -> Result<Ack>;

    /// Send an event without waiting for an acknowledgement
    async fn emit(&self, event: ClientEvent) -> Result<()>;

    /// Start receiving remote events
    ///
    /// Called once per connection; the channel closes when the connection does.
    async fn subscribe(&self) -> Result<mpsc::Receiver<RemoteEvent>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Opens transports
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `target` (socket scheme, host and port)
    async fn connect(
        &self,
        target: &str,
        session_id: &str,
        options: &TransportOptions,
    ) -> Result<Arc<dyn Transport>>;
}
