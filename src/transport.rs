use crate::error::TransportError;
use crate::types::events::{LiveEvent, OutboundEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Inbound side of the socket connection, as delivered by the external
/// messaging service's client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket (re)connected. Room membership is not assumed to survive a
    /// reconnect, so the client re-joins every held conversation.
    Connected,
    Disconnected,
    Live(LiveEvent),
}

impl TransportEvent {
    /// Decode a named wire event, logging and dropping anything malformed or
    /// unknown. A single bad event must never take the pump down.
    pub fn live_from_wire(name: &str, payload: serde_json::Value) -> Option<Self> {
        match LiveEvent::from_wire(name, payload) {
            Ok(event) => Some(Self::Live(event)),
            Err(e) => {
                log::warn!("dropping wire event '{name}': {e}");
                None
            }
        }
    }
}

/// Outbound side of the socket connection. Reconnection is the transport's
/// own responsibility; this crate only reacts to `TransportEvent::Connected`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn emit(&self, event: OutboundEvent) -> Result<(), TransportError>;
}

/// In-process transport backed by channels, used by the test suite and for
/// local development without a live socket service.
pub struct LocalTransport {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
}

impl LocalTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { outbound: tx }), rx)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn emit(&self, event: OutboundEvent) -> Result<(), TransportError> {
        self.outbound
            .send(event)
            .map_err(|_| TransportError::NotConnected)
    }
}
