//! Subscriber callbacks.

use async_trait::async_trait;
use chorus_core::commit::CommitEvent;
use chorus_core::error::ErrorCode;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber is gone")]
    Closed,

    #[error("subscriber rejected event: {0}")]
    Rejected(String),
}

impl DeliveryError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::DeliveryFailure
    }
}

/// A viewer-side callback that receives commit events.
///
/// A failed delivery is final: the broker drops the registration.
#[async_trait]
pub trait CommitListener: Send + Sync {
    async fn deliver(&self, event: &CommitEvent) -> Result<(), DeliveryError>;
}

/// Forwards typed events into an unbounded channel.
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<CommitEvent>,
}

impl ChannelListener {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CommitEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommitListener for ChannelListener {
    async fn deliver(&self, event: &CommitEvent) -> Result<(), DeliveryError> {
        self.tx.send(event.clone()).map_err(|_| DeliveryError::Closed)
    }
}

/// Forwards events as JSON wire envelopes, the way a remote viewer
/// receives them over the transport.
#[derive(Debug)]
pub struct WireListener {
    tx: mpsc::UnboundedSender<String>,
}

impl WireListener {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommitListener for WireListener {
    async fn deliver(&self, event: &CommitEvent) -> Result<(), DeliveryError> {
        self.tx.send(event.to_json()).map_err(|_| DeliveryError::Closed)
    }
}
