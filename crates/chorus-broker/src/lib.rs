//! Service-side subscriptions for chorus.
//!
//! Viewers register a [`CommitListener`] per document through a
//! [`DocService`]; every mutation the replication engine accepts is fanned
//! out by the [`SubscriptionBroker`] to the interested registrations.

pub mod broker;
pub mod connection;
pub mod listener;
pub mod service;

pub use broker::{BroadcastReport, ListenerHandle, RegistrationId, SubscriptionBroker};
pub use connection::{Connection, ConnectionId};
pub use listener::{ChannelListener, CommitListener, DeliveryError, WireListener};
pub use service::DocService;
