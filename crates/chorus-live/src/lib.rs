//! Client-side live sync for chorus.
//!
//! A [`Client`] follows one channel at a time through a
//! [`chorus_broker::DocService`]. Its [`LiveSync`] pipeline debounces local
//! edits into document commits, applies commits pushed by the service, and
//! keeps the editor caret stable across remote writes.

pub mod client;
pub mod debounce;
pub mod editor;
pub mod pipeline;
pub mod processed;
pub mod session;

pub use client::{Client, ServiceSync};
pub use debounce::SyncState;
pub use editor::{EditorBuffer, Selection};
pub use pipeline::{ApplyOutcome, ConnectionState, LiveError, LiveSync, LocalInput, RunExit};
pub use processed::ProcessedSet;
pub use session::ChannelSession;
