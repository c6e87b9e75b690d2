//! chorus-core library.
//!
//! The commit model, idempotent ingest into the local store, per-character
//! attribution, and history navigation shared by the broker, the live sync
//! client, and the CLI.
//!
//! # Conventions
//!
//! - **Errors**: per-module `thiserror` enums carrying an [`error::ErrorCode`];
//!   `anyhow::Result` at the store layer.
//! - **Logging**: `tracing` macros with structured fields.

pub mod attribution;
pub mod clock;
pub mod commit;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod model;
pub mod payload;

pub use commit::{Commit, CommitEvent, CommitHash};
pub use engine::{DocId, ReplicationEngine};
