//! Replication engine interface.
//!
//! The engine owns the authoritative, append-only commit log of every
//! document. chorus only talks to it through [`ReplicationEngine`]; the log
//! it returns may mix plain commits and bundles, which [`flatten_entries`]
//! turns into the plain [`Commit`] list the rest of the core expects.

pub mod memory;

pub use memory::MemoryEngine;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commit::{Commit, CommitError, CommitHash};
use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// DocId
// ---------------------------------------------------------------------------

/// Engine-assigned document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Log entries
// ---------------------------------------------------------------------------

/// One entry of a loaded document log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOrBundle {
    Commit(Commit),
    /// A compacted run of commits, in log order.
    Bundle { commits: Vec<Commit> },
}

/// Flatten a loaded log into plain commits, preserving order.
#[must_use]
pub fn flatten_entries(entries: Vec<CommitOrBundle>) -> Vec<Commit> {
    entries
        .into_iter()
        .flat_map(|entry| match entry {
            CommitOrBundle::Commit(commit) => vec![commit],
            CommitOrBundle::Bundle { commits } => commits,
        })
        .collect()
}

/// What an `add_commits` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddCommitsOutcome {
    /// Commits that were not already in the log, in submission order.
    pub accepted: Vec<Commit>,
    /// Commits already present, ignored.
    pub duplicates: usize,
}

impl AddCommitsOutcome {
    #[must_use]
    pub fn has_new_commits(&self) -> bool {
        !self.accepted.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by a replication engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("document not found: {0}")]
    DocumentNotFound(DocId),

    #[error("commit rejected: {0}")]
    Rejected(#[from] CommitError),

    #[error("transport broken: {0}")]
    TransportBroken(String),

    #[error("engine stopped")]
    Stopped,
}

impl EngineError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DocumentNotFound(_) => ErrorCode::DocumentNotFound,
            Self::Rejected(inner) => inner.code(),
            Self::TransportBroken(_) | Self::Stopped => ErrorCode::TransportBroken,
        }
    }
}

// ---------------------------------------------------------------------------
// ReplicationEngine
// ---------------------------------------------------------------------------

/// An opaque, content-addressed, append-only log service.
#[async_trait]
pub trait ReplicationEngine: Send + Sync {
    /// Create a document whose log starts with `initial`.
    async fn create_doc(
        &self,
        initial: Commit,
        other_parents: Vec<CommitHash>,
    ) -> Result<DocId, EngineError>;

    /// Append commits to a document's log. Already-present hashes are ignored.
    async fn add_commits(
        &self,
        doc_id: &DocId,
        commits: Vec<Commit>,
    ) -> Result<AddCommitsOutcome, EngineError>;

    /// The document's log, or `None` if the engine does not know it.
    async fn load_document(
        &self,
        doc_id: &DocId,
    ) -> Result<Option<Vec<CommitOrBundle>>, EngineError>;

    /// Resolve once the engine has exchanged state with `peer_id`.
    async fn wait_until_synced(&self, peer_id: &str) -> Result<(), EngineError>;

    /// A shareable card identifying this peer for multi-party sharing.
    async fn create_contact_card(&self) -> Result<String, EngineError>;

    /// Shut the engine down, dropping its state.
    async fn stop(&self);
}

#[async_trait]
impl<T: ReplicationEngine + ?Sized> ReplicationEngine for Arc<T> {
    async fn create_doc(
        &self,
        initial: Commit,
        other_parents: Vec<CommitHash>,
    ) -> Result<DocId, EngineError> {
        (**self).create_doc(initial, other_parents).await
    }

    async fn add_commits(
        &self,
        doc_id: &DocId,
        commits: Vec<Commit>,
    ) -> Result<AddCommitsOutcome, EngineError> {
        (**self).add_commits(doc_id, commits).await
    }

    async fn load_document(
        &self,
        doc_id: &DocId,
    ) -> Result<Option<Vec<CommitOrBundle>>, EngineError> {
        (**self).load_document(doc_id).await
    }

    async fn wait_until_synced(&self, peer_id: &str) -> Result<(), EngineError> {
        (**self).wait_until_synced(peer_id).await
    }

    async fn create_contact_card(&self) -> Result<String, EngineError> {
        (**self).create_contact_card().await
    }

    async fn stop(&self) {
        (**self).stop().await;
    }
}
