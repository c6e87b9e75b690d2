//! Rows of the local store.

use serde::Serialize;

use crate::commit::CommitHash;
use crate::engine::DocId;

/// A chat/document room wrapping one replicated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub doc_id: DocId,
    pub created_at_ms: i64,
    /// Monotone: max of creation time and every accepted commit timestamp.
    pub last_modified_ms: i64,
}

/// A chat message, at most one per commit hash in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub channel_id: String,
    pub user: String,
    pub content: String,
    pub timestamp_ms: i64,
    pub commit_hash: CommitHash,
}

/// The channel's current document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSnapshot {
    pub channel_id: String,
    pub content: String,
    pub updated_at_ms: i64,
    pub latest_commit_hash: CommitHash,
}

/// One full-text revision of a channel document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentHistoryEntry {
    pub commit_hash: CommitHash,
    pub user: String,
    pub content: String,
    pub timestamp_ms: i64,
}
