//! Typed read/write helpers over the local store.
//!
//! All functions take a shared `&Connection` and return `anyhow::Result`
//! with model structs, never raw rows.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, types::Type};

use crate::commit::CommitHash;
use crate::engine::DocId;
use crate::model::{Channel, DocumentHistoryEntry, DocumentSnapshot, Message};

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Deterministic channel id for a document: `ch-` plus 12 hex chars of the
/// BLAKE3 digest of the doc id. Every peer derives the same id.
#[must_use]
pub fn channel_id_for_doc(doc_id: &DocId) -> String {
    let digest = blake3::hash(doc_id.as_str().as_bytes());
    format!("ch-{}", &digest.to_hex()[..12])
}

/// Insert a channel for `doc_id` if none exists and return the stored row.
///
/// An existing channel keeps its name and timestamps.
///
/// # Errors
///
/// Returns an error if the insert or read-back fails.
pub fn ensure_channel(
    conn: &Connection,
    doc_id: &DocId,
    name: &str,
    now_ms: i64,
) -> Result<Channel> {
    let channel_id = channel_id_for_doc(doc_id);
    conn.execute(
        "INSERT OR IGNORE INTO channels (channel_id, name, doc_id, created_at_ms, last_modified_ms)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![channel_id, name, doc_id.as_str(), now_ms],
    )
    .with_context(|| format!("insert channel for {doc_id}"))?;

    get_channel(conn, &channel_id)?
        .with_context(|| format!("channel {channel_id} missing after insert"))
}

/// Fetch a channel by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_channel(conn: &Connection, channel_id: &str) -> Result<Option<Channel>> {
    conn.query_row(
        "SELECT channel_id, name, doc_id, created_at_ms, last_modified_ms
         FROM channels WHERE channel_id = ?1",
        params![channel_id],
        row_to_channel,
    )
    .optional()
    .with_context(|| format!("get_channel for '{channel_id}'"))
}

/// Fetch the channel wrapping `doc_id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_channel_by_doc(conn: &Connection, doc_id: &DocId) -> Result<Option<Channel>> {
    conn.query_row(
        "SELECT channel_id, name, doc_id, created_at_ms, last_modified_ms
         FROM channels WHERE doc_id = ?1",
        params![doc_id.as_str()],
        row_to_channel,
    )
    .optional()
    .with_context(|| format!("get_channel_by_doc for '{doc_id}'"))
}

/// All channels, most recently active first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_channels(conn: &Connection) -> Result<Vec<Channel>> {
    let mut stmt = conn
        .prepare(
            "SELECT channel_id, name, doc_id, created_at_ms, last_modified_ms
             FROM channels ORDER BY last_modified_ms DESC, channel_id",
        )
        .context("prepare list_channels")?;
    let rows = stmt
        .query_map([], row_to_channel)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("list_channels")?;
    Ok(rows)
}

/// Delete a channel and, by cascade, all of its rows.
///
/// Returns `true` if a channel was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_channel(conn: &Connection, channel_id: &str) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM channels WHERE channel_id = ?1",
            params![channel_id],
        )
        .with_context(|| format!("delete channel {channel_id}"))?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Messages in a channel ordered by timestamp, then arrival.
///
/// # Errors
///
/// Returns an error if the query fails or a stored hash is corrupt.
pub fn list_messages(conn: &Connection, channel_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn
        .prepare(
            "SELECT message_id, channel_id, user, content, timestamp_ms, commit_hash
             FROM messages WHERE channel_id = ?1
             ORDER BY timestamp_ms, message_id",
        )
        .context("prepare list_messages")?;
    let rows = stmt
        .query_map(params![channel_id], |row| {
            Ok(Message {
                id: row.get(0)?,
                channel_id: row.get(1)?,
                user: row.get(2)?,
                content: row.get(3)?,
                timestamp_ms: row.get(4)?,
                commit_hash: hash_column(row, 5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("list_messages for '{channel_id}'"))?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Document history & snapshot
// ---------------------------------------------------------------------------

/// Full document history of a channel, ordered by timestamp then arrival.
///
/// # Errors
///
/// Returns an error if the query fails or a stored hash is corrupt.
pub fn document_history(conn: &Connection, channel_id: &str) -> Result<Vec<DocumentHistoryEntry>> {
    document_history_range(conn, channel_id, i64::MIN, i64::MAX)
}

/// History entries with `from_ms <= timestamp <= to_ms`, in display order.
///
/// # Errors
///
/// Returns an error if the query fails or a stored hash is corrupt.
pub fn document_history_range(
    conn: &Connection,
    channel_id: &str,
    from_ms: i64,
    to_ms: i64,
) -> Result<Vec<DocumentHistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT commit_hash, user, content, timestamp_ms
             FROM document_history
             WHERE channel_id = ?1 AND timestamp_ms BETWEEN ?2 AND ?3
             ORDER BY timestamp_ms, entry_id",
        )
        .context("prepare document_history_range")?;
    let rows = stmt
        .query_map(params![channel_id, from_ms, to_ms], |row| {
            Ok(DocumentHistoryEntry {
                commit_hash: hash_column(row, 0)?,
                user: row.get(1)?,
                content: row.get(2)?,
                timestamp_ms: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("document_history for '{channel_id}'"))?;
    Ok(rows)
}

/// Latest document snapshot for a channel.
///
/// # Errors
///
/// Returns an error if the query fails or the stored hash is corrupt.
pub fn get_snapshot(conn: &Connection, channel_id: &str) -> Result<Option<DocumentSnapshot>> {
    conn.query_row(
        "SELECT channel_id, content, updated_at_ms, latest_commit_hash
         FROM document_snapshots WHERE channel_id = ?1",
        params![channel_id],
        |row| {
            Ok(DocumentSnapshot {
                channel_id: row.get(0)?,
                content: row.get(1)?,
                updated_at_ms: row.get(2)?,
                latest_commit_hash: hash_column(row, 3)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("get_snapshot for '{channel_id}'"))
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        doc_id: DocId::new(row.get::<_, String>(2)?),
        created_at_ms: row.get(3)?,
        last_modified_ms: row.get(4)?,
    })
}

fn hash_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<CommitHash> {
    let raw: String = row.get(idx)?;
    CommitHash::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
