//! Commit batch → local store ingestion.
//!
//! The [`Ingestor`] turns an ordered batch of commits into messages and
//! document revisions for one channel. It is used both for bulk hydration
//! (importing a document's full log) and for live commit events, so it must
//! be safe over overlapping batches:
//!
//! - messages and history entries are insert-if-absent per
//!   `(channel, commit hash)`; counts include only newly inserted rows
//! - the document snapshot is last-write-wins by `updated_at_ms`
//! - `channels.last_modified_ms` only ever moves forward
//!
//! Commits that cannot be decoded are logged and skipped; the rest of the
//! batch still applies. The whole batch runs in one transaction.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::clock::{self, DEFAULT_SKEW_THRESHOLD_SECS};
use crate::commit::{Commit, CommitHash};
use crate::model::Channel;
use crate::payload::{Payload, PayloadBody};

// ---------------------------------------------------------------------------
// PersistResult
// ---------------------------------------------------------------------------

/// Outcome of ingesting one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistResult {
    /// Messages newly inserted by this batch.
    pub message_count: usize,
    /// Document history entries newly inserted by this batch.
    pub document_count: usize,
    /// Max of the channel's prior `last_modified_ms` and every decoded
    /// commit timestamp in the batch.
    pub latest_activity_ms: i64,
    /// Timestamp of the most recent document commit in the batch.
    pub latest_document_timestamp_ms: Option<i64>,
    pub latest_document_hash: Option<CommitHash>,
    pub latest_document_content: Option<String>,
    /// Commits skipped as undecodable, incomplete, or of unknown type.
    pub skipped: usize,
}

#[derive(Debug)]
struct LatestDocument {
    timestamp_ms: i64,
    hash: CommitHash,
    content: String,
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Applies commit batches to the store.
pub struct Ingestor<'conn> {
    conn: &'conn Connection,
    skew_threshold_secs: u64,
}

impl<'conn> Ingestor<'conn> {
    /// Create an ingestor with the default clock-skew threshold.
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            skew_threshold_secs: DEFAULT_SKEW_THRESHOLD_SECS,
        }
    }

    /// Override the clock-skew warning threshold.
    #[must_use]
    pub const fn with_skew_threshold(mut self, secs: u64) -> Self {
        self.skew_threshold_secs = secs;
        self
    }

    /// Ingest `commits` into `channel`, using the wall clock for payloads
    /// without a timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails; the batch is rolled back.
    pub fn ingest(&self, channel: &Channel, commits: &[Commit]) -> Result<PersistResult> {
        self.ingest_at(channel, commits, clock::now_ms())
    }

    /// Like [`Ingestor::ingest`], with an explicit "now".
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails; the batch is rolled back.
    pub fn ingest_at(
        &self,
        channel: &Channel,
        commits: &[Commit],
        now_ms: i64,
    ) -> Result<PersistResult> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin ingest transaction")?;

        let stored_last_modified: i64 = tx
            .query_row(
                "SELECT last_modified_ms FROM channels WHERE channel_id = ?1",
                params![channel.id],
                |row| row.get(0),
            )
            .with_context(|| format!("read last_modified for channel {}", channel.id))?;

        let mut result = PersistResult {
            latest_activity_ms: stored_last_modified,
            ..PersistResult::default()
        };
        let mut latest_doc: Option<LatestDocument> = None;

        for commit in commits {
            let payload = match Payload::from_commit(commit) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        channel = %channel.id,
                        commit = %commit.hash,
                        code = %e.code(),
                        error = %e,
                        "skipping undecodable commit"
                    );
                    result.skipped += 1;
                    continue;
                }
            };

            if let Some(ts) = payload.timestamp_ms {
                if let Some(warning) = clock::check_clock_skew(ts, now_ms, self.skew_threshold_secs)
                {
                    tracing::warn!(
                        channel = %channel.id,
                        commit = %commit.hash,
                        user = %payload.user,
                        skew_secs = warning.skew_secs,
                        "{warning}"
                    );
                }
            }

            let timestamp_ms = payload.resolved_timestamp(now_ms);
            result.latest_activity_ms = result.latest_activity_ms.max(timestamp_ms);

            match &payload.body {
                PayloadBody::Document { content } => {
                    if self.insert_history(&tx, channel, commit, &payload.user, content, timestamp_ms)? {
                        result.document_count += 1;
                    }
                    let newer = latest_doc
                        .as_ref()
                        .is_none_or(|cur| timestamp_ms >= cur.timestamp_ms);
                    if newer {
                        latest_doc = Some(LatestDocument {
                            timestamp_ms,
                            hash: commit.hash.clone(),
                            content: content.clone(),
                        });
                    }
                }
                PayloadBody::Message { content } => {
                    if self.insert_message(&tx, channel, commit, &payload.user, content, timestamp_ms)? {
                        result.message_count += 1;
                    }
                }
                PayloadBody::MissingContent { kind } | PayloadBody::Other { kind } => {
                    tracing::debug!(
                        channel = %channel.id,
                        commit = %commit.hash,
                        kind = %kind,
                        "skipping payload without recordable content"
                    );
                    result.skipped += 1;
                }
            }
        }

        if let Some(doc) = latest_doc {
            upsert_snapshot(&tx, &channel.id, &doc)?;
            result.latest_document_timestamp_ms = Some(doc.timestamp_ms);
            result.latest_document_hash = Some(doc.hash);
            result.latest_document_content = Some(doc.content);
        }

        if result.latest_activity_ms > stored_last_modified {
            tx.execute(
                "UPDATE channels SET last_modified_ms = ?2
                 WHERE channel_id = ?1 AND last_modified_ms < ?2",
                params![channel.id, result.latest_activity_ms],
            )
            .context("advance channel last_modified")?;
        }

        tx.commit().context("commit ingest transaction")?;

        tracing::debug!(
            channel = %channel.id,
            commits = commits.len(),
            messages = result.message_count,
            documents = result.document_count,
            skipped = result.skipped,
            "ingested batch"
        );
        Ok(result)
    }

    #[allow(clippy::unused_self)]
    fn insert_history(
        &self,
        conn: &Connection,
        channel: &Channel,
        commit: &Commit,
        user: &str,
        content: &str,
        timestamp_ms: i64,
    ) -> Result<bool> {
        let n = conn
            .execute(
                "INSERT OR IGNORE INTO document_history
                    (channel_id, commit_hash, user, content, timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel.id, commit.hash.as_str(), user, content, timestamp_ms],
            )
            .with_context(|| format!("insert history entry {}", commit.hash.short()))?;
        Ok(n > 0)
    }

    #[allow(clippy::unused_self)]
    fn insert_message(
        &self,
        conn: &Connection,
        channel: &Channel,
        commit: &Commit,
        user: &str,
        content: &str,
        timestamp_ms: i64,
    ) -> Result<bool> {
        let n = conn
            .execute(
                "INSERT OR IGNORE INTO messages
                    (channel_id, user, content, timestamp_ms, commit_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel.id, user, content, timestamp_ms, commit.hash.as_str()],
            )
            .with_context(|| format!("insert message {}", commit.hash.short()))?;
        Ok(n > 0)
    }
}

fn upsert_snapshot(conn: &Connection, channel_id: &str, doc: &LatestDocument) -> Result<()> {
    conn.execute(
        "INSERT INTO document_snapshots (channel_id, content, updated_at_ms, latest_commit_hash)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(channel_id) DO UPDATE SET
            content = excluded.content,
            updated_at_ms = excluded.updated_at_ms,
            latest_commit_hash = excluded.latest_commit_hash
         WHERE excluded.updated_at_ms >= document_snapshots.updated_at_ms",
        params![channel_id, doc.content, doc.timestamp_ms, doc.hash.as_str()],
    )
    .with_context(|| format!("upsert snapshot for {channel_id}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::create;
    use crate::db::{open_in_memory, query};
    use crate::engine::DocId;

    const NOW: i64 = 1_700_000_000_000;

    fn test_db() -> (Connection, Channel) {
        let conn = open_in_memory().expect("open store");
        let channel =
            query::ensure_channel(&conn, &DocId::new("doc-1"), "general", NOW - 10_000).expect("channel");
        (conn, channel)
    }

    fn make_message(user: &str, content: &str, ts: i64) -> Commit {
        create(&Payload::message(user, content, ts).encode(), vec![])
    }

    fn make_document(user: &str, content: &str, ts: i64) -> Commit {
        create(&Payload::document(user, content, ts).encode(), vec![])
    }

    #[test]
    fn ingests_messages_and_documents() {
        let (conn, ch) = test_db();
        let batch = vec![
            make_message("alice", "hi", NOW),
            make_document("bob", "draft", NOW + 1),
        ];
        let r = Ingestor::new(&conn).ingest_at(&ch, &batch, NOW).expect("ingest");
        assert_eq!(r.message_count, 1);
        assert_eq!(r.document_count, 1);
        assert_eq!(r.latest_activity_ms, NOW + 1);
        assert_eq!(r.latest_document_content.as_deref(), Some("draft"));

        let messages = query::list_messages(&conn, &ch.id).expect("messages");
        assert_eq!(messages[0].user, "alice");
        assert_eq!(messages[0].commit_hash, batch[0].hash);

        let snap = query::get_snapshot(&conn, &ch.id).expect("snapshot").expect("present");
        assert_eq!(snap.content, "draft");
        assert_eq!(snap.latest_commit_hash, batch[1].hash);
    }

    #[test]
    fn duplicate_commit_in_one_batch_counts_once() {
        let (conn, ch) = test_db();
        let a = make_message("alice", "hello", NOW);
        let r = Ingestor::new(&conn)
            .ingest_at(&ch, &[a.clone(), a], NOW)
            .expect("ingest");
        assert_eq!(r.message_count, 1);
    }

    #[test]
    fn second_pass_inserts_nothing() {
        let (conn, ch) = test_db();
        let batch = vec![
            make_message("alice", "one", NOW),
            make_document("bob", "doc", NOW + 5),
        ];
        let ingestor = Ingestor::new(&conn);
        ingestor.ingest_at(&ch, &batch, NOW).expect("first");
        let before = query::list_messages(&conn, &ch.id).expect("messages");
        let again = ingestor.ingest_at(&ch, &batch, NOW).expect("second");
        assert_eq!(again.message_count, 0);
        assert_eq!(again.document_count, 0);
        assert_eq!(query::list_messages(&conn, &ch.id).expect("messages"), before);
    }

    #[test]
    fn malformed_payloads_are_skipped() {
        let (conn, ch) = test_db();
        let mut non_utf8 = create("", vec![]);
        non_utf8.contents = vec![0xff];
        let batch = vec![
            create("not json", vec![]),
            non_utf8,
            create(r#"{"type":"document"}"#, vec![]),
            create(r#"{"type":"reaction","content":"+1"}"#, vec![]),
            make_message("carol", "survivor", NOW),
        ];
        let r = Ingestor::new(&conn).ingest_at(&ch, &batch, NOW).expect("ingest");
        assert_eq!(r.message_count, 1);
        assert_eq!(r.document_count, 0);
        assert_eq!(r.skipped, 4);
        assert!(query::get_snapshot(&conn, &ch.id).expect("snapshot").is_none());
    }

    #[test]
    fn missing_timestamp_uses_now() {
        let (conn, ch) = test_db();
        let commit = create(r#"{"content":"x","user":"dan"}"#, vec![]);
        let r = Ingestor::new(&conn).ingest_at(&ch, &[commit], NOW).expect("ingest");
        assert_eq!(r.latest_activity_ms, NOW);
        let m = query::list_messages(&conn, &ch.id).expect("messages");
        assert_eq!(m[0].timestamp_ms, NOW);
    }

    #[test]
    fn latest_document_ties_prefer_later_in_batch() {
        let (conn, ch) = test_db();
        let batch = vec![
            make_document("a", "first", NOW),
            make_document("b", "second", NOW),
            make_document("c", "older", NOW - 1),
        ];
        let r = Ingestor::new(&conn).ingest_at(&ch, &batch, NOW).expect("ingest");
        assert_eq!(r.latest_document_content.as_deref(), Some("second"));
        assert_eq!(r.latest_document_hash.as_ref(), Some(&batch[1].hash));
    }

    #[test]
    fn snapshot_is_not_overwritten_by_older_batch() {
        let (conn, ch) = test_db();
        let ingestor = Ingestor::new(&conn);
        ingestor
            .ingest_at(&ch, &[make_document("a", "new", NOW + 100)], NOW)
            .expect("new");
        ingestor
            .ingest_at(&ch, &[make_document("b", "old", NOW)], NOW)
            .expect("old");
        let snap = query::get_snapshot(&conn, &ch.id).expect("snapshot").expect("present");
        assert_eq!(snap.content, "new");
        assert_eq!(query::document_history(&conn, &ch.id).expect("history").len(), 2);
    }

    #[test]
    fn last_modified_is_monotone() {
        let (conn, ch) = test_db();
        let ingestor = Ingestor::new(&conn);
        ingestor
            .ingest_at(&ch, &[make_message("a", "later", NOW + 50)], NOW)
            .expect("later");
        let r = ingestor
            .ingest_at(&ch, &[make_message("a", "earlier", NOW - 5_000)], NOW)
            .expect("earlier");
        assert_eq!(r.latest_activity_ms, NOW + 50);
        let stored = query::get_channel(&conn, &ch.id).expect("get").expect("present");
        assert_eq!(stored.last_modified_ms, NOW + 50);
    }

    #[test]
    fn skewed_timestamp_is_still_ingested() {
        let (conn, ch) = test_db();
        let far_future = NOW + 86_400_000;
        let r = Ingestor::new(&conn)
            .with_skew_threshold(60)
            .ingest_at(&ch, &[make_message("eve", "from the future", far_future)], NOW)
            .expect("ingest");
        assert_eq!(r.message_count, 1);
        assert_eq!(r.latest_activity_ms, far_future);
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let (conn, mut ch) = test_db();
        ch.id = "ch-missing".into();
        assert!(
            Ingestor::new(&conn)
                .ingest_at(&ch, &[make_message("a", "b", NOW)], NOW)
                .is_err()
        );
    }
}
