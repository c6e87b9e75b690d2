//! SQLite schema for the local channel store.
//!
//! - `channels` wraps one replicated document per row
//! - `messages` and `document_history` are append-only and unique per
//!   `(channel_id, commit_hash)`, which is what makes ingest idempotent
//! - `document_snapshots` holds the latest document text per channel
//! - `store_meta` records the applied schema version

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS channels (
    channel_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    doc_id TEXT NOT NULL UNIQUE,
    created_at_ms INTEGER NOT NULL,
    last_modified_ms INTEGER NOT NULL,
    CHECK (channel_id LIKE 'ch-%')
);

CREATE TABLE IF NOT EXISTS messages (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id TEXT NOT NULL REFERENCES channels(channel_id) ON DELETE CASCADE,
    user TEXT NOT NULL CHECK (length(user) > 0),
    content TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    commit_hash TEXT NOT NULL CHECK (length(commit_hash) = 64),
    UNIQUE (channel_id, commit_hash)
);

CREATE TABLE IF NOT EXISTS document_history (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id TEXT NOT NULL REFERENCES channels(channel_id) ON DELETE CASCADE,
    commit_hash TEXT NOT NULL CHECK (length(commit_hash) = 64),
    user TEXT NOT NULL CHECK (length(user) > 0),
    content TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    UNIQUE (channel_id, commit_hash)
);

CREATE TABLE IF NOT EXISTS document_snapshots (
    channel_id TEXT PRIMARY KEY REFERENCES channels(channel_id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    latest_commit_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for timestamp-ordered scans.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_messages_channel_ts
    ON messages(channel_id, timestamp_ms, message_id);

CREATE INDEX IF NOT EXISTS idx_document_history_channel_ts
    ON document_history(channel_id, timestamp_ms, entry_id);

CREATE INDEX IF NOT EXISTS idx_channels_last_modified
    ON channels(last_modified_ms DESC);
";

/// Indexes every fully-migrated store must have.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_messages_channel_ts",
    "idx_document_history_channel_ts",
    "idx_channels_last_modified",
];
