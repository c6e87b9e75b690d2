//! Integrity checks for the local store.
//!
//! Checks the schema version, the read-path indexes, and that every
//! channel's snapshot agrees with the newest entry of its document history.
//! A disagreeing or missing snapshot can be rebuilt from history.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::migrations::{LATEST_SCHEMA_VERSION, current_schema_version};
use super::query;
use super::schema::REQUIRED_INDEXES;

/// One verification result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoreCheck {
    pub name: String,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CheckStatus {
    Verified,
    /// The snapshot was rebuilt from history.
    Repaired,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct VerifyReport {
    pub checks: Vec<StoreCheck>,
}

impl VerifyReport {
    /// Return `true` when no check failed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.checks
            .iter()
            .all(|c| !matches!(c.status, CheckStatus::Failed(_)))
    }

    fn push(&mut self, name: impl Into<String>, status: CheckStatus) {
        self.checks.push(StoreCheck {
            name: name.into(),
            status,
        });
    }
}

/// Verify the store. With `repair`, stale or missing snapshots are rebuilt
/// from the newest history entry instead of failing.
///
/// # Errors
///
/// Returns an error if the store cannot be queried at all.
pub fn verify_store(conn: &Connection, repair: bool) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();

    let version = current_schema_version(conn).context("read schema version")?;
    report.push(
        "schema",
        if version == LATEST_SCHEMA_VERSION {
            CheckStatus::Verified
        } else {
            CheckStatus::Failed(format!(
                "version {version}, expected {LATEST_SCHEMA_VERSION}"
            ))
        },
    );

    for index in REQUIRED_INDEXES {
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1)",
                params![index],
                |row| row.get(0),
            )
            .with_context(|| format!("look up index {index}"))?;
        report.push(
            format!("index {index}"),
            if exists {
                CheckStatus::Verified
            } else {
                CheckStatus::Failed("missing".into())
            },
        );
    }

    for channel in query::list_channels(conn)? {
        let status = check_snapshot(conn, &channel.id, repair)?;
        report.push(format!("snapshot {}", channel.id), status);
    }

    Ok(report)
}

struct NewestEntry {
    hash: String,
    content: String,
    timestamp_ms: i64,
}

fn check_snapshot(conn: &Connection, channel_id: &str, repair: bool) -> Result<CheckStatus> {
    let newest = conn
        .query_row(
            "SELECT commit_hash, content, timestamp_ms FROM document_history
             WHERE channel_id = ?1
             ORDER BY timestamp_ms DESC, entry_id DESC LIMIT 1",
            params![channel_id],
            |row| {
                Ok(NewestEntry {
                    hash: row.get(0)?,
                    content: row.get(1)?,
                    timestamp_ms: row.get(2)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("newest history entry for {channel_id}"))?;

    let snapshot: Option<(String, String)> = conn
        .query_row(
            "SELECT latest_commit_hash, content FROM document_snapshots WHERE channel_id = ?1",
            params![channel_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .with_context(|| format!("snapshot for {channel_id}"))?;

    let problem = match (&newest, &snapshot) {
        (None, None) => return Ok(CheckStatus::Verified),
        (None, Some(_)) => "snapshot without history",
        (Some(_), None) => "missing snapshot",
        (Some(entry), Some((hash, content))) => {
            if *hash == entry.hash && *content == entry.content {
                return Ok(CheckStatus::Verified);
            }
            "snapshot does not match newest history entry"
        }
    };

    match newest {
        Some(entry) if repair => {
            conn.execute(
                "INSERT INTO document_snapshots (channel_id, content, updated_at_ms, latest_commit_hash)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(channel_id) DO UPDATE SET
                    content = excluded.content,
                    updated_at_ms = excluded.updated_at_ms,
                    latest_commit_hash = excluded.latest_commit_hash",
                params![channel_id, entry.content, entry.timestamp_ms, entry.hash],
            )
            .with_context(|| format!("rebuild snapshot for {channel_id}"))?;
            tracing::info!(channel = %channel_id, problem, "rebuilt snapshot from history");
            Ok(CheckStatus::Repaired)
        }
        _ => Ok(CheckStatus::Failed(problem.to_owned())),
    }
}
