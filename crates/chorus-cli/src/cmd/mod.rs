//! Command handlers. Each takes parsed args, an output mode, and the
//! project root.

pub mod blame;
pub mod history;
pub mod import;
pub mod messages;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};
use chorus_core::config::{EffectiveConfig, resolve_config};
use chorus_core::db::{open_store, query};
use chorus_core::engine::DocId;
use chorus_core::error::ErrorCode;
use chorus_core::model::Channel;
use rusqlite::Connection;

/// An error carrying a machine-readable [`ErrorCode`].
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub detail: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// Resolved configuration plus an open store.
pub struct Project {
    pub config: EffectiveConfig,
    pub conn: Connection,
}

impl Project {
    /// Open the store, creating it if `create` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is malformed, or the store is
    /// missing (without `create`) or cannot be opened.
    pub fn open(project_root: &Path, create: bool) -> Result<Self> {
        let config = resolve_config(project_root)
            .map_err(|e| CodedError::new(ErrorCode::ConfigParseError, format!("{e:#}")))?;
        if !create && !config.store_path.exists() {
            return Err(CodedError::new(
                ErrorCode::NotInitialized,
                format!("no store at {}", config.store_path.display()),
            )
            .into());
        }
        let conn = open_store(&config.store_path)
            .with_context(|| format!("open store {}", config.store_path.display()))?;
        tracing::debug!(store = %config.store_path.display(), user = %config.user_name, "opened project");
        Ok(Self { config, conn })
    }

    /// Find a channel by channel id or by document id.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ChannelNotFound`] if neither matches.
    pub fn channel(&self, key: &str) -> Result<Channel> {
        if let Some(channel) = query::get_channel(&self.conn, key)? {
            return Ok(channel);
        }
        if let Some(channel) = query::get_channel_by_doc(&self.conn, &DocId::new(key))? {
            return Ok(channel);
        }
        Err(CodedError::new(ErrorCode::ChannelNotFound, format!("no channel '{key}'")).into())
    }
}

/// Parse an RFC 3339 timestamp into epoch milliseconds.
///
/// # Errors
///
/// Returns an error naming `flag` if `raw` is not RFC 3339.
pub fn parse_time_ms(flag: &str, raw: &str) -> Result<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .with_context(|| format!("{flag}: '{raw}' is not an RFC 3339 timestamp"))
}
