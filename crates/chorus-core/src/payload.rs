//! Commit payload codec.
//!
//! Commit contents carry a small JSON object:
//!
//! ```json
//! {"type": "message" | "document", "user": "alice", "content": "...", "timestamp": 1700000000000}
//! ```
//!
//! [`Payload::decode`] validates that object once, at the boundary, into a
//! [`Payload`] whose [`PayloadBody`] says exactly what the ingestor should do
//! with it. Field resolution rules:
//!
//! - `type` defaults to `"message"` when absent or not a string.
//! - `user` is trimmed; absent, non-string, or blank becomes [`ANONYMOUS`].
//! - `timestamp` is epoch milliseconds: a JSON integer, a float (truncated),
//!   or an RFC 3339 string. Anything else is treated as absent.
//! - `content` must be a string for message and document payloads.

use chrono::DateTime;
use serde_json::{Map, Value, json};

use crate::commit::{Commit, CommitError};
use crate::error::ErrorCode;

/// Author name used when a payload carries no usable `user`.
pub const ANONYMOUS: &str = "anonymous";

const KIND_MESSAGE: &str = "message";
const KIND_DOCUMENT: &str = "document";

/// Errors raised while decoding commit contents into a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error(transparent)]
    Encoding(#[from] CommitError),

    #[error("payload is not valid JSON: {reason}")]
    NotJson { reason: String },

    #[error("payload is JSON but not an object")]
    NotAnObject,
}

impl PayloadError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Encoding(inner) => inner.code(),
            Self::NotJson { .. } | Self::NotAnObject => ErrorCode::MalformedPayload,
        }
    }
}

/// What a payload asks the ingestor to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    /// A chat message.
    Message { content: String },
    /// A full-text document revision.
    Document { content: String },
    /// A message or document payload without a string `content`.
    MissingContent { kind: String },
    /// Any other `type`.
    Other { kind: String },
}

impl PayloadBody {
    /// The payload `type` this body was decoded from.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Message { .. } => KIND_MESSAGE,
            Self::Document { .. } => KIND_DOCUMENT,
            Self::MissingContent { kind } | Self::Other { kind } => kind,
        }
    }
}

/// A decoded, field-resolved commit payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Resolved author (never empty).
    pub user: String,
    /// Payload timestamp in epoch milliseconds, if one was supplied.
    pub timestamp_ms: Option<i64>,
    pub body: PayloadBody,
}

impl Payload {
    /// Build a document payload.
    #[must_use]
    pub fn document(user: &str, content: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            user: resolve_user(Some(user)),
            timestamp_ms: Some(timestamp_ms),
            body: PayloadBody::Document {
                content: content.into(),
            },
        }
    }

    /// Build a chat message payload.
    #[must_use]
    pub fn message(user: &str, content: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            user: resolve_user(Some(user)),
            timestamp_ms: Some(timestamp_ms),
            body: PayloadBody::Message {
                content: content.into(),
            },
        }
    }

    /// Decode a commit's contents.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Encoding`] for non-UTF-8 contents and
    /// [`PayloadError::NotJson`] / [`PayloadError::NotAnObject`] for anything
    /// that is not a JSON object.
    pub fn from_commit(commit: &Commit) -> Result<Self, PayloadError> {
        Self::decode(commit.text()?)
    }

    /// Decode payload JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a JSON object.
    pub fn decode(raw: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| PayloadError::NotJson {
            reason: e.to_string(),
        })?;
        let Value::Object(obj) = value else {
            return Err(PayloadError::NotAnObject);
        };

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(KIND_MESSAGE);
        let content = obj.get("content").and_then(Value::as_str);

        let body = match (kind, content) {
            (KIND_MESSAGE, Some(c)) => PayloadBody::Message {
                content: c.to_owned(),
            },
            (KIND_DOCUMENT, Some(c)) => PayloadBody::Document {
                content: c.to_owned(),
            },
            (KIND_MESSAGE | KIND_DOCUMENT, None) => PayloadBody::MissingContent {
                kind: kind.to_owned(),
            },
            (other, _) => PayloadBody::Other {
                kind: other.to_owned(),
            },
        };

        Ok(Self {
            user: resolve_user(obj.get("user").and_then(Value::as_str)),
            timestamp_ms: parse_timestamp(&obj),
            body,
        })
    }

    /// The payload timestamp, or `now_ms` when none was supplied.
    #[must_use]
    pub fn resolved_timestamp(&self, now_ms: i64) -> i64 {
        self.timestamp_ms.unwrap_or(now_ms)
    }

    /// Encode as payload JSON text suitable for commit contents.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut obj = Map::new();
        obj.insert("type".into(), json!(self.body.kind()));
        obj.insert("user".into(), json!(self.user));
        match &self.body {
            PayloadBody::Message { content } | PayloadBody::Document { content } => {
                obj.insert("content".into(), json!(content));
            }
            PayloadBody::MissingContent { .. } | PayloadBody::Other { .. } => {}
        }
        if let Some(ts) = self.timestamp_ms {
            obj.insert("timestamp".into(), json!(ts));
        }
        Value::Object(obj).to_string()
    }
}

fn resolve_user(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(user) if !user.is_empty() => user.to_owned(),
        _ => ANONYMOUS.to_owned(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn parse_timestamp(obj: &Map<String, Value>) -> Option<i64> {
    match obj.get("timestamp")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
