//! Wire envelope for commits and commit events.
//!
//! Over the transport a commit travels as
//! `{"parents":[<hex>...],"hash":<hex>,"contents":<base64>}` and events as a
//! `type`-tagged object:
//!
//! ```text
//! {"type":"docCreated","id":"doc-1"}
//! {"type":"commitAdded","docId":"doc-1","commit":{...}}
//! {"type":"commitsAdded","docId":"doc-1","commits":[{...}]}
//! ```
//!
//! [`WireEvent`] is the serde shape; [`CommitEvent`] is the validated form
//! the rest of the system works with. Conversion checks every hash string and
//! decodes contents at the boundary. A bad commit inside a `commitsAdded`
//! batch is dropped on its own; the rest of the batch survives.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{Commit, CommitError, CommitHash};
use crate::engine::DocId;

/// A commit as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCommit {
    pub parents: Vec<String>,
    pub hash: String,
    /// Standard base64 of the raw contents.
    pub contents: String,
}

impl From<&Commit> for WireCommit {
    fn from(commit: &Commit) -> Self {
        Self {
            parents: commit.parents.iter().map(ToString::to_string).collect(),
            hash: commit.hash.to_string(),
            contents: STANDARD.encode(&commit.contents),
        }
    }
}

impl TryFrom<WireCommit> for Commit {
    type Error = CommitError;

    fn try_from(wire: WireCommit) -> Result<Self, Self::Error> {
        let hash = CommitHash::parse(&wire.hash)?;
        let parents = wire
            .parents
            .iter()
            .map(|p| CommitHash::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        let contents =
            STANDARD
                .decode(wire.contents.as_bytes())
                .map_err(|e| CommitError::InvalidWireContents {
                    hash: wire.hash.clone(),
                    reason: e.to_string(),
                })?;
        Ok(Self {
            hash,
            parents,
            contents,
        })
    }
}

/// Serde shape of a commit event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireEvent {
    DocCreated {
        id: String,
    },
    CommitAdded {
        #[serde(rename = "docId")]
        doc_id: String,
        commit: WireCommit,
    },
    CommitsAdded {
        #[serde(rename = "docId")]
        doc_id: String,
        commits: Vec<WireCommit>,
    },
}

/// A validated commit event, emitted only after the replication engine has
/// accepted the corresponding mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitEvent {
    /// A new document exists.
    DocCreated { id: DocId },
    /// One commit was appended to `doc_id`.
    CommitAdded { doc_id: DocId, commit: Commit },
    /// Several commits were appended to `doc_id` in one call.
    CommitsAdded { doc_id: DocId, commits: Vec<Commit> },
}

impl CommitEvent {
    /// Wrap an accepted batch, using the single-commit form when possible.
    #[must_use]
    pub fn for_batch(doc_id: DocId, mut commits: Vec<Commit>) -> Self {
        if commits.len() == 1 {
            if let Some(commit) = commits.pop() {
                return Self::CommitAdded { doc_id, commit };
            }
        }
        Self::CommitsAdded { doc_id, commits }
    }

    /// The document this event concerns.
    #[must_use]
    pub const fn doc_id(&self) -> &DocId {
        match self {
            Self::DocCreated { id } => id,
            Self::CommitAdded { doc_id, .. } | Self::CommitsAdded { doc_id, .. } => doc_id,
        }
    }

    /// Commits carried by the event, in delivery order.
    #[must_use]
    pub fn commits(&self) -> &[Commit] {
        match self {
            Self::DocCreated { .. } => &[],
            Self::CommitAdded { commit, .. } => std::slice::from_ref(commit),
            Self::CommitsAdded { commits, .. } => commits,
        }
    }

    /// Event name as it appears in the wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DocCreated { .. } => "docCreated",
            Self::CommitAdded { .. } => "commitAdded",
            Self::CommitsAdded { .. } => "commitsAdded",
        }
    }

    /// Serialize to the JSON envelope.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_value(WireEvent::from(self))
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    /// Parse and validate a JSON envelope, dropping invalid commits from a
    /// batch. See [`CommitEvent::decode_json`] for what was dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the envelope shape or the
    /// single commit of a `commitAdded` envelope fails validation.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Self::decode_json(raw).map(|decoded| decoded.event)
    }

    /// Parse a JSON envelope, validating each commit on its own.
    ///
    /// # Errors
    ///
    /// Same as [`CommitEvent::from_json`].
    pub fn decode_json(raw: &str) -> anyhow::Result<DecodedEvent> {
        let wire: WireEvent = serde_json::from_str(raw)?;
        let WireEvent::CommitsAdded { doc_id, commits } = wire else {
            return Ok(DecodedEvent {
                event: Self::try_from(wire)?,
                rejected: Vec::new(),
            });
        };

        let doc_id = DocId::new(doc_id);
        let mut kept = Vec::with_capacity(commits.len());
        let mut rejected = Vec::new();
        for wire_commit in commits {
            let hash = wire_commit.hash.clone();
            match Commit::try_from(wire_commit) {
                Ok(commit) => kept.push(commit),
                Err(e) => {
                    tracing::warn!(
                        doc = %doc_id,
                        commit = %hash,
                        code = %e.code(),
                        error = %e,
                        "dropping undecodable commit from batch"
                    );
                    rejected.push(e);
                }
            }
        }
        Ok(DecodedEvent {
            event: Self::CommitsAdded {
                doc_id,
                commits: kept,
            },
            rejected,
        })
    }
}

/// An envelope with the commits that failed validation split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event: CommitEvent,
    pub rejected: Vec<CommitError>,
}

impl From<&CommitEvent> for WireEvent {
    fn from(event: &CommitEvent) -> Self {
        match event {
            CommitEvent::DocCreated { id } => Self::DocCreated { id: id.to_string() },
            CommitEvent::CommitAdded { doc_id, commit } => Self::CommitAdded {
                doc_id: doc_id.to_string(),
                commit: WireCommit::from(commit),
            },
            CommitEvent::CommitsAdded { doc_id, commits } => Self::CommitsAdded {
                doc_id: doc_id.to_string(),
                commits: commits.iter().map(WireCommit::from).collect(),
            },
        }
    }
}

impl TryFrom<WireEvent> for CommitEvent {
    type Error = CommitError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        Ok(match wire {
            WireEvent::DocCreated { id } => Self::DocCreated { id: DocId::new(id) },
            WireEvent::CommitAdded { doc_id, commit } => Self::CommitAdded {
                doc_id: DocId::new(doc_id),
                commit: Commit::try_from(commit)?,
            },
            WireEvent::CommitsAdded { doc_id, commits } => Self::CommitsAdded {
                doc_id: DocId::new(doc_id),
                commits: commits
                    .into_iter()
                    .map(Commit::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            },
        })
    }
}
