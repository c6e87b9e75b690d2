//! Content-addressed commits.
//!
//! A [`Commit`] is the immutable unit of change in a document's log. Its
//! [`CommitHash`] is a keyed BLAKE3 digest over a canonical encoding of the
//! commit's parents and contents, so recomputing the hash both verifies
//! integrity and serves as the dedup key everywhere downstream.
//!
//! # Sub-modules
//!
//! - [`canonical`]: canonical JSON used as the hash input encoding.
//! - [`factory`]: commit construction and verification
//!   ([`create`], [`compute_hash`], [`verify`]).
//! - [`wire`]: the JSON envelope used to ship commits and commit events.

pub mod canonical;
pub mod factory;
pub mod wire;

pub use factory::{compute_hash, create, verify, verify_strict};
pub use wire::{CommitEvent, DecodedEvent, WireCommit, WireEvent};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Length of a hex-rendered 32-byte digest.
pub const HASH_HEX_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while parsing, decoding, or verifying commits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    /// A hash string is not 64 lowercase hex characters.
    #[error("invalid commit hash '{raw}': expected {HASH_HEX_LEN} lowercase hex characters")]
    InvalidHash {
        /// The rejected input.
        raw: String,
    },

    /// The stored hash does not match the hash recomputed from the commit.
    #[error("commit hash mismatch: stored={stored} expected={expected}")]
    HashMismatch {
        /// Hash carried by the commit.
        stored: CommitHash,
        /// Hash recomputed from parents and contents.
        expected: CommitHash,
    },

    /// Commit contents are not valid UTF-8 text.
    #[error("commit {hash} contents are not valid UTF-8")]
    UnsupportedContentEncoding {
        /// The offending commit.
        hash: CommitHash,
    },

    /// Wire contents could not be decoded from base64.
    #[error("commit {hash} has undecodable wire contents: {reason}")]
    InvalidWireContents {
        /// Hash string as received.
        hash: String,
        /// Decoder error text.
        reason: String,
    },
}

impl CommitError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidHash { .. } => ErrorCode::InvalidHash,
            Self::HashMismatch { .. } => ErrorCode::HashMismatch,
            Self::UnsupportedContentEncoding { .. } | Self::InvalidWireContents { .. } => {
                ErrorCode::UnsupportedContentEncoding
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CommitHash
// ---------------------------------------------------------------------------

/// Hex-encoded 32-byte commit digest.
///
/// Always exactly [`HASH_HEX_LEN`] lowercase hex characters; the constructor
/// rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Parse and validate a hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::InvalidHash`] if `raw` is not 64 lowercase hex
    /// characters.
    pub fn parse(raw: &str) -> Result<Self, CommitError> {
        let valid = raw.len() == HASH_HEX_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(raw.to_owned()))
        } else {
            Err(CommitError::InvalidHash {
                raw: raw.to_owned(),
            })
        }
    }

    pub(crate) fn from_digest(digest: &blake3::Hash) -> Self {
        Self(digest.to_hex().to_string())
    }

    /// The full hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs and terminal output.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitHash {
    type Err = CommitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommitHash {
    type Error = CommitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommitHash> for String {
    fn from(value: CommitHash) -> Self {
        value.0
    }
}

impl AsRef<str> for CommitHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// An immutable, content-addressed entry in a document's commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Keyed digest over `(parents, contents)`.
    pub hash: CommitHash,
    /// Parent hashes, in the order they were given at creation.
    pub parents: Vec<CommitHash>,
    /// Opaque payload bytes; chorus payloads are UTF-8 JSON.
    pub contents: Vec<u8>,
}

impl Commit {
    /// Borrow the contents as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::UnsupportedContentEncoding`] when the contents
    /// are not valid UTF-8.
    pub fn text(&self) -> Result<&str, CommitError> {
        std::str::from_utf8(&self.contents).map_err(|_| CommitError::UnsupportedContentEncoding {
            hash: self.hash.clone(),
        })
    }
}
