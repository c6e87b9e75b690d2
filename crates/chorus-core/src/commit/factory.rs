//! Commit construction and verification.
//!
//! The hash is BLAKE3 in key-derivation mode (context
//! [`COMMIT_HASH_CONTEXT`]) over the canonical JSON
//! `{"contents":<base64>,"parents":[<hex>...]}`. Keying the digest keeps
//! chorus commit hashes disjoint from plain BLAKE3 hashes of the same bytes,
//! and covering the parents means two identical payloads on divergent
//! histories never collide.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::canonical::commit_hash_input;
use super::{Commit, CommitError, CommitHash};

/// Key-derivation context for commit hashes. Changing it re-keys every hash.
pub const COMMIT_HASH_CONTEXT: &str = "chorus 2024 commit v1";

/// Build a commit carrying `content` (as UTF-8 bytes) on top of `parents`.
#[must_use]
pub fn create(content: &str, parents: Vec<CommitHash>) -> Commit {
    let contents = content.as_bytes().to_vec();
    let hash = compute_hash(&parents, &contents);
    Commit {
        hash,
        parents,
        contents,
    }
}

/// Compute the keyed digest of `(parents, contents)`.
#[must_use]
pub fn compute_hash(parents: &[CommitHash], contents: &[u8]) -> CommitHash {
    let parents: Vec<&str> = parents.iter().map(CommitHash::as_str).collect();
    let input = commit_hash_input(&parents, &STANDARD.encode(contents));

    let mut hasher = blake3::Hasher::new_derive_key(COMMIT_HASH_CONTEXT);
    hasher.update(input.as_bytes());
    CommitHash::from_digest(&hasher.finalize())
}

/// Returns `true` when the commit's stored hash matches its contents.
#[must_use]
pub fn verify(commit: &Commit) -> bool {
    compute_hash(&commit.parents, &commit.contents) == commit.hash
}

/// Like [`verify`], but reports the expected hash on mismatch.
///
/// # Errors
///
/// Returns [`CommitError::HashMismatch`] when the stored hash is wrong.
pub fn verify_strict(commit: &Commit) -> Result<(), CommitError> {
    let expected = compute_hash(&commit.parents, &commit.contents);
    if expected == commit.hash {
        Ok(())
    } else {
        Err(CommitError::HashMismatch {
            stored: commit.hash.clone(),
            expected,
        })
    }
}
