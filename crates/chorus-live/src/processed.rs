//! Per-session record of commit hashes already applied.

use std::collections::HashSet;

use chorus_core::commit::CommitHash;

/// Hashes this session has already applied, whether authored locally,
/// replayed from the engine, or pushed by the broker.
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    seen: HashSet<CommitHash>,
}

impl ProcessedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash`. Returns `false` if it was already present.
    pub fn insert(&mut self, hash: &CommitHash) -> bool {
        if self.seen.contains(hash) {
            return false;
        }
        self.seen.insert(hash.clone())
    }

    /// Forget `hash`. Returns `true` if it was present.
    pub fn remove(&mut self, hash: &CommitHash) -> bool {
        self.seen.remove(hash)
    }

    #[must_use]
    pub fn contains(&self, hash: &CommitHash) -> bool {
        self.seen.contains(hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
