//! Time-travel over a channel's document history.
//!
//! The navigator is either *live* (`index() == None`, tracking the newest
//! entry and the editable text) or pinned to a history entry. Viewing never
//! mutates history; restoring an old revision authors a brand-new document
//! commit carrying that revision's text.

use crate::attribution::{
    CharAttribution, compute_char_attribution, ensure_attribution_matches_content,
};
use crate::commit::{Commit, CommitHash, create};
use crate::error::ErrorCode;
use crate::model::DocumentHistoryEntry;
use crate::payload::Payload;

/// Default upper bound on document length for attribution.
pub const DEFAULT_MAX_CHARS: usize = 20_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("history index {index} out of range (history has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("document has {chars} characters, attribution is limited to {max}")]
    DocumentTooLarge { chars: usize, max: usize },
}

impl HistoryError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::IndexOutOfRange { .. } => ErrorCode::HistoryIndexOutOfRange,
            Self::DocumentTooLarge { .. } => ErrorCode::DocumentTooLarge,
        }
    }
}

/// Document text with its attribution at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryView {
    /// `None` for the live view.
    pub index: Option<usize>,
    pub content: String,
    pub attribution: CharAttribution,
}

/// Result of restoring an old revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restoration {
    /// The new outgoing document commit.
    pub commit: Commit,
    pub payload: Payload,
    pub content: String,
    /// Attribution of the restored text before the commit is sent.
    pub attribution: CharAttribution,
    pub restored_from: CommitHash,
}

#[derive(Debug, Clone)]
pub struct HistoryNavigator {
    entries: Vec<DocumentHistoryEntry>,
    index: Option<usize>,
    max_chars: usize,
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl HistoryNavigator {
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: None,
            max_chars,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[DocumentHistoryEntry] {
        &self.entries
    }

    /// The pinned history index, or `None` when live.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        self.index
    }

    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.index.is_none()
    }

    /// Replace the history, clamping a pinned index into the new range.
    pub fn set_entries(&mut self, entries: Vec<DocumentHistoryEntry>) {
        self.entries = entries;
        self.index = match (self.index, self.entries.len()) {
            (_, 0) | (None, _) => None,
            (Some(i), len) => Some(i.min(len - 1)),
        };
    }

    /// Pin the view to `index`. Selecting the last entry or beyond returns
    /// to live. Returns the resulting index.
    pub fn select(&mut self, index: usize) -> Option<usize> {
        self.index = match self.entries.len() {
            0 => None,
            len if index >= len - 1 => None,
            _ => Some(index),
        };
        self.index
    }

    pub fn go_live(&mut self) {
        self.index = None;
    }

    /// Text and attribution as of entry `index`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::IndexOutOfRange`] for an unknown index and
    /// [`HistoryError::DocumentTooLarge`] if any revision up to `index`
    /// exceeds the configured bound.
    pub fn view_at(&self, index: usize) -> Result<HistoryView, HistoryError> {
        let slice = self.prefix(index)?;
        let content = slice
            .last()
            .map(|e| e.content.clone())
            .unwrap_or_default();
        Ok(HistoryView {
            index: Some(index),
            content,
            attribution: compute_char_attribution(slice),
        })
    }

    /// The view for the current mode.
    ///
    /// When live, the full-history attribution is reconciled against
    /// `live_content`, with unexplained characters attributed to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::DocumentTooLarge`] past the size bound.
    pub fn current_view(&self, live_content: &str, user: &str) -> Result<HistoryView, HistoryError> {
        if let Some(index) = self.index {
            return self.view_at(index);
        }
        self.check_size(live_content)?;
        for entry in &self.entries {
            self.check_size(&entry.content)?;
        }
        let base = compute_char_attribution(&self.entries);
        Ok(HistoryView {
            index: None,
            content: live_content.to_owned(),
            attribution: ensure_attribution_matches_content(&base, live_content, user),
        })
    }

    /// Author a new document commit restoring entry `index`.
    ///
    /// # Errors
    ///
    /// Same as [`HistoryNavigator::view_at`].
    pub fn restore(
        &self,
        index: usize,
        user: &str,
        parents: Vec<CommitHash>,
        now_ms: i64,
    ) -> Result<Restoration, HistoryError> {
        let view = self.view_at(index)?;
        let restored_from = self.entries[index].commit_hash.clone();
        let payload = Payload::document(user, view.content.clone(), now_ms);
        let commit = create(&payload.encode(), parents);

        tracing::info!(
            restored_from = %restored_from.short(),
            commit = %commit.hash.short(),
            user = %payload.user,
            "restored history entry as new commit"
        );

        Ok(Restoration {
            commit,
            payload,
            content: view.content,
            attribution: view.attribution,
            restored_from,
        })
    }

    fn prefix(&self, index: usize) -> Result<&[DocumentHistoryEntry], HistoryError> {
        if index >= self.entries.len() {
            return Err(HistoryError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        let slice = &self.entries[..=index];
        for entry in slice {
            self.check_size(&entry.content)?;
        }
        Ok(slice)
    }

    fn check_size(&self, text: &str) -> Result<(), HistoryError> {
        let chars = text.chars().count();
        if chars > self.max_chars {
            return Err(HistoryError::DocumentTooLarge {
                chars,
                max: self.max_chars,
            });
        }
        Ok(())
    }
}
