//! The editable document text and its selection.

/// Selection as character offsets; `start == end` is a caret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    #[must_use]
    pub const fn caret(at: usize) -> Self {
        Self { start: at, end: at }
    }

    /// Shift both offsets by `delta`, clamped into `[0, len]`.
    #[must_use]
    pub fn shifted(self, delta: i64, len: usize) -> Self {
        let shift = |offset: usize| -> usize {
            let moved = i64::try_from(offset).unwrap_or(i64::MAX).saturating_add(delta);
            usize::try_from(moved.max(0)).unwrap_or(usize::MAX).min(len)
        };
        Self {
            start: shift(self.start),
            end: shift(self.end),
        }
    }
}

/// Local model of the document editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorBuffer {
    text: String,
    selection: Selection,
}

impl EditorBuffer {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn selection(&self) -> Selection {
        self.selection
    }

    /// Record a local edit as typed by the user.
    pub fn set_local(&mut self, text: String, selection: Selection) {
        let len = text.chars().count();
        self.selection = Selection {
            start: selection.start.min(len),
            end: selection.end.min(len),
        };
        self.text = text;
    }

    /// Replace the text with remote content, moving the selection by the
    /// change in length. Returns `false` if the text was already identical.
    pub fn apply_remote(&mut self, content: &str) -> bool {
        if self.text == content {
            return false;
        }
        let old_len = self.text.chars().count();
        let new_len = content.chars().count();
        let delta = i64::try_from(new_len).unwrap_or(i64::MAX)
            - i64::try_from(old_len).unwrap_or(i64::MAX);
        self.selection = self.selection.shifted(delta, new_len);
        content.clone_into(&mut self.text);
        true
    }
}
