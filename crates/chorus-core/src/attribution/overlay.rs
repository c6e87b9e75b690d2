//! Line/run layout of an attribution for rendering.

use std::collections::HashMap;

use serde::Serialize;

use super::AttributedChar;

/// A maximal run of characters by one author within a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlaySegment {
    pub author: String,
    pub text: String,
}

/// One line of attributed text. An empty line has no segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverlayLine {
    pub segments: Vec<OverlaySegment>,
}

impl OverlayLine {
    /// The line's text without attribution.
    #[must_use]
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Split an attribution on `'\n'` into lines of same-author runs.
///
/// Always returns at least one line. Characters with an empty author are
/// shown as `fallback_author`.
#[must_use]
pub fn to_overlay_lines(attribution: &[AttributedChar], fallback_author: &str) -> Vec<OverlayLine> {
    let mut lines = vec![OverlayLine::default()];
    for attributed in attribution {
        if attributed.ch == '\n' {
            lines.push(OverlayLine::default());
            continue;
        }
        let author = if attributed.author.is_empty() {
            fallback_author
        } else {
            attributed.author.as_str()
        };
        let Some(line) = lines.last_mut() else {
            continue;
        };
        match line.segments.last_mut() {
            Some(seg) if seg.author == author => seg.text.push(attributed.ch),
            _ => line.segments.push(OverlaySegment {
                author: author.to_owned(),
                text: attributed.ch.to_string(),
            }),
        }
    }
    lines
}

/// Stable author → color slot assignment for one viewing session.
///
/// Slots are handed out in order of first appearance and wrap after
/// `slots` distinct authors.
#[derive(Debug, Clone)]
pub struct AuthorPalette {
    slots: usize,
    assigned: HashMap<String, usize>,
    order: Vec<String>,
}

impl AuthorPalette {
    /// A palette with `slots` colors (at least one).
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            slots: slots.max(1),
            assigned: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The slot for `author`, assigning the next one on first sight.
    pub fn slot_for(&mut self, author: &str) -> usize {
        if let Some(&slot) = self.assigned.get(author) {
            return slot;
        }
        let slot = self.order.len() % self.slots;
        self.assigned.insert(author.to_owned(), slot);
        self.order.push(author.to_owned());
        slot
    }

    /// Assign slots to every author in `lines`, in reading order.
    pub fn observe(&mut self, lines: &[OverlayLine]) {
        for seg in lines.iter().flat_map(|l| &l.segments) {
            self.slot_for(&seg.author);
        }
    }

    /// Authors seen so far, in order of first appearance.
    #[must_use]
    pub fn authors(&self) -> &[String] {
        &self.order
    }
}
