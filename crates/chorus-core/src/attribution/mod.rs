//! Per-character authorship.
//!
//! A [`CharAttribution`] pairs every character of a text with the user
//! believed to have written it. It is rebuilt from document history by
//! aligning each revision against the previous one ([`merge`]) and split into
//! same-author runs for display ([`overlay`]).
//!
//! "Character" means a Unicode scalar value; lengths are counted in `char`s.

pub mod merge;
pub mod overlay;

pub use merge::{compute_char_attribution, ensure_attribution_matches_content, merge_attribution};
pub use overlay::{AuthorPalette, OverlayLine, OverlaySegment, to_overlay_lines};

use serde::Serialize;

/// One character and its author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttributedChar {
    pub ch: char,
    pub author: String,
}

impl AttributedChar {
    #[must_use]
    pub fn new(ch: char, author: impl Into<String>) -> Self {
        Self {
            ch,
            author: author.into(),
        }
    }
}

/// Attribution for a whole text, in text order.
pub type CharAttribution = Vec<AttributedChar>;

/// The characters an attribution describes.
#[must_use]
pub fn chars_of(attribution: &[AttributedChar]) -> Vec<char> {
    attribution.iter().map(|a| a.ch).collect()
}

/// The text an attribution describes.
#[must_use]
pub fn text_of(attribution: &[AttributedChar]) -> String {
    attribution.iter().map(|a| a.ch).collect()
}

/// Attribute every character of `text` to `author`.
#[must_use]
pub fn attribute_all(text: &str, author: &str) -> CharAttribution {
    text.chars().map(|ch| AttributedChar::new(ch, author)).collect()
}
