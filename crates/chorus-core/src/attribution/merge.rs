//! LCS-based attribution merge.
//!
//! [`merge_attribution`] aligns the previous attributed text with the next
//! revision using the classic suffix dynamic program:
//!
//! ```text
//! dp[i][j] = dp[i+1][j+1] + 1                 if prev[i] == next[j]
//!          = max(dp[i+1][j], dp[i][j+1])      otherwise
//! ```
//!
//! The walk then goes front to back. Matches keep their previous author. On a
//! mismatch the previous character is dropped when `dp[i+1][j] >= dp[i][j+1]`
//! (deletion is preferred on ties), otherwise the next character is emitted
//! for the fallback author. That tie-break decides where attribution
//! boundaries fall on ambiguous edits and must not change.
//!
//! Time and space are O(n·m); callers bound document size.

use super::{AttributedChar, CharAttribution, attribute_all};
use crate::model::DocumentHistoryEntry;

/// Merge `previous` attribution into the characters of the next revision.
///
/// Characters that survive from `previous` keep their author; new characters
/// go to `fallback_author`. The result always has `next_chars.len()` entries.
#[must_use]
pub fn merge_attribution(
    previous: &[AttributedChar],
    next_chars: &[char],
    fallback_author: &str,
) -> CharAttribution {
    if previous.is_empty() {
        return next_chars
            .iter()
            .map(|&ch| AttributedChar::new(ch, fallback_author))
            .collect();
    }

    let n = previous.len();
    let m = next_chars.len();
    let width = m + 1;
    let mut dp = vec![0_u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i * width + j] = if previous[i].ch == next_chars[j] {
                dp[(i + 1) * width + j + 1] + 1
            } else {
                dp[(i + 1) * width + j].max(dp[i * width + j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if previous[i].ch == next_chars[j] {
            out.push(previous[i].clone());
            i += 1;
            j += 1;
        } else if dp[(i + 1) * width + j] >= dp[i * width + j + 1] {
            i += 1;
        } else {
            out.push(AttributedChar::new(next_chars[j], fallback_author));
            j += 1;
        }
    }
    out.extend(
        next_chars[j..]
            .iter()
            .map(|&ch| AttributedChar::new(ch, fallback_author)),
    );
    out
}

/// Attribution of the last entry, folded over `entries` in timestamp order.
///
/// An entry with empty content resets the running attribution rather than
/// being merged against it. Entries with equal timestamps keep their given
/// order.
#[must_use]
pub fn compute_char_attribution(entries: &[DocumentHistoryEntry]) -> CharAttribution {
    let mut ordered: Vec<&DocumentHistoryEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.timestamp_ms);

    ordered.into_iter().fold(Vec::new(), |acc, entry| {
        if entry.content.is_empty() {
            Vec::new()
        } else if acc.is_empty() {
            attribute_all(&entry.content, &entry.user)
        } else {
            let next: Vec<char> = entry.content.chars().collect();
            merge_attribution(&acc, &next, &entry.user)
        }
    })
}

/// Reconcile `base` against `content`, which may have diverged from it.
///
/// The result always describes exactly `content`.
#[must_use]
pub fn ensure_attribution_matches_content(
    base: &[AttributedChar],
    content: &str,
    fallback_author: &str,
) -> CharAttribution {
    let next: Vec<char> = content.chars().collect();
    merge_attribution(base, &next, fallback_author)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::{chars_of, text_of};
    use crate::commit::CommitHash;

    fn entry(user: &str, content: &str, ts: i64) -> DocumentHistoryEntry {
        DocumentHistoryEntry {
            commit_hash: CommitHash::parse(&format!("{ts:064x}")).expect("hash"),
            user: user.into(),
            content: content.into(),
            timestamp_ms: ts,
        }
    }

    fn authors(attribution: &[AttributedChar]) -> Vec<(char, &str)> {
        attribution.iter().map(|a| (a.ch, a.author.as_str())).collect()
    }

    #[test]
    fn empty_previous_goes_to_fallback() {
        let out = merge_attribution(&[], &['h', 'i'], "zoe");
        assert_eq!(authors(&out), vec![('h', "zoe"), ('i', "zoe")]);
    }

    #[test]
    fn single_author_history() {
        let out = compute_char_attribution(&[entry("alice", "hello", 1)]);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|a| a.author == "alice"));
    }

    #[test]
    fn substitution_prefers_deletion_on_ties() {
        let out = compute_char_attribution(&[entry("alice", "hello", 1), entry("bob", "hullo", 2)]);
        assert_eq!(
            authors(&out),
            vec![
                ('h', "alice"),
                ('u', "bob"),
                ('l', "alice"),
                ('l', "alice"),
                ('o', "alice"),
            ]
        );
    }

    #[test]
    fn append_keeps_prefix_authors() {
        let out = compute_char_attribution(&[entry("a", "ab", 1), entry("b", "abc", 2)]);
        assert_eq!(authors(&out), vec![('a', "a"), ('b', "a"), ('c', "b")]);
    }

    #[test]
    fn entries_are_folded_in_timestamp_order() {
        let out = compute_char_attribution(&[entry("b", "xy", 2), entry("a", "x", 1)]);
        assert_eq!(authors(&out), vec![('x', "a"), ('y', "b")]);
    }

    #[test]
    fn empty_entry_resets() {
        let out = compute_char_attribution(&[
            entry("a", "keep me", 1),
            entry("b", "", 2),
            entry("c", "keep", 3),
        ]);
        assert!(out.iter().all(|a| a.author == "c"));
        assert_eq!(text_of(&out), "keep");
    }

    #[test]
    fn trailing_empty_entry_yields_empty() {
        assert!(compute_char_attribution(&[entry("a", "x", 1), entry("b", "", 2)]).is_empty());
        assert!(compute_char_attribution(&[]).is_empty());
    }

    #[test]
    fn multibyte_chars_count_once() {
        let out = compute_char_attribution(&[entry("a", "héllo 👋", 1)]);
        assert_eq!(out.len(), "héllo 👋".chars().count());
    }

    #[test]
    fn ensure_matches_diverged_content() {
        let base = compute_char_attribution(&[entry("a", "shared", 1)]);
        let out = ensure_attribution_matches_content(&base, "shared text", "me");
        assert_eq!(out.len(), 11);
        assert_eq!(text_of(&out), "shared text");
        assert!(out[..6].iter().all(|a| a.author == "a"));
        assert!(out[6..].iter().all(|a| a.author == "me"));
    }

    #[test]
    fn merge_with_own_chars_is_identity() {
        let base = compute_char_attribution(&[entry("a", "abc", 1), entry("b", "abXc", 2)]);
        assert_eq!(merge_attribution(&base, &chars_of(&base), "z"), base);
    }
}
