//! Property tests for the attribution invariants.

use chorus_core::attribution::{
    AttributedChar, chars_of, compute_char_attribution, ensure_attribution_matches_content,
    merge_attribution, text_of,
};
use chorus_core::commit::CommitHash;
use chorus_core::model::DocumentHistoryEntry;
use proptest::prelude::*;

fn arb_author() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["alice", "bob", "carol"]).prop_map(str::to_owned)
}

// Small alphabet so revisions share characters and the alignment matters.
fn arb_text() -> impl Strategy<Value = String> {
    "[ab\n\u{e9}]{0,12}"
}

fn arb_attribution() -> impl Strategy<Value = Vec<AttributedChar>> {
    prop::collection::vec(
        (prop::sample::select(vec!['a', 'b', 'c', '\n']), arb_author())
            .prop_map(|(ch, author)| AttributedChar { ch, author }),
        0..24,
    )
}

fn arb_history() -> impl Strategy<Value = Vec<DocumentHistoryEntry>> {
    prop::collection::vec((arb_author(), arb_text(), 0_i64..50), 1..8).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (user, content, ts))| DocumentHistoryEntry {
                commit_hash: CommitHash::parse(&format!("{i:064x}")).expect("hash"),
                user,
                content,
                timestamp_ms: ts,
            })
            .collect()
    })
}

fn last_by_timestamp(entries: &[DocumentHistoryEntry]) -> &DocumentHistoryEntry {
    let mut ordered: Vec<&DocumentHistoryEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.timestamp_ms);
    ordered.last().copied().expect("non-empty history")
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn merge_with_own_chars_is_identity(attrib in arb_attribution(), fallback in arb_author()) {
        prop_assert_eq!(merge_attribution(&attrib, &chars_of(&attrib), &fallback), attrib);
    }

    #[test]
    fn merge_output_describes_next(attrib in arb_attribution(), next in arb_text()) {
        let next_chars: Vec<char> = next.chars().collect();
        let out = merge_attribution(&attrib, &next_chars, "z");
        prop_assert_eq!(text_of(&out), next);
    }

    #[test]
    fn history_attribution_matches_last_entry(history in arb_history()) {
        let out = compute_char_attribution(&history);
        let last = last_by_timestamp(&history);
        prop_assert_eq!(out.len(), last.content.chars().count());
        prop_assert_eq!(text_of(&out), last.content.clone());
    }

    #[test]
    fn ensure_matches_content_length(history in arb_history(), live in arb_text()) {
        let base = compute_char_attribution(&history);
        let out = ensure_attribution_matches_content(&base, &live, "me");
        prop_assert_eq!(out.len(), live.chars().count());
    }

    #[test]
    fn empty_entry_resets(mut history in arb_history(), after in arb_text(), who in arb_author()) {
        let max_ts = history.iter().map(|e| e.timestamp_ms).max().unwrap_or(0);
        history.push(DocumentHistoryEntry {
            commit_hash: CommitHash::parse(&"e".repeat(64)).expect("hash"),
            user: "resetter".into(),
            content: String::new(),
            timestamp_ms: max_ts + 1,
        });
        prop_assert!(compute_char_attribution(&history).is_empty());

        history.push(DocumentHistoryEntry {
            commit_hash: CommitHash::parse(&"f".repeat(64)).expect("hash"),
            user: who.clone(),
            content: after.clone(),
            timestamp_ms: max_ts + 2,
        });
        let out = compute_char_attribution(&history);
        prop_assert!(out.iter().all(|a| a.author == who));
    }
}
