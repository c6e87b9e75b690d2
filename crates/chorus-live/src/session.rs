//! Per-channel client state.

use chorus_core::attribution::AuthorPalette;
use chorus_core::commit::CommitHash;
use chorus_core::engine::DocId;
use chorus_core::history::HistoryNavigator;
use chorus_core::model::Channel;

use crate::processed::ProcessedSet;

/// Number of distinct author colors before slots are reused.
pub const PALETTE_SLOTS: usize = 8;

/// Everything one client keeps about the channel it is viewing.
///
/// Dropped wholesale on channel switch, so nothing leaks between channels.
#[derive(Debug)]
pub struct ChannelSession {
    pub channel: Channel,
    pub processed: ProcessedSet,
    pub history: HistoryNavigator,
    pub palette: AuthorPalette,
    /// Latest known document commit; parent of the next local send.
    pub head: Option<CommitHash>,
}

impl ChannelSession {
    #[must_use]
    pub fn new(channel: Channel, max_chars: usize) -> Self {
        Self {
            channel,
            processed: ProcessedSet::new(),
            history: HistoryNavigator::new(max_chars),
            palette: AuthorPalette::new(PALETTE_SLOTS),
            head: None,
        }
    }

    #[must_use]
    pub const fn doc_id(&self) -> &DocId {
        &self.channel.doc_id
    }

    /// Parents for the next outgoing document commit.
    #[must_use]
    pub fn parents(&self) -> Vec<CommitHash> {
        self.head.iter().cloned().collect()
    }
}
