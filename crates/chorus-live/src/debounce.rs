//! Debounced document sends.
//!
//! Keystrokes reset a single deadline; only the newest pending content is
//! sent once the editor has been quiet for the configured delay.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Debouncing,
    Sending,
}

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    state: SyncState,
    pending: Option<String>,
    deadline: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: SyncState::Idle,
            pending: None,
            deadline: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Replace the pending content and push the deadline out.
    pub fn edit(&mut self, content: String, now: Instant) {
        self.pending = Some(content);
        self.deadline = Some(now + self.delay);
        self.state = SyncState::Debouncing;
    }

    /// Hand out the pending content once its deadline has passed, moving to
    /// `Sending`. Call [`Debouncer::finish`] when the send completes.
    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.state = SyncState::Sending;
                self.pending.take()
            }
            _ => None,
        }
    }

    pub fn finish(&mut self) {
        if self.state == SyncState::Sending {
            self.state = SyncState::Idle;
        }
    }

    /// Drop any pending content. Returns `true` if something was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline = None;
        self.state = SyncState::Idle;
        self.pending.take().is_some()
    }
}
