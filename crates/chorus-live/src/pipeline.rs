//! The live sync pipeline for one channel.
//!
//! [`LiveSync`] owns the local store connection, the editor model and the
//! channel session. Local edits are debounced into document commits; commits
//! pushed by the service are verified, deduplicated against the session's
//! processed set, ingested, and written back into the editor with the caret
//! preserved.
//!
//! Every applied commit goes through the same order of side effects:
//!
//! 1. verify the hash (inbound only)
//! 2. record it in the processed set; a seen hash stops here
//! 3. ingest into the local store
//! 4. refresh history and, if the document head moved, the editor
//! 5. submit to the engine (locally authored only)

use std::slice;

use anyhow::Result;
use chorus_core::attribution::{OverlayLine, to_overlay_lines};
use chorus_core::clock::now_ms;
use chorus_core::commit::{Commit, CommitEvent, create, verify_strict};
use chorus_core::config::ProjectConfig;
use chorus_core::db::ingest::Ingestor;
use chorus_core::db::query;
use chorus_core::engine::{DocId, EngineError, ReplicationEngine, flatten_entries};
use chorus_core::error::ErrorCode;
use chorus_core::history::{HistoryError, HistoryView, Restoration};
use chorus_core::model::{Channel, Message};
use chorus_core::payload::Payload;
use rusqlite::Connection;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, Instant, sleep_until};

use crate::debounce::{Debouncer, SyncState};
use crate::editor::{EditorBuffer, Selection};
use crate::session::ChannelSession;

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl LiveError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::History(e) => e.code(),
            Self::Store(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// State of the link to the replication engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// A send or load failed. Stays here until [`LiveSync::reconnect`].
    Error,
    Disconnected,
}

/// Inputs from the user side of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalInput {
    Edit { content: String, selection: Selection },
    SendMessage(String),
    Restore(usize),
    Reconnect,
    Disconnect,
    SwitchChannel { doc_id: DocId, name: String },
    Shutdown,
}

/// Why [`LiveSync::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    Shutdown,
    InputsClosed,
    SwitchChannel { doc_id: DocId, name: String },
}

/// What one batch of inbound commits did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub duplicates: usize,
    /// Commits whose hash did not verify.
    pub rejected: usize,
    pub editor_updated: bool,
}

impl ApplyOutcome {
    pub const fn absorb(&mut self, other: Self) {
        self.applied += other.applied;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
        self.editor_updated |= other.editor_updated;
    }
}

pub struct LiveSync<E> {
    engine: E,
    store: Connection,
    session: ChannelSession,
    editor: EditorBuffer,
    debouncer: Debouncer,
    user: String,
    skew_threshold_secs: u64,
    applying_remote_document: bool,
    state: ConnectionState,
    last_error: Option<String>,
}

impl<E> std::fmt::Debug for LiveSync<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSync")
            .field("channel", &self.session.channel.id)
            .field("user", &self.user)
            .field("state", &self.state)
            .field("sync", &self.debouncer.state())
            .finish_non_exhaustive()
    }
}

impl<E: ReplicationEngine> LiveSync<E> {
    pub fn new(
        engine: E,
        store: Connection,
        channel: Channel,
        user: &str,
        config: &ProjectConfig,
    ) -> Self {
        Self {
            engine,
            store,
            session: ChannelSession::new(channel, config.attribution.max_chars),
            editor: EditorBuffer::default(),
            debouncer: Debouncer::new(Duration::from_millis(config.sync.debounce_ms)),
            user: user.to_owned(),
            skew_threshold_secs: config.clock.skew_threshold_secs,
            applying_remote_document: false,
            state: ConnectionState::Connected,
            last_error: None,
        }
    }

    #[must_use]
    pub const fn session(&self) -> &ChannelSession {
        &self.session
    }

    #[must_use]
    pub const fn editor(&self) -> &EditorBuffer {
        &self.editor
    }

    #[must_use]
    pub const fn store(&self) -> &Connection {
        &self.store
    }

    #[must_use]
    pub const fn doc_id(&self) -> &DocId {
        self.session.doc_id()
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub const fn sync_state(&self) -> SyncState {
        self.debouncer.state()
    }

    #[must_use]
    pub const fn is_applying_remote(&self) -> bool {
        self.applying_remote_document
    }

    /// Give the store connection back, dropping the session.
    #[must_use]
    pub fn into_store(self) -> Connection {
        self.store
    }

    /// Load the full log from the engine and apply whatever this session has
    /// not seen yet. The editor always ends up on the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails. Engine failures move the
    /// connection to [`ConnectionState::Error`] instead.
    pub async fn hydrate(&mut self) -> Result<ApplyOutcome> {
        let loaded = self.engine.load_document(self.session.doc_id()).await;
        let commits = match loaded {
            Ok(Some(entries)) => flatten_entries(entries),
            Ok(None) => {
                tracing::warn!(doc = %self.doc_id(), "engine does not know this document");
                Vec::new()
            }
            Err(e) => {
                self.transport_failed(&e);
                Vec::new()
            }
        };

        let mut outcome = self.apply_commits(commits)?;
        outcome.editor_updated |= self.refresh_document(true)?;
        tracing::info!(
            channel = %self.session.channel.id,
            applied = outcome.applied,
            duplicates = outcome.duplicates,
            rejected = outcome.rejected,
            "hydrated channel"
        );
        Ok(outcome)
    }

    /// Record a local edit. Returns `true` if a send was scheduled; edits
    /// made while remote content is being written never are.
    pub fn on_local_edit(&mut self, content: String, selection: Selection, now: Instant) -> bool {
        if self.applying_remote_document {
            tracing::trace!("ignoring edit during remote apply");
            return false;
        }
        self.editor.set_local(content.clone(), selection);
        self.debouncer.edit(content, now);
        true
    }

    /// Clear the remote-apply guard. Called once per scheduling tick.
    pub const fn end_tick(&mut self) {
        self.applying_remote_document = false;
    }

    /// Send the pending document content if its debounce has elapsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store write fails.
    pub async fn flush_due(&mut self, now: Instant) -> Result<Option<Commit>> {
        let Some(content) = self.debouncer.take_due(now) else {
            return Ok(None);
        };
        let sent = self.send_document(content).await;
        self.debouncer.finish();
        sent.map(Some)
    }

    /// Drop any debounced content that has not been sent.
    pub fn cancel_pending(&mut self) -> bool {
        let dropped = self.debouncer.cancel();
        if dropped {
            tracing::debug!(channel = %self.session.channel.id, "cancelled pending send");
        }
        dropped
    }

    /// Author a chat message and submit it right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store write fails.
    pub async fn send_message(&mut self, content: &str) -> Result<Commit> {
        let payload = Payload::message(&self.user, content, now_ms());
        let commit = create(&payload.encode(), Vec::new());
        self.commit_local(commit.clone()).await?;
        Ok(commit)
    }

    /// Restore history entry `index` as a new document commit and return to
    /// the live view.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::History`] for a bad index or an oversized
    /// document, [`LiveError::Store`] if the store write fails.
    pub async fn restore(&mut self, index: usize) -> Result<Restoration, LiveError> {
        let restoration =
            self.session
                .history
                .restore(index, &self.user, self.session.parents(), now_ms())?;
        self.cancel_pending();
        self.session.history.go_live();
        self.commit_local(restoration.commit.clone()).await?;
        Ok(restoration)
    }

    /// Pin the history view. Indexes at or past the newest entry go live.
    pub fn select_history(&mut self, index: usize) -> Option<usize> {
        self.session.history.select(index)
    }

    pub fn go_live(&mut self) {
        self.session.history.go_live();
    }

    /// The document as currently shown: a pinned revision, or the live text.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::DocumentTooLarge`] past the attribution limit.
    pub fn current_view(&self) -> Result<HistoryView, HistoryError> {
        match self.session.history.index() {
            Some(index) => self.session.history.view_at(index),
            None => self
                .session
                .history
                .current_view(self.editor.text(), &self.user),
        }
    }

    /// Attributed lines for the current view; authors get palette slots in
    /// order of appearance.
    ///
    /// # Errors
    ///
    /// Same as [`LiveSync::current_view`].
    pub fn overlay(&mut self) -> Result<Vec<OverlayLine>, HistoryError> {
        let view = self.current_view()?;
        let lines = to_overlay_lines(&view.attribution, &self.user);
        self.session.palette.observe(&lines);
        Ok(lines)
    }

    /// Chat messages of this channel, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn messages(&self) -> Result<Vec<Message>> {
        query::list_messages(&self.store, &self.session.channel.id)
    }

    /// Apply one JSON wire envelope. Undecodable envelopes are logged and
    /// ignored; undecodable commits inside a batch count as rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn apply_wire(&mut self, raw: &str) -> Result<ApplyOutcome> {
        match CommitEvent::decode_json(raw) {
            Ok(decoded) => {
                let rejected = decoded.rejected.len();
                let mut outcome = self.apply_event(decoded.event)?;
                outcome.rejected += rejected;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable envelope");
                Ok(ApplyOutcome::default())
            }
        }
    }

    /// Apply a pushed event for this channel's document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn apply_event(&mut self, event: CommitEvent) -> Result<ApplyOutcome> {
        if event.doc_id() != self.session.doc_id() {
            tracing::debug!(doc = %event.doc_id(), "ignoring event for another document");
            return Ok(ApplyOutcome::default());
        }
        match event {
            CommitEvent::DocCreated { .. } => Ok(ApplyOutcome::default()),
            CommitEvent::CommitAdded { commit, .. } => self.apply_commits(vec![commit]),
            CommitEvent::CommitsAdded { commits, .. } => self.apply_commits(commits),
        }
    }

    /// Verify, deduplicate and ingest inbound commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn apply_commits(&mut self, commits: Vec<Commit>) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();
        let mut fresh = Vec::with_capacity(commits.len());
        for commit in commits {
            if let Err(e) = verify_strict(&commit) {
                tracing::warn!(
                    commit = %commit.hash,
                    code = %e.code(),
                    error = %e,
                    "dropping commit that failed verification"
                );
                outcome.rejected += 1;
                continue;
            }
            if !self.session.processed.insert(&commit.hash) {
                outcome.duplicates += 1;
                continue;
            }
            fresh.push(commit);
        }
        if fresh.is_empty() {
            return Ok(outcome);
        }

        let result = self.ingestor().ingest(&self.session.channel, &fresh);
        let persisted = match result {
            Ok(persisted) => persisted,
            Err(e) => {
                self.forget(&fresh);
                return Err(e);
            }
        };
        outcome.applied = fresh.len();
        if persisted.document_count > 0 {
            outcome.editor_updated = self.refresh_document(false)?;
        }
        Ok(outcome)
    }

    /// Resume after a transport failure and catch up from the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn reconnect(&mut self) -> Result<ApplyOutcome> {
        if self.state == ConnectionState::Connected {
            return Ok(ApplyOutcome::default());
        }
        tracing::info!(channel = %self.session.channel.id, from = ?self.state, "reconnecting");
        self.state = ConnectionState::Connected;
        self.last_error = None;
        self.hydrate().await
    }

    pub fn disconnect(&mut self) {
        tracing::info!(channel = %self.session.channel.id, "disconnected");
        self.state = ConnectionState::Disconnected;
    }

    /// Drive the pipeline until shutdown, a channel switch, or the input
    /// side going away.
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails.
    pub async fn run(
        &mut self,
        inputs: &mut UnboundedReceiver<LocalInput>,
        inbound: &mut UnboundedReceiver<String>,
    ) -> Result<RunExit> {
        self.end_tick();
        let mut inbound_open = true;
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                biased;

                input = inputs.recv() => match input {
                    Some(input) => {
                        if let Some(exit) = self.handle_input(input).await? {
                            return Ok(exit);
                        }
                    }
                    None => return Ok(RunExit::InputsClosed),
                },

                raw = inbound.recv(), if inbound_open => match raw {
                    Some(raw) => {
                        self.apply_wire(&raw)?;
                    }
                    None => {
                        inbound_open = false;
                        self.transport_failed(&EngineError::TransportBroken(
                            "subscription feed closed".into(),
                        ));
                    }
                },

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush_due(Instant::now()).await?;
                }
            }

            if self.applying_remote_document {
                // Editor echoes of the remote write are already queued.
                while let Ok(input) = inputs.try_recv() {
                    if let Some(exit) = self.handle_input(input).await? {
                        return Ok(exit);
                    }
                }
            }
            self.end_tick();
        }
    }

    async fn handle_input(&mut self, input: LocalInput) -> Result<Option<RunExit>> {
        match input {
            LocalInput::Edit { content, selection } => {
                self.on_local_edit(content, selection, Instant::now());
            }
            LocalInput::SendMessage(content) => {
                self.send_message(&content).await?;
            }
            LocalInput::Restore(index) => match self.restore(index).await {
                Ok(_) => {}
                Err(LiveError::History(e)) => {
                    tracing::warn!(index, code = %e.code(), error = %e, "restore refused");
                }
                Err(LiveError::Store(e)) => return Err(e),
            },
            LocalInput::Reconnect => {
                self.reconnect().await?;
            }
            LocalInput::Disconnect => self.disconnect(),
            LocalInput::SwitchChannel { doc_id, name } => {
                return Ok(Some(RunExit::SwitchChannel { doc_id, name }));
            }
            LocalInput::Shutdown => return Ok(Some(RunExit::Shutdown)),
        }
        Ok(None)
    }

    async fn send_document(&mut self, content: String) -> Result<Commit> {
        let payload = Payload::document(&self.user, content, now_ms());
        let commit = create(&payload.encode(), self.session.parents());
        self.commit_local(commit.clone()).await?;
        Ok(commit)
    }

    async fn commit_local(&mut self, commit: Commit) -> Result<()> {
        self.session.processed.insert(&commit.hash);
        let result = self
            .ingestor()
            .ingest(&self.session.channel, slice::from_ref(&commit));
        let persisted = match result {
            Ok(persisted) => persisted,
            Err(e) => {
                self.forget(slice::from_ref(&commit));
                return Err(e);
            }
        };
        if persisted.document_count > 0 {
            self.refresh_document(false)?;
        }
        self.submit(commit).await;
        Ok(())
    }

    async fn submit(&mut self, commit: Commit) {
        if self.state != ConnectionState::Connected {
            tracing::warn!(
                commit = %commit.hash.short(),
                state = ?self.state,
                "not connected, commit kept locally"
            );
            return;
        }
        let hash = commit.hash.clone();
        match self
            .engine
            .add_commits(self.session.doc_id(), vec![commit])
            .await
        {
            Ok(_) => tracing::debug!(commit = %hash.short(), "submitted commit"),
            Err(e) => self.transport_failed(&e),
        }
    }

    fn transport_failed(&mut self, error: &EngineError) {
        tracing::error!(
            channel = %self.session.channel.id,
            code = %error.code(),
            error = %error,
            "transport failure, reconnect to resume"
        );
        self.state = ConnectionState::Error;
        self.last_error = Some(error.to_string());
    }

    /// Reload history and the snapshot. The editor is only rewritten when
    /// the head moved (or `force`), so unsent typing survives commits that
    /// lose last-write-wins.
    fn refresh_document(&mut self, force: bool) -> Result<bool> {
        let channel_id = &self.session.channel.id;
        let history = query::document_history(&self.store, channel_id)?;
        let snapshot = query::get_snapshot(&self.store, channel_id)?;
        self.session.history.set_entries(history);

        let Some(snapshot) = snapshot else {
            return Ok(false);
        };
        let moved = self.session.head.as_ref() != Some(&snapshot.latest_commit_hash);
        self.session.head = Some(snapshot.latest_commit_hash);
        if !(moved || force) {
            return Ok(false);
        }

        let changed = self.editor.apply_remote(&snapshot.content);
        self.applying_remote_document |= changed;
        Ok(changed)
    }

    /// Un-mark commits whose ingest rolled back so a later delivery or
    /// hydrate can apply them.
    fn forget(&mut self, commits: &[Commit]) {
        for commit in commits {
            self.session.processed.remove(&commit.hash);
        }
        tracing::warn!(
            channel = %self.session.channel.id,
            commits = commits.len(),
            "store write failed, commits left unprocessed"
        );
    }

    fn ingestor(&self) -> Ingestor<'_> {
        Ingestor::new(&self.store).with_skew_threshold(self.skew_threshold_secs)
    }
}
