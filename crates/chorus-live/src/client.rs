//! A viewer connected to a [`DocService`], following one channel at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use chorus_broker::{Connection, DocService, ListenerHandle, WireListener};
use chorus_core::clock::now_ms;
use chorus_core::commit::create;
use chorus_core::config::ProjectConfig;
use chorus_core::db::query;
use chorus_core::engine::{DocId, ReplicationEngine};
use chorus_core::payload::Payload;
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

use crate::pipeline::{ApplyOutcome, LiveSync, LocalInput, RunExit};

/// The pipeline a [`Client`] drives: submissions go through the service so
/// every accepted commit is broadcast.
pub type ServiceSync<E> = LiveSync<Arc<DocService<E>>>;

struct ActiveChannel<E: ReplicationEngine> {
    sync: ServiceSync<E>,
    listener: ListenerHandle,
    inbound: UnboundedReceiver<String>,
}

pub struct Client<E: ReplicationEngine> {
    service: Arc<DocService<E>>,
    connection: Connection,
    user: String,
    config: ProjectConfig,
    /// Store connection while no channel is active.
    idle_store: Option<rusqlite::Connection>,
    active: Option<ActiveChannel<E>>,
}

impl<E: ReplicationEngine> Client<E> {
    pub fn new(
        service: Arc<DocService<E>>,
        store: rusqlite::Connection,
        user: &str,
        config: ProjectConfig,
    ) -> Self {
        Self {
            service,
            connection: Connection::new(),
            user: user.to_owned(),
            config,
            idle_store: Some(store),
            active: None,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn active(&self) -> Option<&ServiceSync<E>> {
        self.active.as_ref().map(|a| &a.sync)
    }

    pub fn active_mut(&mut self) -> Option<&mut ServiceSync<E>> {
        self.active.as_mut().map(|a| &mut a.sync)
    }

    /// Create a document seeded with `initial_content` and switch to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the service refuses the document or the switch
    /// fails.
    pub async fn create_channel(&mut self, name: &str, initial_content: &str) -> Result<DocId> {
        let payload = Payload::document(&self.user, initial_content, now_ms());
        let doc_id = self
            .service
            .create_doc(create(&payload.encode(), Vec::new()), Vec::new())
            .await
            .with_context(|| format!("create channel '{name}'"))?;
        self.switch_channel(doc_id.clone(), name).await?;
        Ok(doc_id)
    }

    /// Follow `doc_id`. Any pending send of the current channel is cancelled
    /// and its subscription released before the new one is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot record the channel or hydration
    /// fails to write.
    pub async fn switch_channel(&mut self, doc_id: DocId, name: &str) -> Result<()> {
        let store = self.release_active()?;
        let channel = match query::ensure_channel(&store, &doc_id, name, now_ms()) {
            Ok(channel) => channel,
            Err(e) => {
                self.idle_store = Some(store);
                return Err(e);
            }
        };

        let (wire, inbound) = WireListener::new();
        let listener: ListenerHandle = Arc::new(wire);
        self.service
            .subscribe(Arc::clone(&listener), &self.connection, Some(doc_id.clone()));
        tracing::info!(
            connection = %self.connection.id(),
            channel = %channel.id,
            doc = %doc_id,
            "switched channel"
        );

        let mut sync = LiveSync::new(
            Arc::clone(&self.service),
            store,
            channel,
            &self.user,
            &self.config,
        );
        let hydrated = sync.hydrate().await;
        self.active = Some(ActiveChannel {
            sync,
            listener,
            inbound,
        });
        hydrated?;
        Ok(())
    }

    /// Stop following the current channel. Returns its document id.
    pub fn leave_channel(&mut self) -> Option<DocId> {
        let active = self.active.take()?;
        let doc_id = active.sync.doc_id().clone();
        self.idle_store = Some(self.close_active(active));
        Some(doc_id)
    }

    /// Apply every envelope already delivered for the active channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn pump(&mut self) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();
        let Some(active) = self.active.as_mut() else {
            return Ok(outcome);
        };
        loop {
            match active.inbound.try_recv() {
                Ok(raw) => outcome.absorb(active.sync.apply_wire(&raw)?),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!(doc = %active.sync.doc_id(), "subscription feed closed");
                    break;
                }
            }
            active.sync.end_tick();
        }
        Ok(outcome)
    }

    /// Drive the active channel until shutdown or the inputs close,
    /// following channel switches along the way.
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails.
    pub async fn run(&mut self, inputs: &mut UnboundedReceiver<LocalInput>) -> Result<RunExit> {
        loop {
            let Some(active) = self.active.as_mut() else {
                return Ok(RunExit::InputsClosed);
            };
            match active.sync.run(inputs, &mut active.inbound).await? {
                RunExit::SwitchChannel { doc_id, name } => {
                    self.switch_channel(doc_id, &name).await?;
                }
                exit => return Ok(exit),
            }
        }
    }

    /// Leave the active channel and break the connection, releasing every
    /// registration the service holds for it.
    pub fn close(&mut self) {
        self.leave_channel();
        self.connection.report_broken();
    }

    fn release_active(&mut self) -> Result<rusqlite::Connection> {
        if let Some(active) = self.active.take() {
            return Ok(self.close_active(active));
        }
        self.idle_store.take().context("client store is unavailable")
    }

    fn close_active(&self, mut active: ActiveChannel<E>) -> rusqlite::Connection {
        active.sync.cancel_pending();
        let doc_id = active.sync.doc_id().clone();
        if !self.service.unsubscribe(&active.listener, Some(&doc_id)) {
            tracing::debug!(doc = %doc_id, "subscription was already released");
        }
        active.sync.into_store()
    }
}
