//! Service-side document API with broadcast-after-commit.
//!
//! [`DocService`] fronts a [`ReplicationEngine`] for remote viewers and is
//! itself a [`ReplicationEngine`], so clients submit through it exactly as
//! they would to the engine. Events go out only after the wrapped engine has
//! accepted the mutation; a rejected call broadcasts nothing.

use async_trait::async_trait;
use chorus_core::commit::{Commit, CommitEvent, CommitHash};
use chorus_core::engine::{
    AddCommitsOutcome, CommitOrBundle, DocId, EngineError, ReplicationEngine, flatten_entries,
};

use crate::broker::{BroadcastReport, ListenerHandle, RegistrationId, SubscriptionBroker};
use crate::connection::Connection;

pub struct DocService<E> {
    engine: E,
    broker: SubscriptionBroker,
}

impl<E: ReplicationEngine> DocService<E> {
    pub const fn new(engine: E, broker: SubscriptionBroker) -> Self {
        Self { engine, broker }
    }

    pub const fn engine(&self) -> &E {
        &self.engine
    }

    pub const fn broker(&self) -> &SubscriptionBroker {
        &self.broker
    }

    /// The document's log as plain commits.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DocumentNotFound`] for unknown documents.
    pub async fn load_commits(&self, doc_id: &DocId) -> Result<Vec<Commit>, EngineError> {
        self.engine
            .load_document(doc_id)
            .await?
            .map(flatten_entries)
            .ok_or_else(|| EngineError::DocumentNotFound(doc_id.clone()))
    }

    pub fn subscribe(
        &self,
        target: ListenerHandle,
        connection: &Connection,
        doc_id: Option<DocId>,
    ) -> RegistrationId {
        self.broker.register(target, connection, doc_id)
    }

    pub fn unsubscribe(&self, target: &ListenerHandle, doc_id: Option<&DocId>) -> bool {
        self.broker.unregister(target, doc_id)
    }

    async fn announce(&self, event: &CommitEvent, doc_id: &DocId) -> BroadcastReport {
        let report = self.broker.broadcast(event, Some(doc_id)).await;
        tracing::debug!(
            event = event.kind(),
            doc = %doc_id,
            commits = event.commits().len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast"
        );
        report
    }
}

#[async_trait]
impl<E: ReplicationEngine> ReplicationEngine for DocService<E> {
    async fn create_doc(
        &self,
        initial: Commit,
        other_parents: Vec<CommitHash>,
    ) -> Result<DocId, EngineError> {
        let doc_id = self
            .engine
            .create_doc(initial, other_parents)
            .await
            .inspect_err(|e| tracing::warn!(code = %e.code(), error = %e, "create_doc failed"))?;

        let event = CommitEvent::DocCreated { id: doc_id.clone() };
        self.announce(&event, &doc_id).await;
        Ok(doc_id)
    }

    async fn add_commits(
        &self,
        doc_id: &DocId,
        commits: Vec<Commit>,
    ) -> Result<AddCommitsOutcome, EngineError> {
        let outcome = self
            .engine
            .add_commits(doc_id, commits)
            .await
            .inspect_err(|e| {
                tracing::warn!(doc = %doc_id, code = %e.code(), error = %e, "add_commits failed");
            })?;

        if outcome.has_new_commits() {
            let event = CommitEvent::for_batch(doc_id.clone(), outcome.accepted.clone());
            self.announce(&event, doc_id).await;
        }
        Ok(outcome)
    }

    async fn load_document(
        &self,
        doc_id: &DocId,
    ) -> Result<Option<Vec<CommitOrBundle>>, EngineError> {
        self.engine.load_document(doc_id).await
    }

    async fn wait_until_synced(&self, peer_id: &str) -> Result<(), EngineError> {
        self.engine.wait_until_synced(peer_id).await
    }

    async fn create_contact_card(&self) -> Result<String, EngineError> {
        self.engine.create_contact_card().await
    }

    async fn stop(&self) {
        self.engine.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ChannelListener;
    use chorus_core::commit::create;
    use chorus_core::engine::MemoryEngine;
    use std::sync::Arc;

    fn service() -> DocService<MemoryEngine> {
        DocService::new(MemoryEngine::new("svc"), SubscriptionBroker::new())
    }

    #[tokio::test]
    async fn create_doc_announces_to_unfiltered_viewers() {
        let svc = service();
        let conn = Connection::new();
        let (listener, mut rx) = ChannelListener::new();
        svc.subscribe(Arc::new(listener), &conn, None);

        let doc = svc.create_doc(create("root", vec![]), vec![]).await.expect("create");
        assert_eq!(rx.try_recv().expect("event"), CommitEvent::DocCreated { id: doc });
    }

    #[tokio::test]
    async fn only_new_commits_are_announced() {
        let svc = service();
        let root = create("root", vec![]);
        let doc = svc.create_doc(root.clone(), vec![]).await.expect("create");

        let conn = Connection::new();
        let (listener, mut rx) = ChannelListener::new();
        svc.subscribe(Arc::new(listener), &conn, Some(doc.clone()));

        let child = create("child", vec![root.hash.clone()]);
        svc.add_commits(&doc, vec![root, child.clone()]).await.expect("add");
        assert_eq!(
            rx.try_recv().expect("event"),
            CommitEvent::CommitAdded {
                doc_id: doc.clone(),
                commit: child.clone()
            }
        );

        svc.add_commits(&doc, vec![child]).await.expect("dup");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_commit_is_not_broadcast() {
        let svc = service();
        let doc = svc.create_doc(create("root", vec![]), vec![]).await.expect("create");
        let conn = Connection::new();
        let (listener, mut rx) = ChannelListener::new();
        svc.subscribe(Arc::new(listener), &conn, Some(doc.clone()));

        let mut forged = create("x", vec![]);
        forged.contents = b"y".to_vec();
        assert!(svc.add_commits(&doc, vec![forged]).await.is_err());
        assert!(svc.add_commits(&DocId::new("nope"), vec![]).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn load_commits_flattens_and_reports_unknown() {
        let svc = DocService::new(
            MemoryEngine::new("svc").with_bundling(0),
            SubscriptionBroker::new(),
        );
        let root = create("root", vec![]);
        let doc = svc.create_doc(root.clone(), vec![]).await.expect("create");
        let next = create("next", vec![root.hash.clone()]);
        svc.add_commits(&doc, vec![next.clone()]).await.expect("add");
        assert_eq!(svc.load_commits(&doc).await.expect("load"), vec![root, next]);

        let err = svc.load_commits(&DocId::new("doc-9")).await.expect_err("unknown");
        assert_eq!(err, EngineError::DocumentNotFound(DocId::new("doc-9")));
    }
}
