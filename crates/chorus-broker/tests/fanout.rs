//! Broadcast fan-out and subscription lifetime tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chorus_broker::{
    ChannelListener, CommitListener, Connection, DeliveryError, DocService, ListenerHandle,
    SubscriptionBroker, WireListener,
};
use chorus_core::commit::{CommitEvent, create};
use chorus_core::engine::{DocId, MemoryEngine, ReplicationEngine};

#[derive(Default)]
struct Counting {
    received: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl CommitListener for Counting {
    async fn deliver(&self, _event: &CommitEvent) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected("viewer threw".into()));
        }
        self.received.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn event_for(doc: &DocId) -> CommitEvent {
    CommitEvent::CommitAdded {
        doc_id: doc.clone(),
        commit: create("payload", vec![]),
    }
}

#[tokio::test]
async fn failing_subscriber_is_dropped_and_others_still_receive() {
    let broker = SubscriptionBroker::new();
    let x = DocId::new("X");

    let targets: Vec<Arc<Counting>> = (0..3).map(|_| Arc::new(Counting::default())).collect();
    targets[1].fail.store(true, Ordering::SeqCst);
    for target in &targets {
        let handle: ListenerHandle = Arc::clone(target) as ListenerHandle;
        broker.register(handle, &Connection::new(), Some(x.clone()));
    }

    let first = broker.broadcast(&event_for(&x), Some(&x)).await;
    assert_eq!(first.delivered, 2);
    assert_eq!(first.dropped, 1);
    assert_eq!(targets[0].received.load(Ordering::SeqCst), 1);
    assert_eq!(targets[1].received.load(Ordering::SeqCst), 0);
    assert_eq!(targets[2].received.load(Ordering::SeqCst), 1);
    assert_eq!(Arc::strong_count(&targets[1]), 1);

    // Even if it would succeed now, the dropped target is never retried.
    targets[1].fail.store(false, Ordering::SeqCst);
    let second = broker.broadcast(&event_for(&x), Some(&x)).await;
    assert_eq!(second.delivered, 2);
    assert_eq!(targets[0].received.load(Ordering::SeqCst), 2);
    assert_eq!(targets[1].received.load(Ordering::SeqCst), 0);
    assert_eq!(targets[2].received.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn every_release_path_drops_the_handle() {
    let broker = SubscriptionBroker::new();
    let doc = DocId::new("d");

    let unregistered: ListenerHandle = Arc::new(Counting::default());
    let failing = Arc::new(Counting::default());
    failing.fail.store(true, Ordering::SeqCst);
    let failing_handle: ListenerHandle = Arc::clone(&failing) as ListenerHandle;
    let orphaned: ListenerHandle = Arc::new(Counting::default());

    let conn = Connection::new();
    broker.register(Arc::clone(&unregistered), &conn, Some(doc.clone()));
    broker.register(Arc::clone(&failing_handle), &Connection::new(), Some(doc.clone()));
    let doomed = Connection::new();
    broker.register(Arc::clone(&orphaned), &doomed, Some(doc.clone()));

    assert!(broker.unregister(&unregistered, Some(&doc)));
    broker.broadcast(&event_for(&doc), Some(&doc)).await;
    doomed.report_broken();

    assert_eq!(broker.registration_count(), 0);
    assert_eq!(Arc::strong_count(&unregistered), 1);
    assert_eq!(Arc::strong_count(&failing_handle), 2); // `failing` + this handle
    assert_eq!(Arc::strong_count(&orphaned), 1);
}

#[tokio::test]
async fn remote_viewer_receives_wire_envelopes_after_commit() {
    let broker = SubscriptionBroker::new();
    let service = DocService::new(MemoryEngine::new("svc"), broker.clone());

    let root = create(r#"{"type":"document","user":"a","content":"v1","timestamp":1}"#, vec![]);
    let doc = service.create_doc(root.clone(), vec![]).await.expect("create");

    let viewer = Connection::new();
    let (wire, mut inbox) = WireListener::new();
    service.subscribe(Arc::new(wire), &viewer, Some(doc.clone()));

    let a = create("a", vec![root.hash.clone()]);
    let b = create("b", vec![a.hash.clone()]);
    service.add_commits(&doc, vec![a.clone(), b.clone()]).await.expect("add");

    let raw = inbox.recv().await.expect("envelope");
    assert!(raw.contains(r#""type":"commitsAdded""#));
    let event = CommitEvent::from_json(&raw).expect("valid envelope");
    assert_eq!(event.doc_id(), &doc);
    assert_eq!(event.commits(), &[a, b]);

    viewer.report_broken();
    assert_eq!(broker.registration_count(), 0);
}

#[tokio::test]
async fn closed_inbox_self_heals() {
    let service = DocService::new(MemoryEngine::new("svc"), SubscriptionBroker::new());
    let doc = service
        .create_doc(create("root", vec![]), vec![])
        .await
        .expect("create");

    let (listener, rx) = ChannelListener::new();
    service.subscribe(Arc::new(listener), &Connection::new(), Some(doc.clone()));
    drop(rx);

    service
        .add_commits(&doc, vec![create("next", vec![])])
        .await
        .expect("add");
    assert_eq!(service.broker().registration_count(), 0);
}
