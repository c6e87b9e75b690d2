//! Subscription registry and broadcast fan-out.
//!
//! Every registration owns an `Arc` to its listener. The broker lets go of
//! that handle on each of the three ways a subscription can end:
//!
//! 1. explicit [`SubscriptionBroker::unregister`]
//! 2. a failed delivery during [`SubscriptionBroker::broadcast`]
//! 3. the owning [`Connection`] reporting broken
//!
//! Delivery happens outside the registry lock, so a slow or failing listener
//! never blocks registration changes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chorus_core::commit::CommitEvent;
use chorus_core::engine::DocId;

use crate::connection::{Connection, ConnectionId};
use crate::listener::CommitListener;

/// Shared handle to a registered listener.
pub type ListenerHandle = Arc<dyn CommitListener>;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

struct Registration {
    id: RegistrationId,
    target: ListenerHandle,
    connection: ConnectionId,
    doc_filter: Option<DocId>,
}

impl Registration {
    fn matches(&self, doc_id: Option<&DocId>) -> bool {
        self.doc_filter.is_none() || self.doc_filter.as_ref() == doc_id
    }
}

#[derive(Default)]
struct Registry {
    registrations: Vec<Registration>,
    hooked: HashSet<ConnectionId>,
}

#[derive(Default)]
struct Inner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl Inner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every registration owned by `connection`. Its break hook stays
    /// installed until it has fired (`hook_fired`).
    fn release_connection(&self, connection: ConnectionId, hook_fired: bool) -> usize {
        let released: Vec<Registration> = {
            let mut registry = self.registry();
            if hook_fired {
                registry.hooked.remove(&connection);
            }
            let (gone, kept) = std::mem::take(&mut registry.registrations)
                .into_iter()
                .partition(|r| r.connection == connection);
            registry.registrations = kept;
            gone
        };
        if !released.is_empty() {
            tracing::info!(
                %connection,
                released = released.len(),
                "released registrations of closed connection"
            );
        }
        released.len()
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Registrations dropped because delivery failed.
    pub dropped: usize,
}

/// Registers viewer callbacks per document and fans out commit events.
#[derive(Clone, Default)]
pub struct SubscriptionBroker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SubscriptionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBroker")
            .field("registrations", &self.registration_count())
            .finish()
    }
}

impl SubscriptionBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain `target` and deliver matching events to it until it is
    /// unregistered, fails a delivery, or `connection` breaks.
    ///
    /// `doc_id = None` subscribes to every document.
    pub fn register(
        &self,
        target: ListenerHandle,
        connection: &Connection,
        doc_id: Option<DocId>,
    ) -> RegistrationId {
        let id = RegistrationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let install_hook = {
            let mut registry = self.inner.registry();
            registry.registrations.push(Registration {
                id,
                target,
                connection: connection.id(),
                doc_filter: doc_id.clone(),
            });
            registry.hooked.insert(connection.id())
        };

        tracing::debug!(
            connection = %connection.id(),
            doc = doc_id.as_ref().map_or("*", DocId::as_str),
            "registered listener"
        );

        if install_hook {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            connection.on_broken(move |conn_id| {
                if let Some(inner) = weak.upgrade() {
                    inner.release_connection(conn_id, true);
                }
            });
        }
        id
    }

    /// Remove the first registration of `target` with exactly this filter.
    ///
    /// Returns `true` if one was removed.
    pub fn unregister(&self, target: &ListenerHandle, doc_id: Option<&DocId>) -> bool {
        let removed = {
            let mut registry = self.inner.registry();
            let pos = registry.registrations.iter().position(|r| {
                std::ptr::addr_eq(Arc::as_ptr(&r.target), Arc::as_ptr(target))
                    && r.doc_filter.as_ref() == doc_id
            });
            pos.map(|i| registry.registrations.remove(i))
        };
        match removed {
            Some(reg) => {
                tracing::debug!(
                    connection = %reg.connection,
                    doc = doc_id.map_or("*", DocId::as_str),
                    "unregistered listener"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every registration whose filter is unset or equal
    /// to `doc_id`. Every match is attempted; failures are dropped, not
    /// retried.
    pub async fn broadcast(&self, event: &CommitEvent, doc_id: Option<&DocId>) -> BroadcastReport {
        let targets: Vec<(RegistrationId, ListenerHandle)> = self
            .inner
            .registry()
            .registrations
            .iter()
            .filter(|r| r.matches(doc_id))
            .map(|r| (r.id, Arc::clone(&r.target)))
            .collect();

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, target) in targets {
            match target.deliver(event).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        event = event.kind(),
                        doc = %event.doc_id(),
                        code = %e.code(),
                        error = %e,
                        "delivery failed, dropping subscriber"
                    );
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut registry = self.inner.registry();
            let before = registry.registrations.len();
            registry.registrations.retain(|r| !failed.contains(&r.id));
            report.dropped = before - registry.registrations.len();
        }
        report
    }

    /// Release every registration owned by `connection`.
    pub fn connection_closed(&self, connection: ConnectionId) -> usize {
        self.inner.release_connection(connection, false)
    }

    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.inner.registry().registrations.len()
    }

    /// Registrations held for `connection` with this exact filter.
    #[must_use]
    pub fn registrations_for(&self, connection: ConnectionId, doc_id: Option<&DocId>) -> usize {
        self.inner
            .registry()
            .registrations
            .iter()
            .filter(|r| r.connection == connection && r.doc_filter.as_ref() == doc_id)
            .count()
    }
}
