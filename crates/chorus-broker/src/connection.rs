//! Transport connection handles.
//!
//! A [`Connection`] stands in for one live capability session. Anything that
//! holds resources on behalf of the connection installs a hook with
//! [`Connection::on_broken`]; when the transport reports the session broken,
//! every hook runs exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

type BrokenHook = Box<dyn FnOnce(ConnectionId) + Send>;

struct Inner {
    id: ConnectionId,
    broken: AtomicBool,
    hooks: Mutex<Vec<BrokenHook>>,
}

/// Cheaply clonable handle to one transport session.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    #[must_use]
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Arc::new(Inner {
                id: ConnectionId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
                broken: AtomicBool::new(false),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.inner.broken.load(Ordering::Acquire)
    }

    /// Run `hook` when this connection breaks. Runs immediately if it
    /// already has.
    pub fn on_broken(&self, hook: impl FnOnce(ConnectionId) + Send + 'static) {
        if self.is_broken() {
            hook(self.inner.id);
            return;
        }
        let mut hooks = self
            .inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Re-check under the lock so a concurrent break cannot strand the hook.
        if self.is_broken() {
            drop(hooks);
            hook(self.inner.id);
        } else {
            hooks.push(Box::new(hook));
        }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn hook_count(&self) -> usize {
        self.inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Mark the connection broken and run every installed hook. Later calls
    /// do nothing.
    pub fn report_broken(&self) {
        let hooks = {
            let mut hooks = self
                .inner
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.inner.broken.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *hooks)
        };
        tracing::info!(connection = %self.inner.id, hooks = hooks.len(), "connection broken");
        for hook in hooks {
            hook(self.inner.id);
        }
    }
}
