//! Listener registry: per-event-type and wildcard callbacks.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{error, trace};

use marquee_protocol::InboundEvent;
use marquee_protocol::constants::WILDCARD_KEY;

/// Callback invoked for each matching event.
pub type Listener = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

struct Registration {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Listener,
}

#[derive(Default)]
struct Inner {
    by_key: HashMap<String, Vec<Registration>>,
    next_id: u64,
}

/// Maps event-type keys (plus [`WILDCARD_KEY`]) to ordered callbacks.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `key`. It stays registered until
    /// [`Subscription::unsubscribe`] is called; dropping the handle does not
    /// remove it.
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let key = key.into();
        let active = Arc::new(AtomicBool::new(true));

        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .by_key
            .entry(key.clone())
            .or_default()
            .push(Registration {
                id,
                active: active.clone(),
                callback: Arc::new(callback),
            });
        drop(inner);

        trace!(key = %key, id, "listener subscribed");
        Subscription {
            id,
            key,
            active,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to the listeners of its exact type in insertion
    /// order, then to the wildcard listeners. A panicking listener is logged
    /// and skipped. Returns the number of listeners that completed.
    pub fn publish(&self, event: &InboundEvent) -> usize {
        let targets: Vec<(Arc<AtomicBool>, Listener)> = {
            let inner = lock(&self.inner);
            let exact = if event.event_type == WILDCARD_KEY {
                None
            } else {
                inner.by_key.get(&event.event_type)
            };
            exact
                .into_iter()
                .chain(inner.by_key.get(WILDCARD_KEY))
                .flatten()
                .map(|r| (r.active.clone(), r.callback.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (active, callback) in targets {
            // Unsubscribed while an earlier listener was running.
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        event_type = %event.event_type,
                        panic = panic_message(panic.as_ref()),
                        "listener panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of listeners registered under exactly `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        lock(&self.inner).by_key.get(key).map_or(0, Vec::len)
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`].
pub struct Subscription {
    id: u64,
    key: String,
    active: Arc<AtomicBool>,
    registry: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// The key this listener was registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Removes the listener. No invocation starts after this returns.
    pub fn unsubscribe(self) {
        self.active.store(false, Ordering::Release);
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut inner = lock(&inner);
        if let Some(regs) = inner.by_key.get_mut(&self.key) {
            regs.retain(|r| r.id != self.id);
            if regs.is_empty() {
                inner.by_key.remove(&self.key);
            }
        }
        trace!(key = %self.key, id = self.id, "listener unsubscribed");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // Callbacks never run under the lock, so a poisoned lock still holds
    // consistent data.
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
