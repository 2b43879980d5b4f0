//! Listener bookkeeping shared by every observable type.

use core::fmt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A registered listener callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    key: u64,
    active: AtomicBool,
    callback: Listener<E>,
}

struct Registry<E> {
    next_key: u64,
    entries: Vec<Arc<Entry<E>>>,
}

/// A list of listeners for events of type `E`.
///
/// Callbacks are never invoked while the registry lock is held, so a listener may subscribe,
/// unsubscribe or fire further events from inside its callback.
pub(crate) struct Listeners<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> Listeners<E> {
    pub(crate) fn new() -> Listeners<E> {
        Listeners {
            registry: Arc::new(Mutex::new(Registry {
                next_key: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Adds a listener and returns the token that removes it again.
    pub(crate) fn add(&self, callback: Listener<E>) -> Subscription {
        let entry = {
            let mut registry = self.registry.lock();
            let key = registry.next_key;
            registry.next_key += 1;
            let entry = Arc::new(Entry {
                key,
                active: AtomicBool::new(true),
                callback,
            });
            registry.entries.push(Arc::clone(&entry));
            entry
        };

        let registry: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            entry.active.store(false, Ordering::Release);
            if let Some(registry) = registry.upgrade() {
                registry.lock().entries.retain(|e| e.key != entry.key);
            }
        })
    }

    /// Calls every listener that is still subscribed with the event.
    pub(crate) fn fire(&self, event: &E) {
        let snapshot: Vec<_> = self.registry.lock().entries.iter().cloned().collect();
        for entry in snapshot {
            // may have been unsubscribed by an earlier listener in this same round
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)(event);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }
}

/// Token for a registered listener.
///
/// Dropping the token unsubscribes the listener.
#[must_use = "dropping a Subscription unsubscribes its listener immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + Send + Sync + 'static) -> Subscription {
        Subscription {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription that isn’t attached to anything.
    pub fn empty() -> Subscription {
        Subscription { release: None }
    }

    /// Combines two subscriptions into one that releases both.
    pub fn and(mut self, mut other: Subscription) -> Subscription {
        match (self.release.take(), other.release.take()) {
            (Some(a), Some(b)) => Subscription::new(move || {
                a();
                b();
            }),
            (Some(a), None) => Subscription { release: Some(a) },
            (None, b) => Subscription { release: b },
        }
    }

    /// Removes the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Keeps the listener registered for as long as its source lives.
    pub fn forget(mut self) {
        self.release.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.release.is_some() {
            write!(f, "Subscription(active)")
        } else {
            write!(f, "Subscription(detached)")
        }
    }
}
