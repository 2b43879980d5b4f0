//! Settable reactive cells.

use super::subscription::{Listener, Listeners, Subscription};
use crate::error::NotSettable;
use core::fmt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of an observable, for telling cells apart without comparing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    pub(crate) fn new() -> CellId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CellId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Why a value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cause {
    description: Arc<str>,
}

impl Cause {
    pub fn new(description: &str) -> Cause {
        Cause {
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A change in an observable value.
#[derive(Debug, Clone)]
pub struct ChangeEvent<T> {
    pub old: T,
    pub new: T,
    pub cause: Option<Cause>,
}

/// A value that can be read and observed, and possibly written.
pub trait Observable<T>: Send + Sync {
    /// Returns the current value.
    fn get(&self) -> T;

    /// Replaces the value and returns the previous one.
    fn set(&self, value: T, cause: Option<Cause>) -> Result<T, NotSettable>;

    /// Whether `set` can succeed right now.
    fn is_settable(&self) -> bool;

    /// Registers a listener for value changes.
    fn subscribe(&self, listener: Listener<ChangeEvent<T>>) -> Subscription;

    /// Identity of the underlying storage.
    fn identity(&self) -> CellId;
}

/// A shared, type-erased observable.
pub type DynObservable<T> = Arc<dyn Observable<T>>;

struct CellInner<T> {
    id: CellId,
    value: RwLock<T>,
    listeners: Listeners<ChangeEvent<T>>,
}

/// A mutable slot holding a value and notifying listeners on every write.
///
/// Cloning a cell yields another handle to the same slot.
pub struct Cell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Cell {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Cell<T> {
    pub fn new(value: T) -> Cell<T> {
        Cell {
            inner: Arc::new(CellInner {
                id: CellId::new(),
                value: RwLock::new(value),
                listeners: Listeners::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Writes a value and notifies listeners. Always succeeds for a plain cell.
    pub fn set(&self, value: T, cause: Option<Cause>) -> T {
        let old = {
            let mut slot = self.inner.value.write();
            std::mem::replace(&mut *slot, value.clone())
        };
        self.inner.listeners.fire(&ChangeEvent {
            old: old.clone(),
            new: value,
            cause,
        });
        old
    }

    pub fn subscribe(&self, listener: Listener<ChangeEvent<T>>) -> Subscription {
        self.inner.listeners.add(listener)
    }

    /// A read-only view of this cell.
    pub fn unsettable(&self, reason: &str) -> ReadOnly<T> {
        ReadOnly {
            cell: self.clone(),
            reason: reason.into(),
        }
    }

    /// Type-erases this cell.
    pub fn shared(&self) -> DynObservable<T> {
        Arc::new(self.clone())
    }

    pub fn ptr_eq(&self, other: &Cell<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> for Cell<T> {
    fn get(&self) -> T {
        Cell::get(self)
    }

    fn set(&self, value: T, cause: Option<Cause>) -> Result<T, NotSettable> {
        Ok(Cell::set(self, value, cause))
    }

    fn is_settable(&self) -> bool {
        true
    }

    fn subscribe(&self, listener: Listener<ChangeEvent<T>>) -> Subscription {
        Cell::subscribe(self, listener)
    }

    fn identity(&self) -> CellId {
        self.inner.id
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Cell").field(&*self.inner.value.read()).finish()
    }
}

/// A read-only view of a cell; writes fail with the stored reason.
#[derive(Clone)]
pub struct ReadOnly<T> {
    cell: Cell<T>,
    reason: Arc<str>,
}

impl<T: Clone + Send + Sync + 'static> Observable<T> for ReadOnly<T> {
    fn get(&self) -> T {
        self.cell.get()
    }

    fn set(&self, _: T, _: Option<Cause>) -> Result<T, NotSettable> {
        Err(NotSettable::new(&self.reason))
    }

    fn is_settable(&self) -> bool {
        false
    }

    fn subscribe(&self, listener: Listener<ChangeEvent<T>>) -> Subscription {
        self.cell.subscribe(listener)
    }

    fn identity(&self) -> CellId {
        self.cell.inner.id
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ReadOnly")
            .field(&*self.cell.inner.value.read())
            .finish()
    }
}

/// A value that never changes.
pub struct Constant<T> {
    id: CellId,
    value: T,
}

impl<T: Clone + Send + Sync + 'static> Constant<T> {
    pub fn new(value: T) -> Constant<T> {
        Constant {
            id: CellId::new(),
            value,
        }
    }

    pub fn shared(value: T) -> DynObservable<T> {
        Arc::new(Constant::new(value))
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> for Constant<T> {
    fn get(&self) -> T {
        self.value.clone()
    }

    fn set(&self, _: T, _: Option<Cause>) -> Result<T, NotSettable> {
        Err(NotSettable::new("constant value"))
    }

    fn is_settable(&self) -> bool {
        false
    }

    fn subscribe(&self, _: Listener<ChangeEvent<T>>) -> Subscription {
        Subscription::empty()
    }

    fn identity(&self) -> CellId {
        self.id
    }
}

impl<T: fmt::Debug> fmt::Debug for Constant<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Constant").field(&self.value).finish()
    }
}
