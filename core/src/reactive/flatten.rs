//! Flattened cells: observing through a cell that holds another observable.
//!
//! A [`FlatCell`] wraps a cell of cells. Reads and writes go to whichever inner observable is
//! currently held, and listeners hear about both inner value changes and swaps of the inner
//! observable. A swap is reported as a single change event from the old inner value to the new
//! one, so a listener registered before a swap keeps working after it without resubscribing.

use super::cell::{Cause, Cell, CellId, ChangeEvent, Constant, DynObservable, Observable};
use super::subscription::{Listener, Listeners, Subscription};
use crate::error::NotSettable;
use core::fmt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

struct Current<T> {
    inner: DynObservable<T>,
    subscription: Option<Subscription>,
}

struct FlatInner<T> {
    id: CellId,
    outer: Cell<DynObservable<T>>,
    current: Mutex<Current<T>>,
    listeners: Listeners<ChangeEvent<T>>,
    outer_subscription: Mutex<Option<Subscription>>,
}

/// A cell that forwards to the observable currently held by an outer cell.
pub struct FlatCell<T> {
    inner: Arc<FlatInner<T>>,
}

impl<T> Clone for FlatCell<T> {
    fn clone(&self) -> Self {
        FlatCell {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> FlatCell<T> {
    /// Flattens a cell of observables.
    pub fn new(outer: Cell<DynObservable<T>>) -> FlatCell<T> {
        let initial = outer.get();
        let flat = FlatCell {
            inner: Arc::new(FlatInner {
                id: CellId::new(),
                outer: outer.clone(),
                current: Mutex::new(Current {
                    inner: Arc::clone(&initial),
                    subscription: None,
                }),
                listeners: Listeners::new(),
                outer_subscription: Mutex::new(None),
            }),
        };

        let weak = Arc::downgrade(&flat.inner);
        let outer_sub = outer.subscribe(Arc::new(move |event: &ChangeEvent<DynObservable<T>>| {
            if let Some(inner) = weak.upgrade() {
                FlatInner::swapped(&inner, &event.new, event.cause.clone());
            }
        }));
        *flat.inner.outer_subscription.lock() = Some(outer_sub);
        FlatInner::attach(&flat.inner, &initial);
        flat
    }

    /// The outer cell.
    pub fn outer(&self) -> &Cell<DynObservable<T>> {
        &self.inner.outer
    }

    /// Drops the subscription to the current inner observable without notifying anyone.
    ///
    /// The flattened cell keeps reading through; it just stops forwarding inner changes until
    /// the next swap.
    pub fn detach(&self) {
        let sub = self.inner.current.lock().subscription.take();
        drop(sub);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<T: Clone + Send + Sync + 'static> FlatInner<T> {
    fn attach(this: &Arc<FlatInner<T>>, inner: &DynObservable<T>) {
        let weak: Weak<FlatInner<T>> = Arc::downgrade(this);
        let inner_id = inner.identity();
        let sub = inner.subscribe(Arc::new(move |event: &ChangeEvent<T>| {
            if let Some(flat) = weak.upgrade() {
                // events from an inner observable that has since been swapped out are stale
                if flat.current.lock().inner.identity() == inner_id {
                    flat.listeners.fire(event);
                }
            }
        }));

        let mut current = this.current.lock();
        if current.inner.identity() == inner_id {
            current.subscription = Some(sub);
        }
    }

    fn swapped(this: &Arc<FlatInner<T>>, new_inner: &DynObservable<T>, cause: Option<Cause>) {
        let (old_inner, old_sub) = {
            let mut current = this.current.lock();
            if current.inner.identity() == new_inner.identity() {
                return;
            }
            let old_inner = std::mem::replace(&mut current.inner, Arc::clone(new_inner));
            (old_inner, current.subscription.take())
        };
        drop(old_sub);
        FlatInner::attach(this, new_inner);

        this.listeners.fire(&ChangeEvent {
            old: old_inner.get(),
            new: new_inner.get(),
            cause,
        });
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> for FlatCell<T> {
    fn get(&self) -> T {
        let inner = Arc::clone(&self.inner.current.lock().inner);
        inner.get()
    }

    fn set(&self, value: T, cause: Option<Cause>) -> Result<T, NotSettable> {
        let inner = Arc::clone(&self.inner.current.lock().inner);
        inner.set(value, cause)
    }

    fn is_settable(&self) -> bool {
        let inner = Arc::clone(&self.inner.current.lock().inner);
        inner.is_settable()
    }

    fn subscribe(&self, listener: Listener<ChangeEvent<T>>) -> Subscription {
        self.inner.listeners.add(listener)
    }

    fn identity(&self) -> CellId {
        self.inner.id
    }
}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> fmt::Debug for FlatCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("FlatCell").field(&self.get()).finish()
    }
}

/// A hot-swappable reactive cell.
///
/// Holds a cell of observables together with its flattened view. Owners hand the view out and
/// swap the inner observable whenever their bound computation changes; everyone holding the view
/// follows along.
pub struct HotCell<T> {
    slot: Cell<DynObservable<T>>,
    view: FlatCell<T>,
}

impl<T> Clone for HotCell<T> {
    fn clone(&self) -> Self {
        HotCell {
            slot: self.slot.clone(),
            view: self.view.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> HotCell<T> {
    pub fn new(initial: DynObservable<T>) -> HotCell<T> {
        let slot = Cell::new(initial);
        let view = FlatCell::new(slot.clone());
        HotCell { slot, view }
    }

    /// A hot cell initially holding a constant.
    pub fn constant(value: T) -> HotCell<T> {
        HotCell::new(Constant::shared(value))
    }

    /// Replaces the inner observable and returns the previous one.
    pub fn swap(&self, inner: DynObservable<T>, cause: Option<Cause>) -> DynObservable<T> {
        self.slot.set(inner, cause)
    }

    /// The observable currently held.
    pub fn current(&self) -> DynObservable<T> {
        self.slot.get()
    }

    /// The flattened view; stays valid across swaps.
    pub fn view(&self) -> FlatCell<T> {
        self.view.clone()
    }

    /// Stops listening to the current inner observable.
    pub fn release(&self) {
        self.view.detach();
    }
}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> fmt::Debug for HotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("HotCell").field(&self.view.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter<T: 'static>() -> (Arc<AtomicUsize>, Listener<ChangeEvent<T>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            count,
            Arc::new(move |_: &ChangeEvent<T>| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn swap_notifies_exactly_once() {
        let x = Cell::new(1);
        let y = Cell::new(2);
        let hot = HotCell::new(x.shared());
        let view = hot.view();
        let (count, listener) = counter();
        let _sub = view.subscribe(listener);

        assert_eq!(view.get(), 1);
        hot.swap(y.shared(), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(view.get(), 2);
    }

    #[test]
    fn swap_event_carries_both_values() {
        let hot = HotCell::new(Cell::new("x").shared());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = hot.view().subscribe(Arc::new(move |e: &ChangeEvent<&str>| {
            s.lock().push((e.old, e.new));
        }));
        hot.swap(Cell::new("y").shared(), None);
        assert_eq!(*seen.lock(), vec![("x", "y")]);
    }

    #[test]
    fn forwards_inner_changes_only_from_the_current_inner() {
        let x = Cell::new(1);
        let y = Cell::new(10);
        let hot = HotCell::new(x.shared());
        let (count, listener) = counter();
        let _sub = hot.view().subscribe(listener);

        x.set(2, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        hot.swap(y.shared(), None);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // the old inner no longer reaches the subscriber
        x.set(3, None);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(x.listener_count(), 0);

        y.set(11, None);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(hot.view().get(), 11);
    }

    #[test]
    fn swapping_in_the_same_inner_is_silent() {
        let x = Cell::new(1);
        let shared = x.shared();
        let hot = HotCell::new(Arc::clone(&shared));
        let (count, listener) = counter();
        let _sub = hot.view().subscribe(listener);
        hot.swap(shared, None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn writes_go_through() {
        let x = Cell::new(1);
        let hot = HotCell::new(x.shared());
        assert!(hot.view().is_settable());
        assert_eq!(hot.view().set(5, None).unwrap(), 1);
        assert_eq!(x.get(), 5);

        hot.swap(Constant::shared(0), None);
        assert!(!hot.view().is_settable());
        assert!(hot.view().set(1, None).is_err());
    }

    #[test]
    fn release_stops_forwarding() {
        let x = Cell::new(1);
        let hot = HotCell::new(x.shared());
        let (count, listener) = counter();
        let _sub = hot.view().subscribe(listener);
        hot.release();
        x.set(2, None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(x.listener_count(), 0);
    }
}
