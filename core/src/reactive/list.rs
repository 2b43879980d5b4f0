//! Observable collections.

use super::cell::{Cause, Cell, CellId, ChangeEvent};
use super::subscription::{Listener, Listeners, Subscription};
use core::fmt;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// A change to an observable collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent<T> {
    Added { index: usize, value: T },
    Removed { index: usize, value: T },
    Updated { index: usize, old: T, new: T },
    /// The whole content was replaced; re-read it.
    Reset,
}

/// An ordered collection that can be read and observed.
pub trait ObservableCollection<T>: Send + Sync {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Option<T>;

    /// A snapshot of the whole content.
    fn to_vec(&self) -> Vec<T>;

    fn subscribe(&self, listener: Listener<ListEvent<T>>) -> Subscription;

    fn identity(&self) -> CellId;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A shared, type-erased collection.
pub type DynCollection<T> = Arc<dyn ObservableCollection<T>>;

struct ListInner<T> {
    id: CellId,
    items: RwLock<Vec<T>>,
    listeners: Listeners<ListEvent<T>>,
}

/// A mutable observable list.
pub struct ObservableList<T> {
    inner: Arc<ListInner<T>>,
}

impl<T> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        ObservableList {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableList<T> {
    pub fn new() -> ObservableList<T> {
        ObservableList::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> ObservableList<T> {
        ObservableList {
            inner: Arc::new(ListInner {
                id: CellId::new(),
                items: RwLock::new(items),
                listeners: Listeners::new(),
            }),
        }
    }

    pub fn push(&self, value: T) {
        let index = {
            let mut items = self.inner.items.write();
            items.push(value.clone());
            items.len() - 1
        };
        self.inner.listeners.fire(&ListEvent::Added { index, value });
    }

    /// Inserts at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, value: T) {
        let index = {
            let mut items = self.inner.items.write();
            let index = index.min(items.len());
            items.insert(index, value.clone());
            index
        };
        self.inner.listeners.fire(&ListEvent::Added { index, value });
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        let value = {
            let mut items = self.inner.items.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.inner.listeners.fire(&ListEvent::Removed {
            index,
            value: value.clone(),
        });
        Some(value)
    }

    pub fn set(&self, index: usize, value: T) -> Option<T> {
        let old = {
            let mut items = self.inner.items.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, value.clone())
        };
        self.inner.listeners.fire(&ListEvent::Updated {
            index,
            old: old.clone(),
            new: value,
        });
        Some(old)
    }

    /// Replaces the whole content with a single reset event.
    pub fn replace_all(&self, items: Vec<T>) {
        *self.inner.items.write() = items;
        self.inner.listeners.fire(&ListEvent::Reset);
    }

    pub fn shared(&self) -> DynCollection<T> {
        Arc::new(self.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ObservableList<T> {
    fn default() -> Self {
        ObservableList::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableCollection<T> for ObservableList<T> {
    fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.inner.items.read().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.inner.items.read().clone()
    }

    fn subscribe(&self, listener: Listener<ListEvent<T>>) -> Subscription {
        self.inner.listeners.add(listener)
    }

    fn identity(&self) -> CellId {
        self.inner.id
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.inner.items.read().iter()).finish()
    }
}

struct FlatListInner<T> {
    id: CellId,
    current: Mutex<(DynCollection<T>, Option<Subscription>)>,
    listeners: Listeners<ListEvent<T>>,
    outer_subscription: Mutex<Option<Subscription>>,
}

/// The collection analogue of [`FlatCell`](super::FlatCell).
///
/// Swapping the held collection is reported as one [`ListEvent::Reset`].
pub struct FlatList<T> {
    inner: Arc<FlatListInner<T>>,
}

impl<T> Clone for FlatList<T> {
    fn clone(&self) -> Self {
        FlatList {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> FlatList<T> {
    pub fn new(outer: Cell<DynCollection<T>>) -> FlatList<T> {
        let initial = outer.get();
        let flat = FlatList {
            inner: Arc::new(FlatListInner {
                id: CellId::new(),
                current: Mutex::new((Arc::clone(&initial), None)),
                listeners: Listeners::new(),
                outer_subscription: Mutex::new(None),
            }),
        };

        let weak = Arc::downgrade(&flat.inner);
        let outer_sub = outer.subscribe(Arc::new(move |event: &ChangeEvent<DynCollection<T>>| {
            if let Some(inner) = weak.upgrade() {
                FlatListInner::swapped(&inner, &event.new);
            }
        }));
        *flat.inner.outer_subscription.lock() = Some(outer_sub);
        FlatListInner::attach(&flat.inner, &initial);
        flat
    }

    /// Stops listening to the current inner collection.
    pub fn detach(&self) {
        let sub = self.inner.current.lock().1.take();
        drop(sub);
    }

    fn current(&self) -> DynCollection<T> {
        Arc::clone(&self.inner.current.lock().0)
    }
}

impl<T: Clone + Send + Sync + 'static> FlatListInner<T> {
    fn attach(this: &Arc<FlatListInner<T>>, inner: &DynCollection<T>) {
        let weak: Weak<FlatListInner<T>> = Arc::downgrade(this);
        let inner_id = inner.identity();
        let sub = inner.subscribe(Arc::new(move |event: &ListEvent<T>| {
            if let Some(flat) = weak.upgrade() {
                if flat.current.lock().0.identity() == inner_id {
                    flat.listeners.fire(event);
                }
            }
        }));

        let mut current = this.current.lock();
        if current.0.identity() == inner_id {
            current.1 = Some(sub);
        }
    }

    fn swapped(this: &Arc<FlatListInner<T>>, new_inner: &DynCollection<T>) {
        let old_sub = {
            let mut current = this.current.lock();
            if current.0.identity() == new_inner.identity() {
                return;
            }
            current.0 = Arc::clone(new_inner);
            current.1.take()
        };
        drop(old_sub);
        FlatListInner::attach(this, new_inner);
        this.listeners.fire(&ListEvent::Reset);
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableCollection<T> for FlatList<T> {
    fn len(&self) -> usize {
        self.current().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.current().get(index)
    }

    fn to_vec(&self) -> Vec<T> {
        self.current().to_vec()
    }

    fn subscribe(&self, listener: Listener<ListEvent<T>>) -> Subscription {
        self.inner.listeners.add(listener)
    }

    fn identity(&self) -> CellId {
        self.inner.id
    }
}

/// A hot-swappable collection: a cell of collections plus its flattened view.
pub struct HotList<T> {
    slot: Cell<DynCollection<T>>,
    view: FlatList<T>,
}

impl<T> Clone for HotList<T> {
    fn clone(&self) -> Self {
        HotList {
            slot: self.slot.clone(),
            view: self.view.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> HotList<T> {
    pub fn new(initial: DynCollection<T>) -> HotList<T> {
        let slot = Cell::new(initial);
        let view = FlatList::new(slot.clone());
        HotList { slot, view }
    }

    pub fn empty() -> HotList<T> {
        HotList::new(ObservableList::new().shared())
    }

    pub fn swap(&self, inner: DynCollection<T>, cause: Option<Cause>) -> DynCollection<T> {
        self.slot.set(inner, cause)
    }

    pub fn view(&self) -> FlatList<T> {
        self.view.clone()
    }

    pub fn release(&self) {
        self.view.detach();
    }
}

impl<T: fmt::Debug + Clone + Send + Sync + 'static> fmt::Debug for HotList<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("HotList").field(&self.view.to_vec()).finish()
    }
}
