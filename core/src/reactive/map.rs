//! Observables derived from other observables.

use super::cell::{Cause, CellId, ChangeEvent, DynObservable, Observable};
use super::list::{DynCollection, ListEvent, ObservableCollection, ObservableList};
use super::subscription::{Listener, Subscription};
use crate::error::NotSettable;
use std::sync::Arc;

/// A read-only observable computed from another one on every read.
pub struct Mapped<S, T> {
    id: CellId,
    source: DynObservable<S>,
    map: Arc<dyn Fn(&S) -> T + Send + Sync>,
}

impl<S, T> Mapped<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(source: DynObservable<S>, map: impl Fn(&S) -> T + Send + Sync + 'static) -> Self {
        Mapped {
            id: CellId::new(),
            source,
            map: Arc::new(map),
        }
    }

    pub fn shared(self) -> DynObservable<T> {
        Arc::new(self)
    }
}

impl<S, T> Observable<T> for Mapped<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        (self.map)(&self.source.get())
    }

    fn set(&self, _: T, _: Option<Cause>) -> Result<T, NotSettable> {
        Err(NotSettable::new("derived value"))
    }

    fn is_settable(&self) -> bool {
        false
    }

    fn subscribe(&self, listener: Listener<ChangeEvent<T>>) -> Subscription {
        let map = Arc::clone(&self.map);
        self.source.subscribe(Arc::new(move |event: &ChangeEvent<S>| {
            listener(&ChangeEvent {
                old: map(&event.old),
                new: map(&event.new),
                cause: event.cause.clone(),
            });
        }))
    }

    fn identity(&self) -> CellId {
        self.id
    }
}

/// A collection recomputed from a single observable value.
///
/// Every change of the source replaces the content and is reported as a reset.
pub struct DerivedList<T> {
    list: ObservableList<T>,
    _source: Subscription,
}

impl<T: Clone + Send + Sync + 'static> DerivedList<T> {
    pub fn new<S>(source: DynObservable<S>, derive: impl Fn(&S) -> Vec<T> + Send + Sync + 'static) -> Self
    where
        S: Clone + Send + Sync + 'static,
    {
        let list = ObservableList::from_vec(derive(&source.get()));
        let target = list.clone();
        let subscription = source.subscribe(Arc::new(move |event: &ChangeEvent<S>| {
            target.replace_all(derive(&event.new));
        }));
        DerivedList {
            list,
            _source: subscription,
        }
    }

    pub fn shared(self) -> DynCollection<T> {
        Arc::new(self)
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableCollection<T> for DerivedList<T> {
    fn len(&self) -> usize {
        self.list.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.list.get(index)
    }

    fn to_vec(&self) -> Vec<T> {
        self.list.to_vec()
    }

    fn subscribe(&self, listener: Listener<ListEvent<T>>) -> Subscription {
        self.list.subscribe(listener)
    }

    fn identity(&self) -> CellId {
        self.list.identity()
    }
}
