//! Reactive cells and collections.
//!
//! Everything the element tree binds to is built from these: plain [`Cell`]s, read-only views,
//! derived values, and the hot-swappable [`HotCell`]/[`HotList`] pairs that let a live element
//! replace its whole bound computation without its observers noticing anything but a change.

mod cell;
mod flatten;
mod list;
mod map;
mod subscription;

pub use cell::{Cause, Cell, CellId, ChangeEvent, Constant, DynObservable, Observable, ReadOnly};
pub use flatten::{FlatCell, HotCell};
pub use list::{
    DynCollection, FlatList, HotList, ListEvent, ObservableCollection, ObservableList,
};
pub use map::{DerivedList, Mapped};
pub use subscription::{Listener, Subscription};
