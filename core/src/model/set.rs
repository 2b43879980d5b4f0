use super::{ModelComponentId, ModelValue, Shape};
use crate::error::ModelInstantiationError;
use crate::reactive::{Constant, HotCell, HotList, ObservableList};
use crate::value::Value;
use core::fmt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Storage for one model component.
///
/// Every component lives behind a hot cell, so rebinding swaps what the cell forwards to and
/// whoever read the component earlier keeps following it.
#[derive(Clone)]
enum Hot {
    Value(HotCell<Value>),
    List(HotList<Value>),
}

impl Hot {
    fn new(shape: Shape) -> Hot {
        match shape {
            Shape::Value => Hot::Value(HotCell::constant(Value::Unit)),
            Shape::List => Hot::List(HotList::empty()),
        }
    }

    fn shape(&self) -> Shape {
        match self {
            Hot::Value(_) => Shape::Value,
            Hot::List(_) => Shape::List,
        }
    }

    /// Swaps in a new binding. Notifies observers, so must not be called with a frame lock held.
    fn swap(&self, id: &ModelComponentId, value: ModelValue) -> Result<(), ModelInstantiationError> {
        match (self, value) {
            (Hot::Value(hot), ModelValue::Value(v)) => {
                hot.swap(v, None);
            }
            (Hot::List(hot), ModelValue::List(l)) => {
                hot.swap(l, None);
            }
            _ => return Err(ModelInstantiationError::ShapeMismatch(id.name_arc())),
        }
        Ok(())
    }

    fn release(&self) {
        match self {
            Hot::Value(hot) => {
                hot.swap(Constant::shared(Value::Unit), None);
                hot.release();
            }
            Hot::List(hot) => {
                hot.swap(ObservableList::new().shared(), None);
                hot.release();
            }
        }
    }
}

struct Slot {
    id: ModelComponentId,
    hot: Hot,
    bound: bool,
}

impl Slot {
    fn view(&self) -> Result<ModelValue, ModelInstantiationError> {
        if !self.bound {
            return Err(ModelInstantiationError::UnboundSlot(self.id.name_arc()));
        }
        Ok(match &self.hot {
            Hot::Value(hot) => ModelValue::Value(Arc::new(hot.view())),
            Hot::List(hot) => ModelValue::List(Arc::new(hot.view())),
        })
    }
}

struct ModelFrame {
    parent: Option<ModelSet>,
    slots: RwLock<HashMap<ModelComponentId, Slot>>,
    alive: AtomicBool,
}

/// A frame of live model components.
///
/// Cloning a model set gives another handle to the same frame. [`ModelSet::child`] and
/// [`ModelSet::fork`] layer a new frame on top without copying anything.
#[derive(Clone)]
pub struct ModelSet {
    frame: Arc<ModelFrame>,
}

impl ModelSet {
    pub fn root() -> ModelSet {
        ModelSet::with_parent(None)
    }

    fn with_parent(parent: Option<ModelSet>) -> ModelSet {
        ModelSet {
            frame: Arc::new(ModelFrame {
                parent,
                slots: RwLock::new(HashMap::new()),
                alive: AtomicBool::new(true),
            }),
        }
    }

    /// A new frame owned by an element.
    pub fn child(&self) -> ModelSet {
        ModelSet::with_parent(Some(self.clone()))
    }

    /// A new frame for a single invocation. Binding in the fork never shows through to `self`.
    pub fn fork(&self) -> ModelSet {
        trace!("forking model set");
        ModelSet::with_parent(Some(self.clone()))
    }

    /// Adds or replaces a component in this frame.
    pub fn insert(&self, id: ModelComponentId, value: ModelValue) -> Result<(), ModelInstantiationError> {
        self.check_alive()?;
        let existing = self.frame.slots.read().get(&id).map(|slot| slot.hot.clone());
        let hot = existing.unwrap_or_else(|| Hot::new(value.shape()));
        self.store(id, hot, value)
    }

    /// Declares a dynamic slot in this frame. It can’t be read until it has been bound.
    pub fn declare_slot(&self, id: ModelComponentId, shape: Shape) -> Result<(), ModelInstantiationError> {
        self.check_alive()?;
        self.frame
            .slots
            .write()
            .entry(id.clone())
            .or_insert_with(|| Slot {
                id,
                hot: Hot::new(shape),
                bound: false,
            });
        Ok(())
    }

    /// Binds a slot declared in this frame or any ancestor.
    ///
    /// A slot declared further up is shadowed in this frame, so the ancestor keeps its own
    /// binding. Rebinding replaces the previous binding in place.
    pub fn bind(&self, id: &ModelComponentId, value: ModelValue) -> Result<(), ModelInstantiationError> {
        self.check_alive()?;
        trace!(slot = id.name(), "binding");
        let existing = self.frame.slots.read().get(id).map(|slot| slot.hot.clone());
        let hot = match existing {
            Some(hot) => hot,
            None => {
                let shape = self
                    .find(id, |slot| slot.hot.shape())
                    .ok_or_else(|| ModelInstantiationError::UnknownSlot(id.name_arc()))?;
                Hot::new(shape)
            }
        };
        self.store(id.clone(), hot, value)
    }

    fn store(&self, id: ModelComponentId, hot: Hot, value: ModelValue) -> Result<(), ModelInstantiationError> {
        hot.swap(&id, value)?;
        let mut slots = self.frame.slots.write();
        slots
            .entry(id.clone())
            .or_insert_with(|| Slot {
                id,
                hot,
                bound: false,
            })
            .bound = true;
        Ok(())
    }

    /// Reads a component, innermost frame first.
    ///
    /// Values are returned as views that follow later rebinding.
    pub fn get(&self, id: &ModelComponentId) -> Result<ModelValue, ModelInstantiationError> {
        if !self.is_alive() {
            return Err(ModelInstantiationError::Released);
        }
        self.find(id, Slot::view)
            .unwrap_or_else(|| Err(ModelInstantiationError::UnknownSlot(id.name_arc())))
    }

    fn find<R>(&self, id: &ModelComponentId, f: impl Fn(&Slot) -> R) -> Option<R> {
        let mut set = self;
        loop {
            if let Some(slot) = set.frame.slots.read().get(id) {
                return Some(f(slot));
            }
            set = set.frame.parent.as_ref()?;
        }
    }

    /// Whether a slot is declared and bound somewhere in the chain.
    pub fn is_bound(&self, id: &ModelComponentId) -> bool {
        self.find(id, |slot| slot.bound).unwrap_or(false)
    }

    /// Slots declared in this frame that haven’t been bound yet.
    pub fn unbound_slots(&self) -> Vec<ModelComponentId> {
        self.frame
            .slots
            .read()
            .values()
            .filter(|slot| !slot.bound)
            .map(|slot| slot.id.clone())
            .collect()
    }

    /// Whether this frame and all of its ancestors are still alive.
    pub fn is_alive(&self) -> bool {
        let mut set = self;
        loop {
            if !set.frame.alive.load(Ordering::Acquire) {
                return false;
            }
            match &set.frame.parent {
                Some(parent) => set = parent,
                None => return true,
            }
        }
    }

    fn check_alive(&self) -> Result<(), ModelInstantiationError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ModelInstantiationError::Released)
        }
    }

    /// Releases this frame: drops every binding and subscription held by it.
    ///
    /// Frames layered on top of it (children and forks) stop being alive as well.
    pub fn release(&self) {
        if self.frame.alive.swap(false, Ordering::AcqRel) {
            let slots: Vec<Slot> = self.frame.slots.write().drain().map(|(_, s)| s).collect();
            trace!(count = slots.len(), "releasing model frame");
            for slot in &slots {
                slot.hot.release();
            }
        }
    }

    /// Number of components in this frame.
    pub fn local_len(&self) -> usize {
        self.frame.slots.read().len()
    }

    pub fn ptr_eq(&self, other: &ModelSet) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame)
    }
}

impl fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let slots = self.frame.slots.read();
        let ids: Vec<_> = slots.keys().collect();
        f.debug_struct("ModelSet")
            .field("local", &ids)
            .field("alive", &self.frame.alive.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Cell, ChangeEvent, Observable};
    use std::sync::atomic::AtomicUsize;

    fn value(set: &ModelSet, id: &ModelComponentId) -> Value {
        set.get(id).unwrap().snapshot()
    }

    #[test]
    fn unbound_slots_fail_until_bound() {
        let set = ModelSet::root();
        let row = ModelComponentId::new("row");
        set.declare_slot(row.clone(), Shape::Value).unwrap();
        assert_eq!(set.unbound_slots(), vec![row.clone()]);
        assert!(matches!(
            set.get(&row),
            Err(ModelInstantiationError::UnboundSlot(_))
        ));

        set.bind(&row, ModelValue::Value(Constant::shared(Value::Int(1)))).unwrap();
        assert_eq!(value(&set, &row), Value::Int(1));
        assert!(set.unbound_slots().is_empty());
    }

    #[test]
    fn forks_shadow_without_touching_the_parent() {
        let set = ModelSet::root();
        let node = ModelComponentId::new("node");
        set.declare_slot(node.clone(), Shape::Value).unwrap();
        set.bind(&node, ModelValue::Value(Constant::shared("root".into()))).unwrap();

        let a = set.fork();
        let b = set.fork();
        a.bind(&node, ModelValue::Value(Constant::shared("A".into()))).unwrap();
        b.bind(&node, ModelValue::Value(Constant::shared("B".into()))).unwrap();

        assert_eq!(value(&a, &node), Value::from("A"));
        assert_eq!(value(&b, &node), Value::from("B"));
        assert_eq!(value(&set, &node), Value::from("root"));
    }

    #[test]
    fn binding_an_undeclared_slot_fails() {
        let set = ModelSet::root();
        let id = ModelComponentId::new("nope");
        let err = set
            .fork()
            .bind(&id, ModelValue::Value(Constant::shared(Value::Unit)))
            .unwrap_err();
        assert_eq!(err, ModelInstantiationError::UnknownSlot("nope".into()));
    }

    #[test]
    fn rebinding_keeps_readers_and_drops_old_subscriptions() {
        let set = ModelSet::root();
        let row = ModelComponentId::new("row");
        set.declare_slot(row.clone(), Shape::Value).unwrap();
        let first = Cell::new(Value::Int(1));
        set.bind(&row, ModelValue::Value(first.shared())).unwrap();

        let view = set.get(&row).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = view.as_value().unwrap().subscribe(Arc::new(move |_: &ChangeEvent<Value>| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        for i in 2..10 {
            set.bind(&row, ModelValue::Value(Cell::new(Value::Int(i)).shared()))
                .unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 8);
        assert_eq!(view.snapshot(), Value::Int(9));
        assert_eq!(first.listener_count(), 0);
    }

    #[test]
    fn released_frames_and_their_forks_are_dead() {
        let set = ModelSet::root();
        let id = ModelComponentId::new("x");
        set.insert(id.clone(), ModelValue::Value(Constant::shared(Value::Int(3))))
            .unwrap();
        let fork = set.fork();
        assert!(fork.is_alive());
        set.release();
        assert!(!fork.is_alive());
        assert_eq!(fork.get(&id).unwrap_err(), ModelInstantiationError::Released);
        set.release();
    }

    #[test]
    fn shape_mismatch() {
        let set = ModelSet::root();
        let id = ModelComponentId::new("items");
        set.declare_slot(id.clone(), Shape::List).unwrap();
        let err = set
            .bind(&id, ModelValue::Value(Constant::shared(Value::Unit)))
            .unwrap_err();
        assert!(matches!(err, ModelInstantiationError::ShapeMismatch(_)));
    }
}
