//! The scoped model environment.
//!
//! There are two halves to it. At interpretation time an [`Env`] says which names are in scope
//! and what type they have; at instance time a [`ModelSet`] holds the live cells those names are
//! bound to. Both are chains of frames where a child frame shadows its parent without touching it.
//!
//! A name is declared either statically (its value is known as soon as the element declaring it
//! is instantiated) or as a dynamic slot, which only gets a value when someone binds it, possibly
//! many times over. Template elements evaluate themselves against an [`Invocation`], a throwaway
//! fork of their model set in which the slots are bound for just that one evaluation.

mod env;
mod fork;
mod set;

pub use env::{Binding, Declaration, Env, EnvBuilder, EnvId};
pub use fork::{Invocation, Retained, RetainedFork};
pub use set::ModelSet;

use crate::reactive::{DynCollection, DynObservable};
use crate::value::{Value, ValueType};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// A unique identifier for a declared model component.
///
/// Two components with the same name are still different components.
#[derive(Clone)]
pub struct ModelComponentId {
    id: Uuid,
    name: Arc<str>,
}

impl ModelComponentId {
    pub fn new(name: &str) -> ModelComponentId {
        ModelComponentId {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// The human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

impl PartialEq for ModelComponentId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModelComponentId {}

impl Hash for ModelComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ModelComponentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (a, ..) = self.id.as_fields();
        write!(f, "{}#{:08x}", self.name, a)
    }
}

/// Whether a model component is a single value or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Value,
    List,
}

/// The type of a model component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelType {
    /// A single observable value.
    Value(ValueType),
    /// An observable collection with the given element type.
    List(ValueType),
}

impl ModelType {
    /// The most permissive type of the given shape.
    pub fn any(shape: Shape) -> ModelType {
        match shape {
            Shape::Value => ModelType::Value(ValueType::Any),
            Shape::List => ModelType::List(ValueType::Any),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            ModelType::Value(_) => Shape::Value,
            ModelType::List(_) => Shape::List,
        }
    }

    /// The value type, or the element type for lists.
    pub fn value_type(&self) -> &ValueType {
        match self {
            ModelType::Value(ty) | ModelType::List(ty) => ty,
        }
    }

    pub fn is_assignable_from(&self, other: &ModelType) -> bool {
        match (self, other) {
            (ModelType::Value(a), ModelType::Value(b)) => a.is_assignable_from(b),
            (ModelType::List(a), ModelType::List(b)) => a.is_assignable_from(b),
            _ => false,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelType::Value(ty) => write!(f, "{}", ty),
            ModelType::List(ty) => write!(f, "collection<{}>", ty),
        }
    }
}

/// A live model component: an observable value or an observable collection.
#[derive(Clone)]
pub enum ModelValue {
    Value(DynObservable<Value>),
    List(DynCollection<Value>),
}

impl ModelValue {
    pub fn shape(&self) -> Shape {
        match self {
            ModelValue::Value(_) => Shape::Value,
            ModelValue::List(_) => Shape::List,
        }
    }

    pub fn as_value(&self) -> Option<&DynObservable<Value>> {
        match self {
            ModelValue::Value(v) => Some(v),
            ModelValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&DynCollection<Value>> {
        match self {
            ModelValue::List(l) => Some(l),
            ModelValue::Value(_) => None,
        }
    }

    /// Reads the current value; collections are read as a list value.
    pub fn snapshot(&self) -> Value {
        match self {
            ModelValue::Value(v) => v.get(),
            ModelValue::List(l) => Value::from(l.to_vec()),
        }
    }
}

impl fmt::Debug for ModelValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelValue::Value(v) => f.debug_tuple("Value").field(&v.get()).finish(),
            ModelValue::List(l) => f.debug_tuple("List").field(&l.to_vec()).finish(),
        }
    }
}
