//! Declarative element engine.
//!
//! # Conceptual overview
//! Tern turns a declarative description of a user interface into a tree of live, reactive
//! elements, and keeps that tree in sync as the description changes.
//!
//! ## Elements
//! Every element goes through three stages. A [`Definition`] is the validated configuration of an
//! element: its type, its attributes (some of them expressions), and its children. It knows
//! nothing about models. An [`Interpreted`] element is a definition that has been type-checked
//! against the environment it appears in; interpretation may run any number of times and never
//! allocates anything live. Finally, an element in the [`ElementTree`] is the live instance,
//! holding the kind’s state and bound to a [`ModelSet`].
//!
//! What an element does is up to its [`Kind`]. Kinds are registered by element type name in a
//! [`KindRegistry`] and are asked to define, interpret, create, update, instantiate and destroy
//! elements of their type. The engine holds on to everything they produce.
//!
//! ## Identity
//! Reloading a description must not tear down what didn’t change. The [`DefinitionLoader`] keys
//! each definition on its type and attributes, and matches children against the previous load:
//! an unchanged subtree comes back as the very same object, a changed one keeps its identity.
//! The [`Interpreter`] caches interpretations by definition and environment, and the element
//! tree matches children by definition identity (see [`reconcile`]). Updating an element with
//! an interpretation it already has is a no-op.
//!
//! ## Models
//! Models are the data an interface shows. At interpretation time an [`Env`] says what is in
//! scope and what type it is; at instance time a [`ModelSet`] holds the live values. Both are
//! chains of frames. Elements may declare dynamic slots, which get bound later (possibly many
//! times, as with a table column that renders one row after another), and local models computed
//! from expressions.
//!
//! Everything live is built from the observables in [`reactive`]. Model components sit behind
//! hot-swappable cells, so rebinding a slot or re-evaluating an expression never invalidates a
//! subscription somebody else made earlier.
//!
//! ## Backends
//! The element tree queues a [`Patch`] for every structural change. A [`Backend`] receives them
//! in order and renders whatever it wants from them.

pub mod backend;
pub mod definition;
pub mod error;
pub mod expr;
mod interpret;
mod kind;
mod lifecycle;
pub mod model;
pub mod reactive;
pub mod reconcile;
mod tree;
pub mod value;

#[cfg(test)]
mod testing;

pub use backend::Backend;
pub use definition::{
    DefId, DefineContext, Definition, DefinitionLoader, ElementType, ParsedNode, RawValue,
    SlotType,
};
pub use error::{
    ElementError, InterpretationError, ModelInstantiationError, NotSettable, StaleInvocationError,
    ValidationError,
};
pub use interpret::{InterpretContext, Interpreted, InterpretedModel, Interpreter, ResolvedSlot};
pub use kind::{ElementContext, Kind, KindRegistry};
pub use lifecycle::Phase;
pub use model::{Env, Invocation, ModelComponentId, ModelSet, ModelType, ModelValue, Shape};
pub use tree::{ContextBinding, ElementId, ElementTree, Patch};
pub use value::{Value, ValueType};
