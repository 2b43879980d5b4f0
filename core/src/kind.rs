//! Element kinds.

use crate::definition::DefineContext;
use crate::error::{InterpretationError, ModelInstantiationError, ValidationError};
use crate::interpret::{InterpretContext, Interpreted};
use crate::model::{ModelComponentId, ModelSet};
use crate::tree::ElementId;
use core::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// An element kind: how elements of one type are defined, interpreted, and brought to life.
///
/// Kinds are stateless; everything they produce is stored by the engine and handed back to them.
///
/// - `define` reads the element’s attributes and produces the kind’s definition payload. It may
///   declare dynamic slots and local models for the element’s descendants.
/// - `interpret` type-checks the definition against the environment. It must not allocate
///   anything live, and may run any number of times.
/// - `create` makes the live state for a new element, and `update` brings an existing state up to
///   date with a new interpretation. State that is already being observed should be kept; cells
///   should only be reallocated when their value type changed.
/// - `instantiate` binds the state to the element’s model set, and `instantiated` is called once
///   the whole subtree has been bound.
/// - `destroy` releases whatever the state holds on to.
pub trait Kind: Send + Sync + 'static {
    type Definition: Send + Sync + 'static;
    type Interpreted: Send + Sync + 'static;
    type State: Send + 'static;

    fn define(&self, cx: &mut DefineContext) -> Result<Self::Definition, ValidationError>;

    fn interpret(
        &self,
        def: &Self::Definition,
        cx: &mut InterpretContext,
    ) -> Result<Self::Interpreted, InterpretationError>;

    fn create(&self, interp: &Self::Interpreted, cx: &ElementContext) -> Self::State;

    /// Called with a new interpretation of the same definition.
    ///
    /// If the element is already instantiated, `cx.models()` is available and the state should be
    /// rebound.
    fn update(
        &self,
        _state: &mut Self::State,
        _interp: &Self::Interpreted,
        _cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        Ok(())
    }

    fn instantiate(
        &self,
        _state: &mut Self::State,
        _interp: &Self::Interpreted,
        _cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        Ok(())
    }

    fn instantiated(&self, _state: &mut Self::State, _cx: &ElementContext) {}

    /// Called after the element’s dynamic slots were rebound with `set_context`.
    fn context_changed(
        &self,
        _state: &mut Self::State,
        _interp: &Self::Interpreted,
        _cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        Ok(())
    }

    fn destroy(&self, _state: &mut Self::State) {}
}

/// What a kind gets to see of the element it is working on.
pub struct ElementContext<'a> {
    pub(crate) id: ElementId,
    pub(crate) interpreted: &'a Interpreted,
    pub(crate) models: Option<&'a ModelSet>,
}

impl<'a> ElementContext<'a> {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn interpreted(&self) -> &Interpreted {
        self.interpreted
    }

    /// The element’s model set, once it has been instantiated.
    pub fn models(&self) -> Option<&ModelSet> {
        self.models
    }

    pub fn require_models(&self) -> Result<&ModelSet, ModelInstantiationError> {
        self.models
            .ok_or_else(|| ModelInstantiationError::Failed("element is not instantiated".into()))
    }

    /// One of the element’s own dynamic slots, by name.
    pub fn slot(&self, name: &str) -> Option<&ModelComponentId> {
        self.interpreted
            .slots()
            .iter()
            .map(|slot| &slot.id)
            .find(|id| id.name() == name)
    }
}

/// Type-erased kind.
pub(crate) trait ErasedKind: Send + Sync {
    fn name(&self) -> &'static str;

    fn define(&self, cx: &mut DefineContext) -> Result<Arc<dyn Any + Send + Sync>, ValidationError>;

    fn interpret(
        &self,
        def: &dyn Any,
        cx: &mut InterpretContext,
    ) -> Result<Arc<dyn Any + Send + Sync>, InterpretationError>;

    fn create(&self, interp: &dyn Any, cx: &ElementContext) -> Box<dyn Any + Send>;

    fn update(
        &self,
        state: &mut dyn Any,
        interp: &dyn Any,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError>;

    fn instantiate(
        &self,
        state: &mut dyn Any,
        interp: &dyn Any,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError>;

    fn instantiated(&self, state: &mut dyn Any, cx: &ElementContext);

    fn context_changed(
        &self,
        state: &mut dyn Any,
        interp: &dyn Any,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError>;

    fn destroy(&self, state: &mut dyn Any);
}

struct KindAdapter<K>(K);

impl<K: Kind> KindAdapter<K> {
    fn def<'a>(&self, def: &'a dyn Any) -> &'a K::Definition {
        match def.downcast_ref() {
            Some(def) => def,
            None => panic!(
                "Kind::interpret: invalid definition for {}",
                core::any::type_name::<K>()
            ),
        }
    }

    fn interp<'a>(&self, interp: &'a dyn Any) -> &'a K::Interpreted {
        match interp.downcast_ref() {
            Some(interp) => interp,
            None => panic!(
                "Kind: invalid interpretation for {}",
                core::any::type_name::<K>()
            ),
        }
    }

    fn state<'a>(&self, state: &'a mut dyn Any) -> &'a mut K::State {
        match state.downcast_mut() {
            Some(state) => state,
            None => panic!("Kind: invalid state for {}", core::any::type_name::<K>()),
        }
    }
}

impl<K: Kind> ErasedKind for KindAdapter<K> {
    fn name(&self) -> &'static str {
        core::any::type_name::<K>()
    }

    fn define(&self, cx: &mut DefineContext) -> Result<Arc<dyn Any + Send + Sync>, ValidationError> {
        let def = self.0.define(cx)?;
        Ok(Arc::new(def))
    }

    fn interpret(
        &self,
        def: &dyn Any,
        cx: &mut InterpretContext,
    ) -> Result<Arc<dyn Any + Send + Sync>, InterpretationError> {
        let interp = self.0.interpret(self.def(def), cx)?;
        Ok(Arc::new(interp))
    }

    fn create(&self, interp: &dyn Any, cx: &ElementContext) -> Box<dyn Any + Send> {
        Box::new(self.0.create(self.interp(interp), cx))
    }

    fn update(
        &self,
        state: &mut dyn Any,
        interp: &dyn Any,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        self.0.update(self.state(state), self.interp(interp), cx)
    }

    fn instantiate(
        &self,
        state: &mut dyn Any,
        interp: &dyn Any,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        self.0.instantiate(self.state(state), self.interp(interp), cx)
    }

    fn instantiated(&self, state: &mut dyn Any, cx: &ElementContext) {
        self.0.instantiated(self.state(state), cx)
    }

    fn context_changed(
        &self,
        state: &mut dyn Any,
        interp: &dyn Any,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        self.0.context_changed(self.state(state), self.interp(interp), cx)
    }

    fn destroy(&self, state: &mut dyn Any) {
        self.0.destroy(self.state(state))
    }
}

pub(crate) fn erase<K: Kind>(kind: K) -> Arc<dyn ErasedKind> {
    Arc::new(KindAdapter(kind))
}

/// The kind standing in for elements that failed to define.
pub(crate) struct Placeholder;

impl Kind for Placeholder {
    type Definition = ();
    type Interpreted = ();
    type State = ();

    fn define(&self, _: &mut DefineContext) -> Result<(), ValidationError> {
        Ok(())
    }

    fn interpret(&self, _: &(), _: &mut InterpretContext) -> Result<(), InterpretationError> {
        Ok(())
    }

    fn create(&self, _: &(), _: &ElementContext) {}
}

/// Maps element type names to kinds.
#[derive(Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<Arc<str>, Arc<dyn ErasedKind>>,
}

impl KindRegistry {
    pub fn new() -> KindRegistry {
        KindRegistry::default()
    }

    /// Registers a kind under one or more element type names.
    pub fn register<K: Kind>(&mut self, names: &[&str], kind: K) -> &mut Self {
        let kind = erase(kind);
        for name in names {
            self.kinds.insert((*name).into(), Arc::clone(&kind));
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.kinds.keys().map(|name| &**name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Arc<dyn ErasedKind>> {
        self.kinds.get(name)
    }
}

impl core::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort();
        f.debug_tuple("KindRegistry").field(&names).finish()
    }
}
