//! Interpretation: the second stage of an element.

use crate::definition::{DefId, Definition, SlotType};
use crate::error::InterpretationError;
use crate::expr::{CompiledExpression, InterpretedExpression};
use crate::kind::ErasedKind;
use crate::model::{Env, ModelComponentId, ModelType, Shape};
use core::any::Any;
use core::fmt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// A dynamic slot with its type resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub id: ModelComponentId,
    pub model_type: ModelType,
}

/// A local model with its expression interpreted.
#[derive(Debug, Clone)]
pub struct InterpretedModel {
    pub id: ModelComponentId,
    pub expression: Arc<dyn InterpretedExpression>,
}

/// A definition interpreted against an environment.
///
/// Never changes once built. When its definition or environment changes, a new one is built and
/// this one is marked destroyed.
pub struct Interpreted {
    definition: Arc<Definition>,
    parent_env: Env,
    env: Env,
    payload: Result<Arc<dyn Any + Send + Sync>, InterpretationError>,
    slots: Vec<ResolvedSlot>,
    models: Vec<InterpretedModel>,
    children: Vec<Arc<Interpreted>>,
    destroyed: AtomicBool,
}

impl Interpreted {
    pub fn id(&self) -> DefId {
        self.definition.id()
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    /// The environment this was interpreted in.
    pub fn parent_env(&self) -> &Env {
        &self.parent_env
    }

    /// The environment seen by children: the parent environment plus this element’s own slots and
    /// models.
    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn slots(&self) -> &[ResolvedSlot] {
        &self.slots
    }

    pub fn models(&self) -> &[InterpretedModel] {
        &self.models
    }

    pub fn children(&self) -> &[Arc<Interpreted>] {
        &self.children
    }

    pub fn error(&self) -> Option<&InterpretationError> {
        self.payload.as_ref().err()
    }

    /// The kind’s interpretation payload.
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.as_ref().ok()?.downcast_ref()
    }

    pub(crate) fn payload_any(&self) -> Result<&(dyn Any + Send + Sync), &InterpretationError> {
        self.payload.as_ref().map(|p| &**p)
    }

    pub(crate) fn kind(&self) -> &Arc<dyn ErasedKind> {
        self.definition.kind()
    }

    /// Whether this element declares anything in its own model frame.
    pub fn declares_models(&self) -> bool {
        !self.slots.is_empty() || !self.models.is_empty()
    }

    /// Whether this has been superseded or dropped by the interpreter.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Interpreted {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Interpreted")
            .field("id", &self.id())
            .field("type", self.definition.element_type())
            .field("error", &self.error())
            .field("children", &self.children)
            .finish()
    }
}

/// What a kind gets to work with during interpretation.
pub struct InterpretContext<'a> {
    env: &'a Env,
}

impl<'a> InterpretContext<'a> {
    /// The element’s environment, including its own slots and models.
    pub fn env(&self) -> &Env {
        self.env
    }

    pub fn interpret(
        &self,
        expression: &Arc<dyn CompiledExpression>,
        target: &ModelType,
    ) -> Result<Arc<dyn InterpretedExpression>, InterpretationError> {
        expression.interpret(target, self.env)
    }

    /// Resolves a dynamic slot by name.
    pub fn slot(&self, name: &str) -> Option<ModelComponentId> {
        self.env.resolve(name).map(|decl| decl.id.clone())
    }
}

/// Interprets definition trees, caching results per definition.
///
/// A cached interpretation is reused as long as both its definition object and its environment
/// are unchanged. Failures are never cached.
#[derive(Default)]
pub struct Interpreter {
    cache: HashMap<DefId, Arc<Interpreted>>,
    root: Option<DefId>,
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter::default()
    }

    /// Interprets a root definition.
    ///
    /// Children that fail come back as interpretations carrying their error; only a failure of
    /// the root itself is returned as an error.
    pub fn interpret(
        &mut self,
        definition: &Arc<Definition>,
        env: &Env,
    ) -> Result<Arc<Interpreted>, InterpretationError> {
        if let Some(old_root) = self.root {
            if old_root != definition.id() {
                debug!(?old_root, "root definition replaced");
                self.evict(old_root);
            }
        }
        self.root = Some(definition.id());

        let interp = self.interpret_node(definition, env);
        match interp.error() {
            Some(err) => Err(err.clone()),
            None => Ok(interp),
        }
    }

    /// The cached interpretation of a definition, if any.
    pub fn cached(&self, id: DefId) -> Option<&Arc<Interpreted>> {
        self.cache.get(&id)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        for (_, interp) in self.cache.drain() {
            interp.destroy();
        }
        self.root = None;
    }

    fn interpret_node(&mut self, definition: &Arc<Definition>, env: &Env) -> Arc<Interpreted> {
        let id = definition.id();
        if let Some(cached) = self.cache.get(&id) {
            if Arc::ptr_eq(cached.definition(), definition) && cached.parent_env.same_scope(env) {
                trace!(?id, "interpretation cache hit");
                return Arc::clone(cached);
            }
        }
        debug!(?id, element = %definition.element_type(), "interpreting");

        let built = self.build(definition, env);
        let (local_env, payload, slots, models) = match built {
            Ok(parts) => (parts.0, Ok(parts.1), parts.2, parts.3),
            Err(err) => (env.clone(), Err(err), Vec::new(), Vec::new()),
        };

        // a failed element is a placeholder and has no children
        let children: Vec<_> = if payload.is_ok() {
            definition
                .children()
                .iter()
                .map(|child| self.interpret_node(child, &local_env))
                .collect()
        } else {
            Vec::new()
        };

        let interp = Arc::new(Interpreted {
            definition: Arc::clone(definition),
            parent_env: env.clone(),
            env: local_env,
            payload,
            slots,
            models,
            children,
            destroyed: AtomicBool::new(false),
        });

        let previous = if interp.error().is_none() {
            self.cache.insert(id, Arc::clone(&interp))
        } else {
            debug!(?id, err = ?interp.error(), "interpretation failed");
            self.cache.remove(&id)
        };
        if let Some(previous) = previous {
            previous.destroy();
            let kept: HashSet<DefId> = interp.children.iter().map(|c| c.id()).collect();
            for child in previous.children() {
                if !kept.contains(&child.id()) {
                    self.evict(child.id());
                }
            }
        }
        interp
    }

    #[allow(clippy::type_complexity)]
    fn build(
        &mut self,
        definition: &Arc<Definition>,
        env: &Env,
    ) -> Result<
        (
            Env,
            Arc<dyn Any + Send + Sync>,
            Vec<ResolvedSlot>,
            Vec<InterpretedModel>,
        ),
        InterpretationError,
    > {
        let def_payload = definition.payload_any().map_err(|err| err.clone())?;

        // slot types may depend on the parent environment only
        let mut slots = Vec::with_capacity(definition.slots().len());
        for slot in definition.slots() {
            let model_type = match &slot.slot_type {
                SlotType::Fixed(ty) => ty.clone(),
                SlotType::ValueOf(expr) => expr
                    .interpret(&ModelType::any(Shape::Value), env)?
                    .model_type()
                    .clone(),
                SlotType::ElementOf(expr) => {
                    let ty = expr.interpret(&ModelType::any(Shape::List), env)?;
                    ModelType::Value(ty.model_type().value_type().clone())
                }
            };
            slots.push(ResolvedSlot {
                id: slot.id.clone(),
                model_type,
            });
        }

        let mut builder = env.builder();
        for slot in &slots {
            builder.declare_dynamic(slot.id.clone(), slot.model_type.clone());
        }
        // each model sees the slots and the models declared before it
        let mut models = Vec::with_capacity(definition.models().len());
        for model in definition.models() {
            let expression = model
                .expression
                .interpret(&ModelType::any(model.shape), &builder.snapshot())?;
            builder.declare_static(model.id.clone(), expression.model_type().clone());
            models.push(InterpretedModel {
                id: model.id.clone(),
                expression,
            });
        }
        let local_env = builder.build();

        let mut cx = InterpretContext { env: &local_env };
        let payload = definition.kind().interpret(def_payload, &mut cx)?;
        Ok((local_env, payload, slots, models))
    }

    /// Removes an interpretation and its descendants from the cache.
    fn evict(&mut self, id: DefId) {
        if let Some(interp) = self.cache.remove(&id) {
            trace!(?id, "evicting interpretation");
            interp.destroy();
            for child in interp.children() {
                self.evict(child.id());
            }
        }
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("cached", &self.cache.len())
            .field("root", &self.root)
            .finish()
    }
}
