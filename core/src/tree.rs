use crate::definition::ElementType;
use crate::error::{ElementError, ModelInstantiationError};
use crate::interpret::Interpreted;
use crate::kind::{ElementContext, ErasedKind, Kind};
use crate::lifecycle::Phase;
use crate::model::{Invocation, ModelComponentId, ModelSet, ModelValue, RetainedFork};
use crate::reactive::{Cell, ChangeEvent, Subscription};
use crate::reconcile::{self, Step};
use core::any::Any;
use core::fmt;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// A unique identifier for an element.
///
/// (this is just a UUID)
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(u32, u16, u16, [u8; 8]);

impl ElementId {
    pub(crate) fn new() -> ElementId {
        let uuid = Uuid::new_v4();
        let (a, b, c, d) = uuid.as_fields();
        ElementId(a, b, c, *d)
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ElementId({:08x})", self.0)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

/// A change to the element tree, for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// The root element changed.
    SetRoot(ElementId),
    /// An element was created.
    Created(ElementId, ElementType),
    /// An element was updated from a new interpretation.
    Updated(ElementId),
    /// An element’s children are now these, in this order.
    Children(ElementId, Vec<ElementId>),
    /// An element failed and should be shown as an inert placeholder.
    Failed(ElementId, ElementError),
    /// An element finished instantiation.
    Live(ElementId),
    /// An element was destroyed.
    Destroyed(ElementId),
}

/// Dynamic slot bindings for [`ElementTree::set_context`].
#[derive(Debug, Clone, Default)]
pub struct ContextBinding {
    entries: Vec<(ModelComponentId, ModelValue)>,
}

impl ContextBinding {
    pub fn new() -> ContextBinding {
        ContextBinding::default()
    }

    pub fn with(mut self, slot: ModelComponentId, value: ModelValue) -> ContextBinding {
        self.entries.push((slot, value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ModelComponentId, ModelValue)> {
        self.entries.iter()
    }
}

/// A node in the element tree.
struct TreeNode {
    /// The current interpretation.
    interpreted: Arc<Interpreted>,
    /// The kind the state belongs to.
    kind: Arc<dyn ErasedKind>,
    /// The kind’s live state; none for placeholders.
    state: Option<Box<dyn Any + Send>>,
    phase: Phase,
    parent: Option<ElementId>,
    /// Structural children, in order.
    children: Vec<ElementId>,
    /// Copies made under this element; owned, but not reconciled.
    copies: Vec<ElementId>,
    /// The element’s own model frame, once instantiated.
    models: Option<ModelSet>,
    /// The model set the element was instantiated in.
    parent_models: Option<ModelSet>,
    /// Forks retained on behalf of this element.
    retained: Vec<ModelSet>,
    /// Why the element is a placeholder or failed to instantiate.
    error: Option<ElementError>,
    /// Set when destruction begins.
    destroyed: Cell<bool>,
}

/// The element tree; holds the live instances and keeps them in sync with interpretations.
pub struct ElementTree {
    nodes: HashMap<ElementId, TreeNode>,
    root: Option<ElementId>,
    patches: VecDeque<Patch>,
}

impl Default for ElementTree {
    fn default() -> Self {
        ElementTree::new()
    }
}

impl ElementTree {
    pub fn new() -> ElementTree {
        ElementTree {
            nodes: HashMap::new(),
            root: None,
            patches: VecDeque::new(),
        }
    }

    /// Returns an iterator over available patches.
    ///
    /// Does not drain the queue immediately.
    /// Calling `next` will always remove a patch from the queue.
    pub fn patches(&mut self) -> impl Iterator<Item = Patch> + '_ {
        struct PatchIterator<'a>(&'a mut ElementTree);
        impl<'a> Iterator for PatchIterator<'a> {
            type Item = Patch;
            fn next(&mut self) -> Option<Patch> {
                self.0.patches.pop_front()
            }
        }

        PatchIterator(self)
    }

    pub fn root(&self) -> Option<ElementId> {
        self.root
    }

    /// Sets the root interpretation.
    ///
    /// If the current root comes from the same definition it is updated in place; otherwise it
    /// is destroyed and replaced.
    pub fn set_root(&mut self, interpreted: &Arc<Interpreted>) -> Result<ElementId, ElementError> {
        if let Some(root) = self.root {
            if self.nodes[&root].interpreted.id() == interpreted.id() {
                self.update(root, interpreted)?;
                return Ok(root);
            }
            debug!(%root, "replacing root element");
            self.destroy(root);
        }

        let root = self.insert(None, interpreted);
        self.root = Some(root);
        self.patches.push_back(Patch::SetRoot(root));
        Ok(root)
    }

    /// Updates an element with a new interpretation of its definition.
    ///
    /// Updating with the interpretation the element already has does nothing.
    pub fn update(&mut self, id: ElementId, interpreted: &Arc<Interpreted>) -> Result<(), ElementError> {
        let node = self.nodes.get_mut(&id).ok_or(ElementError::NoSuchElement(id))?;
        if node.phase == Phase::Destroyed {
            return Err(ElementError::Lifecycle {
                from: Phase::Destroyed,
                to: Phase::Interpreted,
            });
        }
        if Arc::ptr_eq(&node.interpreted, interpreted) {
            trace!(%id, "same interpretation; not updating");
            return Ok(());
        }
        if node.interpreted.id() != interpreted.id() {
            return Err(ElementError::WrongInterpretation(id));
        }

        debug!(%id, "updating element");
        node.interpreted = Arc::clone(interpreted);
        self.refresh(id, false)
    }

    /// Adds a new element to the tree.
    fn insert(&mut self, parent: Option<ElementId>, interpreted: &Arc<Interpreted>) -> ElementId {
        let id = ElementId::new();
        debug!(%id, element = %interpreted.definition().element_type(), "creating element");
        self.nodes.insert(
            id,
            TreeNode {
                interpreted: Arc::clone(interpreted),
                kind: Arc::clone(interpreted.kind()),
                state: None,
                phase: Phase::Defined,
                parent,
                children: Vec::new(),
                copies: Vec::new(),
                models: None,
                parent_models: None,
                retained: Vec::new(),
                error: None,
                destroyed: Cell::new(false),
            },
        );
        self.patches.push_back(Patch::Created(
            id,
            interpreted.definition().element_type().clone(),
        ));
        if let Err(err) = self.refresh(id, true) {
            warn!(%id, %err, "failed to set up new element");
        }
        id
    }

    /// Brings a node’s state and children in line with its current interpretation.
    fn refresh(&mut self, id: ElementId, created: bool) -> Result<(), ElementError> {
        let node = self.nodes.get_mut(&id).ok_or(ElementError::NoSuchElement(id))?;
        let interpreted = Arc::clone(&node.interpreted);

        if let Some(err) = interpreted.error() {
            // inert placeholder: no state, no children, not bound to anything
            let err = ElementError::from(err.clone());
            debug!(%id, %err, "element failed; showing placeholder");
            self.clear_children(id);
            self.drop_state(id);
            let node = self.nodes.get_mut(&id).ok_or(ElementError::NoSuchElement(id))?;
            if let Some(models) = node.models.take() {
                models.release();
            }
            node.parent_models = None;
            node.phase.transition(Phase::Interpreted)?;
            node.error = Some(err.clone());
            self.patches.push_back(Patch::Failed(id, err));
            return Ok(());
        }

        if !Arc::ptr_eq(&node.kind, interpreted.kind()) {
            // same definition, different kind: the old state is of no use
            self.drop_state(id);
        }
        let node = self.nodes.get_mut(&id).ok_or(ElementError::NoSuchElement(id))?;
        node.kind = Arc::clone(interpreted.kind());
        node.error = None;
        if node.phase == Phase::Defined {
            node.phase.transition(Phase::Interpreted)?;
        }
        let live = node.phase == Phase::Live;

        let result = if live {
            self.refresh_frame(id)
        } else {
            Ok(())
        };
        let result = result.and_then(|()| {
            if self.nodes[&id].state.is_none() {
                self.create_state(id);
                if live {
                    self.kind_call(id, |kind, state, interp, cx| {
                        kind.instantiate(state, interp, cx)
                            .map(|()| kind.instantiated(state, cx))
                    })
                    .unwrap_or(Ok(()))
                } else {
                    Ok(())
                }
            } else {
                self.kind_call(id, |kind, state, interp, cx| kind.update(state, interp, cx))
                    .unwrap_or(Ok(()))
            }
        });
        if let Err(err) = result {
            warn!(%id, %err, "failed to rebind element");
            let err = ElementError::from(err);
            // a half-rebound element can't stay live; the parent instantiates it again later
            self.deactivate(id);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.error = Some(err.clone());
            }
            self.patches.push_back(Patch::Failed(id, err));
        }

        if !created {
            self.patches.push_back(Patch::Updated(id));
        }
        self.update_children(id);
        Ok(())
    }

    /// Reconciles a node’s children with its interpretation’s children.
    fn update_children(&mut self, id: ElementId) {
        let node = &self.nodes[&id];
        let interpreted = Arc::clone(&node.interpreted);
        let old_children = node.children.clone();

        let old_keys: Vec<_> = old_children
            .iter()
            .map(|child| self.nodes[child].interpreted.id())
            .collect();
        let new_keys: Vec<_> = interpreted.children().iter().map(|c| c.id()).collect();
        let diff = reconcile::diff(&old_keys, &new_keys);
        let unchanged = diff.is_identity();

        let mut new_children = Vec::with_capacity(new_keys.len());
        for step in diff.steps {
            match step {
                Step::Keep { old, new } => {
                    // this child already has a corresponding element
                    let child = old_children[old];
                    if let Err(err) = self.update(child, &interpreted.children()[new]) {
                        warn!(%id, %child, %err, "failed to update child");
                    }
                    new_children.push(child);
                }
                Step::Create { new } => {
                    // no existing element for this child, needs to be created
                    let child = self.insert(Some(id), &interpreted.children()[new]);
                    new_children.push(child);
                }
            }
        }

        // unused children need to be removed, last first
        for old in diff.removed {
            self.destroy(old_children[old]);
        }

        let node = match self.nodes.get_mut(&id) {
            Some(node) => node,
            None => return,
        };
        node.children = new_children.clone();
        let live = node.phase == Phase::Live;
        let models = node.models.clone();
        if !unchanged {
            self.patches.push_back(Patch::Children(id, new_children.clone()));
        }

        // children of a live element have to be live too
        if let (true, Some(models)) = (live, models) {
            for child in new_children {
                let child_node = &self.nodes[&child];
                if child_node.phase.is_instantiated() || child_node.interpreted.error().is_some() {
                    continue;
                }
                if let Err(err) = self.instantiate(child, &models) {
                    warn!(%id, %child, %err, "failed to instantiate child");
                }
            }
        }
    }

    /// Re-declares slots and re-evaluates local models of a live element.
    fn refresh_frame(&mut self, id: ElementId) -> Result<(), ModelInstantiationError> {
        let node = &self.nodes[&id];
        let models = match &node.models {
            Some(models) => models.clone(),
            None => return Ok(()),
        };
        bind_frame(&node.interpreted, &models)
    }

    fn create_state(&mut self, id: ElementId) {
        let node = match self.nodes.get_mut(&id) {
            Some(node) => node,
            None => return,
        };
        let TreeNode {
            interpreted,
            kind,
            state,
            models,
            ..
        } = node;
        if let Ok(payload) = interpreted.payload_any() {
            let cx = ElementContext {
                id,
                interpreted: &**interpreted,
                models: models.as_ref(),
            };
            *state = Some(kind.create(payload, &cx));
        }
    }

    /// Calls into a node’s kind with its state.
    ///
    /// Returns `None` if the node has no state.
    fn kind_call<R>(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&dyn ErasedKind, &mut dyn Any, &dyn Any, &ElementContext) -> R,
    ) -> Option<R> {
        let node = self.nodes.get_mut(&id)?;
        let TreeNode {
            interpreted,
            kind,
            state,
            models,
            ..
        } = node;
        let state = state.as_mut()?;
        let payload = interpreted.payload_any().ok()?;
        let cx = ElementContext {
            id,
            interpreted: &**interpreted,
            models: models.as_ref(),
        };
        Some(f(&**kind, &mut **state, payload, &cx))
    }

    fn drop_state(&mut self, id: ElementId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if let Some(mut state) = node.state.take() {
                node.kind.destroy(&mut *state);
            }
        }
    }

    fn clear_children(&mut self, id: ElementId) {
        let (children, copies) = match self.nodes.get_mut(&id) {
            Some(node) => (
                std::mem::take(&mut node.children),
                std::mem::take(&mut node.copies),
            ),
            None => return,
        };
        for copy in copies.into_iter().rev() {
            self.destroy(copy);
        }
        for child in children.into_iter().rev() {
            self.destroy(child);
        }
    }

    /// Instantiates an element and its subtree in a model set.
    ///
    /// Each element gets its own frame on top of its parent’s. Elements are bound in structural
    /// order, parents first, and once the whole subtree is bound every bound element is told it
    /// was instantiated, again parents first. A child that fails is left interpreted but not
    /// live, and the others carry on; if the element itself fails, the error is returned.
    pub fn instantiate(&mut self, id: ElementId, models: &ModelSet) -> Result<(), ElementError> {
        let node = self.nodes.get(&id).ok_or(ElementError::NoSuchElement(id))?;
        match node.phase {
            Phase::Live | Phase::Instantiating => {
                let same = node
                    .parent_models
                    .as_ref()
                    .map_or(false, |m| m.ptr_eq(models));
                return if same {
                    Ok(())
                } else {
                    Err(ElementError::Lifecycle {
                        from: node.phase,
                        to: Phase::Instantiating,
                    })
                };
            }
            _ => (),
        }
        if let Some(err) = node.interpreted.error() {
            return Err(err.clone().into());
        }

        let mut bound = Vec::new();
        let result = self.bind(id, models, &mut bound);
        for id in bound {
            self.activate(id);
        }
        result
    }

    /// The bind pass.
    fn bind(&mut self, id: ElementId, models: &ModelSet, bound: &mut Vec<ElementId>) -> Result<(), ElementError> {
        let node = self.nodes.get_mut(&id).ok_or(ElementError::NoSuchElement(id))?;
        node.phase.transition(Phase::Instantiating)?;
        trace!(%id, "binding element");

        let frame = models.child();
        node.parent_models = Some(models.clone());
        node.models = Some(frame.clone());
        let interpreted = Arc::clone(&node.interpreted);

        let result = bind_frame(&interpreted, &frame).and_then(|()| {
            self.kind_call(id, |kind, state, interp, cx| kind.instantiate(state, interp, cx))
                .unwrap_or(Ok(()))
        });

        if let Err(err) = result {
            let err = ElementError::from(err);
            debug!(%id, %err, "instantiation failed");
            frame.release();
            let node = self.nodes.get_mut(&id).ok_or(ElementError::NoSuchElement(id))?;
            node.models = None;
            node.parent_models = None;
            node.phase.transition(Phase::Interpreted)?;
            node.error = Some(err.clone());
            self.patches.push_back(Patch::Failed(id, err.clone()));
            return Err(err);
        }
        bound.push(id);

        let node = &self.nodes[&id];
        let children = node.children.clone();
        for child in children {
            if self.nodes[&child].interpreted.error().is_some() {
                continue;
            }
            if let Err(err) = self.bind(child, &frame, bound) {
                warn!(parent = %id, %child, %err, "failed to instantiate child");
            }
        }
        Ok(())
    }

    /// The instantiated pass.
    fn activate(&mut self, id: ElementId) {
        match self.nodes.get_mut(&id) {
            Some(node) if node.phase == Phase::Instantiating => {
                node.phase = Phase::Live;
                node.error = None;
            }
            _ => return,
        }
        self.kind_call(id, |kind, state, _, cx| kind.instantiated(state, cx));
        self.patches.push_back(Patch::Live(id));
    }

    /// Takes an instantiated element and everything under it back to `Interpreted`, releasing
    /// their frames. State is kept so the element can be instantiated again.
    fn deactivate(&mut self, id: ElementId) {
        let node = match self.nodes.get_mut(&id) {
            Some(node) if node.phase.is_instantiated() => node,
            _ => return,
        };
        if let Some(models) = node.models.take() {
            models.release();
        }
        node.parent_models = None;
        node.phase = Phase::Interpreted;
        debug!(%id, "element taken out of service");
        let dependents: Vec<_> = node.copies.iter().chain(&node.children).copied().collect();
        for dependent in dependents {
            self.deactivate(dependent);
        }
    }

    /// Rebinds an instantiated element’s dynamic slots.
    ///
    /// Can be called any number of times; previous bindings are replaced in place, so anything
    /// that was reading a slot keeps following it.
    pub fn set_context(&mut self, id: ElementId, binding: &ContextBinding) -> Result<(), ElementError> {
        let node = self.nodes.get(&id).ok_or(ElementError::NoSuchElement(id))?;
        let models = match (&node.models, node.phase) {
            (Some(models), phase) if phase.is_instantiated() => models.clone(),
            _ => return Err(ElementError::NotInstantiated(id)),
        };
        for (slot, value) in binding.iter() {
            models.bind(slot, value.clone())?;
        }
        trace!(%id, "context changed");
        self.kind_call(id, |kind, state, interp, cx| kind.context_changed(state, interp, cx))
            .unwrap_or(Ok(()))?;
        Ok(())
    }

    /// Starts an invocation of an element used as a template.
    pub fn invoke(&self, id: ElementId) -> Result<Invocation, ElementError> {
        let node = self.nodes.get(&id).ok_or(ElementError::NoSuchElement(id))?;
        let models = node.models.as_ref().ok_or(ElementError::NotInstantiated(id))?;
        Ok(Invocation::new(models)?)
    }

    /// Keeps an invocation’s fork alive until the returned handle is dropped or the element is
    /// destroyed, whichever comes first.
    pub fn retain(&mut self, id: ElementId, invocation: Invocation) -> Result<RetainedFork, ElementError> {
        let node = self.nodes.get_mut(&id).ok_or(ElementError::NoSuchElement(id))?;
        let fork = invocation.retain();
        node.retained.retain(|models| models.is_alive());
        node.retained.push(fork.models().clone());
        Ok(fork)
    }

    /// Destroys an element and everything it owns.
    ///
    /// Dependents registered with [`ElementTree::on_destroy`] are told first. Then copies and
    /// children are destroyed, last first, followed by the element’s own state and model frame;
    /// finally it is detached from its parent. Destroying an element that is already destroyed
    /// (or being destroyed) does nothing.
    pub fn destroy(&mut self, id: ElementId) {
        let node = match self.nodes.get_mut(&id) {
            Some(node) if node.phase != Phase::Destroyed => node,
            _ => {
                trace!(%id, "already destroyed");
                return;
            }
        };
        debug!(%id, "destroying element");
        node.phase = Phase::Destroyed;
        let destroyed = node.destroyed.clone();
        destroyed.set(true, None);

        self.clear_children(id);
        self.drop_state(id);

        let node = match self.nodes.remove(&id) {
            Some(node) => node,
            None => return,
        };
        for fork in &node.retained {
            fork.release();
        }
        if let Some(models) = &node.models {
            models.release();
        }
        if let Some(parent) = node.parent.and_then(|parent| self.nodes.get_mut(&parent)) {
            parent.children.retain(|child| *child != id);
            parent.copies.retain(|copy| *copy != id);
        }
        if self.root == Some(id) {
            self.root = None;
        }
        self.patches.push_back(Patch::Destroyed(id));
    }

    /// Makes a structural copy of an element under `new_parent`.
    ///
    /// The copy shares the original’s interpretation but gets fresh state and fresh cells. It is
    /// owned by the new parent (and destroyed with it) but is not one of its reconciled children.
    /// If the new parent is live, so is the copy.
    pub fn copy(&mut self, id: ElementId, new_parent: ElementId) -> Result<ElementId, ElementError> {
        let node = self.nodes.get(&id).ok_or(ElementError::NoSuchElement(id))?;
        if node.phase == Phase::Destroyed {
            return Err(ElementError::NoSuchElement(id));
        }
        let interpreted = Arc::clone(&node.interpreted);
        let parent = self
            .nodes
            .get(&new_parent)
            .ok_or(ElementError::NoSuchElement(new_parent))?;
        let parent_models = match parent.phase {
            Phase::Live => parent.models.clone(),
            _ => None,
        };

        let copy = self.insert(Some(new_parent), &interpreted);
        if let Some(parent) = self.nodes.get_mut(&new_parent) {
            parent.copies.push(copy);
        }
        debug!(%id, %copy, "copied element");
        if let Some(models) = parent_models {
            if interpreted.error().is_none() {
                self.instantiate(copy, &models)?;
            }
        }
        Ok(copy)
    }

    /// Registers a callback for when destruction of an element begins.
    ///
    /// Returns `None` if the element doesn’t exist or is already being destroyed.
    pub fn on_destroy(
        &self,
        id: ElementId,
        callback: impl Fn(ElementId) + Send + Sync + 'static,
    ) -> Option<Subscription> {
        let node = self.nodes.get(&id)?;
        if node.phase == Phase::Destroyed {
            return None;
        }
        Some(node.destroyed.subscribe(Arc::new(move |event: &ChangeEvent<bool>| {
            if event.new {
                callback(id);
            }
        })))
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn phase(&self, id: ElementId) -> Option<Phase> {
        self.nodes.get(&id).map(|node| node.phase)
    }

    /// Why an element is a placeholder, or why it failed to instantiate.
    pub fn error(&self, id: ElementId) -> Option<&ElementError> {
        self.nodes.get(&id)?.error.as_ref()
    }

    pub fn children(&self, id: ElementId) -> Option<&[ElementId]> {
        self.nodes.get(&id).map(|node| &node.children[..])
    }

    pub fn copies(&self, id: ElementId) -> Option<&[ElementId]> {
        self.nodes.get(&id).map(|node| &node.copies[..])
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(&id)?.parent
    }

    pub fn interpreted(&self, id: ElementId) -> Option<&Arc<Interpreted>> {
        self.nodes.get(&id).map(|node| &node.interpreted)
    }

    /// The element’s own model frame, if it is instantiated.
    pub fn models(&self, id: ElementId) -> Option<&ModelSet> {
        self.nodes.get(&id)?.models.as_ref()
    }

    /// The live state of an element of kind `K`.
    pub fn state<K: Kind>(&self, id: ElementId) -> Option<&K::State> {
        self.nodes.get(&id)?.state.as_ref()?.downcast_ref()
    }

    /// Finds the first element in structural order satisfying a predicate.
    pub fn find(&self, mut predicate: impl FnMut(ElementId, &Interpreted) -> bool) -> Option<ElementId> {
        let mut stack: Vec<ElementId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[&id];
            if predicate(id, &node.interpreted) {
                return Some(id);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }
}

/// Declares an element’s slots and evaluates its local models in its frame.
fn bind_frame(interpreted: &Interpreted, frame: &ModelSet) -> Result<(), ModelInstantiationError> {
    for slot in interpreted.slots() {
        frame.declare_slot(slot.id.clone(), slot.model_type.shape())?;
    }
    for model in interpreted.models() {
        let value = model.expression.instantiate().get(frame)?;
        frame.insert(model.id.clone(), value)?;
    }
    Ok(())
}

impl fmt::Debug for ElementTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ElementTree")
            .field("root", &self.root)
            .field("len", &self.nodes.len())
            .field("patches", &self.patches.len())
            .finish()
    }
}
