//! Definitions: the first stage of an element.
//!
//! A [`ParsedNode`] tree comes from the configuration parser. The [`DefinitionLoader`] turns it
//! into a tree of immutable [`Definition`]s, asking each element’s [`Kind`](crate::Kind) to
//! validate its attributes. Definitions are identified by a [`DefId`] that survives reloading the
//! configuration as long as the element itself didn’t change.

use crate::error::ValidationError;
use crate::expr::{CompiledExpression, Expression};
use crate::kind::{erase, ErasedKind, KindRegistry, Placeholder};
use crate::model::{ModelComponentId, ModelType, Shape};
use core::any::Any;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// The declared type of an element, e.g. `menu` or `label`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementType(Arc<str>);

impl ElementType {
    pub fn new(name: &str) -> ElementType {
        ElementType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An attribute value as handed over by the parser.
#[derive(Clone)]
pub enum RawValue {
    Text(Arc<str>),
    Int(i64),
    Bool(bool),
    Expression(Arc<dyn CompiledExpression>),
}

impl PartialEq for RawValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RawValue::Text(a), RawValue::Text(b)) => a == b,
            (RawValue::Int(a), RawValue::Int(b)) => a == b,
            (RawValue::Bool(a), RawValue::Bool(b)) => a == b,
            // compiled expressions are identified by their source
            (RawValue::Expression(a), RawValue::Expression(b)) => a.source() == b.source(),
            _ => false,
        }
    }
}

impl Eq for RawValue {}

impl Hash for RawValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            RawValue::Text(s) => s.hash(state),
            RawValue::Int(i) => i.hash(state),
            RawValue::Bool(b) => b.hash(state),
            RawValue::Expression(e) => e.source().hash(state),
        }
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RawValue::Text(s) => write!(f, "{:?}", s),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Expression(e) => write!(f, "{{{}}}", e.source()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.into())
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<Expression> for RawValue {
    fn from(e: Expression) -> Self {
        RawValue::Expression(e.shared())
    }
}

impl From<Arc<dyn CompiledExpression>> for RawValue {
    fn from(e: Arc<dyn CompiledExpression>) -> Self {
        RawValue::Expression(e)
    }
}

/// A validated configuration node, as produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNode {
    pub declared_type: ElementType,
    pub attributes: BTreeMap<Arc<str>, RawValue>,
    pub children: Vec<ParsedNode>,
}

impl ParsedNode {
    pub fn new(declared_type: &str) -> ParsedNode {
        ParsedNode {
            declared_type: ElementType::new(declared_type),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<RawValue>) -> ParsedNode {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: ParsedNode) -> ParsedNode {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ParsedNode>) -> ParsedNode {
        self.children.extend(children);
        self
    }
}

/// A unique identifier for a definition.
///
/// (this is just a UUID)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefId(u32, u16, u16, [u8; 8]);

impl DefId {
    fn new() -> DefId {
        let uuid = Uuid::new_v4();
        let (a, b, c, d) = uuid.as_fields();
        DefId(a, b, c, *d)
    }
}

impl fmt::Debug for DefId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DefId({:08x})", self.0)
    }
}

/// How the type of a dynamic slot is determined.
#[derive(Debug, Clone)]
pub enum SlotType {
    /// A fixed type.
    Fixed(ModelType),
    /// The type of an expression’s value.
    ValueOf(Arc<dyn CompiledExpression>),
    /// The element type of a collection expression.
    ElementOf(Arc<dyn CompiledExpression>),
}

/// A dynamic slot declared by an element for its descendants.
#[derive(Debug, Clone)]
pub struct SlotDecl {
    pub id: ModelComponentId,
    pub slot_type: SlotType,
}

impl SlotDecl {
    pub fn shape(&self) -> Shape {
        match &self.slot_type {
            SlotType::Fixed(ty) => ty.shape(),
            SlotType::ValueOf(_) | SlotType::ElementOf(_) => Shape::Value,
        }
    }
}

/// A local model declared by an element: a named value computed from an expression.
#[derive(Debug, Clone)]
pub struct ModelDecl {
    pub id: ModelComponentId,
    pub shape: Shape,
    pub expression: Arc<dyn CompiledExpression>,
}

/// Content that decides whether a node is the same element as before.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DefKey {
    element_type: ElementType,
    attributes: BTreeMap<Arc<str>, RawValue>,
}

impl DefKey {
    fn of(node: &ParsedNode) -> DefKey {
        DefKey {
            element_type: node.declared_type.clone(),
            attributes: node.attributes.clone(),
        }
    }
}

/// The part of a definition that doesn’t depend on its children.
struct Own {
    key: DefKey,
    kind: Arc<dyn ErasedKind>,
    payload: Result<Arc<dyn Any + Send + Sync>, ValidationError>,
    slots: Vec<SlotDecl>,
    models: Vec<ModelDecl>,
}

/// An immutable element definition.
pub struct Definition {
    id: DefId,
    own: Arc<Own>,
    children: Vec<Arc<Definition>>,
}

impl Definition {
    pub fn id(&self) -> DefId {
        self.id
    }

    pub fn element_type(&self) -> &ElementType {
        &self.own.key.element_type
    }

    pub fn attribute(&self, name: &str) -> Option<&RawValue> {
        self.own.key.attributes.get(name)
    }

    pub fn slots(&self) -> &[SlotDecl] {
        &self.own.slots
    }

    pub fn models(&self) -> &[ModelDecl] {
        &self.own.models
    }

    pub fn children(&self) -> &[Arc<Definition>] {
        &self.children
    }

    /// The validation error, if this element failed to define.
    pub fn error(&self) -> Option<&ValidationError> {
        self.own.payload.as_ref().err()
    }

    /// The kind’s definition payload.
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.own.payload.as_ref().ok()?.downcast_ref()
    }

    pub(crate) fn payload_any(&self) -> Result<&(dyn Any + Send + Sync), &ValidationError> {
        self.own.payload.as_ref().map(|p| &**p)
    }

    pub(crate) fn kind(&self) -> &Arc<dyn ErasedKind> {
        &self.own.kind
    }

    /// Number of definitions in this subtree.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(|c| c.len()).sum::<usize>()
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Definition")
            .field("id", &self.id)
            .field("type", &self.own.key.element_type)
            .field("attributes", &self.own.key.attributes)
            .field("kind", &self.own.kind.name())
            .field("children", &self.children)
            .finish()
    }
}

/// Typed access to an element’s attributes while it is being defined.
pub struct DefineContext<'a> {
    node: &'a ParsedNode,
    slots: Vec<SlotDecl>,
    models: Vec<ModelDecl>,
}

impl<'a> DefineContext<'a> {
    fn new(node: &'a ParsedNode) -> DefineContext<'a> {
        DefineContext {
            node,
            slots: Vec::new(),
            models: Vec::new(),
        }
    }

    pub fn element_type(&self) -> &ElementType {
        &self.node.declared_type
    }

    fn bad(&self, attribute: &str, expected: &'static str) -> ValidationError {
        ValidationError::BadAttribute {
            element: Arc::clone(&self.node.declared_type.0),
            attribute: attribute.into(),
            expected,
        }
    }

    /// A validation error for this element.
    pub fn error(&self, message: &str) -> ValidationError {
        ValidationError::Kind {
            element: Arc::clone(&self.node.declared_type.0),
            message: message.into(),
        }
    }

    pub fn text(&self, name: &str) -> Result<Option<Arc<str>>, ValidationError> {
        match self.node.attributes.get(name) {
            None => Ok(None),
            Some(RawValue::Text(s)) => Ok(Some(Arc::clone(s))),
            Some(_) => Err(self.bad(name, "text")),
        }
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, ValidationError> {
        match self.node.attributes.get(name) {
            None => Ok(None),
            Some(RawValue::Int(i)) => Ok(Some(*i)),
            Some(RawValue::Text(s)) => s.parse().map(Some).map_err(|_| self.bad(name, "an integer")),
            Some(_) => Err(self.bad(name, "an integer")),
        }
    }

    /// A boolean attribute; absent means false.
    pub fn flag(&self, name: &str) -> Result<bool, ValidationError> {
        match self.node.attributes.get(name) {
            None => Ok(false),
            Some(RawValue::Bool(b)) => Ok(*b),
            Some(RawValue::Text(s)) if &**s == "true" => Ok(true),
            Some(RawValue::Text(s)) if &**s == "false" => Ok(false),
            Some(_) => Err(self.bad(name, "a boolean")),
        }
    }

    /// An attribute as an expression. Plain values become literals.
    pub fn expression(&self, name: &str) -> Result<Option<Arc<dyn CompiledExpression>>, ValidationError> {
        Ok(self.node.attributes.get(name).map(|value| match value {
            RawValue::Expression(e) => Arc::clone(e),
            RawValue::Text(s) => Expression::literal(&**s).shared(),
            RawValue::Int(i) => Expression::literal(*i).shared(),
            RawValue::Bool(b) => Expression::literal(*b).shared(),
        }))
    }

    pub fn require_expression(&self, name: &str) -> Result<Arc<dyn CompiledExpression>, ValidationError> {
        self.expression(name)?
            .ok_or_else(|| ValidationError::MissingAttribute {
                element: Arc::clone(&self.node.declared_type.0),
                attribute: name.into(),
            })
    }

    /// Declares a dynamic slot visible to this element and its descendants.
    pub fn declare_slot(&mut self, name: &str, slot_type: SlotType) -> ModelComponentId {
        let id = ModelComponentId::new(name);
        self.slots.push(SlotDecl {
            id: id.clone(),
            slot_type,
        });
        id
    }

    /// Declares a local model computed from an expression.
    pub fn declare_model(
        &mut self,
        name: &str,
        shape: Shape,
        expression: Arc<dyn CompiledExpression>,
    ) -> ModelComponentId {
        let id = ModelComponentId::new(name);
        self.models.push(ModelDecl {
            id: id.clone(),
            shape,
            expression,
        });
        id
    }
}

/// Builds definition trees, reusing identities from the previous load.
pub struct DefinitionLoader {
    registry: KindRegistry,
    previous: Option<Arc<Definition>>,
}

impl DefinitionLoader {
    pub fn new(registry: KindRegistry) -> DefinitionLoader {
        DefinitionLoader {
            registry,
            previous: None,
        }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// The last successfully loaded tree.
    pub fn current(&self) -> Option<&Arc<Definition>> {
        self.previous.as_ref()
    }

    /// Loads a configuration tree.
    ///
    /// Children that fail to define are kept as invalid definitions. If the root fails, the
    /// error is returned and the previous tree stays current.
    pub fn load(&mut self, node: &ParsedNode) -> Result<Arc<Definition>, ValidationError> {
        let root = self.build(node, DefKey::of(node), self.previous.as_ref());
        if let Some(err) = root.error() {
            debug!(%err, "root definition failed");
            return Err(err.clone());
        }
        if let Some(previous) = &self.previous {
            if Arc::ptr_eq(previous, &root) {
                trace!("configuration unchanged");
            }
        }
        self.previous = Some(Arc::clone(&root));
        Ok(root)
    }

    /// Forgets the previous tree; the next load gets fresh identities throughout.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn build(&self, node: &ParsedNode, key: DefKey, previous: Option<&Arc<Definition>>) -> Arc<Definition> {
        let (id, own) = match previous {
            Some(prev) if prev.own.key == key => (prev.id, Arc::clone(&prev.own)),
            _ => (DefId::new(), Arc::new(self.define(node, key))),
        };

        let prev_children = previous.map(|p| &p.children[..]).unwrap_or(&[]);
        // identical siblings are paired up in order: the k-th old one with the k-th new one
        let mut unclaimed: HashMap<&DefKey, VecDeque<usize>> = HashMap::with_capacity(prev_children.len());
        for (i, child) in prev_children.iter().enumerate() {
            unclaimed.entry(&child.own.key).or_default().push_back(i);
        }

        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let key = DefKey::of(child);
            let prev_child = unclaimed
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .map(|old| &prev_children[old]);
            children.push(self.build(child, key, prev_child));
        }

        // an entirely unchanged subtree is the same definition
        if let Some(prev) = previous {
            let unchanged = Arc::ptr_eq(&prev.own, &own)
                && prev.children.len() == children.len()
                && prev.children.iter().zip(&children).all(|(a, b)| Arc::ptr_eq(a, b));
            if unchanged {
                return Arc::clone(prev);
            }
        }

        Arc::new(Definition { id, own, children })
    }

    fn define(&self, node: &ParsedNode, key: DefKey) -> Own {
        let kind = match self.registry.get(node.declared_type.as_str()) {
            Some(kind) => Arc::clone(kind),
            None => {
                debug!(element = %node.declared_type, "unknown element type");
                return Own {
                    key,
                    kind: erase(Placeholder),
                    payload: Err(ValidationError::UnknownType(Arc::clone(&node.declared_type.0))),
                    slots: Vec::new(),
                    models: Vec::new(),
                };
            }
        };

        let mut cx = DefineContext::new(node);
        let payload = kind.define(&mut cx);
        match &payload {
            Ok(_) => trace!(element = %node.declared_type, "defined"),
            Err(err) => debug!(element = %node.declared_type, %err, "definition failed"),
        }
        let (slots, models) = match payload {
            Ok(_) => (cx.slots, cx.models),
            Err(_) => (Vec::new(), Vec::new()),
        };
        Own {
            key,
            kind,
            payload,
            slots,
            models,
        }
    }
}

impl fmt::Debug for DefinitionLoader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DefinitionLoader")
            .field("registry", &self.registry)
            .field("current", &self.previous.as_ref().map(|d| d.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{menu_bar, registry};

    fn item(name: &str) -> ParsedNode {
        ParsedNode::new("item").attr("value", name)
    }

    #[test]
    fn reloading_the_same_tree_reuses_it() {
        let mut loader = DefinitionLoader::new(registry());
        let a = loader.load(&menu_bar(&["x", "y"])).unwrap();
        let b = loader.load(&menu_bar(&["x", "y"])).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn identical_siblings_keep_their_identities() {
        let mut loader = DefinitionLoader::new(registry());
        let a = loader.load(&menu_bar(&["-", "-"])).unwrap();
        let b = loader.load(&menu_bar(&["-", "-"])).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = loader.load(&menu_bar(&["-", "open", "-"])).unwrap();
        let (old, new) = (a.children()[0].children(), c.children()[0].children());
        assert_eq!(new[0].id(), old[0].id());
        assert_eq!(new[2].id(), old[1].id());
        assert_ne!(old[0].id(), old[1].id());
    }

    #[test]
    fn changed_children_keep_identities() {
        let mut loader = DefinitionLoader::new(registry());
        let a = loader.load(&menu_bar(&["item1", "item2"])).unwrap();
        let b = loader.load(&menu_bar(&["item1", "item3"])).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), b.id());
        let (menu_a, menu_b) = (&a.children()[0], &b.children()[0]);
        assert_eq!(menu_a.id(), menu_b.id());
        assert!(Arc::ptr_eq(&menu_a.children()[0], &menu_b.children()[0]));
        assert_ne!(menu_a.children()[1].id(), menu_b.children()[1].id());
    }

    #[test]
    fn reordered_children_follow_their_content() {
        let mut loader = DefinitionLoader::new(registry());
        let a = loader
            .load(&ParsedNode::new("menu").children(vec![item("a"), item("b")]))
            .unwrap();
        let b = loader
            .load(&ParsedNode::new("menu").children(vec![item("b"), item("a")]))
            .unwrap();
        assert_eq!(a.children()[0].id(), b.children()[1].id());
        assert_eq!(a.children()[1].id(), b.children()[0].id());
    }

    #[test]
    fn invalid_children_become_placeholders() {
        let mut loader = DefinitionLoader::new(registry());
        let root = loader
            .load(
                &ParsedNode::new("menu")
                    .child(ParsedNode::new("item"))
                    .child(ParsedNode::new("gizmo"))
                    .child(item("ok")),
            )
            .unwrap();
        let children = root.children();
        assert!(matches!(
            children[0].error(),
            Some(ValidationError::MissingAttribute { .. })
        ));
        assert_eq!(
            children[1].error(),
            Some(&ValidationError::UnknownType("gizmo".into()))
        );
        assert!(children[2].error().is_none());
    }

    #[test]
    fn invalid_root_is_an_error() {
        let mut loader = DefinitionLoader::new(registry());
        let good = loader.load(&menu_bar(&["a"])).unwrap();
        assert!(loader.load(&ParsedNode::new("item")).is_err());
        assert!(Arc::ptr_eq(loader.current().unwrap(), &good));
    }

    #[test]
    fn attribute_access() {
        let node = ParsedNode::new("x")
            .attr("n", "12")
            .attr("on", true)
            .attr("label", "hi");
        let cx = DefineContext::new(&node);
        assert_eq!(cx.int("n").unwrap(), Some(12));
        assert!(cx.flag("on").unwrap());
        assert!(!cx.flag("off").unwrap());
        assert!(cx.int("label").is_err());
        assert_eq!(cx.expression("label").unwrap().unwrap().source(), "\"hi\"");
        assert!(cx.require_expression("missing").is_err());
    }
}
