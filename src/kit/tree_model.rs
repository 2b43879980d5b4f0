use std::sync::Arc;
use tern_core::expr::{CompiledExpression, InterpretedExpression, Instantiator};
use tern_core::model::{Invocation, Retained};
use tern_core::reactive::{Constant, DynCollection, FlatCell, FlatList, HotCell, HotList, ObservableCollection};
use tern_core::{
    DefineContext, ElementContext, ElementError, ElementId, InterpretContext, InterpretationError,
    Kind, ModelComponentId, ModelInstantiationError, ModelSet, ModelType, ModelValue, Shape,
    SlotType, ValidationError, Value,
};
use tracing::trace;

/// A lazily expanded tree of values: `<tree root=… children=…>`.
///
/// `children` is evaluated with the `node` slot bound to the node being expanded. The slot has
/// the type of `root`.
pub struct TreeModel;

pub struct TreeDef {
    root: Arc<dyn CompiledExpression>,
    children: Arc<dyn CompiledExpression>,
    node: ModelComponentId,
}

pub struct TreeInterp {
    root: Arc<dyn InterpretedExpression>,
    children: Arc<dyn InterpretedExpression>,
    node: ModelComponentId,
}

pub struct TreeState {
    id: ElementId,
    node: ModelComponentId,
    root: HotCell<Value>,
    top_level: HotList<Value>,
    children: Box<dyn Instantiator>,
    models: Option<ModelSet>,
}

impl TreeState {
    /// The root node.
    pub fn root(&self) -> FlatCell<Value> {
        self.root.view()
    }

    /// Children of the root node; follows changes of the root.
    pub fn top_level(&self) -> FlatList<Value> {
        self.top_level.view()
    }

    fn models(&self) -> Result<&ModelSet, ElementError> {
        self.models.as_ref().ok_or(ElementError::NotInstantiated(self.id))
    }

    fn expand(&self, node: &Value) -> Result<(Invocation, DynCollection<Value>), ElementError> {
        let invocation = Invocation::new(self.models()?)?;
        invocation.bind(&self.node, ModelValue::Value(Constant::shared(node.clone())))?;
        match invocation.evaluate(&*self.children)? {
            ModelValue::List(children) => Ok((invocation, children)),
            ModelValue::Value(_) => Err(ModelInstantiationError::ShapeMismatch("children".into()).into()),
        }
    }

    /// The children of `node`.
    ///
    /// The result stays live for as long as it is held, and goes stale once the tree is
    /// destroyed.
    pub fn children_of(&self, node: &Value) -> Result<Retained<DynCollection<Value>>, ElementError> {
        trace!(id = %self.id, %node, "expanding tree node");
        let (invocation, children) = self.expand(node)?;
        Ok(Retained::new(children, invocation.retain()))
    }

    pub fn is_leaf(&self, node: &Value) -> Result<bool, ElementError> {
        let (_invocation, children) = self.expand(node)?;
        Ok(children.is_empty())
    }

    fn bind(&mut self, interp: &TreeInterp, models: &ModelSet) -> Result<(), ModelInstantiationError> {
        match interp.root.instantiate().get(models)? {
            ModelValue::Value(root) => {
                self.root.swap(root, None);
            }
            ModelValue::List(_) => return Err(ModelInstantiationError::ShapeMismatch("root".into())),
        }
        // the element's own frame shows the root node
        models.bind(&self.node, ModelValue::Value(Arc::new(self.root.view())))?;
        match self.children.get(models)? {
            ModelValue::List(children) => {
                self.top_level.swap(children, None);
            }
            ModelValue::Value(_) => {
                return Err(ModelInstantiationError::ShapeMismatch("children".into()))
            }
        }
        self.models = Some(models.clone());
        Ok(())
    }
}

impl Kind for TreeModel {
    type Definition = TreeDef;
    type Interpreted = TreeInterp;
    type State = TreeState;

    fn define(&self, cx: &mut DefineContext) -> Result<TreeDef, ValidationError> {
        let root = cx.require_expression("root")?;
        let children = cx.require_expression("children")?;
        let node = cx.declare_slot("node", SlotType::ValueOf(Arc::clone(&root)));
        Ok(TreeDef {
            root,
            children,
            node,
        })
    }

    fn interpret(&self, def: &TreeDef, cx: &mut InterpretContext) -> Result<TreeInterp, InterpretationError> {
        Ok(TreeInterp {
            root: cx.interpret(&def.root, &ModelType::any(Shape::Value))?,
            children: cx.interpret(&def.children, &ModelType::any(Shape::List))?,
            node: def.node.clone(),
        })
    }

    fn create(&self, interp: &TreeInterp, cx: &ElementContext) -> TreeState {
        TreeState {
            id: cx.id(),
            node: interp.node.clone(),
            root: HotCell::constant(Value::Unit),
            top_level: HotList::empty(),
            children: interp.children.instantiate(),
            models: None,
        }
    }

    fn update(
        &self,
        state: &mut TreeState,
        interp: &TreeInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        state.children = interp.children.instantiate();
        match cx.models() {
            Some(models) => state.bind(interp, models),
            None => Ok(()),
        }
    }

    fn instantiate(
        &self,
        state: &mut TreeState,
        interp: &TreeInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        state.bind(interp, cx.require_models()?)
    }

    fn destroy(&self, state: &mut TreeState) {
        state.root.release();
        state.top_level.release();
        state.models = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit;
    use tern_core::expr::Expression;
    use tern_core::reactive::{Cell, Observable};
    use tern_core::{
        DefinitionLoader, ElementTree, Env, Interpreter, ParsedNode, StaleInvocationError,
        ValueType,
    };

    /// A binary tree of integers, cut off below 4.
    fn binary(node: &Value) -> Vec<Value> {
        match node.as_int() {
            Some(n) if n < 4 => vec![Value::Int(n * 2), Value::Int(n * 2 + 1)],
            _ => Vec::new(),
        }
    }

    fn load(start: &Cell<Value>) -> (ElementTree, ElementId) {
        let start_id = ModelComponentId::new("start");
        let mut env = Env::root().builder();
        env.declare_static(start_id.clone(), ModelType::Value(ValueType::Int));
        let models = ModelSet::root();
        models
            .insert(start_id, ModelValue::Value(start.shared()))
            .unwrap();

        let node = ParsedNode::new("tree")
            .attr("root", Expression::reference("start"))
            .attr(
                "children",
                Expression::collect("binary(node)", "node", ValueType::Int, binary),
            );
        let def = DefinitionLoader::new(kit::registry()).load(&node).unwrap();
        let interp = Interpreter::new().interpret(&def, &env.build()).unwrap();
        let mut tree = ElementTree::new();
        let root = tree.set_root(&interp).unwrap();
        tree.instantiate(root, &models).unwrap();
        (tree, root)
    }

    #[test]
    fn node_slot_is_typed_after_the_root() {
        let start = Cell::new(Value::Int(1));
        let (tree, root) = load(&start);
        let slots = tree.interpreted(root).unwrap().slots();
        assert_eq!(slots[0].model_type, ModelType::Value(ValueType::Int));
    }

    #[test]
    fn top_level_follows_the_root() {
        let start = Cell::new(Value::Int(1));
        let (tree, root) = load(&start);
        let state = tree.state::<TreeModel>(root).unwrap();
        let top = state.top_level();
        assert_eq!(top.to_vec(), vec![Value::Int(2), Value::Int(3)]);

        start.set(Value::Int(2), None);
        assert_eq!(state.root().get(), Value::Int(2));
        assert_eq!(top.to_vec(), vec![Value::Int(4), Value::Int(5)]);
    }

    #[test]
    fn expanded_nodes_dont_interfere() {
        let start = Cell::new(Value::Int(1));
        let (mut tree, root) = load(&start);
        let state = tree.state::<TreeModel>(root).unwrap();

        let a = state.children_of(&Value::Int(2)).unwrap();
        let b = state.children_of(&Value::Int(3)).unwrap();
        assert_eq!(a.get().unwrap().to_vec(), vec![Value::Int(4), Value::Int(5)]);
        assert_eq!(b.get().unwrap().to_vec(), vec![Value::Int(6), Value::Int(7)]);
        assert!(state.is_leaf(&Value::Int(4)).unwrap());
        assert!(!state.is_leaf(&Value::Int(1)).unwrap());
        // the tree's own binding is untouched
        assert_eq!(state.top_level().to_vec(), vec![Value::Int(2), Value::Int(3)]);

        tree.destroy(root);
        assert_eq!(a.get().err(), Some(StaleInvocationError));
        assert_eq!(b.get().err(), Some(StaleInvocationError));
    }
}
