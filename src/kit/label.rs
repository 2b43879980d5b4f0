use std::sync::Arc;
use tern_core::expr::{CompiledExpression, InterpretedExpression};
use tern_core::reactive::{FlatCell, HotCell};
use tern_core::{
    DefineContext, ElementContext, InterpretContext, InterpretationError, Kind,
    ModelInstantiationError, ModelSet, ModelType, ModelValue, Shape, ValidationError, Value,
    ValueType,
};
use tracing::debug;

/// A piece of text, or anything else with a single value: `<item value=…>`, `<label value=…>`.
pub struct Label;

pub struct LabelDef {
    value: Arc<dyn CompiledExpression>,
}

pub struct LabelInterp {
    value: Arc<dyn InterpretedExpression>,
}

pub struct LabelState {
    value: HotCell<Value>,
    value_type: ValueType,
}

impl LabelState {
    /// The label’s value; stays valid across updates.
    pub fn value(&self) -> FlatCell<Value> {
        self.value.view()
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    fn bind(&self, interp: &LabelInterp, models: &ModelSet) -> Result<(), ModelInstantiationError> {
        match interp.value.instantiate().get(models)? {
            ModelValue::Value(value) => {
                self.value.swap(value, None);
                Ok(())
            }
            ModelValue::List(_) => Err(ModelInstantiationError::ShapeMismatch("value".into())),
        }
    }
}

impl Kind for Label {
    type Definition = LabelDef;
    type Interpreted = LabelInterp;
    type State = LabelState;

    fn define(&self, cx: &mut DefineContext) -> Result<LabelDef, ValidationError> {
        Ok(LabelDef {
            value: cx.require_expression("value")?,
        })
    }

    fn interpret(&self, def: &LabelDef, cx: &mut InterpretContext) -> Result<LabelInterp, InterpretationError> {
        Ok(LabelInterp {
            value: cx.interpret(&def.value, &ModelType::any(Shape::Value))?,
        })
    }

    fn create(&self, interp: &LabelInterp, _: &ElementContext) -> LabelState {
        LabelState {
            value: HotCell::constant(Value::Unit),
            value_type: interp.value.model_type().value_type().clone(),
        }
    }

    fn update(
        &self,
        state: &mut LabelState,
        interp: &LabelInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        let value_type = interp.value.model_type().value_type();
        if *value_type != state.value_type {
            // observers of the old cell expect the old type
            debug!(id = %cx.id(), from = %state.value_type, to = %value_type, "label type changed");
            state.value.release();
            state.value = HotCell::constant(Value::Unit);
            state.value_type = value_type.clone();
        }
        match cx.models() {
            Some(models) => state.bind(interp, models),
            None => Ok(()),
        }
    }

    fn instantiate(
        &self,
        state: &mut LabelState,
        interp: &LabelInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        state.bind(interp, cx.require_models()?)
    }

    fn destroy(&self, state: &mut LabelState) {
        state.value.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit;
    use parking_lot::Mutex;
    use tern_core::expr::Expression;
    use tern_core::reactive::{Cell, ChangeEvent, Observable};
    use tern_core::{DefinitionLoader, ElementTree, Env, Interpreter, ModelComponentId, ParsedNode};

    struct Fixture {
        loader: DefinitionLoader,
        interpreter: Interpreter,
        tree: ElementTree,
        id: ModelComponentId,
        models: ModelSet,
    }

    impl Fixture {
        fn new(initial: Value) -> (Fixture, Cell<Value>) {
            let id = ModelComponentId::new("title");
            let models = ModelSet::root();
            let cell = Cell::new(initial);
            models.insert(id.clone(), ModelValue::Value(cell.shared())).unwrap();
            let fixture = Fixture {
                loader: DefinitionLoader::new(kit::registry()),
                interpreter: Interpreter::new(),
                tree: ElementTree::new(),
                id,
                models,
            };
            (fixture, cell)
        }

        fn load(&mut self, value_type: ValueType) -> tern_core::ElementId {
            let mut env = Env::root().builder();
            env.declare_static(self.id.clone(), ModelType::Value(value_type));
            // a fresh environment every time, so every load reinterprets
            env.declare_static(ModelComponentId::new("generation"), ModelType::Value(ValueType::Int));
            let node = ParsedNode::new("label").attr("value", Expression::reference("title"));
            let def = self.loader.load(&node).unwrap();
            let interp = self.interpreter.interpret(&def, &env.build()).unwrap();
            let root = self.tree.set_root(&interp).unwrap();
            if self.tree.models(root).is_none() {
                self.tree.instantiate(root, &self.models).unwrap();
            }
            root
        }
    }

    #[test]
    fn cells_survive_updates_of_the_same_type() {
        let (mut fx, cell) = Fixture::new(Value::from("a"));
        let root = fx.load(ValueType::Str);
        let view = fx.tree.state::<Label>(root).unwrap().value();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let _sub = view.subscribe(Arc::new(move |event: &ChangeEvent<Value>| {
            seen2.lock().push(event.new.clone());
        }));

        assert_eq!(fx.load(ValueType::Str), root);
        cell.set(Value::from("b"), None);
        assert_eq!(view.get(), Value::from("b"));
        assert_eq!(seen.lock().last(), Some(&Value::from("b")));
    }

    #[test]
    fn cells_are_reallocated_when_the_type_changes() {
        let (mut fx, _cell) = Fixture::new(Value::from("a"));
        let root = fx.load(ValueType::Str);
        let old = fx.tree.state::<Label>(root).unwrap().value();

        fx.load(ValueType::Any);
        let state = fx.tree.state::<Label>(root).unwrap();
        assert_eq!(state.value_type(), &ValueType::Any);
        assert_eq!(state.value().get(), Value::from("a"));
        assert_ne!(old.identity(), state.value().identity());
    }
}
