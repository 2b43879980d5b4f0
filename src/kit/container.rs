use std::sync::Arc;
use tern_core::expr::{CompiledExpression, InterpretedExpression};
use tern_core::reactive::{FlatCell, HotCell};
use tern_core::{
    DefineContext, ElementContext, InterpretContext, InterpretationError, Kind,
    ModelInstantiationError, ModelSet, ModelType, ModelValue, ValidationError, Value, ValueType,
};

/// An element that only groups its children, with an optional `title`.
///
/// Used for menu bars, menus, panels and tables.
pub struct Container;

pub struct ContainerDef {
    title: Option<Arc<dyn CompiledExpression>>,
}

pub struct ContainerInterp {
    title: Option<Arc<dyn InterpretedExpression>>,
}

pub struct ContainerState {
    title: HotCell<Value>,
}

impl ContainerState {
    /// The title, or unit if there is none.
    pub fn title(&self) -> FlatCell<Value> {
        self.title.view()
    }

    fn bind(&self, interp: &ContainerInterp, models: &ModelSet) -> Result<(), ModelInstantiationError> {
        let title = match &interp.title {
            Some(title) => title,
            None => return Ok(()),
        };
        match title.instantiate().get(models)? {
            ModelValue::Value(value) => {
                self.title.swap(value, None);
                Ok(())
            }
            ModelValue::List(_) => Err(ModelInstantiationError::ShapeMismatch("title".into())),
        }
    }
}

impl Kind for Container {
    type Definition = ContainerDef;
    type Interpreted = ContainerInterp;
    type State = ContainerState;

    fn define(&self, cx: &mut DefineContext) -> Result<ContainerDef, ValidationError> {
        Ok(ContainerDef {
            title: cx.expression("title")?,
        })
    }

    fn interpret(
        &self,
        def: &ContainerDef,
        cx: &mut InterpretContext,
    ) -> Result<ContainerInterp, InterpretationError> {
        let title = match &def.title {
            Some(title) => Some(cx.interpret(title, &ModelType::Value(ValueType::Str))?),
            None => None,
        };
        Ok(ContainerInterp { title })
    }

    fn create(&self, _: &ContainerInterp, _: &ElementContext) -> ContainerState {
        ContainerState {
            title: HotCell::constant(Value::Unit),
        }
    }

    fn update(
        &self,
        state: &mut ContainerState,
        interp: &ContainerInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        match cx.models() {
            Some(models) => state.bind(interp, models),
            None => Ok(()),
        }
    }

    fn instantiate(
        &self,
        state: &mut ContainerState,
        interp: &ContainerInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        state.bind(interp, cx.require_models()?)
    }

    fn destroy(&self, state: &mut ContainerState) {
        state.title.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit;
    use tern_core::expr::Expression;
    use tern_core::reactive::Observable;
    use tern_core::{
        DefinitionLoader, ElementTree, Env, InterpretationError, Interpreter, ParsedNode,
    };

    #[test]
    fn titles() {
        let mut loader = DefinitionLoader::new(kit::registry());
        let def = loader
            .load(
                &ParsedNode::new("menu-bar")
                    .child(ParsedNode::new("menu").attr("title", "Edit"))
                    .child(ParsedNode::new("menu")),
            )
            .unwrap();
        let interp = Interpreter::new().interpret(&def, &Env::root()).unwrap();
        let mut tree = ElementTree::new();
        let root = tree.set_root(&interp).unwrap();
        tree.instantiate(root, &ModelSet::root()).unwrap();

        let menus = tree.children(root).unwrap();
        let title = |id| tree.state::<Container>(id).unwrap().title().get();
        assert_eq!(title(menus[0]), Value::from("Edit"));
        assert_eq!(title(menus[1]), Value::Unit);
    }

    #[test]
    fn titles_must_be_text() {
        let mut loader = DefinitionLoader::new(kit::registry());
        let def = loader
            .load(&ParsedNode::new("panel").attr("title", Expression::literal(3i64)))
            .unwrap();
        let err = Interpreter::new().interpret(&def, &Env::root()).unwrap_err();
        assert!(matches!(err, InterpretationError::TypeMismatch { .. }));
    }
}
