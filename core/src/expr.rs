//! Expressions.
//!
//! The three traits here are how the engine talks to an expression compiler: a
//! [`CompiledExpression`] is checked against an [`Env`] and yields an [`InterpretedExpression`],
//! which in turn can be instantiated into any number of [`Instantiator`]s that produce live model
//! values from a [`ModelSet`].
//!
//! [`Expression`] is a small built-in implementation covering literals, references to models in
//! scope, and plain functions over them.

use crate::error::{InterpretationError, ModelInstantiationError};
use crate::model::{Env, ModelComponentId, ModelSet, ModelType, ModelValue, Shape};
use crate::reactive::{Constant, DerivedList, Mapped};
use crate::value::{Value, ValueType};
use core::fmt;
use std::sync::Arc;

/// An expression that has been compiled but not yet checked against an environment.
pub trait CompiledExpression: fmt::Debug + Send + Sync {
    /// The source text, used for identity and error messages.
    fn source(&self) -> &str;

    /// Resolves references and checks the result against `target`.
    fn interpret(
        &self,
        target: &ModelType,
        env: &Env,
    ) -> Result<Arc<dyn InterpretedExpression>, InterpretationError>;
}

/// A type-checked expression.
pub trait InterpretedExpression: fmt::Debug + Send + Sync {
    /// The type the expression evaluates to.
    fn model_type(&self) -> &ModelType;

    /// Creates an evaluator for this expression.
    fn instantiate(&self) -> Box<dyn Instantiator>;
}

/// Produces a live model value from a model set.
pub trait Instantiator: Send + Sync {
    fn get(&self, models: &ModelSet) -> Result<ModelValue, ModelInstantiationError>;
}

type MapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
type CollectFn = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

#[derive(Clone)]
enum Node {
    Literal(Value),
    Reference(Arc<str>),
    Map {
        input: Arc<str>,
        output: ValueType,
        f: MapFn,
    },
    Collect {
        input: Arc<str>,
        element: ValueType,
        f: CollectFn,
    },
}

/// A built-in expression.
#[derive(Clone)]
pub struct Expression {
    source: Arc<str>,
    node: Node,
}

impl Expression {
    /// A constant.
    pub fn literal(value: impl Into<Value>) -> Expression {
        let value = value.into();
        let source = match &value {
            Value::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        };
        Expression {
            source: source.into(),
            node: Node::Literal(value),
        }
    }

    /// The model named `name`.
    pub fn reference(name: &str) -> Expression {
        Expression {
            source: name.into(),
            node: Node::Reference(name.into()),
        }
    }

    /// A function of the value named `input`.
    ///
    /// `label` stands in for the source text and is what identifies the expression.
    pub fn map(
        label: &str,
        input: &str,
        output: ValueType,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Expression {
        Expression {
            source: label.into(),
            node: Node::Map {
                input: input.into(),
                output,
                f: Arc::new(f),
            },
        }
    }

    /// A collection computed from the value named `input`.
    pub fn collect(
        label: &str,
        input: &str,
        element: ValueType,
        f: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    ) -> Expression {
        Expression {
            source: label.into(),
            node: Node::Collect {
                input: input.into(),
                element,
                f: Arc::new(f),
            },
        }
    }

    pub fn shared(self) -> Arc<dyn CompiledExpression> {
        Arc::new(self)
    }

    fn check(&self, target: &ModelType, found: ModelType) -> Result<ModelType, InterpretationError> {
        if target.is_assignable_from(&found) {
            Ok(found)
        } else {
            Err(InterpretationError::TypeMismatch {
                source_text: Arc::clone(&self.source),
                expected: target.clone(),
                found,
            })
        }
    }

    fn resolve_value(&self, env: &Env, name: &str) -> Result<ModelComponentId, InterpretationError> {
        let decl = env
            .resolve(name)
            .ok_or_else(|| InterpretationError::UnresolvedReference(name.into()))?;
        if decl.model_type.shape() != Shape::Value {
            return Err(InterpretationError::TypeMismatch {
                source_text: Arc::clone(&self.source),
                expected: ModelType::any(Shape::Value),
                found: decl.model_type.clone(),
            });
        }
        Ok(decl.id.clone())
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Expression({})", self.source)
    }
}

impl CompiledExpression for Expression {
    fn source(&self) -> &str {
        &self.source
    }

    fn interpret(
        &self,
        target: &ModelType,
        env: &Env,
    ) -> Result<Arc<dyn InterpretedExpression>, InterpretationError> {
        let (model_type, eval) = match &self.node {
            Node::Literal(value) => (
                self.check(target, ModelType::Value(value.value_type()))?,
                Eval::Literal(value.clone()),
            ),
            Node::Reference(name) => {
                let decl = env
                    .resolve(name)
                    .ok_or_else(|| InterpretationError::UnresolvedReference(Arc::clone(name)))?;
                (
                    self.check(target, decl.model_type.clone())?,
                    Eval::Reference(decl.id.clone()),
                )
            }
            Node::Map { input, output, f } => {
                let id = self.resolve_value(env, input)?;
                (
                    self.check(target, ModelType::Value(output.clone()))?,
                    Eval::Map(id, Arc::clone(f)),
                )
            }
            Node::Collect { input, element, f } => {
                let id = self.resolve_value(env, input)?;
                (
                    self.check(target, ModelType::List(element.clone()))?,
                    Eval::Collect(id, Arc::clone(f)),
                )
            }
        };
        Ok(Arc::new(Interpreted {
            source: Arc::clone(&self.source),
            model_type,
            eval,
        }))
    }
}

#[derive(Clone)]
enum Eval {
    Literal(Value),
    Reference(ModelComponentId),
    Map(ModelComponentId, MapFn),
    Collect(ModelComponentId, CollectFn),
}

struct Interpreted {
    source: Arc<str>,
    model_type: ModelType,
    eval: Eval,
}

impl fmt::Debug for Interpreted {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} : {}", self.source, self.model_type)
    }
}

impl InterpretedExpression for Interpreted {
    fn model_type(&self) -> &ModelType {
        &self.model_type
    }

    fn instantiate(&self) -> Box<dyn Instantiator> {
        Box::new(self.eval.clone())
    }
}

fn input_value(
    models: &ModelSet,
    id: &ModelComponentId,
) -> Result<crate::reactive::DynObservable<Value>, ModelInstantiationError> {
    match models.get(id)? {
        ModelValue::Value(v) => Ok(v),
        ModelValue::List(_) => Err(ModelInstantiationError::ShapeMismatch(id.name_arc())),
    }
}

impl Instantiator for Eval {
    fn get(&self, models: &ModelSet) -> Result<ModelValue, ModelInstantiationError> {
        Ok(match self {
            Eval::Literal(value) => ModelValue::Value(Constant::shared(value.clone())),
            Eval::Reference(id) => models.get(id)?,
            Eval::Map(id, f) => {
                let f = Arc::clone(f);
                ModelValue::Value(Mapped::new(input_value(models, id)?, move |v| f(v)).shared())
            }
            Eval::Collect(id, f) => {
                let f = Arc::clone(f);
                ModelValue::List(DerivedList::new(input_value(models, id)?, move |v| f(v)).shared())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;

    fn env_with(name: &str, ty: ModelType) -> (Env, ModelComponentId) {
        let id = ModelComponentId::new(name);
        let mut b = Env::root().builder();
        b.declare_static(id.clone(), ty);
        (b.build(), id)
    }

    #[test]
    fn references_resolve_and_follow_the_model() {
        let (env, id) = env_with("count", ModelType::Value(ValueType::Int));
        let expr = Expression::map("count + 1", "count", ValueType::Int, |v| {
            Value::Int(v.as_int().unwrap_or(0) + 1)
        });
        let interp = expr
            .interpret(&ModelType::Value(ValueType::Float), &env)
            .unwrap();
        assert_eq!(interp.model_type(), &ModelType::Value(ValueType::Int));

        let models = ModelSet::root();
        let count = Cell::new(Value::Int(1));
        models
            .insert(id, ModelValue::Value(count.shared()))
            .unwrap();
        let value = interp.instantiate().get(&models).unwrap();
        assert_eq!(value.snapshot(), Value::Int(2));
        count.set(Value::Int(41), None);
        assert_eq!(value.snapshot(), Value::Int(42));
    }

    #[test]
    fn unresolved_references() {
        let err = Expression::reference("missing")
            .interpret(&ModelType::any(Shape::Value), &Env::root())
            .unwrap_err();
        assert_eq!(err, InterpretationError::UnresolvedReference("missing".into()));
    }

    #[test]
    fn type_mismatches() {
        let err = Expression::literal("text")
            .interpret(&ModelType::Value(ValueType::Int), &Env::root())
            .unwrap_err();
        assert!(matches!(err, InterpretationError::TypeMismatch { .. }));

        let (env, _) = env_with("items", ModelType::List(ValueType::Str));
        let err = Expression::reference("items")
            .interpret(&ModelType::any(Shape::Value), &env)
            .unwrap_err();
        assert!(matches!(err, InterpretationError::TypeMismatch { .. }));
    }

    #[test]
    fn collect_produces_a_list() {
        let (env, id) = env_with("n", ModelType::Value(ValueType::Int));
        let expr = Expression::collect("0..n", "n", ValueType::Int, |v| {
            (0..v.as_int().unwrap_or(0)).map(Value::Int).collect()
        });
        let interp = expr.interpret(&ModelType::any(Shape::List), &env).unwrap();
        let models = ModelSet::root();
        models
            .insert(id, ModelValue::Value(Constant::shared(Value::Int(3))))
            .unwrap();
        let list = interp.instantiate().get(&models).unwrap();
        assert_eq!(list.as_list().unwrap().len(), 3);
    }
}
