use super::{ModelComponentId, ModelSet, ModelValue};
use crate::error::{ElementError, ModelInstantiationError, StaleInvocationError};
use crate::expr::Instantiator;
use core::fmt;
use tracing::trace;

/// One evaluation of a template against its own slot bindings.
///
/// The invocation owns a fork of the template’s model set. Bindings made here are invisible to
/// the template and to every other invocation. The fork is released when the invocation is
/// dropped, unless it was [retained](Invocation::retain).
pub struct Invocation {
    models: ModelSet,
    retained: bool,
}

impl Invocation {
    /// Forks the template’s model set.
    ///
    /// Fails if the template has already been torn down.
    pub fn new(template: &ModelSet) -> Result<Invocation, StaleInvocationError> {
        if !template.is_alive() {
            return Err(StaleInvocationError);
        }
        Ok(Invocation {
            models: template.fork(),
            retained: false,
        })
    }

    /// Binds a slot for this invocation only.
    pub fn bind(&self, id: &ModelComponentId, value: ModelValue) -> Result<&Self, ModelInstantiationError> {
        self.models.bind(id, value)?;
        Ok(self)
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    /// Evaluates an instantiated expression in this invocation.
    pub fn evaluate(&self, instantiator: &dyn Instantiator) -> Result<ModelValue, ElementError> {
        if !self.models.is_alive() {
            return Err(StaleInvocationError.into());
        }
        match instantiator.get(&self.models) {
            Ok(value) => Ok(value),
            // the template went away while we were evaluating
            Err(ModelInstantiationError::Released) => Err(StaleInvocationError.into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Keeps the fork alive beyond this invocation, for as long as the returned handle lives.
    pub fn retain(mut self) -> RetainedFork {
        self.retained = true;
        RetainedFork {
            models: self.models.clone(),
        }
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        if !self.retained {
            self.models.release();
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Invocation").field(&self.models).finish()
    }
}

/// A fork kept alive past its invocation.
///
/// Released when dropped, or earlier with [`RetainedFork::release`]; also goes stale when the
/// template it was forked from is released.
pub struct RetainedFork {
    models: ModelSet,
}

impl RetainedFork {
    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub fn is_alive(&self) -> bool {
        self.models.is_alive()
    }

    pub fn release(&self) {
        trace!("releasing retained fork");
        self.models.release();
    }
}

impl Drop for RetainedFork {
    fn drop(&mut self) {
        self.models.release();
    }
}

impl fmt::Debug for RetainedFork {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("RetainedFork").field(&self.models).finish()
    }
}

/// A value derived in a retained fork; valid exactly as long as the fork.
#[derive(Debug)]
pub struct Retained<V> {
    value: V,
    fork: RetainedFork,
}

impl<V> Retained<V> {
    pub fn new(value: V, fork: RetainedFork) -> Retained<V> {
        Retained { value, fork }
    }

    /// The derived value, unless its bindings have gone away.
    pub fn get(&self) -> Result<&V, StaleInvocationError> {
        if self.fork.is_alive() {
            Ok(&self.value)
        } else {
            Err(StaleInvocationError)
        }
    }

    pub fn fork(&self) -> &RetainedFork {
        &self.fork
    }

    pub fn release(&self) {
        self.fork.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Shape;
    use crate::reactive::Constant;
    use crate::value::Value;

    struct Read(ModelComponentId);

    impl Instantiator for Read {
        fn get(&self, models: &ModelSet) -> Result<ModelValue, ModelInstantiationError> {
            models.get(&self.0)
        }
    }

    fn template() -> (ModelSet, ModelComponentId) {
        let models = ModelSet::root();
        let node = ModelComponentId::new("node");
        models.declare_slot(node.clone(), Shape::Value).unwrap();
        (models, node)
    }

    #[test]
    fn concurrent_invocations_are_isolated() {
        let (models, node) = template();
        let read = Read(node.clone());

        let a = Invocation::new(&models).unwrap();
        a.bind(&node, ModelValue::Value(Constant::shared("A".into())))
            .unwrap();
        let b = Invocation::new(&models).unwrap();
        b.bind(&node, ModelValue::Value(Constant::shared("B".into())))
            .unwrap();

        let in_a = a.evaluate(&read).unwrap();
        let in_b = b.evaluate(&read).unwrap();
        assert_eq!(in_a.snapshot(), Value::from("A"));
        assert_eq!(in_b.snapshot(), Value::from("B"));

        // the template itself never saw either binding
        assert!(models.get(&node).is_err());
    }

    #[test]
    fn dropping_an_invocation_releases_its_fork() {
        let (models, node) = template();
        let fork = {
            let invocation = Invocation::new(&models).unwrap();
            invocation
                .bind(&node, ModelValue::Value(Constant::shared(Value::Int(1))))
                .unwrap();
            invocation.models().clone()
        };
        assert!(!fork.is_alive());
        assert!(models.is_alive());
    }

    #[test]
    fn retained_values_go_stale_with_the_template() {
        let (models, node) = template();
        let invocation = Invocation::new(&models).unwrap();
        invocation
            .bind(&node, ModelValue::Value(Constant::shared(Value::Int(7))))
            .unwrap();
        let value = invocation.evaluate(&Read(node.clone())).unwrap();
        let retained = Retained::new(value, invocation.retain());

        assert_eq!(retained.get().unwrap().snapshot(), Value::Int(7));
        models.release();
        assert_eq!(retained.get().unwrap_err(), StaleInvocationError);
        assert!(Invocation::new(&models).is_err());
    }

    #[test]
    fn evaluating_after_release_is_stale() {
        let (models, node) = template();
        let invocation = Invocation::new(&models).unwrap();
        models.release();
        let err = invocation.evaluate(&Read(node)).unwrap_err();
        assert_eq!(err, ElementError::Stale(StaleInvocationError));
    }
}
