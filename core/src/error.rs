//! Error types.
//!
//! Every stage has its own error type; [`ElementError`] wraps them for operations on the element
//! tree. Errors are cheap to clone so that a failed element can keep its error around as
//! placeholder content.

use crate::lifecycle::Phase;
use crate::model::ModelType;
use crate::tree::ElementId;
use std::sync::Arc;
use thiserror::Error;

/// A write to an observable that can’t be written to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value is not settable: {reason}")]
pub struct NotSettable {
    reason: Arc<str>,
}

impl NotSettable {
    pub fn new(reason: &str) -> NotSettable {
        NotSettable {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Definition stage errors: the configuration of an element is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("<{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        element: Arc<str>,
        attribute: Arc<str>,
    },

    #[error("<{element}> attribute `{attribute}` should be {expected}")]
    BadAttribute {
        element: Arc<str>,
        attribute: Arc<str>,
        expected: &'static str,
    },

    #[error("unknown element type <{0}>")]
    UnknownType(Arc<str>),

    #[error("<{element}>: {message}")]
    Kind {
        element: Arc<str>,
        message: Arc<str>,
    },
}

/// Interpretation stage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretationError {
    #[error("type mismatch in `{source_text}`: expected {expected}, found {found}")]
    TypeMismatch {
        source_text: Arc<str>,
        expected: ModelType,
        found: ModelType,
    },

    #[error("unresolved model reference `{0}`")]
    UnresolvedReference(Arc<str>),

    #[error("invalid definition: {0}")]
    InvalidDefinition(#[from] ValidationError),

    #[error("{0}")]
    Kind(Arc<str>),
}

/// Instance stage errors: a model set couldn’t provide what an element needed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelInstantiationError {
    #[error("model slot `{0}` is not bound")]
    UnboundSlot(Arc<str>),

    #[error("model slot `{0}` is not declared")]
    UnknownSlot(Arc<str>),

    #[error("model slot `{0}` was bound to a value of the wrong shape")]
    ShapeMismatch(Arc<str>),

    #[error("model set has been released")]
    Released,

    #[error("instantiation failed: {0}")]
    Failed(Arc<str>),
}

/// Evaluation in an invocation fork whose bindings are no longer valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invocation is no longer valid")]
pub struct StaleInvocationError;

/// Errors from operations on the element tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Interpretation(#[from] InterpretationError),

    #[error(transparent)]
    Instantiation(#[from] ModelInstantiationError),

    #[error(transparent)]
    Stale(#[from] StaleInvocationError),

    #[error("no such element: {0}")]
    NoSuchElement(ElementId),

    #[error("element {0} was handed an interpretation of a different definition")]
    WrongInterpretation(ElementId),

    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    Lifecycle { from: Phase, to: Phase },

    #[error("element {0} has not been instantiated")]
    NotInstantiated(ElementId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = ValidationError::MissingAttribute {
            element: "item".into(),
            attribute: "value".into(),
        };
        assert_eq!(err.to_string(), "<item> is missing required attribute `value`");

        let wrapped: ElementError = InterpretationError::from(err.clone()).into();
        assert_eq!(
            wrapped.to_string(),
            "invalid definition: <item> is missing required attribute `value`"
        );
        assert_eq!(
            ElementError::from(StaleInvocationError).to_string(),
            "invocation is no longer valid"
        );
    }
}
