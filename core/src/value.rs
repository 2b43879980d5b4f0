//! Model values and their types.

use core::fmt;
use std::sync::Arc;

/// A value in the model world.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<[Value]>),
}

impl Value {
    /// The most specific type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::List(items) => {
                let mut elem = None;
                for item in items.iter() {
                    let ty = item.value_type();
                    elem = match elem {
                        None => Some(ty),
                        Some(prev) if prev == ty => Some(prev),
                        Some(_) => Some(ValueType::Any),
                    };
                }
                ValueType::List(Box::new(elem.unwrap_or(ValueType::Any)))
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The type of a model value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accepts any value.
    Any,
    Unit,
    Bool,
    Int,
    Float,
    Str,
    List(Box<ValueType>),
}

impl ValueType {
    pub fn list_of(elem: ValueType) -> ValueType {
        ValueType::List(Box::new(elem))
    }

    /// Whether a value of type `other` may be stored where `self` is expected.
    pub fn is_assignable_from(&self, other: &ValueType) -> bool {
        match (self, other) {
            (ValueType::Any, _) => true,
            (ValueType::Float, ValueType::Int) => true,
            (ValueType::List(a), ValueType::List(b)) => a.is_assignable_from(b),
            (a, b) => a == b,
        }
    }

    /// The element type if this is a list type.
    pub fn element(&self) -> Option<&ValueType> {
        match self {
            ValueType::List(elem) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "any"),
            ValueType::Unit => write!(f, "unit"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::Str => write!(f, "string"),
            ValueType::List(elem) => write!(f, "list<{}>", elem),
        }
    }
}
