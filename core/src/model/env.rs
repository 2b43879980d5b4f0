use super::{ModelComponentId, ModelType};
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A unique identifier for an environment frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(Uuid);

/// How a declared name gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Provided by the declaring element when it is instantiated.
    Static,
    /// Bound from outside, per invocation.
    Dynamic,
}

/// A name in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: ModelComponentId,
    pub model_type: ModelType,
    pub binding: Binding,
}

struct EnvFrame {
    id: EnvId,
    parent: Option<Env>,
    entries: HashMap<Arc<str>, Declaration>,
}

/// The interpretation environment: which model names are in scope, and their types.
///
/// Environments are immutable; a child is built on top of a parent with [`Env::builder`].
#[derive(Clone)]
pub struct Env {
    frame: Arc<EnvFrame>,
}

impl Env {
    /// An empty environment.
    pub fn root() -> Env {
        Env {
            frame: Arc::new(EnvFrame {
                id: EnvId(Uuid::new_v4()),
                parent: None,
                entries: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> EnvId {
        self.frame.id
    }

    /// Starts a child frame.
    pub fn builder(&self) -> EnvBuilder {
        EnvBuilder {
            parent: self.clone(),
            entries: HashMap::new(),
        }
    }

    /// Looks up a name, innermost frame first.
    pub fn resolve(&self, name: &str) -> Option<&Declaration> {
        let mut env = self;
        loop {
            if let Some(decl) = env.frame.entries.get(name) {
                return Some(decl);
            }
            env = env.frame.parent.as_ref()?;
        }
    }

    /// Declarations made in this frame.
    pub fn local(&self) -> impl Iterator<Item = &Declaration> + '_ {
        self.frame.entries.values()
    }

    pub fn parent(&self) -> Option<&Env> {
        self.frame.parent.as_ref()
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame)
    }

    /// Whether both environments declare exactly the same things.
    ///
    /// Rebuilding a frame from unchanged declarations gives a different object but the same scope.
    pub fn same_scope(&self, other: &Env) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.frame.entries != other.frame.entries {
            return false;
        }
        match (&self.frame.parent, &other.frame.parent) {
            (Some(a), Some(b)) => a.same_scope(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<_> = self.frame.entries.keys().collect();
        names.sort();
        f.debug_struct("Env")
            .field("local", &names)
            .field("parent", &self.frame.parent)
            .finish()
    }
}

/// Builds a child environment frame.
pub struct EnvBuilder {
    parent: Env,
    entries: HashMap<Arc<str>, Declaration>,
}

impl EnvBuilder {
    pub fn declare(&mut self, id: ModelComponentId, model_type: ModelType, binding: Binding) -> &mut Self {
        self.entries.insert(
            id.name_arc(),
            Declaration {
                id,
                model_type,
                binding,
            },
        );
        self
    }

    pub fn declare_static(&mut self, id: ModelComponentId, model_type: ModelType) -> &mut Self {
        self.declare(id, model_type, Binding::Static)
    }

    pub fn declare_dynamic(&mut self, id: ModelComponentId, model_type: ModelType) -> &mut Self {
        self.declare(id, model_type, Binding::Dynamic)
    }

    /// The environment declared so far, for resolving later declarations against.
    pub fn snapshot(&self) -> Env {
        if self.entries.is_empty() {
            return self.parent.clone();
        }
        Env {
            frame: Arc::new(EnvFrame {
                id: EnvId(Uuid::new_v4()),
                parent: Some(self.parent.clone()),
                entries: self.entries.clone(),
            }),
        }
    }

    /// Finishes the frame. A frame that declares nothing is the parent itself.
    pub fn build(self) -> Env {
        if self.entries.is_empty() {
            return self.parent;
        }
        Env {
            frame: Arc::new(EnvFrame {
                id: EnvId(Uuid::new_v4()),
                parent: Some(self.parent),
                entries: self.entries,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    #[test]
    fn child_frames_shadow() {
        let outer = ModelComponentId::new("x");
        let inner = ModelComponentId::new("x");
        let mut b = Env::root().builder();
        b.declare_static(outer.clone(), ModelType::Value(ValueType::Int));
        let parent = b.build();
        let mut b = parent.builder();
        b.declare_dynamic(inner.clone(), ModelType::Value(ValueType::Str));
        let child = b.build();

        assert_eq!(child.resolve("x").map(|d| &d.id), Some(&inner));
        assert_eq!(parent.resolve("x").map(|d| &d.id), Some(&outer));
        assert!(child.resolve("y").is_none());
    }

    #[test]
    fn empty_frames_are_the_parent() {
        let root = Env::root();
        assert!(root.builder().build().ptr_eq(&root));
    }

    #[test]
    fn rebuilt_frames_are_the_same_scope() {
        let root = Env::root();
        let id = ModelComponentId::new("row");
        let build = |ty| {
            let mut b = root.builder();
            b.declare_dynamic(id.clone(), ModelType::Value(ty));
            b.build()
        };
        let a = build(ValueType::Int);
        let b = build(ValueType::Int);
        let c = build(ValueType::Str);
        assert!(!a.ptr_eq(&b));
        assert!(a.same_scope(&b));
        assert!(!a.same_scope(&c));
    }
}
