use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::signal::SonError;
use crate::value::Value;

/// A method body, either SON-defined or routed to the primitive table.
#[derive(Clone)]
pub enum MethodImpl {
    Son {
        selector: String,
        arg_names: Vec<String>,
        body: serde_json::Value,
    },
    Primitive(crate::primitives::PrimitiveTag),
}

/// One node in the lexical scope chain.
pub struct EnvironmentData {
    bindings: IndexMap<String, Value>,
    methods: IndexMap<String, MethodImpl>,
    parent: Option<EnvRef>,
    is_method_context: bool,
    method_self: Option<Value>,
}

/// Environments are shared, mutable, and referenced from multiple places at once
/// (blocks capture them, method activations chain through them), so they are
/// heap nodes behind an `Rc<RefCell<_>>` rather than arena-indexed slots.
pub type EnvRef = Rc<RefCell<EnvironmentData>>;

/// Creates the root environment: no parent, not a method context.
pub fn new_root() -> EnvRef {
    Rc::new(RefCell::new(EnvironmentData {
        bindings: IndexMap::new(),
        methods: IndexMap::new(),
        parent: None,
        is_method_context: false,
        method_self: None,
    }))
}

/// Creates a fresh class table: an environment with no parent whose `methods`
/// map is the class's dispatch table.
pub fn new_class_table() -> EnvRef {
    new_root()
}

/// Creates a child scope of `parent`. When `method_self` is present, `self` is
/// pre-bound in the child's bindings.
pub fn create_child(parent: &EnvRef, is_method_context: bool, method_self: Option<Value>) -> EnvRef {
    let mut bindings = IndexMap::new();
    if let Some(value) = &method_self {
        bindings.insert("self".to_string(), value.clone());
    }
    Rc::new(RefCell::new(EnvironmentData {
        bindings,
        methods: IndexMap::new(),
        parent: Some(parent.clone()),
        is_method_context,
        method_self,
    }))
}

/// Looks `name` up: local then parent, no mutation.
pub fn env_get(env: &EnvRef, name: &str) -> Result<Value, SonError> {
    let mut current = env.clone();
    loop {
        let next_parent = {
            let data = current.borrow();
            if let Some(value) = data.bindings.get(name) {
                return Ok(value.clone());
            }
            data.parent.clone()
        };
        match next_parent {
            Some(parent) => current = parent,
            None => return Err(SonError::VariableNotFound(name.to_string())),
        }
    }
}

/// Sets `name` locally; assignment never walks the parent chain. Creates the
/// binding if it does not already exist locally.
pub fn env_set(env: &EnvRef, name: &str, value: Value) {
    env.borrow_mut().bindings.insert(name.to_string(), value);
}

/// Installs a method into the local method table only — there is no
/// per-instance method storage, only class tables.
pub fn define_method(env: &EnvRef, selector: String, arg_names: Vec<String>, body: serde_json::Value) {
    env.borrow_mut().methods.insert(
        selector.clone(),
        MethodImpl::Son { selector, arg_names, body },
    );
}

/// Installs an already-constructed `MethodImpl` (used by the image loader when
/// loading a `{primitive: tag}` method body straight from the store).
pub fn install_method(env: &EnvRef, selector: String, method: MethodImpl) {
    env.borrow_mut().methods.insert(selector, method);
}

pub fn lookup_method_locally(env: &EnvRef, selector: &str) -> Option<MethodImpl> {
    env.borrow().methods.get(selector).cloned()
}

pub fn is_method_context(env: &EnvRef) -> bool {
    env.borrow().is_method_context
}

pub fn method_self(env: &EnvRef) -> Option<Value> {
    env.borrow().method_self.clone()
}

pub fn parent_of(env: &EnvRef) -> Option<EnvRef> {
    env.borrow().parent.clone()
}

/// Walks `env` and its ancestors, returning the nearest environment (possibly
/// `env` itself) with `isMethodContext == true`. Used both to find a block's
/// `homeContext` at creation time and to find the target of a non-local return.
pub fn nearest_method_context(env: &EnvRef) -> Option<EnvRef> {
    let mut current = env.clone();
    loop {
        if current.borrow().is_method_context {
            return Some(current);
        }
        match parent_of(&current) {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_binding_shadows_parent_but_does_not_mutate_it() {
        let root = new_root();
        env_set(&root, "x", Value::Number(10.0));
        let child = create_child(&root, false, None);
        env_set(&child, "x", Value::Number(99.0));

        assert_eq!(env_get(&child, "x").unwrap(), Value::Number(99.0));
        assert_eq!(env_get(&root, "x").unwrap(), Value::Number(10.0));
    }

    #[test]
    fn get_falls_through_to_parent_when_absent_locally() {
        let root = new_root();
        env_set(&root, "x", Value::Number(1.0));
        let child = create_child(&root, false, None);
        assert_eq!(env_get(&child, "x").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn missing_variable_reports_its_name() {
        let root = new_root();
        match env_get(&root, "missing") {
            Err(SonError::VariableNotFound(name)) => assert_eq!(name, "missing"),
            other => panic!("expected VariableNotFound, got {other:?}"),
        }
    }

    #[test]
    fn nearest_method_context_walks_up_through_non_method_frames() {
        let root = new_root();
        let method_env = create_child(&root, true, Some(Value::Null));
        let block_env = create_child(&method_env, false, None);
        let nested = create_child(&block_env, false, None);

        let found = nearest_method_context(&nested).unwrap();
        assert!(Rc::ptr_eq(&found, &method_env));
    }

    #[test]
    fn nearest_method_context_is_none_at_top_level() {
        let root = new_root();
        assert!(nearest_method_context(&root).is_none());
    }
}
