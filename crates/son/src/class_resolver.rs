use crate::environment::{env_get, EnvRef};
use crate::signal::SonError;
use crate::value::Value;

/// The class name looked up in the environment chain for each runtime shape.
/// `Bridge` is intentionally absent: callers bypass class resolution for
/// bridge receivers and dispatch to the bridge's own table.
fn class_name_for(value: &Value) -> &'static str {
    match value {
        Value::Null => "UndefinedObject",
        Value::Number(_) => "Number",
        Value::Str(_) => "String",
        Value::Boolean(_) => "Boolean",
        Value::Symbol(_) => "Symbol",
        Value::Block(_) => "BlockClosure",
        Value::Array(_) | Value::Object(_) | Value::Bridge(_) => "Object",
        Value::Class(_) => unreachable!("Class values resolve to themselves, see resolve_class"),
    }
}

/// Looks `name` up through `env`'s chain, returning it only if it is bound to a
/// `ClassTable` (i.e. `Value::Class`).
pub fn lookup_class_in_chain(env: &EnvRef, name: &str) -> Option<EnvRef> {
    match env_get(env, name) {
        Ok(Value::Class(class_env)) => Some(class_env),
        _ => None,
    }
}

/// Resolves the `ClassTable` to dispatch a message against.
///
/// An `Environment` value used directly as a receiver (e.g. `$env`) resolves to
/// itself. Every other shape resolves to its named class, falling back to
/// `Object` when that specific class is absent; absence of `Object` itself is
/// fatal.
pub fn resolve_class(value: &Value, env: &EnvRef) -> Result<EnvRef, SonError> {
    if let Value::Class(class_env) = value {
        return Ok(class_env.clone());
    }

    let class_name = class_name_for(value);
    if let Some(class_env) = lookup_class_in_chain(env, class_name) {
        return Ok(class_env);
    }
    lookup_class_in_chain(env, "Object").ok_or_else(|| {
        SonError::Semantic(format!(
            "no class table for {class_name} and no Object fallback is bound in this environment"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{create_child, env_set, new_class_table, new_root};

    #[test]
    fn falls_back_to_object_when_specific_class_absent() {
        let root = new_root();
        let object_class = new_class_table();
        env_set(&root, "Object", Value::Class(object_class.clone()));

        let resolved = resolve_class(&Value::Number(1.0), &root).unwrap();
        assert!(std::rc::Rc::ptr_eq(&resolved, &object_class));
    }

    #[test]
    fn uses_specific_class_when_present() {
        let root = new_root();
        let object_class = new_class_table();
        let number_class = new_class_table();
        env_set(&root, "Object", Value::Class(object_class));
        env_set(&root, "Number", Value::Class(number_class.clone()));

        let resolved = resolve_class(&Value::Number(1.0), &root).unwrap();
        assert!(std::rc::Rc::ptr_eq(&resolved, &number_class));
    }

    #[test]
    fn missing_object_fallback_is_fatal() {
        let root = new_root();
        assert!(resolve_class(&Value::Null, &root).is_err());
    }

    #[test]
    fn class_values_resolve_to_themselves() {
        let root = new_root();
        let child_scope = create_child(&root, false, None);
        let resolved = resolve_class(&Value::Class(child_scope.clone()), &root).unwrap();
        assert!(std::rc::Rc::ptr_eq(&resolved, &child_scope));
    }
}
