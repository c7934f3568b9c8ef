use std::rc::Rc;

use crate::class_resolver::lookup_class_in_chain;
use crate::environment::{lookup_method_locally, EnvRef, MethodImpl};

/// Given a `ClassTable` and selector, returns the method to dispatch: the
/// class's own table first, then `Object`'s as a single-level fallback (there
/// is no deeper inheritance chain in this design).
pub fn lookup_method(lookup_env: &EnvRef, class_env: &EnvRef, selector: &str) -> Option<MethodImpl> {
    if let Some(method) = lookup_method_locally(class_env, selector) {
        return Some(method);
    }

    let object_env = lookup_class_in_chain(lookup_env, "Object")?;
    if Rc::ptr_eq(class_env, &object_env) {
        return None;
    }
    lookup_method_locally(&object_env, selector)
}
