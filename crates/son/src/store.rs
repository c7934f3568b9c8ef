use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::environment::{lookup_method_locally, EnvRef, MethodImpl};

/// One saved method definition. Primitives are never persisted — only
/// SON-defined method bodies, since primitives are host-provided and have no
/// JSON body to store.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRecord {
    pub id: Uuid,
    pub class_name: String,
    pub selector: String,
    pub arg_names: Vec<String>,
    pub body: serde_json::Value,
}

/// The persistence adapter sitting behind the image loader: a single-writer,
/// last-write-wins store of method definitions, keyed by `(class, selector)`.
/// A real backing store (e.g. HTTP + SQL) is an explicit external
/// collaborator outside this crate's scope; this trait is the seam an
/// embedder implements to talk to it.
pub trait MethodStore {
    /// Saves `body` as the new definition for `class_name#selector`, assigning
    /// a fresh id. A later `save` for the same selector always wins over an
    /// earlier one — there is no merge, no versioning beyond "latest".
    fn save(&self, class_name: &str, selector: &str, arg_names: &[String], body: &serde_json::Value) -> MethodRecord;

    fn latest(&self, class_name: &str, selector: &str) -> Option<MethodRecord>;

    fn all(&self) -> Vec<MethodRecord>;
}

/// An in-process `MethodStore`. Good enough for embedding and tests; a real
/// deployment backs this trait with a SQL table instead.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<(String, String), MethodRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MethodStore for InMemoryStore {
    fn save(&self, class_name: &str, selector: &str, arg_names: &[String], body: &serde_json::Value) -> MethodRecord {
        let record = MethodRecord {
            id: Uuid::new_v4(),
            class_name: class_name.to_string(),
            selector: selector.to_string(),
            arg_names: arg_names.to_vec(),
            body: body.clone(),
        };
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert((class_name.to_string(), selector.to_string()), record.clone());
        record
    }

    fn latest(&self, class_name: &str, selector: &str) -> Option<MethodRecord> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(&(class_name.to_string(), selector.to_string()))
            .cloned()
    }

    fn all(&self) -> Vec<MethodRecord> {
        self.records.lock().expect("store mutex poisoned").values().cloned().collect()
    }
}

/// Persists `selector` out of `class_env`'s local method table, if it has a SON
/// body. A primitive under that selector is a no-op: there is nothing to save.
pub fn persist_method(store: &dyn MethodStore, class_name: &str, class_env: &EnvRef, selector: &str) -> Option<MethodRecord> {
    match lookup_method_locally(class_env, selector)? {
        MethodImpl::Son { arg_names, body, .. } => Some(store.save(class_name, selector, &arg_names, &body)),
        MethodImpl::Primitive(_) => None,
    }
}

/// Reinstalls every record in `store` back into its class table. Used to
/// rehydrate an image whose method bodies were evolved and saved outside the
/// JSON blob `load_image` started from.
pub fn restore_methods(store: &dyn MethodStore, class_envs: &indexmap::IndexMap<String, EnvRef>) {
    for record in store.all() {
        if let Some(class_env) = class_envs.get(&record.class_name) {
            crate::environment::define_method(class_env, record.selector.clone(), record.arg_names.clone(), record.body.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{define_method, new_class_table};
    use serde_json::json;

    #[test]
    fn save_overwrites_previous_definition_for_same_selector() {
        let store = InMemoryStore::new();
        store.save("Number", "double:", &["x".to_string()], &json!(["$x"]));
        let second = store.save("Number", "double:", &["x".to_string()], &json!(["$x", "*", 2]));

        let latest = store.latest("Number", "double:").unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.body, json!(["$x", "*", 2]));
    }

    #[test]
    fn persist_method_skips_primitives() {
        let store = InMemoryStore::new();
        let class_env = new_class_table();
        crate::environment::install_method(
            &class_env,
            "classOf".to_string(),
            crate::environment::MethodImpl::Primitive(crate::primitives::PrimitiveTag::ClassOf),
        );
        assert!(persist_method(&store, "Object", &class_env, "classOf").is_none());
    }

    #[test]
    fn persist_and_restore_round_trip() {
        let store = InMemoryStore::new();
        let class_env = new_class_table();
        define_method(&class_env, "triple:".to_string(), vec!["x".to_string()], json!(["$x", "*", 3]));
        persist_method(&store, "Number", &class_env, "triple:").unwrap();

        let fresh_env = new_class_table();
        let mut class_envs = indexmap::IndexMap::new();
        class_envs.insert("Number".to_string(), fresh_env.clone());
        restore_methods(&store, &class_envs);

        assert!(crate::environment::lookup_method_locally(&fresh_env, "triple:").is_some());
    }
}
