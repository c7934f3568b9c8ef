use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::bridge::{Bridge, Transcript};
use crate::environment::{env_set, install_method, new_class_table, new_root, EnvRef, MethodImpl};
use crate::primitives::PrimitiveTag;
use crate::signal::SonError;
use crate::value::Value;

/// A loaded image: the root environment (global bindings plus every class
/// table) and the host bridge bound into it.
pub struct Image {
    pub root: EnvRef,
    pub bridge: Rc<Bridge>,
}

/// Loads a base environment from its JSON description.
///
/// Shape:
/// ```json
/// { "classes": { "Number": { "methods": { "+": {"primitive": "add"} } } },
///   "globals": { "Transcript": {"bridge": true} } }
/// ```
/// `"globals"` entries are either literal image data (see [`json_to_value`]) or
/// the reserved `{"bridge": true}` marker, which binds the interpreter's
/// [`Bridge`] under that name instead (defaulting to `"Transcript"` if no
/// marker is present).
pub fn load_image(source: &Json, transcript: Box<dyn Transcript>) -> Result<Image, SonError> {
    let root = new_root();
    let bridge = Bridge::new(transcript);

    let top = source
        .as_object()
        .ok_or_else(|| SonError::Semantic("image must be a JSON object".into()))?;

    let mut class_envs: IndexMap<String, EnvRef> = IndexMap::new();
    if let Some(classes) = top.get("classes") {
        let classes = classes
            .as_object()
            .ok_or_else(|| SonError::Semantic("\"classes\" must be a JSON object".into()))?;
        for name in classes.keys() {
            class_envs.insert(name.clone(), new_class_table());
        }
        for (name, spec) in classes {
            let class_env = class_envs[name].clone();
            let methods = spec
                .get("methods")
                .and_then(Json::as_object)
                .ok_or_else(|| SonError::Semantic(format!("class {name} is missing a \"methods\" object")))?;
            for (selector, method_spec) in methods {
                let method = parse_method_spec(selector, method_spec)?;
                install_method(&class_env, selector.clone(), method);
            }
        }
    }

    // Every other class falls back to Object; an image that defines no Object
    // at all can never dispatch anything.
    if !class_envs.contains_key("Object") {
        return Err(SonError::Semantic("image defines no Object class".into()));
    }

    for (name, env) in &class_envs {
        env_set(&root, name, Value::Class(env.clone()));
    }

    let globals = top.get("globals").and_then(Json::as_object);

    let bridge_name = globals
        .and_then(|g| g.iter().find(|(_, v)| v.get("bridge") == Some(&Json::Bool(true))))
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| "Transcript".to_string());
    env_set(&root, &bridge_name, Value::Bridge(bridge.clone()));

    if let Some(globals) = globals {
        for (name, spec) in globals {
            if spec.get("bridge") == Some(&Json::Bool(true)) {
                continue;
            }
            env_set(&root, name, json_to_value(spec)?);
        }
    }

    Ok(Image { root, bridge })
}

fn parse_method_spec(selector: &str, spec: &Json) -> Result<MethodImpl, SonError> {
    let obj = spec
        .as_object()
        .ok_or_else(|| SonError::Semantic(format!("method {selector} must be a JSON object")))?;

    if let Some(tag) = obj.get("primitive").and_then(Json::as_str) {
        return Ok(MethodImpl::Primitive(PrimitiveTag::parse(tag)?));
    }

    let arg_names = obj
        .get("argNames")
        .and_then(Json::as_array)
        .ok_or_else(|| SonError::Semantic(format!("method {selector} is missing \"argNames\"")))?
        .iter()
        .map(|n| {
            n.as_str()
                .map(str::to_string)
                .ok_or_else(|| SonError::Semantic(format!("method {selector}: argument names must be strings")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let body = obj
        .get("body")
        .cloned()
        .ok_or_else(|| SonError::Semantic(format!("method {selector} is missing \"body\"")))?;

    Ok(MethodImpl::Son {
        selector: selector.to_string(),
        arg_names,
        body,
    })
}

/// Converts literal image data into a runtime `Value`. This is distinct from
/// [`crate::evaluator::evaluate`]: image globals are data, never code, so a
/// JSON array here becomes a `Value::Array`, not an AST send.
pub fn json_to_value(node: &Json) -> Result<Value, SonError> {
    Ok(match node {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(
            n.as_f64()
                .ok_or_else(|| SonError::Semantic("non-finite number in image data".into()))?,
        ),
        Json::String(s) => Value::str(s.clone()),
        Json::Array(items) => {
            let values = items.iter().map(json_to_value).collect::<Result<Vec<_>, _>>()?;
            Value::Array(Rc::new(RefCell::new(values)))
        }
        Json::Object(map) if map.len() == 1 => match map.get("#").and_then(Json::as_str) {
            Some(name) => Value::symbol(name),
            None => return Err(SonError::Semantic("object literals in image data must be {\"#\": name} symbols".into())),
        },
        Json::Object(_) => {
            return Err(SonError::Semantic(
                "object literals in image data must be {\"#\": name} symbols".into(),
            ))
        }
    })
}

/// The interpreter's built-in base image: every class named in the class
/// resolution table, wired to the primitive table. Array accessors are bound
/// on `Object`'s table since `Array` has no class name of its own in the
/// resolution rules — misuse on a non-Array receiver still surfaces correctly
/// as an `ArgumentError` from the primitive itself.
pub fn default_base_environment_json() -> Json {
    serde_json::json!({
        "classes": {
            "Object": {
                "methods": {
                    "=": {"primitive": "equals"},
                    "~=": {"primitive": "notEquals"},
                    "==": {"primitive": "identityEquals"},
                    "~~": {"primitive": "identityNotEquals"},
                    "class": {"primitive": "classOf"},
                    "printString": {"primitive": "printString"},
                    "at:": {"primitive": "arrayAt"},
                    "at:put:": {"primitive": "arrayAtPut"},
                    "size": {"primitive": "arraySize"},
                    "do:": {"primitive": "arrayDo"}
                }
            },
            "Number": {
                "methods": {
                    "+": {"primitive": "add"},
                    "-": {"primitive": "subtract"},
                    "*": {"primitive": "multiply"},
                    "/": {"primitive": "divide"},
                    "<": {"primitive": "less"},
                    ">": {"primitive": "greater"},
                    "<=": {"primitive": "lessOrEqual"},
                    ">=": {"primitive": "greaterOrEqual"},
                    "=": {"primitive": "numEquals"},
                    "printString": {"primitive": "numToString"},
                    "timesRepeat:": {"primitive": "timesRepeat"},
                    "to:do:": {"primitive": "toDo"}
                }
            },
            "Boolean": {
                "methods": {
                    "&": {"primitive": "and"},
                    "|": {"primitive": "or"},
                    "not": {"primitive": "not"},
                    "ifTrue:": {"primitive": "ifTrue"},
                    "ifFalse:": {"primitive": "ifFalse"},
                    "ifTrue:ifFalse:": {"primitive": "ifTrueIfFalse"}
                }
            },
            "String": {
                "methods": {
                    ",": {"primitive": "stringConcat"},
                    "length": {"primitive": "stringLength"},
                    "=": {"primitive": "stringEquals"}
                }
            },
            "Symbol": {
                "methods": {
                    "printString": {"primitive": "symbolToString"},
                    "=": {"primitive": "symbolEquals"}
                }
            },
            "UndefinedObject": {
                "methods": {
                    "ifNil:": {"primitive": "nilIfNil"},
                    "ifNotNil:": {"primitive": "nilIfNotNil"},
                    "ifNil:ifNotNil:": {"primitive": "nilIfNilIfNotNil"}
                }
            },
            "BlockClosure": {
                "methods": {
                    "whileTrue:": {"primitive": "whileTrue"}
                }
            }
        },
        "globals": {
            "Transcript": {"bridge": true}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::InMemoryTranscript;
    use crate::evaluator::evaluate;

    #[test]
    fn base_image_loads_and_resolves_object_fallback() {
        let image = load_image(&default_base_environment_json(), Box::new(InMemoryTranscript::default())).unwrap();
        let result = evaluate(&serde_json::json!([2, "+", 3]), &image.root).unwrap();
        assert_eq!(result, Value::Number(5.0));
    }

    #[test]
    fn missing_object_class_is_rejected() {
        let broken = serde_json::json!({"classes": {"Number": {"methods": {}}}});
        assert!(load_image(&broken, Box::new(InMemoryTranscript::default())).is_err());
    }

    #[test]
    fn transcript_global_binds_the_bridge() {
        let image = load_image(&default_base_environment_json(), Box::new(InMemoryTranscript::default())).unwrap();
        let transcript = crate::environment::env_get(&image.root, "Transcript").unwrap();
        assert!(matches!(transcript, Value::Bridge(_)));
    }

    #[test]
    fn globals_seed_plain_data() {
        let source = serde_json::json!({
            "classes": {"Object": {"methods": {}}},
            "globals": {"answer": 42, "label": {"#": "ok"}}
        });
        let image = load_image(&source, Box::new(InMemoryTranscript::default())).unwrap();
        assert_eq!(crate::environment::env_get(&image.root, "answer").unwrap(), Value::Number(42.0));
        assert_eq!(crate::environment::env_get(&image.root, "label").unwrap(), Value::symbol("ok"));
    }
}
