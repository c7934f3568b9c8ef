use std::rc::Rc;

use crate::bridge::Bridge;
use crate::class_resolver::resolve_class;
use crate::environment::{create_child, env_get, env_set, nearest_method_context, EnvRef, MethodImpl};
use crate::method_lookup::lookup_method;
use crate::primitives::{self, PrimitiveTag};
use crate::signal::{EvalResult, EvalSignal, SonError};
use crate::value::{Block, Value};

/// The core recursive procedure over the SON AST. The AST is never compiled or
/// re-parsed — `node` is exactly the JSON the caller supplied; programs are
/// plain JSON trees with no separate lexer or parser stage.
pub fn evaluate(node: &serde_json::Value, env: &EnvRef) -> EvalResult {
    match node {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| SonError::Semantic("number literal is not representable as f64".into()).into()),
        serde_json::Value::String(s) => evaluate_string(s, env),
        serde_json::Value::Object(map) => evaluate_symbol_literal(map),
        serde_json::Value::Array(items) => evaluate_array(items, env),
    }
}

fn evaluate_string(s: &str, env: &EnvRef) -> EvalResult {
    match s.strip_prefix('$') {
        // `$env` yields the current Environment itself.
        Some("env") => Ok(Value::Class(env.clone())),
        Some(name) => env_get(env, name).map_err(Into::into),
        None => Ok(Value::str(s.to_string())),
    }
}

fn evaluate_symbol_literal(map: &serde_json::Map<String, serde_json::Value>) -> EvalResult {
    if map.len() == 1 {
        if let Some(serde_json::Value::String(name)) = map.get("#") {
            return Ok(Value::symbol(name.clone()));
        }
    }
    Err(SonError::Semantic("unrecognised AST node: only {\"#\": name} object literals are symbols".into()).into())
}

fn evaluate_array(items: &[serde_json::Value], env: &EnvRef) -> EvalResult {
    if items.is_empty() {
        return Ok(Value::Null);
    }

    if items[0].as_str() == Some("^") {
        return eval_return(items, env);
    }

    if items[0].as_str() == Some("define:args:body:") {
        return eval_method_definition(items, env);
    }

    if items.len() == 3 && items[1].as_str() == Some("=>:") && items[0].is_array() {
        return eval_block_literal(items, env);
    }

    if items.len() == 3 && items[1].as_str() == Some("cascade:") && items[2].is_array() {
        return eval_cascade(items, env);
    }

    if items.len() == 2 {
        if let Some(name) = items[0].as_str() {
            if is_assignment_target(name) {
                let value = evaluate(&items[1], env)?;
                env_set(env, &name[..name.len() - 1], value.clone());
                return Ok(value);
            }
        }
    }

    if items.len() >= 2 {
        if let Some(selector) = items[1].as_str() {
            if selector.contains(':') {
                return eval_keyword_send(items, selector, env);
            }
            if items.len() == 3 {
                return eval_operator_send(items, selector, env, true);
            }
            if items.len() == 2 {
                return eval_operator_send(items, selector, env, false);
            }
        }
    }

    eval_sequence(items, env)
}

/// A local variable's assignment form `["name:", expr]` is only recognised when
/// the target has exactly one trailing colon, so it can't be confused with a
/// one-argument keyword send.
fn is_assignment_target(name: &str) -> bool {
    name.len() > 1 && name.ends_with(':') && name.matches(':').count() == 1
}

fn eval_sequence(items: &[serde_json::Value], env: &EnvRef) -> EvalResult {
    let mut result = Value::Null;
    for item in items {
        result = evaluate(item, env)?;
    }
    Ok(result)
}

fn eval_return(items: &[serde_json::Value], env: &EnvRef) -> EvalResult {
    if items.len() != 2 {
        return Err(SonError::Semantic("malformed return: expected [\"^\", expr]".into()).into());
    }
    let value = evaluate(&items[1], env)?;
    if crate::environment::is_method_context(env) {
        return Err(EvalSignal::LocalReturn(value));
    }
    match nearest_method_context(env) {
        Some(target) => Err(EvalSignal::NonLocalReturn { value, target }),
        None => Err(SonError::Semantic("^ used outside of any method context".into()).into()),
    }
}

fn eval_method_definition(items: &[serde_json::Value], env: &EnvRef) -> EvalResult {
    if items.len() != 4 {
        return Err(SonError::Semantic(
            "malformed method definition: expected [\"define:args:body:\", selector, [argNames...], body]".into(),
        )
        .into());
    }
    let selector = items[1]
        .as_str()
        .ok_or_else(|| SonError::Semantic("method selector must be a string".into()))?;
    let arg_names = parse_name_list(&items[2])?;
    let body = items[3].clone();
    crate::environment::define_method(env, selector.to_string(), arg_names, body);
    Ok(Value::symbol(selector))
}

fn eval_block_literal(items: &[serde_json::Value], env: &EnvRef) -> EvalResult {
    let arg_names = parse_name_list(&items[0])?;
    let body = items[2].clone();
    let home_context = nearest_method_context(env);
    Ok(Value::Block(Rc::new(Block {
        arg_names,
        body,
        lexical_scope: env.clone(),
        home_context,
    })))
}

fn parse_name_list(node: &serde_json::Value) -> Result<Vec<String>, SonError> {
    let array = node
        .as_array()
        .ok_or_else(|| SonError::Semantic("expected a literal array of parameter names".into()))?;
    array
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| SonError::Semantic("parameter names must be strings".into()))
        })
        .collect()
}

fn eval_cascade(items: &[serde_json::Value], env: &EnvRef) -> EvalResult {
    let receiver = evaluate(&items[0], env)?;
    let messages = items[2].as_array().expect("checked by evaluate_array");
    for message in messages {
        let selector: &str;
        let arg_nodes: &[serde_json::Value];
        match message {
            serde_json::Value::String(s) => {
                selector = s.as_str();
                arg_nodes = &[];
            }
            serde_json::Value::Array(parts) if !parts.is_empty() => {
                selector = parts[0]
                    .as_str()
                    .ok_or_else(|| SonError::Semantic("cascade message selector must be a string".into()))?;
                arg_nodes = &parts[1..];
            }
            _ => return Err(SonError::Semantic("malformed cascade message".into()).into()),
        }
        let mut args = Vec::with_capacity(arg_nodes.len());
        for node in arg_nodes {
            args.push(evaluate(node, env)?);
        }
        send_message(receiver.clone(), selector, args, env)?;
    }
    Ok(receiver)
}

fn eval_keyword_send(items: &[serde_json::Value], selector: &str, env: &EnvRef) -> EvalResult {
    let expected = selector.matches(':').count();
    let actual = items.len() - 2;
    if expected != actual {
        return Err(SonError::ArgumentError(format!(
            "{selector} expects {expected} argument(s), got {actual}"
        ))
        .into());
    }
    let receiver = evaluate(&items[0], env)?;
    let mut args = Vec::with_capacity(actual);
    for item in &items[2..] {
        args.push(evaluate(item, env)?);
    }
    send_message(receiver, selector, args, env)
}

fn eval_operator_send(items: &[serde_json::Value], selector: &str, env: &EnvRef, binary: bool) -> EvalResult {
    let receiver = evaluate(&items[0], env)?;
    let mut args = Vec::new();
    if binary {
        args.push(evaluate(&items[2], env)?);
    }
    send_message(receiver, selector, args, env)
}

/// Dispatches one message send: bridge entries short-circuit, then the `$env`
/// method-definition extension, then the block `value` family, then ordinary
/// class-based lookup.
pub fn send_message(receiver: Value, selector: &str, args: Vec<Value>, env: &EnvRef) -> EvalResult {
    if let Value::Bridge(bridge) = &receiver {
        if Bridge::has_entry(selector) {
            return bridge.dispatch(selector, args, receiver.clone());
        }
    }

    // Defining a method via message send rather than the `define:args:body:`
    // AST form.
    if selector == "defineMethod:args:body:" {
        if let Value::Class(target_env) = &receiver {
            return eval_define_method_message(target_env, args);
        }
    }

    if let Value::Block(block) = &receiver {
        if value_family_arity(selector).is_some() {
            return call_block(block, args);
        }
    }

    let class_env = resolve_class(&receiver, env)?;
    let Some(method) = lookup_method(env, &class_env, selector) else {
        return Err(SonError::MessageNotUnderstood {
            receiver_kind: receiver.kind_name(),
            selector: selector.to_string(),
        }
        .into());
    };

    match method {
        MethodImpl::Primitive(tag) if tag == PrimitiveTag::ClassOf => Ok(Value::Class(class_env)),
        MethodImpl::Primitive(tag) => primitives::dispatch(tag, selector, receiver, args),
        MethodImpl::Son { arg_names, body, .. } => invoke_method(receiver, arg_names, &body, args, env),
    }
}

/// Recognises the `value`, `value:`, `value:value:`, ... family. Any other
/// selector sent to a Block falls through to ordinary class-based dispatch
/// against `BlockClosure`, e.g. `whileTrue:`.
fn value_family_arity(selector: &str) -> Option<usize> {
    if selector == "value" {
        return Some(0);
    }
    if !selector.ends_with(':') {
        return None;
    }
    let mut count = 0;
    let mut rest = selector;
    while let Some(remainder) = rest.strip_prefix("value:") {
        count += 1;
        rest = remainder;
    }
    (rest.is_empty() && count > 0).then_some(count)
}

fn invoke_method(
    receiver: Value,
    arg_names: Vec<String>,
    body: &serde_json::Value,
    args: Vec<Value>,
    env: &EnvRef,
) -> EvalResult {
    if arg_names.len() != args.len() {
        return Err(SonError::ArgumentError(format!(
            "method expects {} argument(s), got {}",
            arg_names.len(),
            args.len()
        ))
        .into());
    }
    let method_env = create_child(env, true, Some(receiver.clone()));
    for (name, value) in arg_names.iter().zip(args) {
        env_set(&method_env, name, value);
    }
    match evaluate(body, &method_env) {
        // No explicit `^`: the method's result is its receiver (implicit self-return).
        Ok(_) => Ok(receiver),
        Err(EvalSignal::LocalReturn(value)) => Ok(value),
        Err(EvalSignal::NonLocalReturn { value, target }) if Rc::ptr_eq(&target, &method_env) => Ok(value),
        Err(other) => Err(other),
    }
}

/// Invokes a Block via the `value` family.
pub fn call_block(block: &Rc<Block>, args: Vec<Value>) -> EvalResult {
    if block.arg_names.len() != args.len() {
        return Err(SonError::ArgumentError(format!(
            "block expects {} argument(s), got {}",
            block.arg_names.len(),
            args.len()
        ))
        .into());
    }
    let block_env = create_child(&block.lexical_scope, false, None);
    for (name, value) in block.arg_names.iter().zip(args) {
        env_set(&block_env, name, value);
    }
    match evaluate(&block.body, &block_env) {
        Ok(value) => Ok(value),
        // Unreachable via evaluate()'s own Return handling (block_env is never a
        // method context, so `^` inside a block always resolves to a
        // NonLocalReturn or an error) — kept for defensive symmetry since a
        // local return inside a block is never valid.
        Err(EvalSignal::LocalReturn(_)) => {
            Err(SonError::Semantic("local return (^) is not valid inside a block".into()).into())
        }
        Err(other) => Err(other),
    }
}

fn eval_define_method_message(target_env: &EnvRef, args: Vec<Value>) -> EvalResult {
    let [selector_value, arg_names_value, body_value]: [Value; 3] = args.try_into().map_err(|got: Vec<Value>| {
        EvalSignal::from(SonError::ArgumentError(format!(
            "defineMethod:args:body: expects 3 argument(s), got {}",
            got.len()
        )))
    })?;

    let selector = match selector_value {
        Value::Symbol(s) | Value::Str(s) => s.to_string(),
        other => {
            return Err(SonError::ArgumentError(format!(
                "defineMethod:args:body: expects a Symbol/String selector, got {}",
                other.kind_name()
            ))
            .into())
        }
    };
    let arg_names = match &arg_names_value {
        Value::Array(items) => items
            .borrow()
            .iter()
            .map(|item| match item {
                Value::Symbol(s) | Value::Str(s) => Ok(s.to_string()),
                other => Err(SonError::ArgumentError(format!(
                    "argument name must be a Symbol/String, got {}",
                    other.kind_name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(SonError::ArgumentError(format!(
                "defineMethod:args:body: expects an Array of argument names, got {}",
                other.kind_name()
            ))
            .into())
        }
    };
    let body = value_to_ast(&body_value)?;
    crate::environment::define_method(target_env, selector.clone(), arg_names, body);
    Ok(Value::symbol(selector))
}

/// Converts a runtime `Value` back into an AST node, so a body built up from
/// ordinary Array/Symbol/String/Number values can be installed as a method
/// body through `defineMethod:args:body:`.
fn value_to_ast(value: &Value) -> Result<serde_json::Value, SonError> {
    Ok(match value {
        Value::Number(n) => serde_json::json!(n),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Null => serde_json::Value::Null,
        Value::Symbol(s) => serde_json::json!({ "#": s.to_string() }),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items.borrow().iter() {
                out.push(value_to_ast(item)?);
            }
            serde_json::Value::Array(out)
        }
        other => {
            return Err(SonError::Semantic(format!(
                "{} cannot be converted into a SON AST node",
                other.kind_name()
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{env_set, new_class_table, new_root};
    use serde_json::json;

    fn root_with_object_class() -> EnvRef {
        let root = new_root();
        let object_class = new_class_table();
        env_set(&root, "Object", Value::Class(object_class));
        root
    }

    #[test]
    fn number_literal() {
        let env = root_with_object_class();
        assert_eq!(evaluate(&json!(7), &env).unwrap(), Value::Number(7.0));
    }

    #[test]
    fn string_literal_vs_variable_reference() {
        let env = root_with_object_class();
        env_set(&env, "x", Value::Number(10.0));
        assert_eq!(evaluate(&json!("hello"), &env).unwrap(), Value::str("hello"));
        assert_eq!(evaluate(&json!("$x"), &env).unwrap(), Value::Number(10.0));
    }

    #[test]
    fn symbol_literal() {
        let env = root_with_object_class();
        assert_eq!(evaluate(&json!({"#": "foo"}), &env).unwrap(), Value::symbol("foo"));
    }

    #[test]
    fn empty_array_is_null() {
        let env = root_with_object_class();
        assert_eq!(evaluate(&json!([]), &env).unwrap(), Value::Null);
    }

    #[test]
    fn assignment_then_read_same_scope() {
        let env = root_with_object_class();
        let program = json!([["x:", 10], ["x:", ["$x", "+", 5]], "$x"]);
        assert_eq!(evaluate(&program, &env).unwrap(), Value::Number(15.0));
    }

    #[test]
    fn assignment_is_local_to_child_scope() {
        let root = root_with_object_class();
        env_set(&root, "x", Value::Number(1.0));
        let child = create_child(&root, false, None);
        env_set(&child, "x", Value::Number(1.0));
        evaluate(&json!(["x:", 99]), &child).unwrap();
        assert_eq!(env_get(&root, "x").unwrap(), Value::Number(1.0));
        assert_eq!(env_get(&child, "x").unwrap(), Value::Number(99.0));
    }

    #[test]
    fn sequence_returns_last_value() {
        let env = root_with_object_class();
        assert_eq!(evaluate(&json!([1, 2, 3]), &env).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn return_outside_method_is_error() {
        let env = root_with_object_class();
        let result = evaluate(&json!(["^", 1]), &env);
        assert!(matches!(result, Err(EvalSignal::Error(SonError::Semantic(_)))));
    }

    #[test]
    fn method_definition_returns_selector_symbol() {
        let env = root_with_object_class();
        let result = evaluate(&json!(["define:args:body:", "double:", ["x"], [["^", ["$x", "*", 2]]]]), &env).unwrap();
        assert_eq!(result, Value::symbol("double:"));
        assert!(crate::environment::lookup_method_locally(&env, "double:").is_some());
    }

    #[test]
    fn block_literal_captures_lexical_scope() {
        let env = root_with_object_class();
        env_set(&env, "y", Value::Number(3.0));
        let block_value = evaluate(&json!([["x"], "=>:", [["$x", "+", "$y"]]]), &env).unwrap();
        let Value::Block(block) = block_value else {
            panic!("expected a block");
        };
        let result = call_block(&block, vec![Value::Number(4.0)]).unwrap();
        assert_eq!(result, Value::Number(7.0));
    }
}
