//! Integration tests exercising the behaviours that drive this evaluator's
//! design.

use serde_json::json;
use son::{EvalSignal, Interpreter, SonError, Value};

fn interp() -> Interpreter {
    Interpreter::new().expect("base image should always load")
}

#[test]
fn nested_sends_respect_inner_before_outer() {
    let result = interp().run(&json!([1, "+", [2, "*", 3]])).unwrap();
    assert_eq!(result, Value::Number(7.0));
}

#[test]
fn reassignment_in_one_scope() {
    let program = json!([["x:", 10], ["x:", ["$x", "+", 5]], "$x"]);
    assert_eq!(interp().run(&program).unwrap(), Value::Number(15.0));
}

#[test]
fn bridge_show_logs_and_returns_the_bridge() {
    let interpreter = interp();
    let result = interpreter.run(&json!(["$Transcript", "show:", "hi"])).unwrap();
    assert!(matches!(result, Value::Bridge(_)));
}

#[test]
fn if_true_if_false_picks_the_true_branch() {
    let program = json!([
        true,
        "ifTrue:ifFalse:",
        [[], "=>:", ["yes"]],
        [[], "=>:", ["no"]]
    ]);
    assert_eq!(interp().run(&program).unwrap(), Value::str("yes"));
}

#[test]
fn user_defined_unary_method_on_number() {
    let interpreter = interp();

    // `define:args:body:` installs into whichever environment it runs in, so
    // defining `double` where instances of Number will find it means running
    // it against Number's own class table. `double` is unary (no colon), so
    // `self` is the only thing the body needs.
    let number_class = son::environment::env_get(interpreter.root(), "Number").unwrap();
    if let Value::Class(class_env) = number_class {
        son::environment::define_method(
            &class_env,
            "double".to_string(),
            vec![],
            json!(["^", ["$self", "*", 2]]),
        );
    } else {
        panic!("Number should resolve to a class table");
    }

    let result = interpreter.run(&json!([21, "double"])).unwrap();
    assert_eq!(result, Value::Number(42.0));
}

#[test]
fn non_local_return_unwinds_to_the_defining_method() {
    let interpreter = interp();
    let number_class = son::environment::env_get(interpreter.root(), "Number").unwrap();
    let Value::Class(class_env) = number_class else {
        panic!("Number should resolve to a class table");
    };
    son::environment::define_method(
        &class_env,
        "ninetyNine".to_string(),
        vec![],
        json!([[[], "=>:", [["^", 99]]], "value"]),
    );

    let result = interpreter.run(&json!([1, "ninetyNine"])).unwrap();
    assert_eq!(result, Value::Number(99.0));
}

#[test]
fn return_outside_any_method_context_is_an_error() {
    let result = interp().run(&json!(["^", 1]));
    assert!(matches!(result, Err(EvalSignal::Error(SonError::Semantic(_)))));
}

#[test]
fn implicit_self_return_when_method_body_has_no_explicit_return() {
    let interpreter = interp();
    let number_class = son::environment::env_get(interpreter.root(), "Number").unwrap();
    let Value::Class(class_env) = number_class else {
        panic!("Number should resolve to a class table");
    };
    son::environment::define_method(&class_env, "noop".to_string(), vec![], json!([]));

    let result = interpreter.run(&json!([5, "noop"])).unwrap();
    assert_eq!(result, Value::Number(5.0));
}

#[test]
fn cascade_returns_the_original_receiver() {
    let interpreter = interp();
    let result = interpreter
        .run(&json!([
            "$Transcript",
            "cascade:",
            [["show:", "a"], ["show:", "b"]]
        ]))
        .unwrap();
    assert!(matches!(result, Value::Bridge(_)));
}

#[test]
fn division_by_zero_is_semantic_error() {
    let result = interp().run(&json!([1, "/", 0]));
    assert!(matches!(result, Err(EvalSignal::Error(SonError::Semantic(_)))));
}

#[test]
fn assignment_is_local_to_its_scope() {
    // ["x:", v] inside a block does not leak into the enclosing scope, since a
    // block body runs in a fresh child of its lexical scope.
    let interpreter = interp();
    interpreter.run(&json!(["x:", 1])).unwrap();
    let block = json!([["y"], "=>:", [["x:", 2], "$y"]]);
    let program = json!([block, "value:", 9]);
    assert_eq!(interpreter.run(&program).unwrap(), Value::Number(9.0));
    assert_eq!(interpreter.run(&json!("$x")).unwrap(), Value::Number(1.0));
}

#[test]
fn while_true_drives_a_counting_loop() {
    let program = json!([
        ["n:", 0],
        [[[], "=>:", [["$n", "<", 3]]], "whileTrue:", [[], "=>:", [["n:", ["$n", "+", 1]]]]],
        "$n"
    ]);
    assert_eq!(interp().run(&program).unwrap(), Value::Number(3.0));
}

#[test]
fn array_primitives_supplement_the_base_image() {
    // A JSON array written directly in program text is an AST sequence, not
    // array data — so an Array value has to arrive from outside the program,
    // exactly as image globals do via `json_to_value`.
    let interpreter = interp();
    let xs = son::image::json_to_value(&json!([10, 20, 30])).unwrap();
    son::environment::env_set(interpreter.root(), "xs", xs);

    assert_eq!(interpreter.run(&json!(["$xs", "at:", 2])).unwrap(), Value::Number(20.0));
    assert_eq!(interpreter.run(&json!(["$xs", "size"])).unwrap(), Value::Number(3.0));
}

#[test]
fn message_not_understood_reports_selector_and_kind() {
    let result = interp().run(&json!([1, "frobnicate:", 2]));
    match result {
        Err(EvalSignal::Error(SonError::MessageNotUnderstood { receiver_kind, selector })) => {
            assert_eq!(receiver_kind, "Number");
            assert_eq!(selector, "frobnicate:");
        }
        other => panic!("expected MessageNotUnderstood, got {other:?}"),
    }
}
