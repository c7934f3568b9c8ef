use std::cell::RefCell;
use std::rc::Rc;

use crate::evaluator::call_block;
use crate::signal::{EvalResult, EvalSignal, SonError};
use crate::value::{identical, Value};

/// The closed, fixed set of host-implemented operations. SON code can never
/// register a new tag — the `From<&str>` parse below is exhaustive and any
/// unrecognised name is a `SonError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTag {
    NumAdd,
    NumSub,
    NumMul,
    NumDiv,
    NumLt,
    NumGt,
    NumLe,
    NumGe,
    NumEq,
    NumToString,
    ObjEq,
    ObjNotEq,
    IdEq,
    IdNotEq,
    ClassOf,
    PrintString,
    BoolAnd,
    BoolOr,
    BoolNot,
    IfTrue,
    IfFalse,
    IfTrueIfFalse,
    StrConcat,
    StrLength,
    StrEquals,
    SymToString,
    SymEquals,
    NilIfNil,
    NilIfNotNil,
    NilIfNilIfNotNil,
    WhileTrue,
    TimesRepeat,
    ToDo,
    ArrayAt,
    ArrayAtPut,
    ArraySize,
    ArrayDo,
}

impl PrimitiveTag {
    pub fn parse(tag: &str) -> Result<Self, SonError> {
        Ok(match tag {
            "add" => Self::NumAdd,
            "subtract" => Self::NumSub,
            "multiply" => Self::NumMul,
            "divide" => Self::NumDiv,
            "less" => Self::NumLt,
            "greater" => Self::NumGt,
            "lessOrEqual" => Self::NumLe,
            "greaterOrEqual" => Self::NumGe,
            "numEquals" => Self::NumEq,
            "numToString" => Self::NumToString,
            "equals" => Self::ObjEq,
            "notEquals" => Self::ObjNotEq,
            "identityEquals" => Self::IdEq,
            "identityNotEquals" => Self::IdNotEq,
            "classOf" => Self::ClassOf,
            "printString" => Self::PrintString,
            "and" => Self::BoolAnd,
            "or" => Self::BoolOr,
            "not" => Self::BoolNot,
            "ifTrue" => Self::IfTrue,
            "ifFalse" => Self::IfFalse,
            "ifTrueIfFalse" => Self::IfTrueIfFalse,
            "stringConcat" => Self::StrConcat,
            "stringLength" => Self::StrLength,
            "stringEquals" => Self::StrEquals,
            "symbolToString" => Self::SymToString,
            "symbolEquals" => Self::SymEquals,
            "nilIfNil" => Self::NilIfNil,
            "nilIfNotNil" => Self::NilIfNotNil,
            "nilIfNilIfNotNil" => Self::NilIfNilIfNotNil,
            "whileTrue" => Self::WhileTrue,
            "timesRepeat" => Self::TimesRepeat,
            "toDo" => Self::ToDo,
            "arrayAt" => Self::ArrayAt,
            "arrayAtPut" => Self::ArrayAtPut,
            "arraySize" => Self::ArraySize,
            "arrayDo" => Self::ArrayDo,
            other => return Err(SonError::Semantic(format!("invalid primitive tag: {other}"))),
        })
    }
}

fn arity_error(selector: &str, expected: usize, got: usize) -> EvalSignal {
    SonError::ArgumentError(format!("{selector} expects {expected} argument(s), got {got}")).into()
}

fn expect_number(value: &Value, context: &str) -> Result<f64, EvalSignal> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(SonError::ArgumentError(format!("{context} expects a Number, got {}", other.kind_name())).into()),
    }
}

fn expect_block(value: Value, context: &str) -> Result<Rc<crate::value::Block>, EvalSignal> {
    match value {
        Value::Block(b) => Ok(b),
        other => Err(SonError::ArgumentError(format!("{context} expects a Block, got {}", other.kind_name())).into()),
    }
}

fn expect_args<const N: usize>(args: Vec<Value>, selector: &str) -> Result<[Value; N], EvalSignal> {
    let got = args.len();
    args.try_into().map_err(|_| arity_error(selector, N, got))
}

/// Dispatches a primitive. `selector` is only used for error messages; routing
/// is entirely by `tag`.
pub fn dispatch(tag: PrimitiveTag, selector: &str, receiver: Value, args: Vec<Value>) -> EvalResult {
    use PrimitiveTag::*;
    match tag {
        NumAdd | NumSub | NumMul | NumDiv | NumLt | NumGt | NumLe | NumGe | NumEq => {
            let lhs = expect_number(&receiver, selector)?;
            let [arg] = expect_args::<1>(args, selector)?;
            let rhs = expect_number(&arg, selector)?;
            Ok(match tag {
                NumAdd => Value::Number(lhs + rhs),
                NumSub => Value::Number(lhs - rhs),
                NumMul => Value::Number(lhs * rhs),
                NumDiv => {
                    if rhs == 0.0 {
                        return Err(SonError::Semantic("division by zero".into()).into());
                    }
                    Value::Number(lhs / rhs)
                }
                NumLt => Value::Boolean(lhs < rhs),
                NumGt => Value::Boolean(lhs > rhs),
                NumLe => Value::Boolean(lhs <= rhs),
                NumGe => Value::Boolean(lhs >= rhs),
                NumEq => Value::Boolean(lhs == rhs),
                _ => unreachable!(),
            })
        }
        NumToString => {
            let n = expect_number(&receiver, selector)?;
            expect_args::<0>(args, selector)?;
            Ok(Value::str(n.to_string()))
        }
        ObjEq => {
            let [arg] = expect_args::<1>(args, selector)?;
            Ok(Value::Boolean(receiver == arg))
        }
        ObjNotEq => {
            let [arg] = expect_args::<1>(args, selector)?;
            Ok(Value::Boolean(receiver != arg))
        }
        IdEq => {
            let [arg] = expect_args::<1>(args, selector)?;
            Ok(Value::Boolean(identical(&receiver, &arg)))
        }
        IdNotEq => {
            let [arg] = expect_args::<1>(args, selector)?;
            Ok(Value::Boolean(!identical(&receiver, &arg)))
        }
        ClassOf => {
            // Intercepted by evaluator::send_message before reaching here: it
            // needs the lookup environment to resolve a class table, which this
            // function does not have. See send_message's ClassOf special case.
            unreachable!("ClassOf is handled in send_message before primitive dispatch")
        }
        PrintString => {
            expect_args::<0>(args, selector)?;
            Ok(Value::str(receiver.to_string()))
        }
        BoolAnd => {
            let lhs = expect_bool(&receiver, selector)?;
            let [arg] = expect_args::<1>(args, selector)?;
            let rhs = expect_bool(&arg, selector)?;
            Ok(Value::Boolean(lhs && rhs))
        }
        BoolOr => {
            let lhs = expect_bool(&receiver, selector)?;
            let [arg] = expect_args::<1>(args, selector)?;
            let rhs = expect_bool(&arg, selector)?;
            Ok(Value::Boolean(lhs || rhs))
        }
        BoolNot => {
            let lhs = expect_bool(&receiver, selector)?;
            expect_args::<0>(args, selector)?;
            Ok(Value::Boolean(!lhs))
        }
        IfTrue => {
            let cond = expect_bool(&receiver, selector)?;
            let [block] = expect_args::<1>(args, selector)?;
            let block = expect_block(block, selector)?;
            if cond {
                call_block(&block, Vec::new())
            } else {
                Ok(Value::Null)
            }
        }
        IfFalse => {
            let cond = expect_bool(&receiver, selector)?;
            let [block] = expect_args::<1>(args, selector)?;
            let block = expect_block(block, selector)?;
            if !cond {
                call_block(&block, Vec::new())
            } else {
                Ok(Value::Null)
            }
        }
        IfTrueIfFalse => {
            let cond = expect_bool(&receiver, selector)?;
            let [true_block, false_block] = expect_args::<2>(args, selector)?;
            let true_block = expect_block(true_block, selector)?;
            let false_block = expect_block(false_block, selector)?;
            if cond {
                call_block(&true_block, Vec::new())
            } else {
                call_block(&false_block, Vec::new())
            }
        }
        StrConcat => {
            let lhs = expect_str(&receiver, selector)?;
            let [arg] = expect_args::<1>(args, selector)?;
            let rhs = expect_str(&arg, selector)?;
            Ok(Value::str(format!("{lhs}{rhs}")))
        }
        StrLength => {
            let s = expect_str(&receiver, selector)?;
            expect_args::<0>(args, selector)?;
            Ok(Value::Number(s.chars().count() as f64))
        }
        StrEquals => {
            let lhs = expect_str(&receiver, selector)?;
            let [arg] = expect_args::<1>(args, selector)?;
            Ok(Value::Boolean(match &arg {
                Value::Str(rhs) => lhs == rhs.as_ref(),
                _ => false,
            }))
        }
        SymToString => {
            let s = expect_symbol(&receiver, selector)?;
            expect_args::<0>(args, selector)?;
            Ok(Value::str(s.to_string()))
        }
        SymEquals => {
            let lhs = expect_symbol(&receiver, selector)?;
            let [arg] = expect_args::<1>(args, selector)?;
            Ok(Value::Boolean(match &arg {
                Value::Symbol(rhs) => lhs == rhs.as_ref(),
                _ => false,
            }))
        }
        NilIfNil => {
            let [block] = expect_args::<1>(args, selector)?;
            let block = expect_block(block, selector)?;
            if matches!(receiver, Value::Null) {
                call_block(&block, Vec::new())
            } else {
                Ok(receiver)
            }
        }
        NilIfNotNil => {
            let [block] = expect_args::<1>(args, selector)?;
            let block = expect_block(block, selector)?;
            if matches!(receiver, Value::Null) {
                Ok(Value::Null)
            } else {
                call_block(&block, vec![receiver])
            }
        }
        NilIfNilIfNotNil => {
            let [nil_block, not_nil_block] = expect_args::<2>(args, selector)?;
            let nil_block = expect_block(nil_block, selector)?;
            let not_nil_block = expect_block(not_nil_block, selector)?;
            if matches!(receiver, Value::Null) {
                call_block(&nil_block, Vec::new())
            } else {
                call_block(&not_nil_block, vec![receiver])
            }
        }
        WhileTrue => {
            let condition = expect_block(receiver, selector)?;
            let [body] = expect_args::<1>(args, selector)?;
            let body = expect_block(body, selector)?;
            loop {
                let cond_value = call_block(&condition, Vec::new())?;
                if !expect_bool(&cond_value, selector)? {
                    break;
                }
                call_block(&body, Vec::new())?;
            }
            Ok(Value::Null)
        }
        TimesRepeat => {
            let count = expect_number(&receiver, selector)?;
            let [body] = expect_args::<1>(args, selector)?;
            let body = expect_block(body, selector)?;
            let mut i = 0i64;
            let n = count as i64;
            while i < n {
                call_block(&body, Vec::new())?;
                i += 1;
            }
            Ok(receiver)
        }
        ToDo => {
            let start = expect_number(&receiver, selector)?;
            let [end, body] = expect_args::<2>(args, selector)?;
            let end = expect_number(&end, selector)?;
            let body = expect_block(body, selector)?;
            let mut i = start;
            while i <= end {
                call_block(&body, vec![Value::Number(i)])?;
                i += 1.0;
            }
            Ok(receiver)
        }
        ArrayAt => {
            let items = expect_array(&receiver, selector)?;
            let [index] = expect_args::<1>(args, selector)?;
            let index = expect_number(&index, selector)? as i64;
            let items = items.borrow();
            let position = usize::try_from(index - 1)
                .map_err(|_| SonError::ArgumentError(format!("{selector}: index {index} out of bounds")))?;
            items
                .get(position)
                .cloned()
                .ok_or_else(|| SonError::ArgumentError(format!("{selector}: index {index} out of bounds")).into())
        }
        ArrayAtPut => {
            let items = expect_array(&receiver, selector)?;
            let [index, value] = expect_args::<2>(args, selector)?;
            let index = expect_number(&index, selector)? as i64;
            let mut items = items.borrow_mut();
            let position = usize::try_from(index - 1)
                .map_err(|_| SonError::ArgumentError(format!("{selector}: index {index} out of bounds")))?;
            if position >= items.len() {
                return Err(SonError::ArgumentError(format!("{selector}: index {index} out of bounds")).into());
            }
            items[position] = value.clone();
            Ok(value)
        }
        ArraySize => {
            let items = expect_array(&receiver, selector)?;
            expect_args::<0>(args, selector)?;
            Ok(Value::Number(items.borrow().len() as f64))
        }
        ArrayDo => {
            let items = expect_array(&receiver, selector)?;
            let [block] = expect_args::<1>(args, selector)?;
            let block = expect_block(block, selector)?;
            let snapshot: Vec<Value> = items.borrow().clone();
            for item in snapshot {
                call_block(&block, vec![item])?;
            }
            Ok(receiver)
        }
    }
}

fn expect_bool(value: &Value, context: &str) -> Result<bool, EvalSignal> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => Err(SonError::ArgumentError(format!("{context} expects a Boolean, got {}", other.kind_name())).into()),
    }
}

fn expect_str(value: &Value, context: &str) -> Result<Rc<str>, EvalSignal> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(SonError::ArgumentError(format!("{context} expects a String, got {}", other.kind_name())).into()),
    }
}

fn expect_symbol(value: &Value, context: &str) -> Result<Rc<str>, EvalSignal> {
    match value {
        Value::Symbol(s) => Ok(s.clone()),
        other => Err(SonError::ArgumentError(format!("{context} expects a Symbol, got {}", other.kind_name())).into()),
    }
}

fn expect_array(value: &Value, context: &str) -> Result<Rc<RefCell<Vec<Value>>>, EvalSignal> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        other => Err(SonError::ArgumentError(format!("{context} expects an Array, got {}", other.kind_name())).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_is_semantic_error() {
        let result = dispatch(PrimitiveTag::NumDiv, "/", Value::Number(1.0), vec![Value::Number(0.0)]);
        match result {
            Err(EvalSignal::Error(SonError::Semantic(_))) => {}
            other => panic!("expected division-by-zero SonError, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_is_pure() {
        let result = dispatch(PrimitiveTag::NumAdd, "+", Value::Number(2.0), vec![Value::Number(3.0)]).unwrap();
        assert_eq!(result, Value::Number(5.0));
    }

    #[test]
    fn arity_mismatch_is_argument_error() {
        let result = dispatch(PrimitiveTag::NumAdd, "+", Value::Number(2.0), vec![]);
        assert!(matches!(result, Err(EvalSignal::Error(SonError::ArgumentError(_)))));
    }

    #[test]
    fn unknown_tag_is_semantic_error() {
        assert!(matches!(PrimitiveTag::parse("nonsense"), Err(SonError::Semantic(_))));
    }
}
