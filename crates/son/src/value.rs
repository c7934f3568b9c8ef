use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bridge::Bridge;
use crate::environment::EnvRef;

/// A runtime value flowing through the evaluator.
///
/// `Number`/`Str`/`Boolean`/`Null`/`Symbol` are immutable and compared by value.
/// `Array`/`Object`/`Block`/`Class`/`Bridge` are reference types: two handles to
/// the same allocation are `identical` to each other and nothing else is.
#[derive(Clone)]
pub enum Value {
    Number(f64),
    Str(Rc<str>),
    Boolean(bool),
    Null,
    Symbol(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<IndexMap<String, Value>>>),
    Block(Rc<Block>),
    /// A `ClassTable` is just an `Environment` used as a class.
    Class(EnvRef),
    Bridge(Rc<Bridge>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn symbol(s: impl Into<Rc<str>>) -> Self {
        Value::Symbol(s.into())
    }

    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Null => "UndefinedObject",
            Value::Symbol(_) => "Symbol",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Block(_) => "BlockClosure",
            Value::Class(_) => "Class",
            Value::Bridge(_) => "Bridge",
        }
    }
}

/// A block closure: a lexical closure over its creating environment, with an
/// optional `homeContext` for non-local return.
pub struct Block {
    pub arg_names: Vec<String>,
    /// The block's body, a SON AST sequence (raw JSON, never re-parsed).
    pub body: serde_json::Value,
    pub lexical_scope: EnvRef,
    /// The nearest enclosing method activation at creation time, if any —
    /// either `None` or an ancestor of `lexical_scope`.
    pub home_context: Option<EnvRef>,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Null => write!(f, "nil"),
            Value::Symbol(s) => write!(f, "#{s}"),
            Value::Array(items) => {
                write!(f, "(")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Object(_) => write!(f, "an Object"),
            Value::Block(_) => write!(f, "a BlockClosure"),
            Value::Class(_) => write!(f, "a Class"),
            Value::Bridge(_) => write!(f, "a Bridge"),
        }
    }
}

/// Structural (`=`) equality, as used by the generic object-equality primitive.
///
/// Reference types compare by identity of their underlying allocation unless
/// the caller has also given them structural semantics (arrays/objects compare
/// element-wise here, matching ordinary Smalltalk collection `=`).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Bridge(a), Value::Bridge(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Identity (`==`) comparison, distinct from structural `=`. Immutable scalars
/// are identical iff equal by value; reference types are identical iff they
/// are the same allocation.
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Block(x), Value::Block(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Bridge(x), Value::Bridge(y)) => Rc::ptr_eq(x, y),
        _ => a == b,
    }
}
