use std::fmt;

use crate::environment::EnvRef;
use crate::value::Value;

/// The error taxonomy surfaced to callers, minus the two return control
/// signals which are not errors and live on [`EvalSignal`] instead.
#[derive(Debug, Clone)]
pub enum SonError {
    /// `$name` resolution failed through the whole scope chain.
    VariableNotFound(String),
    /// No primitive, SON method, `value`-family selector, or bridge entry matched.
    MessageNotUnderstood { receiver_kind: &'static str, selector: String },
    /// Arity or value-kind mismatch in a send or primitive.
    ArgumentError(String),
    /// Everything else: divide-by-zero, `^` outside a method, local return in a
    /// block, malformed method-def/block, invalid primitive tag, bridge failure.
    Semantic(String),
}

impl fmt::Display for SonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VariableNotFound(name) => write!(f, "variable not found: ${name}"),
            Self::MessageNotUnderstood { receiver_kind, selector } => {
                write!(f, "{receiver_kind} does not understand #{selector}")
            }
            Self::ArgumentError(reason) => write!(f, "argument error: {reason}"),
            Self::Semantic(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for SonError {}

/// Everything that can unwind out of `evaluate`/`send_message`: an error, or one
/// of the two return control signals. These are *not* errors — only the
/// matching activation may catch them; every other frame must re-raise them
/// unchanged.
#[derive(Debug, Clone)]
pub enum EvalSignal {
    Error(SonError),
    LocalReturn(Value),
    NonLocalReturn { value: Value, target: EnvRef },
}

impl From<SonError> for EvalSignal {
    fn from(error: SonError) -> Self {
        Self::Error(error)
    }
}

impl fmt::Display for EvalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::LocalReturn(v) => write!(f, "unhandled local return: {v}"),
            Self::NonLocalReturn { value, .. } => write!(f, "unhandled non-local return: {value}"),
        }
    }
}

pub type EvalResult = Result<Value, EvalSignal>;
