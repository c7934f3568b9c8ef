//! SON: a Smalltalk-flavoured evaluator whose programs are plain JSON trees.
//!
//! [`Interpreter`] ties the pieces together: load an image ([`image`]), then
//! [`evaluator::evaluate`] AST nodes against it, with messages resolved through
//! [`class_resolver`] and [`method_lookup`] and routed either to a SON method
//! body or the closed [`primitives`] table. [`bridge`] is the sole channel to
//! the host; [`store`] is the persistence seam for method bodies that outlive
//! one process.

pub mod bridge;
pub mod class_resolver;
pub mod environment;
pub mod evaluator;
pub mod image;
pub mod method_lookup;
pub mod primitives;
pub mod signal;
pub mod store;
pub mod value;

use std::rc::Rc;

pub use bridge::{Bridge, InMemoryTranscript, StdTranscript, Transcript};
pub use environment::EnvRef;
pub use signal::{EvalResult, EvalSignal, SonError};
pub use value::Value;

/// A running SON image: a root environment (globals, class tables) plus the
/// bridge bound into it. This is the crate's main embedding entry point.
pub struct Interpreter {
    root: EnvRef,
    bridge: Rc<Bridge>,
}

impl Interpreter {
    /// Builds an interpreter from the built-in base image, writing
    /// `Transcript log:` output to stderr.
    pub fn new() -> Result<Self, SonError> {
        Self::with_transcript(Box::new(StdTranscript))
    }

    pub fn with_transcript(transcript: Box<dyn Transcript>) -> Result<Self, SonError> {
        Self::from_image(&image::default_base_environment_json(), transcript)
    }

    /// Loads a custom image instead of the built-in base environment.
    pub fn from_image(source: &serde_json::Value, transcript: Box<dyn Transcript>) -> Result<Self, SonError> {
        let loaded = image::load_image(source, transcript)?;
        Ok(Self {
            root: loaded.root,
            bridge: loaded.bridge,
        })
    }

    /// Evaluates one top-level program, then drains any callbacks it scheduled
    /// before returning (callbacks never interleave with a running evaluation,
    /// only between them).
    ///
    /// A return signal that escapes all the way to the top — e.g. a block
    /// invoked after its defining method has already returned — is not a
    /// method activation catching it, so it is reported as an error rather
    /// than leaking a control signal out of the interpreter.
    pub fn run(&self, program: &serde_json::Value) -> EvalResult {
        let result = match evaluator::evaluate(program, &self.root) {
            Err(EvalSignal::LocalReturn(_)) => {
                Err(SonError::Semantic("local return (^) escaped to the top level".into()).into())
            }
            Err(EvalSignal::NonLocalReturn { .. }) => Err(SonError::Semantic(
                "non-local return (^) targeted a method activation that is no longer on the stack".into(),
            )
            .into()),
            other => other,
        };
        self.bridge.run_event_loop();
        result
    }

    pub fn root(&self) -> &EnvRef {
        &self.root
    }

    pub fn pending_callbacks(&self) -> usize {
        self.bridge.pending_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arithmetic_through_the_base_image() {
        let interp = Interpreter::new().unwrap();
        let result = interp.run(&json!([2, "+", 3])).unwrap();
        assert_eq!(result, Value::Number(5.0));
    }

    #[test]
    fn message_not_understood_surfaces_as_an_error() {
        let interp = Interpreter::new().unwrap();
        let result = interp.run(&json!([2, "frobnicate"]));
        assert!(matches!(result, Err(EvalSignal::Error(SonError::MessageNotUnderstood { .. }))));
    }

    #[test]
    fn non_local_return_from_an_escaped_block_is_reported_as_an_error() {
        let interp = Interpreter::new().unwrap();
        let number_class = environment::env_get(interp.root(), "Number").unwrap();
        let Value::Class(class_env) = number_class else {
            panic!("Number should resolve to a class table");
        };
        // Returns a block whose home context is this method activation, which
        // has already completed by the time anyone can call the block.
        environment::define_method(
            &class_env,
            "makeReturner".to_string(),
            vec![],
            json!(["^", [[], "=>:", [["^", 42]]]]),
        );
        let escaped = interp.run(&json!([1, "makeReturner"])).unwrap();
        environment::env_set(interp.root(), "escaped", escaped);

        let result = interp.run(&json!(["$escaped", "value"]));
        assert!(matches!(result, Err(EvalSignal::Error(SonError::Semantic(_)))));
    }

    #[test]
    fn scheduled_callback_runs_after_the_triggering_evaluation() {
        let interp = Interpreter::new().unwrap();
        interp
            .run(&json!([
                "$Transcript",
                "setTimeout:delay:",
                [[], "=>:", [["$Transcript", "log:", "fired"]]],
                0
            ]))
            .unwrap();
        assert_eq!(interp.pending_callbacks(), 0);
    }
}
