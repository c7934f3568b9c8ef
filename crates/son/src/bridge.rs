use std::collections::VecDeque;
use std::rc::Rc;

use crate::evaluator::call_block;
use crate::signal::{EvalResult, SonError};
use crate::value::{Block, Value};

/// Where the bridge's `log:` entry writes: a trait so hosts can capture or
/// redirect output instead of inheriting the process's stdio.
pub trait Transcript {
    fn log(&mut self, message: &str);
}

/// Default transcript: writes to stderr, one line per `log:` call.
#[derive(Debug, Default)]
pub struct StdTranscript;

impl Transcript for StdTranscript {
    fn log(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

/// Captures transcript lines in memory instead of inheriting process stdio.
/// Used by tests and by embedders that want to inspect `Transcript.show:` output.
#[derive(Debug, Default)]
pub struct InMemoryTranscript {
    pub lines: Vec<String>,
}

impl Transcript for InMemoryTranscript {
    fn log(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }
}

struct ScheduledCallback {
    block: Rc<Block>,
    delay_ms: u32,
}

/// The distinguished host-bridge object: the sole channel between a running
/// program and the host.
///
/// Scheduling is single-threaded and cooperative: `setTimeout:delay:` just
/// enqueues a callback; nothing runs until [`Bridge::run_event_loop`] drains the
/// queue, in FIFO order, strictly between evaluations.
pub struct Bridge {
    transcript: std::cell::RefCell<Box<dyn Transcript>>,
    scheduled: std::cell::RefCell<VecDeque<ScheduledCallback>>,
}

impl Bridge {
    pub fn new(transcript: Box<dyn Transcript>) -> Rc<Self> {
        Rc::new(Self {
            transcript: std::cell::RefCell::new(transcript),
            scheduled: std::cell::RefCell::new(VecDeque::new()),
        })
    }

    pub fn has_entry(selector: &str) -> bool {
        matches!(selector, "log:" | "show:" | "setTimeout:delay:" | "fetch:options:")
    }

    /// Dispatches a message sent to the bridge object. Host-side failures are
    /// wrapped into `SonError` — they never surface as a raw Rust panic or an
    /// uncaught exception type the evaluator doesn't know.
    pub fn dispatch(self: &Rc<Self>, selector: &str, args: Vec<Value>, receiver: Value) -> EvalResult {
        match selector {
            // `show:` is the classic Transcript spelling; `log:` is the other
            // entry name in use. Both append a line.
            "log:" | "show:" => {
                let [value] = take_args(args, "log:")?;
                self.transcript.borrow_mut().log(&value.to_string());
                Ok(receiver)
            }
            "setTimeout:delay:" => {
                let [block_value, delay_value] = take_args(args, "setTimeout:delay:")?;
                let block = match block_value {
                    Value::Block(b) => b,
                    other => {
                        return Err(SonError::ArgumentError(format!(
                            "setTimeout:delay: expects a block, got {}",
                            other.kind_name()
                        ))
                        .into());
                    }
                };
                let delay_ms = match delay_value {
                    Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => n as u32,
                    other => {
                        return Err(SonError::ArgumentError(format!(
                            "setTimeout:delay: expects a non-negative integer delay, got {other}"
                        ))
                        .into());
                    }
                };
                self.scheduled
                    .borrow_mut()
                    .push_back(ScheduledCallback { block, delay_ms });
                Ok(receiver)
            }
            "fetch:options:" => {
                self.transcript
                    .borrow_mut()
                    .log("warning: Bridge.fetch:options: is not implemented by this host");
                Ok(Value::Null)
            }
            other => Err(SonError::MessageNotUnderstood {
                receiver_kind: "Bridge",
                selector: other.to_string(),
            }
            .into()),
        }
    }

    /// Runs every callback scheduled since the last drain, in the order the host
    /// granted them. Callbacks never interleave with a running evaluation; this
    /// is only ever called between top-level evaluations.
    ///
    /// A callback that raises is caught and reported to the transcript rather
    /// than propagated: a return cannot cross an asynchronous boundary back
    /// into an activation that is no longer on the stack.
    pub fn run_event_loop(self: &Rc<Self>) {
        loop {
            let next = self.scheduled.borrow_mut().pop_front();
            let Some(scheduled) = next else { break };
            match call_block(&scheduled.block, Vec::new()) {
                Ok(_) => {}
                Err(signal) => {
                    self.transcript
                        .borrow_mut()
                        .log(&format!("warning: scheduled callback (delay {}ms) failed: {signal}", scheduled.delay_ms));
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.scheduled.borrow().len()
    }
}

fn take_args<const N: usize>(args: Vec<Value>, selector: &str) -> Result<[Value; N], crate::signal::EvalSignal> {
    args.try_into().map_err(|got: Vec<Value>| {
        SonError::ArgumentError(format!(
            "{selector} expects {N} argument(s), got {}",
            got.len()
        ))
        .into()
    })
}
