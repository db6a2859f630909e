//! Seam between the engine and the script evaluator

use super::Interpreter;
use crate::types::EvalResult;

/// Evaluates a script against an interpreter
///
/// The engine treats evaluation as an opaque re-entrant call. An evaluator
/// may push and pop frames of its own, re-enter the engine through
/// [`Interpreter::invoke`], and is expected to call
/// [`Interpreter::check_interrupts`] at each statement boundary so that
/// cancellation takes effect. It must not hold the interpreter's state lock
/// across nested evaluation.
pub trait Evaluate: Send + Sync {
    fn evaluate(&self, interp: &Interpreter, script: &str) -> EvalResult;
}
