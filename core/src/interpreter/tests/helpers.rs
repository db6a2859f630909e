//! Test helpers for interpreter tests
//!
//! Interpreters built here get their own global signal flags so that tests
//! requesting a global cancel or halt cannot disturb tests running in
//! parallel.

use std::sync::Arc;

use crate::cancel::SignalFlags;
use crate::config::Config;
use crate::error::EngineError;
use crate::interpreter::Interpreter;
use crate::types::{Control, EvalResult};

/// Interpreter with default settings and private global flags
pub fn interp() -> Arc<Interpreter> {
    interp_with(Config::default())
}

pub fn interp_with(config: Config) -> Arc<Interpreter> {
    Interpreter::builder()
        .config(config)
        .global_signals(Arc::new(SignalFlags::new()))
        .build()
}

pub fn safe_interp() -> Arc<Interpreter> {
    Interpreter::builder()
        .safe(true)
        .global_signals(Arc::new(SignalFlags::new()))
        .build()
}

/// Evaluate at top level and return the value, panicking on failure
pub fn eval_ok(interp: &Interpreter, script: &str) -> String {
    match interp.eval_top(script) {
        Ok(value) => value,
        Err(control) => panic!("script failed: {:?}\n{}", control, interp.error_info()),
    }
}

/// Evaluate at top level and return the engine error it failed with
pub fn eval_err(interp: &Interpreter, script: &str) -> EngineError {
    let result: EvalResult = interp.eval_top(script);
    let Err(Control::Error(err)) = result else {
        unreachable!("Expected an error from {:?}, got {:?}", script, result);
    };
    err
}
