use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::helpers::{eval_err, eval_ok, interp};
use crate::cancel::{CancelScope, SignalFlags};
use crate::error::EngineError;
use crate::interpreter::Interpreter;
use crate::types::Control;

#[test]
fn test_local_cancel_is_per_interpreter() {
    let shared = Arc::new(SignalFlags::new());
    let first = Interpreter::builder().global_signals(Arc::clone(&shared)).build();
    let second = Interpreter::builder().global_signals(Arc::clone(&shared)).build();

    first.request_cancel(CancelScope::Local);
    assert_eq!(first.eval("set x 1"), Err(Control::Error(EngineError::Cancelled)));
    assert_eq!(second.eval("set x 1"), Ok("1".to_string()));
    first.reset_cancel(CancelScope::Local);
}

#[test]
fn test_global_cancel_reaches_every_interpreter() {
    let shared = Arc::new(SignalFlags::new());
    let first = Interpreter::builder().global_signals(Arc::clone(&shared)).build();
    let second = Interpreter::builder().global_signals(Arc::clone(&shared)).build();

    eval_ok(&first, "cancel -global");
    assert_eq!(eval_err(&second, "set x 1"), EngineError::Cancelled);

    // Resetting the local flag leaves the global one alone
    assert!(!second.reset_cancel(CancelScope::Local));
    assert!(second.reset_cancel(CancelScope::Global));
    assert_eq!(eval_ok(&first, "set x 2"), "2");
}

#[test]
fn test_catch_does_not_swallow_interrupts() {
    let interp = interp();
    assert_eq!(eval_ok(&interp, "catch {error oops} msg"), "1");
    assert_eq!(eval_ok(&interp, "set msg"), "oops");

    let err = eval_err(&interp, "catch {cancel; set x 1}");
    assert_eq!(err, EngineError::Cancelled);
    assert!(!interp.var_exists("x"));
    interp.reset_cancel(CancelScope::Local);

    let err = eval_err(&interp, "catch {halt; set x 1}");
    assert_eq!(err, EngineError::Halted);
    interp.reset_halt(CancelScope::Local);
}

#[test]
fn test_halt_reported_before_cancel() {
    let interp = interp();
    interp.request_cancel(CancelScope::Local);
    interp.request_halt(CancelScope::Global);
    assert_eq!(interp.check_interrupts(), Err(EngineError::Halted));

    interp.reset_halt(CancelScope::Global);
    assert_eq!(interp.check_interrupts(), Err(EngineError::Cancelled));
    interp.reset_cancel(CancelScope::Local);
    assert_eq!(interp.check_interrupts(), Ok(()));
}

#[test]
fn test_exit_escapes_catch() {
    let interp = interp();
    assert_eq!(interp.eval_top("catch {exit 2}"), Err(Control::Exit(2)));
    assert_eq!(interp.signals().exit_pending(), Some(2));
    assert_eq!(interp.signals().suppress_exit(), Some(2));
    assert_eq!(interp.signals().exit_pending(), None);
}

#[test]
fn test_cancel_interrupts_sleeping_script() {
    let interp = interp();
    let started = Instant::now();

    let err = thread::scope(|s| {
        let runner = s.spawn(|| eval_err(&interp, "after 2000"));
        thread::sleep(Duration::from_millis(20));
        interp.request_cancel(CancelScope::Local);
        runner.join().unwrap()
    });

    assert_eq!(err, EngineError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(interp.error_info().starts_with("eval canceled"));
    interp.reset_cancel(CancelScope::Local);
}

#[test]
fn test_cancel_usage() {
    let interp = interp();
    assert_eq!(eval_err(&interp, "cancel now"), EngineError::usage("cancel ?-global?"));
    assert_eq!(eval_err(&interp, "halt -global extra"), EngineError::usage("halt ?-global?"));
}
