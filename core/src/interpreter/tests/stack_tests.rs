//! Tests for call stack balance
//!
//! Every region that pushes frames must leave the stack at the depth it
//! found, whatever the outcome of the evaluation inside it.

use super::helpers::{eval_err, eval_ok, interp};
use crate::error::EngineError;
use crate::types::Control;

#[test]
fn test_stack_restored_after_procedure_error() {
    let interp = interp();
    eval_ok(&interp, "proc boom {} { error inner }");
    let before = interp.stack_depth();

    let err = eval_err(&interp, "boom");
    assert_eq!(err, EngineError::script("inner"));
    assert_eq!(interp.stack_depth(), before);
}

#[test]
fn test_stack_restored_after_scope_eval_error() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");

    eval_err(&interp, "scope eval s1 { set x 1; error fail }");
    assert_eq!(interp.stack_depth(), 1);
    // The assignment before the error landed in the scope
    assert_eq!(eval_ok(&interp, "scope set s1 x"), "1");
}

#[test]
fn test_stack_restored_after_namespace_eval_break() {
    let interp = interp();
    let result = interp.eval("namespace eval ::a { break }");
    assert_eq!(result, Err(Control::Break));
    assert_eq!(interp.stack_depth(), 1);
}

#[test]
fn test_stack_restored_after_cancel_in_nested_regions() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");
    eval_ok(&interp, "proc inner {} { namespace eval ::b { scope eval s1 { cancel; set never 1 } } }");

    let err = eval_err(&interp, "inner");
    assert_eq!(err, EngineError::Cancelled);
    assert_eq!(interp.stack_depth(), 1);
    interp.reset_cancel(crate::cancel::CancelScope::Local);
    assert_eq!(eval_ok(&interp, "scope vars s1"), "");
}

#[test]
fn test_open_scope_left_open_is_unwound_with_region() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");
    eval_ok(&interp, "proc leaky {} { scope open s1; set y 2 }");

    eval_ok(&interp, "leaky");
    assert_eq!(interp.stack_depth(), 1);
    assert_eq!(eval_ok(&interp, "scope set s1 y"), "2");
}

#[test]
fn test_transient_frames_freed_after_calls() {
    let interp = interp();
    eval_ok(&interp, "proc noop {} {}");
    let live = interp.with_state(|state| state.frames.len());

    for _ in 0..10 {
        eval_ok(&interp, "noop; apply {{} {}}; namespace eval ::c {}");
    }
    // Only the namespace frame of ::c was added
    assert_eq!(interp.with_state(|state| state.frames.len()), live + 1);
}

#[test]
fn test_error_info_traces_procedure_and_overlay() {
    let interp = interp();
    eval_ok(&interp, "proc fail {} {\n  set a 1\n  error deep\n}");

    eval_err(&interp, "namespace eval ::n { fail }");
    let info = interp.error_info();
    assert!(info.starts_with("deep\n    while executing\n\"error deep\""));
    assert!(info.contains("(procedure \"::fail\" line 3)"));
    assert!(info.contains("invoked from within\n\"fail\""));
    assert!(info.contains("(in namespace eval \"::n\" script line 1)"));
}
