//! Tests for named scopes: lifecycle, reuse, open/close and variables

use maplit::hashset;
use std::collections::HashSet;

use super::helpers::{eval_err, eval_ok, interp, interp_with, safe_interp};
use crate::config::Config;
use crate::error::{EngineError, ErrorKind};
use crate::scopes::ScopeOptions;

fn var_set(list: &str) -> HashSet<String> {
    crate::interpreter::script::parse_list(list)
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn test_create_reuses_existing_scope() {
    let interp = interp();
    assert_eq!(eval_ok(&interp, "scope create s1"), "s1");
    eval_ok(&interp, "scope set s1 a 1");

    let first = interp.lookup_scope("s1").unwrap();
    let reused = interp.create_scope(Some("s1"), ScopeOptions::default()).unwrap();
    assert!(!reused.created);
    assert_eq!(reused.frame, first);
    assert_eq!(eval_ok(&interp, "scope vars s1"), "a");
}

#[test]
fn test_strict_create_fails_on_existing_scope() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");

    let err = eval_err(&interp, "scope create -strict s1");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.to_string(), "scope \"s1\" already exists");
}

#[test]
fn test_generated_names_are_unique() {
    let interp = interp();
    let first = eval_ok(&interp, "scope create");
    let second = eval_ok(&interp, "scope create");
    assert!(first.starts_with("scope#"));
    assert_ne!(first, second);
    assert_eq!(eval_ok(&interp, "scope list scope#*").split(' ').count(), 2);
}

#[test]
fn test_args_outside_procedure_rolls_back() {
    let interp = interp();
    let err = eval_err(&interp, "scope create -args s1");
    assert_eq!(err.to_string(), "no procedure frame available");
    // The partially created scope was unregistered
    assert_eq!(eval_ok(&interp, "scope exists s1"), "0");
    assert_eq!(interp.stack_depth(), 1);
}

#[test]
fn test_args_failure_leaves_reused_scope_intact() {
    let interp = interp();
    eval_ok(&interp, "scope create s1; scope set s1 a 1");
    assert_eq!(eval_ok(&interp, "catch {scope create -args s1}"), "1");

    assert_eq!(eval_ok(&interp, "scope list"), "s1");
    assert_eq!(eval_ok(&interp, "scope set s1 a"), "1");
}

#[test]
fn test_clone_copies_current_variables_by_value() {
    let interp = interp();
    eval_ok(&interp, "set a 1; set b 2");
    eval_ok(&interp, "scope create -clone s1");
    eval_ok(&interp, "set a changed");

    assert_eq!(var_set(&eval_ok(&interp, "scope vars s1")), hashset! {"a".to_string(), "b".to_string()});
    assert_eq!(eval_ok(&interp, "scope set s1 a"), "1");
}

#[test]
fn test_clone_byref_shares_variables() {
    let interp = interp();
    eval_ok(&interp, "set a 1");
    eval_ok(&interp, "scope create -clone -byref s1");
    eval_ok(&interp, "set a 2");
    assert_eq!(eval_ok(&interp, "scope set s1 a"), "2");
}

#[test]
fn test_byref_refused_in_safe_interpreter() {
    let interp = safe_interp();
    let err = eval_err(&interp, "scope create -clone -byref s1");
    assert!(err.to_string().starts_with("permission denied"));
}

#[test]
fn test_procedure_scope_captures_arguments() {
    let interp = interp();
    eval_ok(&interp, "proc keep {a {b 5}} { scope create -procedure -shared -args }");

    let name = eval_ok(&interp, "keep 1");
    assert_eq!(name, "procedureScope#::keep");
    assert_eq!(eval_ok(&interp, &format!("scope set {} a", name)), "1");
    assert_eq!(eval_ok(&interp, &format!("scope set {} b", name)), "5");

    // Reuse re-syncs the arguments
    eval_ok(&interp, "keep 7 8");
    assert_eq!(eval_ok(&interp, &format!("scope set {} b", name)), "8");
}

#[test]
fn test_procedure_scope_name_is_per_thread_unless_shared() {
    let interp = interp();
    eval_ok(&interp, "proc mine {} { scope create -procedure }");
    let name = eval_ok(&interp, "mine");
    assert!(name.starts_with("procedureScope#::mine#"));

    let err = eval_err(&interp, "scope create -procedure named");
    assert_eq!(err.to_string(), "cannot specify scope name with -procedure");
}

#[test]
fn test_lambda_scope_name_hashes_body() {
    let interp = interp();
    let name = eval_ok(&interp, "apply {{} { scope create -procedure -shared }}");
    assert!(name.starts_with("lambdaScope#"));
    assert_eq!(name.len(), "lambdaScope#".len() + 64);
    // Same lambda text, same scope
    assert_eq!(eval_ok(&interp, "apply {{} { scope create -procedure -shared }}"), name);
}

#[test]
fn test_open_and_close_scope() {
    let interp = interp();
    eval_ok(&interp, "scope create s1; scope create s2");
    assert_eq!(eval_ok(&interp, "scope open s1"), "");
    eval_ok(&interp, "scope open s2");
    assert_eq!(eval_ok(&interp, "scope current"), "s2");

    eval_ok(&interp, "set v inside");
    assert_eq!(eval_ok(&interp, "scope close"), "s2");
    assert_eq!(eval_ok(&interp, "scope current"), "s1");
    assert_eq!(eval_ok(&interp, "scope close -all"), "s1");
    assert_eq!(eval_ok(&interp, "scope current"), "");

    assert_eq!(eval_ok(&interp, "scope set s2 v"), "inside");
    assert!(!interp.var_exists("v"));
    assert_eq!(eval_err(&interp, "scope close").to_string(), "no scopes are open");
}

#[test]
fn test_close_by_name_reports_missing() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");
    let err = eval_err(&interp, "scope close s1");
    assert_eq!(err.to_string(), "scope \"s1\" is not open");
}

#[test]
fn test_destroy_open_scope_is_refused() {
    let interp = interp();
    eval_ok(&interp, "scope create -open s1");

    let err = eval_err(&interp, "scope destroy s1");
    assert_eq!(err.kind(), ErrorKind::InUse);
    eval_ok(&interp, "scope close");
    eval_ok(&interp, "scope destroy s1");
    assert_eq!(eval_ok(&interp, "scope exists s1"), "0");
}

#[test]
fn test_destroy_unknown_scope() {
    let interp = interp();
    let err = eval_err(&interp, "scope destroy nope");
    assert_eq!(err, EngineError::not_found("scope", "nope"));
}

#[test]
fn test_update_resyncs_from_current_frame() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");
    eval_ok(&interp, "set fresh 1");
    assert_eq!(eval_ok(&interp, "scope update s1"), "s1");
    assert_eq!(eval_ok(&interp, "scope set s1 fresh"), "1");

    // Updating the open scope from itself is refused
    eval_ok(&interp, "scope open s1");
    let err = eval_err(&interp, "scope update");
    assert_eq!(err.to_string(), "cannot clone to same call frame");
}

#[test]
fn test_global_scope_designation() {
    let interp = interp();
    eval_ok(&interp, "scope create g; scope set g shared yes");
    assert_eq!(eval_ok(&interp, "scope global"), "");
    assert_eq!(eval_ok(&interp, "scope global g"), "g");

    let err = eval_err(&interp, "scope global other");
    assert_eq!(err.to_string(), "global scope call frame already set");

    // -global clones now read from the designated scope
    eval_ok(&interp, "scope create -clone -global copy");
    assert_eq!(eval_ok(&interp, "scope set copy shared"), "yes");

    eval_ok(&interp, "scope global -unset");
    assert_eq!(eval_ok(&interp, "scope global"), "");
}

#[test]
fn test_destroy_clears_global_designation() {
    let interp = interp();
    eval_ok(&interp, "scope create g; scope global g; scope destroy g");
    assert_eq!(interp.global_scope(), None);
}

#[test]
fn test_scope_variable_commands() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");
    assert_eq!(eval_ok(&interp, "scope set s1 alpha 1"), "1");
    eval_ok(&interp, "scope set s1 beta 2");
    assert_eq!(eval_ok(&interp, "scope vars s1 a*"), "alpha");

    eval_ok(&interp, "scope unset s1 alpha");
    let err = eval_err(&interp, "scope set s1 alpha");
    assert_eq!(err.to_string(), "can't read \"alpha\": no such variable");
}

#[test]
fn test_scope_eval_writes_into_scope() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");
    assert_eq!(eval_ok(&interp, "scope eval s1 { set x 10 }"), "10");
    assert_eq!(eval_ok(&interp, "scope eval s1 set y {[scope current]}"), "s1");
    assert!(!interp.var_exists("x"));
    assert_eq!(eval_ok(&interp, "scope set s1 y"), "s1");
}

#[test]
fn test_scope_eval_error_trace() {
    let interp = interp();
    eval_ok(&interp, "scope create s1");
    eval_err(&interp, "scope eval s1 {\n  error bad\n}");
    assert!(interp.error_info().contains("(in scope eval \"s1\" script line 2)"));
}

#[test]
fn test_read_only_interpreter_refuses_create() {
    let mut config = Config::default();
    config.interpreter.read_only = true;
    let interp = interp_with(config);

    assert_eq!(eval_err(&interp, "scope create s1"), EngineError::NotModifiable);
    assert!(!interp.is_modifiable());
}

#[test]
fn test_disabled_scopes() {
    let interp = interp();
    interp.set_scopes_enabled(false);
    assert!(!interp.has_scopes());
    assert_eq!(eval_err(&interp, "scope create s1"), EngineError::NoScopes);
    assert_eq!(eval_err(&interp, "scope list"), EngineError::NoScopes);
}

#[test]
fn test_disabled_scopes_block_variable_access() {
    let interp = interp();
    eval_ok(&interp, "scope create s1; scope set s1 a 1");
    interp.set_scopes_enabled(false);

    assert_eq!(eval_err(&interp, "scope set s1 a 2"), EngineError::NoScopes);
    assert_eq!(eval_err(&interp, "scope set s1 a"), EngineError::NoScopes);
    assert_eq!(eval_err(&interp, "scope unset s1 a"), EngineError::NoScopes);
    assert_eq!(eval_err(&interp, "scope vars s1"), EngineError::NoScopes);
    assert_eq!(interp.scope_get("s1", "a"), Err(EngineError::NoScopes));

    interp.set_scopes_enabled(true);
    assert_eq!(eval_ok(&interp, "scope set s1 a"), "1");
}

#[test]
fn test_unknown_subcommand_lists_choices() {
    let interp = interp();
    let err = eval_err(&interp, "scope bogus");
    assert!(err.to_string().starts_with("bad option \"bogus\": must be close, create"));
    let err = eval_err(&interp, "scope destroy");
    assert_eq!(err, EngineError::usage("scope destroy name"));
}
