use super::helpers::{eval_err, eval_ok, interp, interp_with};
use crate::config::Config;
use crate::error::{EngineError, ErrorKind};

#[test]
fn test_eval_creates_and_enters_namespace() {
    let interp = interp();
    assert_eq!(eval_ok(&interp, "namespace eval ::a { namespace current }"), "::a");
    eval_ok(&interp, "namespace eval a::b { set v 1 }");
    assert_eq!(eval_ok(&interp, "set ::a::b::v"), "1");
    assert_eq!(eval_ok(&interp, "namespace current"), "::");

    // Several script words are concatenated
    assert_eq!(eval_ok(&interp, "namespace eval c set y 2"), "2");
    assert_eq!(eval_ok(&interp, "set ::c::y"), "2");

    let err = eval_err(&interp, "namespace eval ::a");
    assert_eq!(err, EngineError::usage("namespace eval name arg ?arg ...?"));
}

#[test]
fn test_relative_eval_creates_child_of_current() {
    let interp = interp();
    eval_ok(&interp, "namespace eval ::b {}");

    let current = eval_ok(&interp, "namespace eval ::a { namespace eval b { namespace current } }");
    assert_eq!(current, "::a::b");
    assert_eq!(eval_ok(&interp, "namespace exists ::a::b"), "1");
    assert_eq!(eval_ok(&interp, "namespace children ::b"), "");
    assert_eq!(eval_ok(&interp, "namespace eval ::a { namespace exists b }"), "1");
    assert_eq!(eval_ok(&interp, "namespace eval ::c { namespace exists b }"), "0");
}

#[test]
fn test_inscope_requires_existing_namespace() {
    let interp = interp();
    let err = eval_err(&interp, "namespace inscope ::nope { set x 1 }");
    assert_eq!(
        err.to_string(),
        "unknown namespace \"::nope\" in inscope namespace command"
    );
    assert_eq!(eval_ok(&interp, "namespace exists ::nope"), "0");

    // Malformed names keep their own error kind
    let err = eval_err(&interp, "namespace inscope ::a:: { set x 1 }");
    assert_eq!(err.kind(), ErrorKind::InvalidName);

    eval_ok(&interp, "namespace eval ::a {}");
    // Extra arguments are appended as list elements
    assert_eq!(eval_ok(&interp, "namespace inscope ::a list a {b c}"), "a {b c}");
    assert_eq!(eval_ok(&interp, "namespace inscope ::a namespace current"), "::a");
}

#[test]
fn test_children_and_descendants() {
    let interp = interp();
    eval_ok(&interp, "namespace eval ::p::q::s {}; namespace eval ::p::r {}");

    assert_eq!(eval_ok(&interp, "namespace children ::p"), "::p::q ::p::r");
    assert_eq!(eval_ok(&interp, "namespace children ::p r*"), "::p::r");
    assert_eq!(eval_ok(&interp, "namespace children ::p ::p::q*"), "::p::q");
    assert_eq!(
        eval_ok(&interp, "namespace descendants ::p"),
        "::p::q ::p::q::s ::p::r"
    );
    assert_eq!(eval_ok(&interp, "namespace eval ::p { namespace children }"), "::p::q ::p::r");
    assert_eq!(eval_ok(&interp, "namespace children ::p::r"), "");
}

#[test]
fn test_parent_qualifiers_and_tail() {
    let interp = interp();
    eval_ok(&interp, "namespace eval ::p::q {}");

    assert_eq!(eval_ok(&interp, "namespace parent ::p::q"), "::p");
    assert_eq!(eval_ok(&interp, "namespace parent ::p"), "::");
    // The global namespace has no parent
    assert_eq!(eval_ok(&interp, "namespace parent"), "");
    assert_eq!(eval_ok(&interp, "namespace eval ::p::q { namespace parent }"), "::p");

    assert_eq!(eval_ok(&interp, "namespace qualifiers ::a::b::c"), "::a::b");
    assert_eq!(eval_ok(&interp, "namespace tail ::a::b::c"), "c");
    assert_eq!(eval_ok(&interp, "namespace tail plain"), "plain");

    let err = eval_err(&interp, "namespace parent ::missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_export_import_and_forget() {
    let interp = interp();
    eval_ok(
        &interp,
        "namespace eval ::lib {
            proc greet {} { return hi }
            proc hidden {} { return no }
            namespace export gr*
        }",
    );
    assert_eq!(eval_ok(&interp, "namespace eval ::lib { namespace export }"), "gr*");

    assert_eq!(eval_ok(&interp, "namespace eval ::app { namespace import ::lib::* }"), "greet");
    assert_eq!(eval_ok(&interp, "namespace eval ::app { greet }"), "hi");
    assert_eq!(eval_ok(&interp, "namespace eval ::app { namespace which greet }"), "::app::greet");
    assert_eq!(eval_ok(&interp, "namespace eval ::app { namespace origin greet }"), "::lib::greet");
    assert_eq!(eval_ok(&interp, "namespace eval ::app { namespace which hidden }"), "");

    let err = eval_err(&interp, "namespace eval ::app { namespace import ::lib::greet }");
    assert_eq!(err.to_string(), "can't import command \"greet\": already exists");
    eval_ok(&interp, "namespace eval ::app { namespace import -force ::lib::greet }");

    eval_ok(&interp, "namespace eval ::app { namespace forget ::lib::greet }");
    assert_eq!(eval_ok(&interp, "namespace eval ::app { namespace which greet }"), "");

    let err = eval_err(&interp, "namespace export ::lib::x");
    assert!(err.to_string().contains("pattern can't specify a namespace"));
    let err = eval_err(&interp, "namespace eval ::lib { namespace import ::lib::greet }");
    assert!(err.to_string().contains("into itself"));
}

#[test]
fn test_export_clear_replaces_patterns() {
    let interp = interp();
    eval_ok(&interp, "namespace eval ::lib { namespace export a* b* }");
    assert_eq!(eval_ok(&interp, "namespace eval ::lib { namespace export -clear c* }"), "");
    assert_eq!(eval_ok(&interp, "namespace eval ::lib { namespace export }"), "c*");
}

#[test]
fn test_which_finds_builtins_and_procs() {
    let interp = interp();
    assert_eq!(eval_ok(&interp, "namespace which -command set"), "::set");
    assert_eq!(eval_ok(&interp, "namespace which nothing"), "");

    eval_ok(&interp, "namespace eval ::a { proc local {} {} }");
    assert_eq!(eval_ok(&interp, "namespace eval ::a { namespace which local }"), "::a::local");
    assert_eq!(eval_ok(&interp, "namespace eval ::a { namespace which set }"), "::set");

    let err = eval_err(&interp, "namespace origin nothing");
    assert_eq!(err.to_string(), "invalid command name \"nothing\"");
}

#[test]
fn test_code_runs_later_in_namespace() {
    let interp = interp();
    let wrapped = eval_ok(&interp, "namespace eval ::a { namespace code {set v 2} }");
    assert_eq!(wrapped, "::namespace inscope ::a {set v 2}");

    eval_ok(&interp, &format!("eval {{{}}}", wrapped));
    assert_eq!(eval_ok(&interp, "set ::a::v"), "2");
    assert!(!interp.var_exists("v"));
}

#[test]
fn test_unknown_handler() {
    let interp = interp();
    assert_eq!(eval_ok(&interp, "namespace unknown"), "");

    eval_ok(&interp, "proc handler {args} { return \"missing $args\" }");
    eval_ok(&interp, "namespace unknown handler");
    assert_eq!(eval_ok(&interp, "nosuch 1 2"), "missing nosuch 1 2");
    // Child namespaces inherit the global handler
    assert_eq!(eval_ok(&interp, "namespace eval ::a { nosuch }"), "missing nosuch");

    eval_ok(&interp, "namespace unknown {}");
    let err = eval_err(&interp, "nosuch");
    assert_eq!(err.to_string(), "invalid command name \"nosuch\"");
}

#[test]
fn test_mappings_redirect_lookups() {
    let interp = interp();
    assert_eq!(eval_ok(&interp, "namespace mappings alias ::real"), "::real");
    eval_ok(&interp, "namespace eval ::real { set z 1 }");

    assert_eq!(eval_ok(&interp, "namespace eval alias { set z }"), "1");
    assert_eq!(eval_ok(&interp, "namespace mappings"), "alias ::real");
    assert_eq!(eval_ok(&interp, "namespace mappings alias"), "::real");

    eval_ok(&interp, "namespace mappings alias {}");
    assert_eq!(eval_ok(&interp, "namespace mappings"), "");
}

#[test]
fn test_enable_and_disable() {
    let interp = interp();
    assert_eq!(eval_ok(&interp, "namespace enable"), "1");
    eval_ok(&interp, "namespace eval ::x {}");

    let err = eval_err(&interp, "namespace enable 0");
    assert_eq!(err.kind(), ErrorKind::InUse);
    assert_eq!(eval_ok(&interp, "namespace enable 0 1"), "0");
    assert_eq!(eval_err(&interp, "namespace current"), EngineError::NamespacesDisabled);

    assert_eq!(eval_ok(&interp, "namespace enable 1"), "1");
    assert_eq!(eval_ok(&interp, "namespace exists ::x"), "0");
}

#[test]
fn test_delete_refuses_global_and_unknown() {
    let interp = interp();
    let err = eval_err(&interp, "namespace delete ::");
    assert_eq!(err.to_string(), "can't delete the global namespace");
    let err = eval_err(&interp, "namespace delete ::nope");
    assert_eq!(
        err.to_string(),
        "unknown namespace \"::nope\" in namespace delete command"
    );
}

#[test]
fn test_delete_removes_subtree() {
    let interp = interp();
    eval_ok(&interp, "namespace eval ::d::e { set v 1 }");
    let frames = interp.with_state(|state| state.frames.len());

    eval_ok(&interp, "namespace delete ::d");
    assert_eq!(eval_ok(&interp, "namespace exists ::d"), "0");
    assert_eq!(eval_ok(&interp, "namespace exists ::d::e"), "0");
    assert_eq!(interp.with_state(|state| state.frames.len()), frames - 2);
}

#[test]
fn test_delete_in_use_is_deferred() {
    let interp = interp();
    let frames = interp.with_state(|state| state.frames.len());

    eval_ok(
        &interp,
        "namespace eval ::d { namespace delete ::d; set ::inside [namespace exists ::d] }",
    );
    assert_eq!(eval_ok(&interp, "set inside"), "0");
    assert_eq!(eval_ok(&interp, "namespace exists ::d"), "0");
    // Reclaimed once the overlay was popped
    assert_eq!(interp.with_state(|state| state.frames.len()), frames);
}

#[test]
fn test_delete_in_use_refused_without_deferral() {
    let mut config = Config::default();
    config.namespaces.delete_in_use_ok = false;
    let interp = interp_with(config);

    let err = eval_err(&interp, "namespace eval ::d { namespace delete ::d }");
    assert_eq!(err.to_string(), "can't delete namespace \"::d\": namespace is in use");
    assert_eq!(eval_ok(&interp, "namespace exists ::d"), "1");
}

#[test]
fn test_rename_moves_namespace() {
    let interp = interp();
    eval_ok(&interp, "namespace eval ::old { set v 1 }");
    eval_ok(&interp, "namespace rename ::old ::new");
    assert_eq!(eval_ok(&interp, "set ::new::v"), "1");
    assert_eq!(eval_ok(&interp, "namespace exists ::old"), "0");

    // A relative target keeps the parent
    eval_ok(&interp, "namespace eval ::p::q {}");
    eval_ok(&interp, "namespace rename ::p::q r2");
    assert_eq!(eval_ok(&interp, "namespace children ::p"), "::p::r2");

    let err = eval_err(&interp, "namespace rename ::new ::p");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    let err = eval_err(&interp, "namespace rename ::missing ::x");
    assert_eq!(
        err.to_string(),
        "can't rename from \"::missing\": namespace does not exist"
    );
}

#[test]
fn test_rename_guards() {
    let interp = interp();
    let err = eval_err(&interp, "namespace rename :: foo");
    assert_eq!(err.to_string(), "can't rename global namespace");

    eval_ok(&interp, "namespace eval ::p::r2 {}");
    let err = eval_err(&interp, "namespace rename ::p ::p::r2::inner");
    assert_eq!(
        err.to_string(),
        "can't rename to \"::p::r2::inner\": namespace would be inside itself"
    );

    let err = eval_err(&interp, "namespace eval ::busy { namespace rename ::busy ::free }");
    assert_eq!(err.to_string(), "can't rename namespace \"::busy\": namespace is in use");
}

#[test]
fn test_global_rename_is_rejected_even_when_allowed() {
    let mut config = Config::default();
    config.namespaces.rename_global_ok = true;
    let interp = interp_with(config);

    let err = eval_err(&interp, "namespace rename :: foo");
    assert_eq!(err.kind(), ErrorKind::InvalidName);
    assert_eq!(eval_ok(&interp, "namespace current"), "::");
    assert_eq!(eval_ok(&interp, "namespace exists ::foo"), "0");
}

#[test]
fn test_rename_in_use_allowed_by_config() {
    let mut config = Config::default();
    config.namespaces.rename_in_use_ok = true;
    let interp = interp_with(config);

    let current = eval_ok(
        &interp,
        "namespace eval ::busy { namespace rename ::busy ::free; namespace current }",
    );
    assert_eq!(current, "::free");
    assert_eq!(eval_ok(&interp, "namespace exists ::busy"), "0");
}
