use super::*;
use crate::namespaces::NamespaceTree;
use crate::error::EngineError;

fn stack_with_global() -> (FrameArena, CallFrameStack, NamespaceTree) {
    let mut frames = FrameArena::new();
    let global = frames.insert(Frame::new("global", FrameFlags::GLOBAL));
    let namespaces = NamespaceTree::new(&mut frames, global);
    (frames, CallFrameStack::new(global), namespaces)
}

#[test]
fn test_flags_combine_and_print() {
    let flags = FrameFlags::SCOPE | FrameFlags::FAST;
    assert!(flags.contains(FrameFlags::SCOPE));
    assert!(!flags.contains(FrameFlags::SCOPE | FrameFlags::GLOBAL));
    assert!(flags.intersects(FrameFlags::SCOPE | FrameFlags::GLOBAL));
    assert_eq!(format!("{:?}", flags), "Scope | Fast");
    assert_eq!(format!("{:?}", FrameFlags::NONE), "None");
}

#[test]
fn test_global_frame_cannot_be_popped() {
    let (mut frames, mut stack, _) = stack_with_global();
    assert_eq!(stack.pop(&mut frames), Err(EngineError::EmptyStack));
    assert_eq!(stack.depth(), 1);
}

#[test]
fn test_transient_frames_are_freed_on_pop() {
    let (mut frames, mut stack, _) = stack_with_global();
    let transient = frames.insert(Frame::new("proc", FrameFlags::PROCEDURE));
    let persistent = frames.insert(Frame::new("s1", FrameFlags::SCOPE));

    stack.push_automatic(persistent);
    stack.push_transient(transient);
    let popped = stack.pop_automatic_to(1, &mut frames);

    assert_eq!(popped, Some(persistent));
    assert!(!frames.contains(transient));
    // Scope frames belong to the registry, not the stack
    assert!(frames.contains(persistent));
    assert_eq!(stack.depth(), 1);
}

#[test]
fn test_pop_to_mark_tolerates_earlier_unwind() {
    let (mut frames, mut stack, _) = stack_with_global();
    let a = frames.insert(Frame::new("a", FrameFlags::NONE));
    stack.push_transient(a);
    let mark = stack.depth();

    // Nothing above the mark: a second unwind is a no-op
    assert_eq!(stack.pop_automatic_to(mark, &mut frames), None);
    assert_eq!(stack.pop_automatic_to(0, &mut frames), Some(a));
    assert_eq!(stack.depth(), 1);
}

#[test]
fn test_closable_scopes_stop_at_automatic_entry() {
    let (mut frames, mut stack, _) = stack_with_global();
    let outer = frames.insert(Frame::new("outer", FrameFlags::SCOPE));
    let region = frames.insert(Frame::new("proc", FrameFlags::PROCEDURE));
    let inner = frames.insert(Frame::new("inner", FrameFlags::SCOPE));

    stack.push(outer);
    stack.push_transient(region);
    stack.push(inner);

    assert_eq!(stack.closable_scopes(&frames), vec![3]);
    assert_eq!(stack.close_at(3, &mut frames), Ok(inner));
    assert!(stack.closable_scopes(&frames).is_empty());
}

#[test]
fn test_variable_frame_skips_tracking_frames() {
    let (mut frames, mut stack, namespaces) = stack_with_global();
    let scope = frames.insert(Frame::new("s1", FrameFlags::SCOPE));
    let tracking = frames.insert(Frame::new("scope eval s1", FrameFlags::SCOPE | FrameFlags::TRACKING));

    stack.push_automatic(scope);
    stack.push_transient(tracking);

    assert_eq!(stack.current_variable_frame(&frames, &namespaces), scope);
    assert_eq!(stack.find_scope(&frames, None), Some(1));
    assert_eq!(stack.find_scope(&frames, Some("other")), None);
}

#[test]
fn test_namespace_overlay_resolves_to_namespace_frame() {
    let (mut frames, mut stack, mut namespaces) = stack_with_global();
    let global_ns = namespaces.global();
    let child = namespaces.find_or_create(global_ns, "a", &mut frames).unwrap();
    let overlay = frames.insert(
        Frame::new("namespace eval ::a", FrameFlags::USE_NAMESPACE | FrameFlags::EVALUATE).with_namespace(child),
    );
    stack.push_transient(overlay);

    assert_eq!(stack.current_variable_frame(&frames, &namespaces), namespaces.frame_of(child).unwrap());
    assert_eq!(stack.current_namespace(&frames), Some(child));
    assert!(stack.references_namespace(&frames, child));
}

#[test]
fn test_byref_copy_shares_cells() {
    let mut source = Frame::new("source", FrameFlags::NONE);
    source.set_var("x", "1");
    let mut by_value = Frame::new("copy", FrameFlags::SCOPE);
    let mut by_ref = Frame::new("alias", FrameFlags::SCOPE);

    by_value.copy_variables_from(&source.variables, false);
    by_ref.copy_variables_from(&source.variables, true);
    source.set_var("x", "2");

    assert_eq!(by_value.get_var("x").as_deref(), Some("1"));
    assert_eq!(by_ref.get_var("x").as_deref(), Some("2"));
}

#[test]
fn test_var_names_sorted_and_filtered() {
    let mut frame = Frame::new("f", FrameFlags::NONE);
    for name in ["beta", "alpha", "gamma"] {
        frame.set_var(name, "");
    }
    assert_eq!(frame.var_names(None), vec!["alpha", "beta", "gamma"]);
    let pattern = crate::glob::Glob::new("*a").unwrap();
    assert_eq!(frame.var_names(Some(&pattern)), vec!["alpha", "beta", "gamma"]);
    let pattern = crate::glob::Glob::new("g*").unwrap();
    assert_eq!(frame.var_names(Some(&pattern)), vec!["gamma"]);
}
