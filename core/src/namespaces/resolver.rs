//! Namespace operations that depend on the call stack
//!
//! Everything here runs against the interpreter: the current namespace comes
//! from the stack, in-use checks look at live frames, and overlays push
//! frames for the duration of an evaluation.

use tracing::debug;

use super::{names, NamespaceId};
use crate::error::EngineError;
use crate::frames::{Frame, FrameFlags};
use crate::interpreter::script::format_list;
use crate::interpreter::{EngineState, Interpreter};
use crate::types::{Control, EvalResult};

/// Construct used to enter a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// `namespace eval`: creates missing namespaces
    Eval,
    /// `namespace inscope`: the namespace must exist
    InScope,
}

impl OverlayKind {
    fn label(self) -> &'static str {
        match self {
            OverlayKind::Eval => "namespace eval",
            OverlayKind::InScope => "namespace inscope",
        }
    }

    fn flags(self) -> FrameFlags {
        match self {
            OverlayKind::Eval => FrameFlags::USE_NAMESPACE | FrameFlags::EVALUATE,
            OverlayKind::InScope => FrameFlags::USE_NAMESPACE | FrameFlags::IN_SCOPE,
        }
    }
}

fn enabled(state: &EngineState) -> Result<(), EngineError> {
    if state.namespaces.enabled {
        Ok(())
    } else {
        Err(EngineError::NamespacesDisabled)
    }
}

/// Look up `name` from the current namespace, failing when it is missing
fn existing(state: &EngineState, name: &str) -> Result<NamespaceId, EngineError> {
    let current = state.current_namespace();
    state.namespaces.find(current, name)?.ok_or_else(|| {
        if names::is_absolute(name) {
            EngineError::NotFound(format!("namespace \"{}\" not found", name))
        } else {
            EngineError::NotFound(format!(
                "namespace \"{}\" not found in \"{}\"",
                name,
                state.namespaces.qualified_name(current)
            ))
        }
    })
}

impl Interpreter {
    /* ===================== Overlays ===================== */

    /// Evaluate `script` with namespace `name` as the current namespace
    pub fn overlay_eval(&self, kind: OverlayKind, name: &str, script: &str) -> EvalResult {
        let namespace = {
            let mut state = self.state();
            enabled(&state)?;
            match kind {
                OverlayKind::Eval => {
                    let current = state.current_namespace();
                    let state = &mut *state;
                    state.namespaces.find_or_create(current, name, &mut state.frames)?
                }
                OverlayKind::InScope => match existing(&state, name) {
                    Err(EngineError::NotFound(_)) => {
                        return Err(EngineError::NotFound(format!(
                            "unknown namespace \"{}\" in inscope namespace command",
                            name
                        ))
                        .into());
                    }
                    other => other?,
                },
            }
        };

        let qualified = self.with_state(|state| state.namespaces.qualified_name(namespace));
        let result = self.eval_in_frames(
            |state| {
                if !state.namespaces.is_live(namespace) {
                    return Err(EngineError::NotFound(format!("namespace \"{}\" not found", qualified)));
                }
                let frame = Frame::new(format!("{} {}", kind.label(), qualified), kind.flags()).with_namespace(namespace);
                let id = state.new_frame(frame);
                state.stack.push_transient(id);
                Ok(())
            },
            script,
        );
        if let Err(Control::Error(_)) = &result {
            let line = self.error_line();
            self.add_error_info(&format!("\n    (in {} \"{}\" script line {})", kind.label(), qualified, line));
        }
        result
    }

    pub fn namespace_eval(&self, name: &str, script: &str) -> EvalResult {
        self.overlay_eval(OverlayKind::Eval, name, script)
    }

    /// `namespace inscope`: extra arguments are appended as list elements
    pub fn namespace_inscope(&self, name: &str, script: &str, args: &[String]) -> EvalResult {
        if args.is_empty() {
            return self.overlay_eval(OverlayKind::InScope, name, script);
        }
        let script = format!("{} {}", script, format_list(args));
        self.overlay_eval(OverlayKind::InScope, name, &script)
    }

    /* ===================== Queries ===================== */

    pub fn current_namespace_name(&self) -> Result<String, EngineError> {
        let state = self.state();
        enabled(&state)?;
        Ok(state.namespaces.qualified_name(state.current_namespace()))
    }

    pub fn namespace_exists(&self, name: &str) -> Result<bool, EngineError> {
        let state = self.state();
        enabled(&state)?;
        Ok(state.namespaces.find(state.current_namespace(), name)?.is_some())
    }

    /// Qualified name of the parent; empty for the global namespace
    pub fn namespace_parent(&self, name: Option<&str>) -> Result<String, EngineError> {
        let state = self.state();
        enabled(&state)?;
        let namespace = match name {
            Some(name) => existing(&state, name)?,
            None => state.current_namespace(),
        };
        Ok(state
            .namespaces
            .parent_of(namespace)
            .map(|parent| state.namespaces.qualified_name(parent))
            .unwrap_or_default())
    }

    pub fn namespace_children(&self, name: Option<&str>, pattern: Option<&str>) -> Result<Vec<String>, EngineError> {
        let state = self.state();
        enabled(&state)?;
        let root = match name {
            Some(name) => existing(&state, name)?,
            None => state.current_namespace(),
        };
        Ok(state.namespaces.children(root, pattern)?.qualified_names(&state.namespaces))
    }

    pub fn namespace_descendants(&self, name: Option<&str>, pattern: Option<&str>) -> Result<Vec<String>, EngineError> {
        let state = self.state();
        enabled(&state)?;
        let root = match name {
            Some(name) => existing(&state, name)?,
            None => state.current_namespace(),
        };
        Ok(state
            .namespaces
            .descendants(root, pattern)?
            .qualified_names(&state.namespaces))
    }

    /// Fully qualified name of the command `name` resolves to, or empty
    pub fn namespace_which(&self, name: &str) -> Result<String, EngineError> {
        let state = self.state();
        enabled(&state)?;
        Ok(self
            .resolve_command(&state, name)
            .map(|command| command.name)
            .unwrap_or_default())
    }

    /// Original definition behind a (possibly imported) command
    pub fn namespace_origin(&self, name: &str) -> Result<String, EngineError> {
        let state = self.state();
        enabled(&state)?;
        self.resolve_command(&state, name)
            .map(|command| command.origin)
            .ok_or_else(|| EngineError::script(format!("invalid command name \"{}\"", name)))
    }

    /// Wrap `script` so that it later runs in the current namespace
    pub fn namespace_code(&self, script: &str) -> Result<String, EngineError> {
        let current = self.current_namespace_name()?;
        Ok(format_list(&["::namespace", "inscope", current.as_str(), script]))
    }

    /* ===================== Export / Import ===================== */

    pub fn namespace_export(&self, patterns: &[String], clear: bool) -> Result<Vec<String>, EngineError> {
        let mut state = self.state();
        enabled(&state)?;
        let current = state.current_namespace();
        state.namespaces.export(current, patterns, clear)
    }

    pub fn namespace_import(&self, patterns: &[String], force: bool) -> Result<Vec<String>, EngineError> {
        let mut state = self.state();
        enabled(&state)?;
        let current = state.current_namespace();
        let imported = state.namespaces.import(current, patterns, force)?;
        debug!(count = imported.len(), "imported commands");
        Ok(imported)
    }

    pub fn namespace_forget(&self, patterns: &[String]) -> Result<Vec<String>, EngineError> {
        let mut state = self.state();
        enabled(&state)?;
        let current = state.current_namespace();
        state.namespaces.forget(current, patterns)
    }

    /* ===================== Unknown / Mappings ===================== */

    /// Unknown handler of the current namespace (inherited from global)
    pub fn namespace_unknown(&self) -> Result<String, EngineError> {
        let state = self.state();
        enabled(&state)?;
        Ok(state
            .namespaces
            .unknown_for(state.current_namespace())
            .unwrap_or_default())
    }

    /// Set the current namespace's unknown handler; empty resets it
    pub fn set_namespace_unknown(&self, handler: &str) -> Result<String, EngineError> {
        let mut state = self.state();
        enabled(&state)?;
        let current = state.current_namespace();
        let ns = state
            .namespaces
            .get_mut(current)
            .ok_or_else(|| EngineError::invalid("current namespace is invalid"))?;
        ns.unknown = (!handler.is_empty()).then(|| handler.to_string());
        Ok(handler.to_string())
    }

    pub fn namespace_mappings(&self) -> Result<Vec<(String, String)>, EngineError> {
        let state = self.state();
        enabled(&state)?;
        Ok(state
            .namespaces
            .mappings
            .iter()
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect())
    }

    /// Map namespace name `from` to `to` for lookups; an empty `to` removes
    /// the mapping
    pub fn set_namespace_mapping(&self, from: &str, to: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        enabled(&state)?;
        if to.is_empty() {
            state.namespaces.mappings.shift_remove(from);
        } else {
            state.namespaces.mappings.insert(from.to_string(), to.to_string());
        }
        Ok(())
    }

    /* ===================== Lifecycle ===================== */

    /// Delete namespaces and their descendants
    ///
    /// A namespace still overlaid by a live frame is only marked deleted and
    /// is reclaimed once the overlay is popped (unless deferral is disabled,
    /// in which case the delete fails).
    pub fn delete_namespaces(&self, names: &[String]) -> Result<(), EngineError> {
        let mut state = self.state();
        enabled(&state)?;
        let defer_ok = self.config().namespaces.delete_in_use_ok;

        let mut targets = Vec::with_capacity(names.len());
        for name in names {
            let id = existing(&state, name).map_err(|_| {
                EngineError::NotFound(format!("unknown namespace \"{}\" in namespace delete command", name))
            })?;
            if id == state.namespaces.global() {
                return Err(EngineError::invalid("can't delete the global namespace"));
            }
            if !defer_ok && subtree_in_use(&state, id) {
                return Err(EngineError::InUse(format!(
                    "can't delete namespace \"{}\": namespace is in use",
                    state.namespaces.qualified_name(id)
                )));
            }
            targets.push(id);
        }

        for id in targets {
            debug!(namespace = %state.namespaces.qualified_name(id), "deleting namespace");
            state.namespaces.mark_deleted(id);
        }
        state.reclaim_namespaces();
        Ok(())
    }

    /// Rename (and possibly move) a namespace
    pub fn rename_namespace(
        &self,
        old: &str,
        new: &str,
        allow_global: bool,
        allow_in_use: bool,
    ) -> Result<String, EngineError> {
        let mut state = self.state();
        enabled(&state)?;
        let current = state.current_namespace();
        let global = state.namespaces.global();

        let id = state.namespaces.find(current, old)?.ok_or_else(|| {
            EngineError::NotFound(format!("can't rename from \"{}\": namespace does not exist", old))
        })?;

        let tail = names::tail(new);
        if tail.is_empty() {
            return Err(EngineError::InvalidName(format!("invalid namespace name \"{}\"", new)));
        }

        if id == global {
            if !allow_global {
                return Err(EngineError::invalid("can't rename global namespace"));
            }
            return Err(EngineError::InvalidName(format!(
                "can't rename global namespace to \"{}\": the global namespace name is fixed",
                new
            )));
        }

        if !allow_in_use && subtree_in_use(&state, id) {
            return Err(EngineError::InUse(format!(
                "can't rename namespace \"{}\": namespace is in use",
                state.namespaces.qualified_name(id)
            )));
        }

        let qualifiers = names::qualifiers(new);
        let parent = if qualifiers.is_empty() {
            if names::is_absolute(new) {
                global
            } else {
                state.namespaces.parent_of(id).unwrap_or(global)
            }
        } else {
            state.namespaces.find(current, qualifiers)?.ok_or_else(|| {
                EngineError::NotFound(format!("can't rename to \"{}\": unknown parent namespace", new))
            })?
        };
        if state.namespaces.is_within(parent, id) {
            return Err(EngineError::invalid(format!(
                "can't rename to \"{}\": namespace would be inside itself",
                new
            )));
        }

        let target = names::join(&state.namespaces.qualified_name(parent), tail);
        if state.namespaces.find(global, &target)?.is_some() {
            return Err(EngineError::AlreadyExists(format!(
                "can't rename to \"{}\": namespace already exists",
                new
            )));
        }

        let state = &mut *state;
        state.namespaces.relink(id, parent, tail);
        state.namespaces.refresh_frame_names(id, &mut state.frames);
        debug!(from = %old, to = %target, "renamed namespace");
        Ok(target)
    }

    /// Turn namespace support on or off
    ///
    /// Disabling while namespaces other than the global one exist requires
    /// `force`, which deletes them.
    pub fn enable_namespaces(&self, enable: bool, force: bool) -> Result<bool, EngineError> {
        let mut state = self.state();
        if enable {
            state.namespaces.enabled = true;
            return Ok(true);
        }
        let global = state.namespaces.global();
        let children: Vec<NamespaceId> = state
            .namespaces
            .children(global, None)?
            .iter(&state.namespaces)
            .collect();
        if !children.is_empty() && !force {
            return Err(EngineError::InUse(
                "can't disable namespaces: namespaces other than the global namespace exist".to_string(),
            ));
        }
        for child in children {
            state.namespaces.mark_deleted(child);
        }
        state.reclaim_namespaces();
        state.namespaces.enabled = false;
        Ok(false)
    }
}

fn subtree_in_use(state: &EngineState, id: NamespaceId) -> bool {
    state
        .namespaces
        .descendants(id, None)
        .map(|list| list.iter(&state.namespaces).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .chain(std::iter::once(id))
        .any(|ns| state.namespace_in_use(ns))
}
