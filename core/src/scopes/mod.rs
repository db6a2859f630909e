//! Named scopes
//!
//! A scope is a persistent frame registered under a name. It outlives the
//! region that created it and can be reopened, evaluated in, locked and
//! destroyed by name. The registry owns the frames it maps; removing a name
//! frees the frame and its variables.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::EngineError;
use crate::frames::{Frame, FrameArena, FrameFlags, FrameId, Variable};
use crate::glob::Glob;
use crate::interpreter::{EngineState, Interpreter};
use crate::types::{Control, EvalResult};

pub mod lock;

pub use lock::{current_owner, ScopeLockGuard, WaitFlags};

const SCOPE_PREFIX: &str = "scope";
const PROCEDURE_SCOPE_PREFIX: &str = "procedureScope";
const LAMBDA_SCOPE_PREFIX: &str = "lambdaScope";

/* ===================== Registry ===================== */

#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub frame: FrameId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ScopeRegistry {
    entries: IndexMap<String, ScopeEntry>,
    pub enabled: bool,
    /// Scope that stands in for the global frame as clone/update source
    global: Option<String>,
}

impl ScopeRegistry {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: IndexMap::new(),
            enabled,
            global: None,
        }
    }

    pub fn insert(&mut self, name: &str, frame: FrameId) {
        self.entries.insert(
            name.to_string(),
            ScopeEntry {
                frame,
                created_at: Utc::now(),
            },
        );
    }

    /// Unregister `name` and free its frame
    pub fn remove(&mut self, name: &str, frames: &mut FrameArena) -> Option<FrameId> {
        let entry = self.entries.shift_remove(name)?;
        frames.remove(entry.frame);
        if self.global.as_deref() == Some(name) {
            self.global = None;
        }
        Some(entry.frame)
    }

    pub fn get(&self, name: &str) -> Option<FrameId> {
        self.entries.get(name).map(|entry| entry.frame)
    }

    pub fn entry(&self, name: &str) -> Option<&ScopeEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted scope names, optionally filtered
    pub fn names(&self, pattern: Option<&Glob>) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter(|name| crate::glob::matches(pattern, name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn global_scope(&self) -> Option<&str> {
        self.global.as_deref()
    }

    pub fn set_global(&mut self, name: &str) {
        self.global = Some(name.to_string());
    }

    pub fn clear_global(&mut self) -> Option<String> {
        self.global.take()
    }
}

/* ===================== Options ===================== */

/// Options of `scope create`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeOptions {
    /// Copy the variables of the current (or global) frame into a new scope
    pub clone: bool,
    /// Share variable cells instead of copying values
    pub by_ref: bool,
    /// Clone from the global frame (or global scope) instead of the current one
    pub global: bool,
    /// Derive the name from the innermost procedure frame
    pub procedure: bool,
    /// Omit the thread component from a derived name
    pub shared: bool,
    /// Push the scope after creating it
    pub open: bool,
    /// Copy the innermost procedure's arguments into the scope
    pub args: bool,
    /// Fail instead of reusing an existing scope
    pub strict: bool,
    pub fast: bool,
}

/// Options of `scope eval`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeEvalOptions {
    pub lock: bool,
    /// `None` waits forever
    pub timeout: Option<Duration>,
    pub wait_flags: WaitFlags,
}

impl Default for ScopeEvalOptions {
    fn default() -> Self {
        Self {
            lock: false,
            timeout: None,
            wait_flags: WaitFlags::DEFAULT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedScope {
    pub name: String,
    pub frame: FrameId,
    /// False when an existing scope was reused
    pub created: bool,
}

/// Convert a millisecond setting to a wait; negative means forever
pub fn timeout_from_millis(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

/* ===================== Scope Operations ===================== */

impl Interpreter {
    fn scopes_enabled(state: &EngineState) -> Result<(), EngineError> {
        if state.scopes.enabled {
            Ok(())
        } else {
            Err(EngineError::NoScopes)
        }
    }

    /// Create a scope, or reuse an existing one of the same name
    ///
    /// The new scope is registered before its arguments are copied; if that
    /// copy fails the registration is rolled back and the frame freed.
    pub fn create_scope(&self, name: Option<&str>, options: ScopeOptions) -> Result<CreatedScope, EngineError> {
        let mut state = self.state();
        if state.read_only {
            return Err(EngineError::NotModifiable);
        }
        Self::scopes_enabled(&state)?;

        let name = match (name, options.procedure) {
            (Some(_), true) => {
                return Err(EngineError::invalid("cannot specify scope name with -procedure"));
            }
            (Some(name), false) => name.to_string(),
            (None, true) => procedure_scope_name(&state, options.shared)?,
            (None, false) => format!("{}#{}", SCOPE_PREFIX, self.next_id()),
        };

        if let Some(existing) = state.scopes.get(&name) {
            if options.strict {
                return Err(EngineError::AlreadyExists(format!("scope \"{}\" already exists", name)));
            }
            if options.args {
                copy_procedure_arguments(&mut state, existing)?;
            }
            if options.open {
                state.stack.push(existing);
            }
            debug!(scope = %name, "reusing scope");
            return Ok(CreatedScope {
                name,
                frame: existing,
                created: false,
            });
        }

        let mut flags = FrameFlags::SCOPE;
        if options.fast {
            flags |= FrameFlags::FAST;
        }
        let mut frame = Frame::new(name.clone(), flags);
        if options.clone {
            let source = if options.global {
                state.global_variable_frame()
            } else {
                state.current_variable_frame()
            };
            let variables = state.frame(source)?.variables.clone();
            frame.copy_variables_from(&variables, options.by_ref);
        }
        let id = state.new_frame(frame);
        state.scopes.insert(&name, id);

        if options.args {
            if let Err(err) = copy_procedure_arguments(&mut state, id) {
                debug!(scope = %name, error = %err, "rolling back scope creation");
                let state = &mut *state;
                state.scopes.remove(&name, &mut state.frames);
                return Err(err);
            }
        }
        if options.open {
            state.stack.push(id);
        }
        debug!(scope = %name, "created scope");
        Ok(CreatedScope {
            name,
            frame: id,
            created: true,
        })
    }

    /// Unregister a scope and free its frame
    pub fn destroy_scope(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.read_only {
            return Err(EngineError::NotModifiable);
        }
        Self::scopes_enabled(&state)?;
        let frame = state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))?;
        if state.stack.contains(frame) {
            return Err(EngineError::InUse(format!("scope \"{}\" is in use", name)));
        }
        let lived_ms = state
            .scopes
            .entry(name)
            .map(|entry| (Utc::now() - entry.created_at).num_milliseconds())
            .unwrap_or_default();
        let state = &mut *state;
        state.scopes.remove(name, &mut state.frames);
        debug!(scope = %name, lived_ms, "destroyed scope");
        // Waiters for this scope's lock re-check and find it gone
        self.lock_released().notify_all();
        Ok(())
    }

    pub fn scope_exists(&self, name: &str) -> bool {
        self.state().scopes.contains(name)
    }

    pub fn lookup_scope(&self, name: &str) -> Result<FrameId, EngineError> {
        let state = self.state();
        Self::scopes_enabled(&state)?;
        state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))
    }

    pub fn list_scopes(&self, pattern: Option<&str>) -> Result<Vec<String>, EngineError> {
        let pattern = pattern.map(Glob::new).transpose()?;
        let state = self.state();
        Self::scopes_enabled(&state)?;
        Ok(state.scopes.names(pattern.as_ref()))
    }

    /* ===================== Open / Close ===================== */

    /// Push an existing scope explicitly; it stays open until closed or
    /// until the enclosing region unwinds
    pub fn open_scope(
        &self,
        name: Option<&str>,
        procedure: bool,
        shared: bool,
        args: bool,
    ) -> Result<String, EngineError> {
        let mut state = self.state();
        Self::scopes_enabled(&state)?;
        let name = match (name, procedure) {
            (Some(_), true) => {
                return Err(EngineError::invalid("cannot specify scope name with -procedure"));
            }
            (Some(name), false) => name.to_string(),
            (None, true) => procedure_scope_name(&state, shared)?,
            (None, false) => return Err(EngineError::invalid("must specify scope name or -procedure")),
        };
        let frame = state
            .scopes
            .get(&name)
            .ok_or_else(|| EngineError::not_found("scope", &name))?;
        if args {
            copy_procedure_arguments(&mut state, frame)?;
        }
        state.stack.push(frame);
        debug!(scope = %name, depth = state.stack.depth(), "opened scope");
        Ok(name)
    }

    /// Close the topmost open scope (matching `name` when given), or every
    /// open scope with `all`; returns the name of the last one closed
    pub fn close_scope(&self, name: Option<&str>, all: bool) -> Result<String, EngineError> {
        let mut state = self.state();
        Self::scopes_enabled(&state)?;
        let state = &mut *state;

        let closable = state.stack.closable_scopes(&state.frames);
        let targets: Vec<usize> = if all {
            closable
        } else {
            closable
                .into_iter()
                .find(|index| {
                    name.map_or(true, |wanted| {
                        state
                            .stack
                            .get(*index)
                            .and_then(|entry| state.frames.get(entry.frame))
                            .is_some_and(|frame| frame.name == wanted)
                    })
                })
                .into_iter()
                .collect()
        };

        if targets.is_empty() {
            return Err(match name {
                Some(name) if !all => EngineError::NotFound(format!("scope \"{}\" is not open", name)),
                _ => EngineError::NotFound("no scopes are open".to_string()),
            });
        }

        let mut last = String::new();
        // Indices are topmost first, so earlier removals never shift later ones
        for index in targets {
            let frame = state.stack.close_at(index, &mut state.frames)?;
            last = state.frame(frame).map(|f| f.name.clone()).unwrap_or_default();
        }
        debug!(scope = %last, "closed scope");
        Ok(last)
    }

    /// Name of the topmost scope frame on the stack, if any
    pub fn current_scope(&self) -> Option<String> {
        let state = self.state();
        let index = state.stack.find_scope(&state.frames, None)?;
        let entry = state.stack.get(index)?;
        state.frames.get(entry.frame).map(|frame| frame.name.clone())
    }

    /* ===================== Variables ===================== */

    /// Re-sync a scope from the current (or global) variable frame
    ///
    /// Without a name the topmost open scope is updated.
    pub fn update_scope(&self, name: Option<&str>, global: bool) -> Result<String, EngineError> {
        let mut state = self.state();
        Self::scopes_enabled(&state)?;
        let target = match name {
            Some(name) => state
                .scopes
                .get(name)
                .ok_or_else(|| EngineError::not_found("scope", name))?,
            None => {
                let index = state
                    .stack
                    .find_scope(&state.frames, None)
                    .ok_or_else(|| EngineError::NotFound("no scopes are open".to_string()))?;
                state.stack.get(index).map(|entry| entry.frame).ok_or(EngineError::EmptyStack)?
            }
        };
        let source = if global {
            state.global_variable_frame()
        } else {
            state.current_variable_frame()
        };
        if source == target {
            return Err(EngineError::invalid("cannot clone to same call frame"));
        }
        if !state.frame(target)?.is_scope() {
            return Err(EngineError::invalid("target call frame must be scope"));
        }
        let variables: HashMap<String, Variable> = state.frame(source)?.variables.clone();
        let frame = state.frame_mut(target)?;
        frame.copy_variables_from(&variables, false);
        Ok(frame.name.clone())
    }

    pub fn scope_get(&self, name: &str, var: &str) -> Result<String, EngineError> {
        let state = self.state();
        Self::scopes_enabled(&state)?;
        let frame = state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))?;
        state
            .frame(frame)?
            .get_var(var)
            .ok_or_else(|| EngineError::script(format!("can't read \"{}\": no such variable", var)))
    }

    pub fn scope_set(&self, name: &str, var: &str, value: &str) -> Result<String, EngineError> {
        let mut state = self.state();
        Self::scopes_enabled(&state)?;
        let frame = state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))?;
        state.frame_mut(frame)?.set_var(var, value);
        Ok(value.to_string())
    }

    pub fn scope_unset(&self, name: &str, var: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        Self::scopes_enabled(&state)?;
        let frame = state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))?;
        if state.frame_mut(frame)?.unset_var(var) {
            Ok(())
        } else {
            Err(EngineError::script(format!("can't unset \"{}\": no such variable", var)))
        }
    }

    pub fn scope_vars(&self, name: &str, pattern: Option<&str>) -> Result<Vec<String>, EngineError> {
        let pattern = pattern.map(Glob::new).transpose()?;
        let state = self.state();
        Self::scopes_enabled(&state)?;
        let frame = state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))?;
        Ok(state.frame(frame)?.var_names(pattern.as_ref()))
    }

    /* ===================== Global Scope ===================== */

    pub fn global_scope(&self) -> Option<String> {
        self.state().scopes.global_scope().map(str::to_string)
    }

    /// Make `name` the source for `-global` clones and updates
    pub fn set_global_scope(&self, name: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.read_only {
            return Err(EngineError::NotModifiable);
        }
        Self::scopes_enabled(&state)?;
        if state.scopes.global_scope().is_some() && !force {
            return Err(EngineError::AlreadyExists(
                "global scope call frame already set".to_string(),
            ));
        }
        let frame = state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))?;
        clear_global_flag(&mut state);
        state.frame_mut(frame)?.flags.insert(FrameFlags::GLOBAL_SCOPE);
        state.scopes.set_global(name);
        debug!(scope = %name, "set global scope");
        Ok(())
    }

    pub fn unset_global_scope(&self, force: bool) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.read_only {
            return Err(EngineError::NotModifiable);
        }
        Self::scopes_enabled(&state)?;
        if state.scopes.global_scope().is_none() && !force {
            return Err(EngineError::NotFound("global scope call frame not set".to_string()));
        }
        clear_global_flag(&mut state);
        state.scopes.clear_global();
        Ok(())
    }

    /* ===================== Scope Eval ===================== */

    /// Evaluate `script` with scope `name` as the variable frame
    ///
    /// With `lock` the scope is held for the whole evaluation and released
    /// on every exit path.
    pub fn eval_in_scope(&self, name: &str, script: &str, options: ScopeEvalOptions) -> EvalResult {
        let frame = self.lookup_scope(name)?;
        let _guard = if options.lock {
            let locked = self.lock_scope(name, options.wait_flags, options.timeout)?;
            Some(ScopeLockGuard::new(self, name, locked))
        } else {
            None
        };

        let result = self.eval_in_frames(
            |state| {
                if !state.frames.contains(frame) {
                    return Err(EngineError::not_found("scope", name));
                }
                state.stack.push_automatic(frame);
                let tracking = state.new_frame(Frame::new(
                    format!("scope eval {}", name),
                    FrameFlags::SCOPE | FrameFlags::EVALUATE | FrameFlags::TRACKING,
                ));
                state.stack.push_transient(tracking);
                Ok(())
            },
            script,
        );
        if let Err(Control::Error(_)) = &result {
            let line = self.error_line();
            self.add_error_info(&format!("\n    (in scope eval \"{}\" script line {})", name, line));
        }
        result
    }
}

/* ===================== Helpers ===================== */

/// Innermost procedure frame on the stack
fn procedure_frame(state: &EngineState) -> Option<&Frame> {
    state
        .stack
        .iter_top_down()
        .filter_map(|entry| state.frames.get(entry.frame))
        .find(|frame| frame.is_procedure() && !frame.flags.contains(FrameFlags::TRACKING))
}

fn procedure_scope_name(state: &EngineState, shared: bool) -> Result<String, EngineError> {
    let frame = procedure_frame(state).ok_or_else(|| EngineError::NotFound("no procedure frame available".to_string()))?;
    let base = if frame.flags.contains(FrameFlags::LAMBDA) {
        let digest = Sha256::digest(frame.name.as_bytes());
        format!("{}#{:x}", LAMBDA_SCOPE_PREFIX, digest)
    } else {
        format!("{}#{}", PROCEDURE_SCOPE_PREFIX, frame.name)
    };
    if shared {
        Ok(base)
    } else {
        Ok(format!("{}#{}", base, current_owner()))
    }
}

fn copy_procedure_arguments(state: &mut EngineState, target: FrameId) -> Result<(), EngineError> {
    let arguments = procedure_frame(state)
        .map(|frame| frame.arguments.clone())
        .ok_or_else(|| EngineError::NotFound("no procedure frame available".to_string()))?;
    let frame = state.frame_mut(target)?;
    for (formal, value) in arguments {
        frame.set_var(&formal, value);
    }
    Ok(())
}

fn clear_global_flag(state: &mut EngineState) {
    let Some(previous) = state.scopes.global_scope().and_then(|name| state.scopes.get(name)) else {
        return;
    };
    if let Some(frame) = state.frames.get_mut(previous) {
        frame.flags.remove(FrameFlags::GLOBAL_SCOPE);
    }
}
