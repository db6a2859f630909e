//! Interpreter
//!
//! An [`Interpreter`] owns the call frame stack, the scope registry, the
//! namespace tree and the event queue behind one interpreter-wide mutex, plus
//! the cancellation flags that other threads use to stop a running
//! evaluation.
//!
//! The mutex is only ever held for short bookkeeping sections. Script
//! evaluation always happens with it released, so another thread can inspect
//! state, request cancellation or wait for a scope lock at any time.
//!
//! # Example
//!
//! ```rust
//! use tempo_core::Interpreter;
//!
//! let interp = Interpreter::new();
//! interp.eval_top("set x 1").unwrap();
//! assert_eq!(interp.get_var("x").unwrap(), "1");
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cancel::{process_signals, CancelScope, CancellationController, SignalFlags};
use crate::commands::{self, BuiltinFn};
use crate::config::Config;
use crate::error::EngineError;
use crate::frames::{CallFrameStack, Frame, FrameArena, FrameFlags, FrameId};
use crate::namespaces::{names, Command, NamespaceId, NamespaceTree, Procedure};
use crate::scopes::ScopeRegistry;
use crate::types::{Control, EvalResult};

pub mod evaluator;
pub mod procedures;
pub mod script;

#[cfg(test)]
mod tests;

use evaluator::Evaluate;
use script::ScriptEvaluator;

/// Longest command text quoted in an error trace
const TRACE_COMMAND_LIMIT: usize = 150;

/// Longest chain of imports followed when resolving a command
const IMPORT_DEPTH_LIMIT: usize = 16;

/* ===================== Engine State ===================== */

/// Tcl-style error trace (`errorInfo` / `errorLine`)
#[derive(Debug, Default, Clone)]
pub struct ErrorTrace {
    pub info: String,
    pub line: usize,
    /// An error is currently unwinding and has been recorded
    pub active: bool,
}

/// Everything guarded by the interpreter-wide mutex
#[derive(Debug)]
pub struct EngineState {
    pub frames: FrameArena,
    pub stack: CallFrameStack,
    pub scopes: ScopeRegistry,
    pub namespaces: NamespaceTree,
    pub events: VecDeque<String>,
    pub trace: ErrorTrace,
    pub read_only: bool,
}

impl EngineState {
    fn new(config: &Config) -> Self {
        let mut frames = FrameArena::new();
        let global = frames.insert(Frame::new("global", FrameFlags::GLOBAL));
        let mut namespaces = NamespaceTree::new(&mut frames, global);
        namespaces.enabled = config.namespaces.enabled;

        Self {
            frames,
            stack: CallFrameStack::new(global),
            scopes: ScopeRegistry::new(config.scopes.enabled),
            namespaces,
            events: VecDeque::new(),
            trace: ErrorTrace::default(),
            read_only: config.interpreter.read_only,
        }
    }

    pub fn frame(&self, id: FrameId) -> Result<&Frame, EngineError> {
        self.frames
            .get(id)
            .ok_or_else(|| EngineError::invalid("invalid call frame"))
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame, EngineError> {
        self.frames
            .get_mut(id)
            .ok_or_else(|| EngineError::invalid("invalid call frame"))
    }

    pub fn current_variable_frame(&self) -> FrameId {
        self.stack
            .current_variable_frame(&self.frames, &self.namespaces)
    }

    pub fn current_namespace(&self) -> NamespaceId {
        self.stack
            .current_namespace(&self.frames)
            .filter(|ns| self.namespaces.is_live(*ns))
            .unwrap_or_else(|| self.namespaces.global())
    }

    /// Source frame for `-global` clones and updates
    pub fn global_variable_frame(&self) -> FrameId {
        self.scopes
            .global_scope()
            .and_then(|name| self.scopes.get(name))
            .filter(|frame| self.frames.contains(*frame))
            .unwrap_or_else(|| self.stack.global())
    }

    /// Allocate a frame whose parent is the current top of the stack
    pub fn new_frame(&mut self, frame: Frame) -> FrameId {
        let parent = self.stack.peek();
        self.frames.insert(frame.with_parent(Some(parent)))
    }

    /// Unwind to `mark` and reclaim namespaces that are no longer referenced
    pub fn pop_to(&mut self, mark: usize) -> Option<FrameId> {
        let last = self.stack.pop_automatic_to(mark, &mut self.frames);
        self.reclaim_namespaces();
        last
    }

    pub fn namespace_in_use(&self, namespace: NamespaceId) -> bool {
        self.stack.references_namespace(&self.frames, namespace)
    }

    pub fn reclaim_namespaces(&mut self) {
        let stack = &self.stack;
        let frames = &self.frames;
        let reclaimable = self
            .namespaces
            .reclaimable(|ns| stack.references_namespace(frames, ns));
        for id in reclaimable {
            debug!(namespace = ?id, "reclaiming deleted namespace");
            self.namespaces.reclaim(id, &mut self.frames);
        }
    }

    /// Frame and local name that a (possibly qualified) variable name refers to
    fn variable_target<'n>(&self, name: &'n str, action: &str) -> Result<(FrameId, &'n str), EngineError> {
        if !names::is_qualified(name) {
            return Ok((self.current_variable_frame(), name));
        }
        let qualifiers = names::qualifiers(name);
        let namespace = if qualifiers.is_empty() {
            Some(self.namespaces.global())
        } else {
            self.namespaces.find(self.current_namespace(), qualifiers)?
        };
        let frame = namespace
            .and_then(|ns| self.namespaces.frame_of(ns))
            .ok_or_else(|| {
                EngineError::script(format!(
                    "can't {} \"{}\": parent namespace doesn't exist",
                    action, name
                ))
            })?;
        Ok((frame, names::tail(name)))
    }
}

/* ===================== Command Resolution ===================== */

/// What a command name resolved to
#[derive(Clone)]
pub enum Resolved {
    Builtin(BuiltinFn),
    Procedure {
        namespace: NamespaceId,
        procedure: Arc<Procedure>,
    },
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolved::Builtin(_) => f.write_str("Builtin"),
            Resolved::Procedure { namespace, .. } => {
                f.debug_struct("Procedure").field("namespace", namespace).finish()
            }
        }
    }
}

/// A resolved command with the names it is known by
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    /// Qualified name under which the lookup found it
    pub name: String,
    /// Qualified name of the original definition (differs for imports)
    pub origin: String,
    pub target: Resolved,
}

/* ===================== Interpreter ===================== */

pub struct Interpreter {
    id: Uuid,
    state: Mutex<EngineState>,
    /// Signalled when a scope lock is released or a wait should re-check
    lock_released: Condvar,
    signals: CancellationController,
    evaluator: Arc<dyn Evaluate>,
    config: Config,
    epoch: Instant,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.id)
            .field("safe", &self.is_safe())
            .finish()
    }
}

impl Interpreter {
    /// Interpreter with default configuration and the built-in evaluator
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_safe(&self) -> bool {
        self.config.interpreter.safe
    }

    pub fn signals(&self) -> &CancellationController {
        &self.signals
    }

    /// Reference point for raw performance counts
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /* ===================== State Access ===================== */

    pub(crate) fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock()
    }

    pub(crate) fn lock_released(&self) -> &Condvar {
        &self.lock_released
    }

    /// Run `f` inside the interpreter-wide critical section
    ///
    /// `f` must not evaluate scripts.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        f(&mut *self.state.lock())
    }

    pub fn has_scopes(&self) -> bool {
        self.state.lock().scopes.enabled
    }

    pub fn set_scopes_enabled(&self, enabled: bool) {
        self.state.lock().scopes.enabled = enabled;
    }

    pub fn has_namespaces(&self) -> bool {
        self.state.lock().namespaces.enabled
    }

    pub fn is_modifiable(&self) -> bool {
        !self.state.lock().read_only
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.state.lock().read_only = read_only;
    }

    pub fn stack_depth(&self) -> usize {
        self.state.lock().stack.depth()
    }

    /* ===================== Evaluation ===================== */

    pub fn eval(&self, script: &str) -> EvalResult {
        self.evaluator.evaluate(self, script)
    }

    /// Evaluate at top level: `return` yields its value and a stray
    /// `break`/`continue` becomes an error
    pub fn eval_top(&self, script: &str) -> EvalResult {
        self.reset_error_info();
        match self.eval(script) {
            Err(Control::Return(value)) => Ok(value),
            Err(Control::Break) => Err(EngineError::script("invoked \"break\" outside of a loop").into()),
            Err(Control::Continue) => {
                Err(EngineError::script("invoked \"continue\" outside of a loop").into())
            }
            other => other,
        }
    }

    /// Push frames via `enter`, evaluate `script`, then unwind to the depth
    /// recorded on entry
    ///
    /// The unwind runs on every exit path, including a failing `enter`, an
    /// evaluation error, cancellation and panics.
    pub(crate) fn eval_in_frames(
        &self,
        enter: impl FnOnce(&mut EngineState) -> Result<(), EngineError>,
        script: &str,
    ) -> EvalResult {
        let mark = self.state.lock().stack.depth();
        let _unwind = UnwindGuard { interp: self, mark };
        enter(&mut *self.state.lock())?;
        self.eval(script)
    }

    /// Invoke a command given its already substituted words
    pub fn invoke(&self, words: &[String]) -> EvalResult {
        let Some(name) = words.first() else {
            return Ok(String::new());
        };

        let resolved = {
            let state = self.state.lock();
            self.resolve_command(&state, name)
        };
        match resolved {
            Some(ResolvedCommand {
                target: Resolved::Builtin(builtin),
                ..
            }) => builtin(self, words),
            Some(ResolvedCommand {
                name,
                target: Resolved::Procedure { namespace, procedure },
                ..
            }) => self.call_procedure(&name, namespace, &procedure, &words[1..]),
            None => self.invoke_unknown(words),
        }
    }

    fn invoke_unknown(&self, words: &[String]) -> EvalResult {
        let handler = {
            let state = self.state.lock();
            state.namespaces.unknown_for(state.current_namespace())
        };
        match handler {
            Some(handler) if handler != words[0] => {
                let mut command = script::parse_list(&handler)?;
                command.extend(words.iter().cloned());
                self.invoke(&command)
            }
            _ => Err(EngineError::script(format!("invalid command name \"{}\"", words[0])).into()),
        }
    }

    /// Resolve a command name against the current namespace, then the
    /// global namespace and the built-in table
    pub fn resolve_command(&self, state: &EngineState, name: &str) -> Option<ResolvedCommand> {
        resolve_in(state, name, 0)
    }

    /* ===================== Variables ===================== */

    pub fn get_var(&self, name: &str) -> Result<String, EngineError> {
        let state = self.state.lock();
        let (frame, local) = state.variable_target(name, "read")?;
        state
            .frame(frame)?
            .get_var(local)
            .ok_or_else(|| EngineError::script(format!("can't read \"{}\": no such variable", name)))
    }

    pub fn set_var(&self, name: &str, value: &str) -> Result<String, EngineError> {
        let mut state = self.state.lock();
        let (frame, local) = state.variable_target(name, "set")?;
        state.frame_mut(frame)?.set_var(local, value);
        Ok(value.to_string())
    }

    pub fn unset_var(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let (frame, local) = state.variable_target(name, "unset")?;
        if state.frame_mut(frame)?.unset_var(local) {
            Ok(())
        } else {
            Err(EngineError::script(format!("can't unset \"{}\": no such variable", name)))
        }
    }

    pub fn var_exists(&self, name: &str) -> bool {
        let state = self.state.lock();
        state
            .variable_target(name, "read")
            .ok()
            .and_then(|(frame, local)| state.frames.get(frame).map(|f| f.variables.contains_key(local)))
            .unwrap_or(false)
    }

    /* ===================== Cancellation ===================== */

    /// Checkpoint for evaluators; fails once a cancel or halt is pending
    pub fn check_interrupts(&self) -> Result<(), EngineError> {
        self.signals.check()
    }

    pub fn request_cancel(&self, scope: CancelScope) {
        self.signals.request_cancel(scope);
        self.lock_released.notify_all();
    }

    pub fn request_halt(&self, scope: CancelScope) {
        self.signals.request_halt(scope);
        self.lock_released.notify_all();
    }

    pub fn reset_cancel(&self, scope: CancelScope) -> bool {
        self.signals.reset_cancel(scope)
    }

    pub fn reset_halt(&self, scope: CancelScope) -> bool {
        self.signals.reset_halt(scope)
    }

    /* ===================== Error Trace ===================== */

    /// Record that `err` passed through `command` at `line`
    ///
    /// The first command an error crosses starts the trace; each enclosing
    /// command appends an "invoked from within" entry.
    pub fn note_error(&self, err: &EngineError, command: &str, line: usize) {
        let quoted = truncate(command, TRACE_COMMAND_LIMIT);
        let mut state = self.state.lock();
        let trace = &mut state.trace;
        if trace.active {
            trace.info.push_str(&format!("\n    invoked from within\n\"{}\"", quoted));
        } else {
            trace.info = format!("{}\n    while executing\n\"{}\"", err, quoted);
            trace.active = true;
        }
        trace.line = line;
    }

    pub fn add_error_info(&self, text: &str) {
        self.state.lock().trace.info.push_str(text);
    }

    pub fn error_info(&self) -> String {
        self.state.lock().trace.info.clone()
    }

    pub fn error_line(&self) -> usize {
        self.state.lock().trace.line
    }

    /// Mark the current error as handled so the next one starts a new trace
    pub fn reset_error_info(&self) {
        self.state.lock().trace.active = false;
    }

    /* ===================== Events ===================== */

    pub fn queue_event(&self, script: impl Into<String>) {
        self.state.lock().events.push_back(script.into());
        self.lock_released.notify_all();
    }

    pub fn pending_events(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn clear_events(&self) -> usize {
        let mut state = self.state.lock();
        let cleared = state.events.len();
        state.events.clear();
        cleared
    }

    /// Run queued event scripts in order; returns how many ran
    ///
    /// Failures are logged and do not stop the remaining events.
    pub fn service_events(&self) -> usize {
        let mut serviced = 0;
        loop {
            let Some(event) = self.state.lock().events.pop_front() else {
                break;
            };
            serviced += 1;
            if let Err(control) = self.eval(&event) {
                warn!(event = %event, error = %control.value(), "event script failed");
                self.reset_error_info();
            }
        }
        serviced
    }
}

/* ===================== Builder ===================== */

#[derive(Default)]
pub struct InterpreterBuilder {
    config: Option<Config>,
    safe: Option<bool>,
    evaluator: Option<Arc<dyn Evaluate>>,
    global_signals: Option<Arc<SignalFlags>>,
}

impl InterpreterBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = Some(safe);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluate>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Share global cancel/halt flags with other interpreters
    pub fn global_signals(mut self, signals: Arc<SignalFlags>) -> Self {
        self.global_signals = Some(signals);
        self
    }

    pub fn build(self) -> Arc<Interpreter> {
        let mut config = self.config.unwrap_or_default();
        if let Some(safe) = self.safe {
            config.interpreter.safe = safe;
        }
        let interp = Interpreter {
            id: Uuid::new_v4(),
            state: Mutex::new(EngineState::new(&config)),
            lock_released: Condvar::new(),
            signals: CancellationController::new(self.global_signals.unwrap_or_else(process_signals)),
            evaluator: self.evaluator.unwrap_or_else(|| Arc::new(ScriptEvaluator)),
            config,
            epoch: Instant::now(),
            next_id: AtomicU64::new(1),
        };
        debug!(id = %interp.id, safe = interp.is_safe(), "interpreter created");
        Arc::new(interp)
    }
}

/* ===================== Helpers ===================== */

struct UnwindGuard<'a> {
    interp: &'a Interpreter,
    mark: usize,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        self.interp.state.lock().pop_to(self.mark);
    }
}

fn resolve_in(state: &EngineState, name: &str, depth: usize) -> Option<ResolvedCommand> {
    if depth > IMPORT_DEPTH_LIMIT {
        return None;
    }
    let global = state.namespaces.global();
    let current = state.current_namespace();

    let (candidates, tail) = if names::is_qualified(name) {
        let qualifiers = names::qualifiers(name);
        let namespace = if qualifiers.is_empty() && names::is_absolute(name) {
            Some(global)
        } else {
            state.namespaces.find(current, qualifiers).ok().flatten()
        };
        (namespace.into_iter().collect::<Vec<_>>(), names::tail(name))
    } else if current == global {
        (vec![global], name)
    } else {
        (vec![current, global], name)
    };

    for namespace in candidates {
        let found = names::join(&state.namespaces.qualified_name(namespace), tail);
        if let Some(command) = state.namespaces.get(namespace).and_then(|ns| ns.commands.get(tail)) {
            return match command {
                Command::Procedure(procedure) => Some(ResolvedCommand {
                    origin: found.clone(),
                    name: found,
                    target: Resolved::Procedure {
                        namespace,
                        procedure: procedure.clone(),
                    },
                }),
                Command::Import { origin } => resolve_in(state, origin, depth + 1).map(|target| ResolvedCommand {
                    name: found,
                    ..target
                }),
            };
        }
        if namespace == global {
            if let Some(builtin) = commands::lookup_builtin(tail) {
                return Some(ResolvedCommand {
                    origin: found.clone(),
                    name: found,
                    target: Resolved::Builtin(builtin),
                });
            }
        }
    }
    None
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push_str("...");
    out
}
