//! Cooperative cancellation
//!
//! Cancel and halt requests are sticky flags. Nothing is interrupted when a
//! flag is set; the evaluator polls [`CancellationController::check`] before
//! each command and unwinds from there. A script stuck inside a single native
//! command is not interrupted until that command returns.
//!
//! Each flag exists in two scopes. `Local` flags belong to one interpreter.
//! `Global` flags live in a [`SignalFlags`] shared by every interpreter built
//! on it (by default, one per process).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::info;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    Local,
    Global,
}

/* ===================== Signal Flags ===================== */

#[derive(Debug, Default)]
pub struct SignalFlags {
    cancel: AtomicBool,
    halt: AtomicBool,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self::default()
    }
}

static PROCESS_SIGNALS: OnceLock<Arc<SignalFlags>> = OnceLock::new();

/// Global flags shared by interpreters that were not given their own
pub fn process_signals() -> Arc<SignalFlags> {
    PROCESS_SIGNALS
        .get_or_init(|| Arc::new(SignalFlags::new()))
        .clone()
}

/* ===================== Controller ===================== */

#[derive(Debug)]
pub struct CancellationController {
    local: SignalFlags,
    global: Arc<SignalFlags>,
    exit: Mutex<Option<i32>>,
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new(process_signals())
    }
}

impl CancellationController {
    pub fn new(global: Arc<SignalFlags>) -> Self {
        Self {
            local: SignalFlags::new(),
            global,
            exit: Mutex::new(None),
        }
    }

    fn flags(&self, scope: CancelScope) -> &SignalFlags {
        match scope {
            CancelScope::Local => &self.local,
            CancelScope::Global => &self.global,
        }
    }

    pub fn request_cancel(&self, scope: CancelScope) {
        info!(?scope, "cancel requested");
        self.flags(scope).cancel.store(true, Ordering::SeqCst);
    }

    pub fn request_halt(&self, scope: CancelScope) {
        info!(?scope, "halt requested");
        self.flags(scope).halt.store(true, Ordering::SeqCst);
    }

    /// Clear the cancel flag of `scope` only; returns whether it was set
    pub fn reset_cancel(&self, scope: CancelScope) -> bool {
        self.flags(scope).cancel.swap(false, Ordering::SeqCst)
    }

    /// Clear the halt flag of `scope` only; returns whether it was set
    pub fn reset_halt(&self, scope: CancelScope) -> bool {
        self.flags(scope).halt.swap(false, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self, scope: CancelScope) -> bool {
        self.flags(scope).cancel.load(Ordering::SeqCst)
    }

    pub fn is_halted(&self, scope: CancelScope) -> bool {
        self.flags(scope).halt.load(Ordering::SeqCst)
    }

    pub fn any_pending(&self) -> bool {
        [CancelScope::Local, CancelScope::Global]
            .into_iter()
            .any(|scope| self.is_cancelled(scope) || self.is_halted(scope))
    }

    /// Checkpoint polled between commands; halt takes precedence over cancel
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_halted(CancelScope::Local) || self.is_halted(CancelScope::Global) {
            return Err(EngineError::Halted);
        }
        if self.is_cancelled(CancelScope::Local) || self.is_cancelled(CancelScope::Global) {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /* ===================== Exit ===================== */

    pub fn request_exit(&self, code: i32) {
        info!(code, "exit requested");
        *self.exit.lock() = Some(code);
    }

    pub fn exit_pending(&self) -> Option<i32> {
        *self.exit.lock()
    }

    /// Drop a pending exit request; returns the code it carried
    pub fn suppress_exit(&self) -> Option<i32> {
        self.exit.lock().take()
    }
}
