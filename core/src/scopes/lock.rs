//! Scope locks
//!
//! A scope frame can be held by one owner at a time. The owner is the host
//! thread, identified by a token handed out the first time the thread asks
//! for it. Locks are re-entrant: the same owner may lock again and must
//! unlock as many times.
//!
//! Waiting happens on the interpreter's condition variable, which releases
//! the interpreter-wide mutex for the duration. Waits are sliced so that
//! cancellation and queued events are noticed without a notification.

use std::cell::Cell;
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;
use tracing::{debug, warn};

use crate::cancel::CancelScope;
use crate::error::EngineError;
use crate::frames::{FrameId, LockState};
use crate::interpreter::Interpreter;

/// Longest single wait before re-checking cancellation and events
const WAIT_SLICE: Duration = Duration::from_millis(50);

/* ===================== Owners ===================== */

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static OWNER: Cell<u64> = const { Cell::new(0) };
}

/// Lock owner token of the calling thread
pub fn current_owner() -> u64 {
    OWNER.with(|owner| {
        if owner.get() == 0 {
            owner.set(NEXT_OWNER.fetch_add(1, Ordering::Relaxed));
        }
        owner.get()
    })
}

/* ===================== Wait Flags ===================== */

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitFlags(u8);

impl WaitFlags {
    pub const NONE: WaitFlags = WaitFlags(0);
    /// Abort the wait when a cancel is pending
    pub const CANCEL: WaitFlags = WaitFlags(1 << 0);
    /// Abort the wait when a halt is pending
    pub const HALT: WaitFlags = WaitFlags(1 << 1);
    /// Service queued events between wakeups
    pub const EVENTS: WaitFlags = WaitFlags(1 << 2);
    pub const DEFAULT: WaitFlags = WaitFlags(Self::CANCEL.0 | Self::HALT.0);

    pub fn contains(self, other: WaitFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse names such as `cancel,events` or `halt|cancel`
    pub fn parse(text: &str) -> Result<WaitFlags, EngineError> {
        let mut flags = WaitFlags::NONE;
        for name in text
            .split(|c: char| c.is_whitespace() || c == ',' || c == '|')
            .filter(|name| !name.is_empty())
        {
            flags = flags
                | match name.to_ascii_lowercase().as_str() {
                    "none" => WaitFlags::NONE,
                    "cancel" => WaitFlags::CANCEL,
                    "halt" => WaitFlags::HALT,
                    "events" => WaitFlags::EVENTS,
                    _ => {
                        return Err(EngineError::invalid(format!(
                            "bad event wait flag \"{}\": must be none, cancel, halt, or events",
                            name
                        )))
                    }
                };
        }
        Ok(flags)
    }
}

impl BitOr for WaitFlags {
    type Output = WaitFlags;

    fn bitor(self, rhs: WaitFlags) -> WaitFlags {
        WaitFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for WaitFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (WaitFlags::CANCEL, "CANCEL"),
            (WaitFlags::HALT, "HALT"),
            (WaitFlags::EVENTS, "EVENTS"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}

/* ===================== Locking ===================== */

impl Interpreter {
    /// Lock scope `name` for the calling thread
    ///
    /// Blocks until the scope is free, the optional timeout elapses, or (per
    /// `wait`) a cancel or halt is requested. The scope is looked up again
    /// after every wakeup, so destroying it ends the wait with `NotFound`.
    pub fn lock_scope(&self, name: &str, wait: WaitFlags, timeout: Option<Duration>) -> Result<FrameId, EngineError> {
        let owner = current_owner();
        let started = Instant::now();
        let mut state = self.state();

        loop {
            let frame_id = state
                .scopes
                .get(name)
                .ok_or_else(|| EngineError::not_found("scope", name))?;
            let frame = state.frame_mut(frame_id)?;
            let current = frame.lock;
            match current {
                LockState::Unlocked => {
                    frame.lock = LockState::LockedBy { owner, depth: 1 };
                    debug!(scope = %name, owner, "locked scope");
                    return Ok(frame_id);
                }
                LockState::LockedBy { owner: holder, depth } if holder == owner => {
                    frame.lock = LockState::LockedBy {
                        owner,
                        depth: depth + 1,
                    };
                    return Ok(frame_id);
                }
                LockState::LockedBy { .. } => {}
            }

            self.check_wait_interrupts(wait)?;
            if wait.contains(WaitFlags::EVENTS) && !state.events.is_empty() {
                MutexGuard::unlocked(&mut state, || self.service_events());
                continue;
            }

            let slice = match timeout {
                Some(timeout) => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(EngineError::LockTimeout {
                            name: name.to_string(),
                            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    (timeout - elapsed).min(WAIT_SLICE)
                }
                None => WAIT_SLICE,
            };
            self.lock_released().wait_for(&mut state, slice);
        }
    }

    fn check_wait_interrupts(&self, wait: WaitFlags) -> Result<(), EngineError> {
        let signals = self.signals();
        let either = |f: &dyn Fn(CancelScope) -> bool| f(CancelScope::Local) || f(CancelScope::Global);
        if wait.contains(WaitFlags::HALT) && either(&|scope| signals.is_halted(scope)) {
            return Err(EngineError::Halted);
        }
        if wait.contains(WaitFlags::CANCEL) && either(&|scope| signals.is_cancelled(scope)) {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Lock `name` if it exists
    pub fn try_lock_scope(
        &self,
        name: &str,
        wait: WaitFlags,
        timeout: Option<Duration>,
    ) -> Result<Option<FrameId>, EngineError> {
        if !self.scope_exists(name) {
            return Ok(None);
        }
        match self.lock_scope(name, wait, timeout) {
            Ok(frame) => Ok(Some(frame)),
            // Destroyed between the check and the lock
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Release one level of the calling thread's lock on `frame`
    ///
    /// A frame that no longer exists counts as unlocked.
    pub fn unlock_frame(&self, frame: FrameId) -> Result<(), EngineError> {
        let owner = current_owner();
        let mut state = self.state();
        let Some(frame) = state.frames.get_mut(frame) else {
            return Ok(());
        };
        let current = frame.lock;
        match current {
            LockState::Unlocked => Err(EngineError::LockState("call frame already unlocked".to_string())),
            LockState::LockedBy { owner: holder, .. } if holder != owner => Err(EngineError::LockState(format!(
                "call frame locked by other thread {}",
                holder
            ))),
            LockState::LockedBy { depth, .. } => {
                frame.lock = if depth > 1 {
                    LockState::LockedBy {
                        owner,
                        depth: depth - 1,
                    }
                } else {
                    LockState::Unlocked
                };
                drop(state);
                self.lock_released().notify_all();
                Ok(())
            }
        }
    }

    pub fn unlock_scope(&self, name: &str) -> Result<FrameId, EngineError> {
        let frame = self.lookup_scope(name)?;
        self.unlock_frame(frame)?;
        debug!(scope = %name, "unlocked scope");
        Ok(frame)
    }

    /// Unlock `name` if it exists
    pub fn try_unlock_scope(&self, name: &str) -> Result<Option<FrameId>, EngineError> {
        match self.unlock_scope(name) {
            Ok(frame) => Ok(Some(frame)),
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Lock state of scope `name`
    pub fn scope_lock_state(&self, name: &str) -> Result<LockState, EngineError> {
        let state = self.state();
        let frame = state
            .scopes
            .get(name)
            .ok_or_else(|| EngineError::not_found("scope", name))?;
        Ok(state.frame(frame)?.lock)
    }
}

/* ===================== Guard ===================== */

/// Releases a scope lock when dropped
///
/// A failing unlock is logged and otherwise ignored so that it never hides
/// the outcome of the evaluation the lock protected.
pub struct ScopeLockGuard<'a> {
    interp: &'a Interpreter,
    name: String,
    frame: FrameId,
}

impl<'a> ScopeLockGuard<'a> {
    pub fn new(interp: &'a Interpreter, name: &str, frame: FrameId) -> Self {
        Self {
            interp,
            name: name.to_string(),
            frame,
        }
    }
}

impl Drop for ScopeLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.interp.unlock_frame(self.frame) {
            warn!(scope = %self.name, error = %err, "failed to unlock scope");
        }
    }
}
