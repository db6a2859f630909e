//! Call frames
//!
//! A [`Frame`] is one execution context: a variable table, a set of
//! [`FrameFlags`], a parent link and the lock state used by named scopes.
//! Frames live in a [`FrameArena`]; everything that refers to a frame holds a
//! [`FrameId`], never the frame itself.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::arena::{Arena, ArenaKey, Handle};
use crate::glob::{self, Glob};
use crate::namespaces::NamespaceId;

pub mod stack;

#[cfg(test)]
mod tests;

pub use stack::{CallFrameStack, StackEntry};

/* ===================== Handles ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(Handle);

impl ArenaKey for FrameId {
    fn from_handle(handle: Handle) -> Self {
        FrameId(handle)
    }
    fn handle(self) -> Handle {
        self.0
    }
}

pub type FrameArena = Arena<FrameId, Frame>;

/* ===================== Flags ===================== */

/// Frame flag bitset
///
/// Whether a frame was pushed automatically is a property of its stack entry
/// (see [`StackEntry`]), since the same persistent scope frame may be pushed
/// explicitly by `scope open` and automatically by `scope eval`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameFlags(u32);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);
    /// The interpreter's global frame (stack sentinel)
    pub const GLOBAL: FrameFlags = FrameFlags(1 << 0);
    /// Persistent frame registered in the scope registry
    pub const SCOPE: FrameFlags = FrameFlags(1 << 1);
    /// Scope designated as the interpreter's global scope
    pub const GLOBAL_SCOPE: FrameFlags = FrameFlags(1 << 2);
    /// Variable frame owned by a namespace
    pub const NAMESPACE: FrameFlags = FrameFlags(1 << 3);
    /// Overlay whose variables resolve through its namespace's frame
    pub const USE_NAMESPACE: FrameFlags = FrameFlags(1 << 4);
    pub const EVALUATE: FrameFlags = FrameFlags(1 << 5);
    pub const IN_SCOPE: FrameFlags = FrameFlags(1 << 6);
    pub const PROCEDURE: FrameFlags = FrameFlags(1 << 7);
    pub const LAMBDA: FrameFlags = FrameFlags(1 << 8);
    /// Bookkeeping frame skipped by variable resolution
    pub const TRACKING: FrameFlags = FrameFlags(1 << 9);
    pub const FAST: FrameFlags = FrameFlags(1 << 10);

    const NAMES: [(FrameFlags, &'static str); 11] = [
        (Self::GLOBAL, "Global"),
        (Self::SCOPE, "Scope"),
        (Self::GLOBAL_SCOPE, "GlobalScope"),
        (Self::NAMESPACE, "Namespace"),
        (Self::USE_NAMESPACE, "UseNamespace"),
        (Self::EVALUATE, "Evaluate"),
        (Self::IN_SCOPE, "InScope"),
        (Self::PROCEDURE, "Procedure"),
        (Self::LAMBDA, "Lambda"),
        (Self::TRACKING, "Tracking"),
        (Self::FAST, "Fast"),
    ];

    pub fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: FrameFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: FrameFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: FrameFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for FrameFlags {
    type Output = FrameFlags;

    fn bitor(self, rhs: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FrameFlags {
    fn bitor_assign(&mut self, rhs: FrameFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

/* ===================== Variables ===================== */

/// Variable cell
///
/// Cloning the cell shares it: a scope created with `-clone -byref` sees
/// writes made through the frame it was cloned from and vice versa.
#[derive(Clone, Default)]
pub struct Variable(Arc<Mutex<String>>);

impl Variable {
    pub fn new(value: impl Into<String>) -> Self {
        Variable(Arc::new(Mutex::new(value.into())))
    }

    pub fn get(&self) -> String {
        self.0.lock().clone()
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.0.lock() = value.into();
    }

    /// New cell holding the current value
    pub fn detached(&self) -> Variable {
        Variable::new(self.get())
    }

    pub fn shares_cell_with(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Variable").field(&self.get()).finish()
    }
}

/* ===================== Frame ===================== */

/// Owner of a scope lock plus its re-entrancy depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    LockedBy { owner: u64, depth: usize },
}

#[derive(Debug)]
pub struct Frame {
    pub name: String,
    pub flags: FrameFlags,
    pub variables: HashMap<String, Variable>,
    /// Positional `(formal, value)` pairs bound by a procedure call
    pub arguments: Vec<(String, String)>,
    /// Frame on top of the stack when this one was created
    pub parent: Option<FrameId>,
    /// Namespace this frame overlays or belongs to
    pub namespace: Option<NamespaceId>,
    pub lock: LockState,
}

impl Frame {
    pub fn new(name: impl Into<String>, flags: FrameFlags) -> Self {
        Self {
            name: name.into(),
            flags,
            variables: HashMap::new(),
            arguments: Vec::new(),
            parent: None,
            namespace: None,
            lock: LockState::Unlocked,
        }
    }

    pub fn with_parent(mut self, parent: Option<FrameId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_namespace(mut self, namespace: NamespaceId) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn is_scope(&self) -> bool {
        self.flags.contains(FrameFlags::SCOPE)
    }

    pub fn is_procedure(&self) -> bool {
        self.flags.contains(FrameFlags::PROCEDURE)
    }

    pub fn get_var(&self, name: &str) -> Option<String> {
        self.variables.get(name).map(Variable::get)
    }

    /// Write through an existing cell, or create one
    pub fn set_var(&mut self, name: &str, value: impl Into<String>) {
        match self.variables.get(name) {
            Some(cell) => cell.set(value),
            None => {
                self.variables.insert(name.to_string(), Variable::new(value));
            }
        }
    }

    pub fn unset_var(&mut self, name: &str) -> bool {
        self.variables.remove(name).is_some()
    }

    /// Sorted variable names, optionally filtered by a glob pattern
    pub fn var_names(&self, pattern: Option<&Glob>) -> Vec<String> {
        let mut names: Vec<String> = self
            .variables
            .keys()
            .filter(|name| glob::matches(pattern, name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Copy every variable of `source` into this frame
    ///
    /// By value the cells are detached; by reference they are shared.
    pub fn copy_variables_from(&mut self, source: &HashMap<String, Variable>, by_ref: bool) {
        for (name, cell) in source {
            let cell = if by_ref { cell.clone() } else { cell.detached() };
            self.variables.insert(name.clone(), cell);
        }
    }

    pub fn is_locked(&self) -> bool {
        !matches!(self.lock, LockState::Unlocked)
    }
}
