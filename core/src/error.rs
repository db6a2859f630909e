//! Engine error taxonomy
//!
//! Every failure the engine reports is an [`EngineError`]. The message text is
//! what a script sees as its error result; [`EngineError::kind`] gives callers
//! a stable classification to branch on.

use std::fmt;

use thiserror::Error;

/* ===================== Error Kinds ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Usage,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    LockTimeout,
    LockState,
    NotModifiable,
    NoScopes,
    NamespacesDisabled,
    InUse,
    InvalidName,
    EmptyStack,
    Script,
    Cancelled,
    Halted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/* ===================== Engine Error ===================== */

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Wrong argument count or shape; carries the usage string
    #[error("wrong # args: should be \"{0}\"")]
    Usage(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("timeout waiting for lock on scope \"{name}\" after {timeout_ms} milliseconds")]
    LockTimeout { name: String, timeout_ms: u64 },

    /// Unlock of a frame that is not locked, or locked by another owner
    #[error("{0}")]
    LockState(String),

    #[error("interpreter is read-only")]
    NotModifiable,

    #[error("scopes are disabled")]
    NoScopes,

    #[error("namespaces are disabled")]
    NamespacesDisabled,

    #[error("{0}")]
    InUse(String),

    #[error("{0}")]
    InvalidName(String),

    #[error("no call frames beyond the global frame")]
    EmptyStack,

    /// Error raised by a script (the `error` command, a bad substitution, ...)
    #[error("{0}")]
    Script(String),

    #[error("eval canceled")]
    Cancelled,

    #[error("eval halted")]
    Halted,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Usage(_) => ErrorKind::Usage,
            EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            EngineError::LockTimeout { .. } => ErrorKind::LockTimeout,
            EngineError::LockState(_) => ErrorKind::LockState,
            EngineError::NotModifiable => ErrorKind::NotModifiable,
            EngineError::NoScopes => ErrorKind::NoScopes,
            EngineError::NamespacesDisabled => ErrorKind::NamespacesDisabled,
            EngineError::InUse(_) => ErrorKind::InUse,
            EngineError::InvalidName(_) => ErrorKind::InvalidName,
            EngineError::EmptyStack => ErrorKind::EmptyStack,
            EngineError::Script(_) => ErrorKind::Script,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Halted => ErrorKind::Halted,
        }
    }

    /// Cooperative termination rather than a failure of the script itself
    pub fn is_interrupt(&self) -> bool {
        matches!(self, EngineError::Cancelled | EngineError::Halted)
    }

    pub fn usage(usage: impl Into<String>) -> Self {
        EngineError::Usage(usage.into())
    }

    pub fn script(message: impl Into<String>) -> Self {
        EngineError::Script(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidArgument(message.into())
    }

    /// `<what> "<name>" not found`
    pub fn not_found(what: &str, name: &str) -> Self {
        EngineError::NotFound(format!("{} \"{}\" not found", what, name))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
