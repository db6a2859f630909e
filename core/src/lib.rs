//! Execution-context engine for the tempo scripting interpreter
//!
//! The engine keeps the call frame stack, the registry of named persistent
//! scopes with their locks, the namespace tree and the cooperative
//! cancellation flags. Scripts reach it through the `scope`, `namespace` and
//! `time` commands of the bundled reference evaluator.

pub mod arena;
pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod frames;
pub mod glob;
pub mod interpreter;
pub mod namespaces;
pub mod scopes;
pub mod types;

// Re-export main types
pub use cancel::{CancelScope, CancellationController, SignalFlags};
pub use config::Config;
pub use error::{EngineError, ErrorKind};
pub use interpreter::Interpreter;
pub use types::{Control, EvalResult, ReturnCode};
