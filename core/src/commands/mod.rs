//! Built-in commands
//!
//! The table is built once on first use and is read-only afterwards. Every
//! built-in receives the interpreter and its fully substituted words,
//! including the command name at index 0.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::EngineError;
use crate::interpreter::Interpreter;
use crate::types::{Control, EvalResult};

pub mod basic;
pub mod namespace;
pub mod options;
pub mod scope;
pub mod time;

pub type BuiltinFn = fn(&Interpreter, &[String]) -> EvalResult;

static BUILTINS: OnceLock<HashMap<&'static str, BuiltinFn>> = OnceLock::new();

fn builtins() -> &'static HashMap<&'static str, BuiltinFn> {
    BUILTINS.get_or_init(|| {
        let table: [(&'static str, BuiltinFn); 21] = [
            ("after", basic::cmd_after),
            ("append", basic::cmd_append),
            ("apply", basic::cmd_apply),
            ("break", basic::cmd_break),
            ("catch", basic::cmd_catch),
            ("continue", basic::cmd_continue),
            ("error", basic::cmd_error),
            ("eval", basic::cmd_eval),
            ("exit", basic::cmd_exit),
            ("incr", basic::cmd_incr),
            ("list", basic::cmd_list),
            ("proc", basic::cmd_proc),
            ("return", basic::cmd_return),
            ("set", basic::cmd_set),
            ("unset", basic::cmd_unset),
            ("update", basic::cmd_update),
            ("namespace", namespace::cmd_namespace),
            ("scope", scope::cmd_scope),
            ("time", time::cmd_time),
            ("cancel", basic::cmd_cancel),
            ("halt", basic::cmd_halt),
        ];
        table.into_iter().collect()
    })
}

pub fn lookup_builtin(name: &str) -> Option<BuiltinFn> {
    builtins().get(name).copied()
}

/// Sorted names of every built-in
pub fn builtin_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = builtins().keys().copied().collect();
    names.sort_unstable();
    names
}

/// `wrong # args: should be "<usage>"` as a control result
pub(crate) fn wrong_args(usage: &str) -> Control {
    EngineError::usage(usage).into()
}

/// Dispatch `words[1]` to one of `subcommands`
pub(crate) fn dispatch(
    interp: &Interpreter,
    words: &[String],
    usage: &str,
    subcommands: &[(&'static str, BuiltinFn)],
) -> EvalResult {
    let Some(sub) = words.get(1) else {
        return Err(wrong_args(usage));
    };
    match subcommands.iter().find(|(name, _)| name == sub) {
        Some((_, handler)) => handler(interp, words),
        None => {
            let names: Vec<&str> = subcommands.iter().map(|(name, _)| *name).collect();
            Err(EngineError::invalid(format!("bad option \"{}\": must be {}", sub, options::one_of(&names))).into())
        }
    }
}
