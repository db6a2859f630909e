//! The `scope` command

use super::basic::concat;
use super::options::{parse_options, OptionSpec, ParsedOptions};
use super::{dispatch, wrong_args, BuiltinFn};
use crate::error::EngineError;
use crate::interpreter::script::format_list;
use crate::interpreter::Interpreter;
use crate::scopes::{timeout_from_millis, ScopeEvalOptions, ScopeOptions, WaitFlags};
use crate::types::{Control, EvalResult};

const SUBCOMMANDS: &[(&str, BuiltinFn)] = &[
    ("close", scope_close),
    ("create", scope_create),
    ("current", scope_current),
    ("destroy", scope_destroy),
    ("eval", scope_eval),
    ("exists", scope_exists),
    ("global", scope_global),
    ("list", scope_list),
    ("lock", scope_lock),
    ("open", scope_open),
    ("set", scope_set),
    ("unlock", scope_unlock),
    ("unset", scope_unset),
    ("update", scope_update),
    ("vars", scope_vars),
];

pub fn cmd_scope(interp: &Interpreter, words: &[String]) -> EvalResult {
    dispatch(interp, words, "scope option ?arg ...?", SUBCOMMANDS)
}

/// Options followed by at most one name
fn options_and_name<'w>(
    interp: &Interpreter,
    words: &'w [String],
    specs: &[OptionSpec],
    usage: &str,
) -> Result<(ParsedOptions, Option<&'w str>), Control> {
    let (options, index) = parse_options(interp, specs, words, 2)?;
    match &words[index..] {
        [] => Ok((options, None)),
        [name] => Ok((options, Some(name.as_str()))),
        _ => Err(wrong_args(usage)),
    }
}

/// Options followed by exactly one name
fn options_then_name<'w>(
    interp: &Interpreter,
    words: &'w [String],
    specs: &[OptionSpec],
    usage: &str,
) -> Result<(ParsedOptions, &'w str), Control> {
    match options_and_name(interp, words, specs, usage)? {
        (options, Some(name)) => Ok((options, name)),
        (_, None) => Err(wrong_args(usage)),
    }
}

fn default_lock_timeout(interp: &Interpreter) -> Option<std::time::Duration> {
    timeout_from_millis(interp.config().scopes.lock_timeout_ms)
}

/* ===================== Lifecycle ===================== */

fn scope_create(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[
        OptionSpec::flag("-args"),
        OptionSpec::flag("-clone"),
        OptionSpec::unsafe_flag("-byref"),
        OptionSpec::flag("-global"),
        OptionSpec::flag("-open"),
        OptionSpec::flag("-procedure"),
        OptionSpec::flag("-shared"),
        OptionSpec::flag("-strict"),
        OptionSpec::flag("-fast"),
    ];
    let (options, name) = options_and_name(interp, words, SPECS, "scope create ?options? ?name?")?;
    let created = interp.create_scope(
        name,
        ScopeOptions {
            clone: options.is_present("-clone"),
            by_ref: options.is_present("-byref"),
            global: options.is_present("-global"),
            procedure: options.is_present("-procedure"),
            shared: options.is_present("-shared"),
            open: options.is_present("-open"),
            args: options.is_present("-args"),
            strict: options.is_present("-strict"),
            fast: options.is_present("-fast"),
        },
    )?;
    Ok(created.name)
}

fn scope_destroy(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name] = words else {
        return Err(wrong_args("scope destroy name"));
    };
    interp.destroy_scope(name)?;
    Ok(String::new())
}

fn scope_exists(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name] = words else {
        return Err(wrong_args("scope exists name"));
    };
    Ok(u8::from(interp.scope_exists(name)).to_string())
}

fn scope_list(interp: &Interpreter, words: &[String]) -> EvalResult {
    let pattern = match words {
        [_, _] => None,
        [_, _, pattern] => Some(pattern.as_str()),
        _ => return Err(wrong_args("scope list ?pattern?")),
    };
    Ok(format_list(&interp.list_scopes(pattern)?))
}

/* ===================== Open / Close ===================== */

fn scope_open(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[
        OptionSpec::flag("-args"),
        OptionSpec::flag("-procedure"),
        OptionSpec::flag("-shared"),
    ];
    let (options, name) = options_and_name(interp, words, SPECS, "scope open ?options? ?name?")?;
    interp.open_scope(
        name,
        options.is_present("-procedure"),
        options.is_present("-shared"),
        options.is_present("-args"),
    )?;
    Ok(String::new())
}

fn scope_close(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-all")];
    let (options, name) = options_and_name(interp, words, SPECS, "scope close ?options? ?name?")?;
    Ok(interp.close_scope(name, options.is_present("-all"))?)
}

fn scope_current(interp: &Interpreter, words: &[String]) -> EvalResult {
    if words.len() != 2 {
        return Err(wrong_args("scope current"));
    }
    if !interp.has_scopes() {
        return Err(EngineError::NoScopes.into());
    }
    Ok(interp.current_scope().unwrap_or_default())
}

/* ===================== Locking ===================== */

fn scope_lock(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-nocomplain")];
    let (options, name) = options_then_name(interp, words, SPECS, "scope lock ?options? name")?;
    let timeout = default_lock_timeout(interp);
    if options.is_present("-nocomplain") {
        interp.try_lock_scope(name, WaitFlags::DEFAULT, timeout)?;
    } else {
        interp.lock_scope(name, WaitFlags::DEFAULT, timeout)?;
    }
    Ok(String::new())
}

fn scope_unlock(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-nocomplain")];
    let (options, name) = options_then_name(interp, words, SPECS, "scope unlock ?options? name")?;
    if options.is_present("-nocomplain") {
        interp.try_unlock_scope(name)?;
    } else {
        interp.unlock_scope(name)?;
    }
    Ok(String::new())
}

/* ===================== Evaluation ===================== */

fn scope_eval(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[
        OptionSpec::value("-eventwaitflags"),
        OptionSpec::value("-lock"),
        OptionSpec::value("-timeout"),
    ];
    const USAGE: &str = "scope eval ?options? name script ?arg ...?";
    let (options, index) = parse_options(interp, SPECS, words, 2)?;
    let rest = &words[index..];
    if rest.len() < 2 {
        return Err(wrong_args(USAGE));
    }
    let name = &rest[0];
    let script = if rest.len() == 2 {
        rest[1].clone()
    } else {
        concat(&rest[1..])
    };

    let mut eval_options = ScopeEvalOptions {
        lock: options.bool_value("-lock")?.unwrap_or(false),
        timeout: default_lock_timeout(interp),
        ..ScopeEvalOptions::default()
    };
    if let Some(millis) = options.int_value("-timeout")? {
        eval_options.timeout = timeout_from_millis(millis);
    }
    if let Some(flags) = options.value("-eventwaitflags") {
        eval_options.wait_flags = WaitFlags::parse(flags)?;
    }
    interp.eval_in_scope(name, &script, eval_options)
}

/* ===================== Variables ===================== */

fn scope_set(interp: &Interpreter, words: &[String]) -> EvalResult {
    match words {
        [_, _, name, var] => Ok(interp.scope_get(name, var)?),
        [_, _, name, var, value] => Ok(interp.scope_set(name, var, value)?),
        _ => Err(wrong_args("scope set name varName ?value?")),
    }
}

fn scope_unset(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name, var] = words else {
        return Err(wrong_args("scope unset name varName"));
    };
    interp.scope_unset(name, var)?;
    Ok(String::new())
}

fn scope_vars(interp: &Interpreter, words: &[String]) -> EvalResult {
    let (name, pattern) = match words {
        [_, _, name] => (name, None),
        [_, _, name, pattern] => (name, Some(pattern.as_str())),
        _ => return Err(wrong_args("scope vars name ?pattern?")),
    };
    Ok(format_list(&interp.scope_vars(name, pattern)?))
}

fn scope_update(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-global")];
    let (options, name) = options_and_name(interp, words, SPECS, "scope update ?options? ?name?")?;
    Ok(interp.update_scope(name, options.is_present("-global"))?)
}

/* ===================== Global Scope ===================== */

fn scope_global(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-force"), OptionSpec::flag("-unset")];
    let (options, name) = options_and_name(interp, words, SPECS, "scope global ?options? ?name?")?;
    let force = options.is_present("-force");
    if !interp.is_modifiable() {
        return Err(EngineError::NotModifiable.into());
    }

    match (options.is_present("-unset"), name) {
        (true, Some(_)) => {
            return Err(EngineError::invalid("cannot specify scope name with -unset option").into());
        }
        (true, None) => interp.unset_global_scope(force)?,
        (false, Some(name)) => interp.set_global_scope(name, force)?,
        (false, None) => {
            if !interp.has_scopes() {
                return Err(EngineError::NoScopes.into());
            }
        }
    }
    Ok(interp.global_scope().unwrap_or_default())
}

