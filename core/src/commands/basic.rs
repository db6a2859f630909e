//! Core language commands

use std::thread;
use std::time::{Duration, Instant};

use super::options::{parse_bool, parse_int, parse_options, OptionSpec};
use super::wrong_args;
use crate::cancel::CancelScope;
use crate::error::EngineError;
use crate::interpreter::script::format_list;
use crate::interpreter::Interpreter;
use crate::types::{Control, EvalResult};

/// Longest sleep between interrupt checks in `after`
const AFTER_SLICE: Duration = Duration::from_millis(10);

/* ===================== Variables ===================== */

pub fn cmd_set(interp: &Interpreter, words: &[String]) -> EvalResult {
    match words {
        [_, name] => Ok(interp.get_var(name)?),
        [_, name, value] => Ok(interp.set_var(name, value)?),
        _ => Err(wrong_args("set varName ?newValue?")),
    }
}

pub fn cmd_unset(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-nocomplain")];
    let (options, start) = parse_options(interp, SPECS, words, 1)?;
    let nocomplain = options.is_present("-nocomplain");
    for name in &words[start..] {
        match interp.unset_var(name) {
            Ok(()) => {}
            Err(_) if nocomplain => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(String::new())
}

pub fn cmd_incr(interp: &Interpreter, words: &[String]) -> EvalResult {
    let (name, increment) = match words {
        [_, name] => (name, 1),
        [_, name, increment] => (name, parse_int(increment)?),
        _ => return Err(wrong_args("incr varName ?increment?")),
    };
    let current = if interp.var_exists(name) {
        parse_int(&interp.get_var(name)?)?
    } else {
        0
    };
    let value = current.wrapping_add(increment).to_string();
    Ok(interp.set_var(name, &value)?)
}

pub fn cmd_append(interp: &Interpreter, words: &[String]) -> EvalResult {
    let Some(name) = words.get(1) else {
        return Err(wrong_args("append varName ?value ...?"));
    };
    let mut value = if interp.var_exists(name) {
        interp.get_var(name)?
    } else {
        String::new()
    };
    for piece in &words[2..] {
        value.push_str(piece);
    }
    Ok(interp.set_var(name, &value)?)
}

pub fn cmd_list(_interp: &Interpreter, words: &[String]) -> EvalResult {
    Ok(format_list(&words[1..]))
}

/* ===================== Control ===================== */

pub fn cmd_eval(interp: &Interpreter, words: &[String]) -> EvalResult {
    if words.len() < 2 {
        return Err(wrong_args("eval arg ?arg ...?"));
    }
    interp.eval(&concat(&words[1..]))
}

pub fn cmd_error(interp: &Interpreter, words: &[String]) -> EvalResult {
    let (message, info) = match words {
        [_, message] => (message, None),
        [_, message, info] | [_, message, info, _] => (message, Some(info)),
        _ => return Err(wrong_args("error message ?errorInfo? ?errorCode?")),
    };
    if let Some(info) = info.filter(|info| !info.is_empty()) {
        interp.with_state(|state| {
            state.trace.info = info.clone();
            state.trace.active = true;
        });
    }
    Err(EngineError::script(message.clone()).into())
}

pub fn cmd_break(_interp: &Interpreter, words: &[String]) -> EvalResult {
    if words.len() != 1 {
        return Err(wrong_args("break"));
    }
    Err(Control::Break)
}

pub fn cmd_continue(_interp: &Interpreter, words: &[String]) -> EvalResult {
    if words.len() != 1 {
        return Err(wrong_args("continue"));
    }
    Err(Control::Continue)
}

pub fn cmd_return(_interp: &Interpreter, words: &[String]) -> EvalResult {
    match words {
        [_] => Err(Control::Return(String::new())),
        [_, value] => Err(Control::Return(value.clone())),
        _ => Err(wrong_args("return ?value?")),
    }
}

pub fn cmd_exit(interp: &Interpreter, words: &[String]) -> EvalResult {
    let code = match words {
        [_] => 0,
        [_, code] => i32::try_from(parse_int(code)?)
            .map_err(|_| EngineError::invalid(format!("exit code \"{}\" out of range", code)))?,
        _ => return Err(wrong_args("exit ?returnCode?")),
    };
    interp.signals().request_exit(code);
    Err(Control::Exit(code))
}

/// `catch script ?varName?`
///
/// Cancellation, halts and exits are not caught.
pub fn cmd_catch(interp: &Interpreter, words: &[String]) -> EvalResult {
    let (script, var) = match words {
        [_, script] => (script, None),
        [_, script, var] => (script, Some(var)),
        _ => return Err(wrong_args("catch script ?varName?")),
    };
    let result = interp.eval(script);
    let (code, value) = match result {
        Ok(value) => (0, value),
        Err(Control::Error(err)) if err.is_interrupt() => return Err(Control::Error(err)),
        Err(exit @ Control::Exit(_)) => return Err(exit),
        Err(control) => {
            if matches!(control, Control::Error(_)) {
                interp.reset_error_info();
            }
            (control.code().as_int(), control.value())
        }
    };
    if let Some(var) = var {
        interp.set_var(var, &value)?;
    }
    Ok(code.to_string())
}

pub fn cmd_proc(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, name, params, body] = words else {
        return Err(wrong_args("proc name args body"));
    };
    interp.define_proc(name, params, body)?;
    Ok(String::new())
}

pub fn cmd_apply(interp: &Interpreter, words: &[String]) -> EvalResult {
    let Some(lambda) = words.get(1) else {
        return Err(wrong_args("apply lambdaExpr ?arg ...?"));
    };
    interp.apply_lambda(lambda, &words[2..])
}

/* ===================== Events ===================== */

/// `after ms` sleeps; `after idle script ?script ...?` queues an event
pub fn cmd_after(interp: &Interpreter, words: &[String]) -> EvalResult {
    match words.get(1).map(String::as_str) {
        Some("idle") if words.len() > 2 => {
            interp.queue_event(concat(&words[2..]));
            Ok(String::new())
        }
        Some(ms) if words.len() == 2 => {
            let millis = u64::try_from(parse_int(ms)?).unwrap_or(0);
            let deadline = Instant::now() + Duration::from_millis(millis);
            loop {
                interp.check_interrupts()?;
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep((deadline - now).min(AFTER_SLICE));
            }
            Ok(String::new())
        }
        _ => Err(wrong_args("after milliseconds ?idle script ...?")),
    }
}

/// `update`: run every queued event
pub fn cmd_update(interp: &Interpreter, words: &[String]) -> EvalResult {
    if words.len() != 1 {
        return Err(wrong_args("update"));
    }
    interp.service_events();
    Ok(String::new())
}

/* ===================== Interrupts ===================== */

/// `cancel ?-global?`: request cancellation of the running evaluation
pub fn cmd_cancel(interp: &Interpreter, words: &[String]) -> EvalResult {
    let scope = interrupt_scope(interp, words, "cancel ?-global?")?;
    interp.request_cancel(scope);
    Ok(String::new())
}

/// `halt ?-global?`
pub fn cmd_halt(interp: &Interpreter, words: &[String]) -> EvalResult {
    let scope = interrupt_scope(interp, words, "halt ?-global?")?;
    interp.request_halt(scope);
    Ok(String::new())
}

fn interrupt_scope(interp: &Interpreter, words: &[String], usage: &str) -> Result<CancelScope, Control> {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-global")];
    let (options, index) = parse_options(interp, SPECS, words, 1)?;
    if index != words.len() {
        return Err(wrong_args(usage));
    }
    Ok(if options.is_present("-global") {
        CancelScope::Global
    } else {
        CancelScope::Local
    })
}

/* ===================== Helpers ===================== */

/// Join words with single spaces after trimming each, like `concat`
pub(crate) fn concat(words: &[String]) -> String {
    words
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Boolean positional argument
pub(crate) fn bool_arg(text: &str) -> Result<bool, Control> {
    parse_bool(text).map_err(Control::from)
}
