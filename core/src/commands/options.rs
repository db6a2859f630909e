//! Option parsing for built-in commands
//!
//! Options come before positional arguments. `--` ends the option list, as
//! does the first argument that does not start with `-`. Names are matched
//! without regard to case.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::interpreter::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub takes_value: bool,
    /// Refused in safe interpreters
    pub unsafe_only: bool,
}

impl OptionSpec {
    pub const fn flag(name: &'static str) -> Self {
        Self {
            name,
            takes_value: false,
            unsafe_only: false,
        }
    }

    pub const fn value(name: &'static str) -> Self {
        Self {
            name,
            takes_value: true,
            unsafe_only: false,
        }
    }

    pub const fn unsafe_flag(name: &'static str) -> Self {
        Self {
            name,
            takes_value: false,
            unsafe_only: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ParsedOptions {
    values: HashMap<&'static str, Option<String>>,
}

impl ParsedOptions {
    pub fn is_present(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }

    pub fn bool_value(&self, name: &str) -> Result<Option<bool>, EngineError> {
        self.value(name).map(parse_bool).transpose()
    }

    pub fn int_value(&self, name: &str) -> Result<Option<i64>, EngineError> {
        self.value(name).map(parse_int).transpose()
    }
}

/// Parse options from `args[start..]`; returns them with the index of the
/// first positional argument
pub fn parse_options(
    interp: &Interpreter,
    specs: &[OptionSpec],
    args: &[String],
    start: usize,
) -> Result<(ParsedOptions, usize), EngineError> {
    let safe = interp.is_safe();
    let mut parsed = ParsedOptions::default();
    let mut index = start;

    while let Some(arg) = args.get(index) {
        if arg == "--" {
            index += 1;
            break;
        }
        if !arg.starts_with('-') || arg.len() < 2 {
            break;
        }
        let Some(spec) = specs.iter().find(|spec| spec.name.eq_ignore_ascii_case(arg)) else {
            return Err(bad_option(specs, arg, safe));
        };
        if spec.unsafe_only && safe {
            return Err(EngineError::invalid(format!(
                "permission denied: safe interpreter cannot use option \"{}\"",
                spec.name
            )));
        }
        index += 1;
        let value = if spec.takes_value {
            let value = args
                .get(index)
                .ok_or_else(|| EngineError::invalid(format!("value for \"{}\" missing", spec.name)))?;
            index += 1;
            Some(value.clone())
        } else {
            None
        };
        parsed.values.insert(spec.name, value);
    }
    Ok((parsed, index))
}

/// `bad option "-x": must be -a, -b, or -c`
pub fn bad_option(specs: &[OptionSpec], arg: &str, safe: bool) -> EngineError {
    let names: Vec<&str> = specs
        .iter()
        .filter(|spec| !(safe && spec.unsafe_only))
        .map(|spec| spec.name)
        .collect();
    EngineError::invalid(format!("bad option \"{}\": must be {}", arg, one_of(&names)))
}

/// `a`, `a or b`, `a, b, or c`
pub fn one_of(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} or {}", first, second),
        [rest @ .., last] => format!("{}, or {}", rest.join(", "), last),
    }
}

pub fn parse_bool(text: &str) -> Result<bool, EngineError> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EngineError::invalid(format!("expected boolean value but got \"{}\"", text))),
    }
}

pub fn parse_int(text: &str) -> Result<i64, EngineError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| EngineError::invalid(format!("expected integer but got \"{}\"", text)))
}
