//! The `namespace` command

use super::basic::{bool_arg, concat};
use super::options::{parse_options, OptionSpec};
use super::{dispatch, wrong_args, BuiltinFn};
use crate::interpreter::script::format_list;
use crate::interpreter::Interpreter;
use crate::namespaces::names;
use crate::types::EvalResult;

const SUBCOMMANDS: &[(&str, BuiltinFn)] = &[
    ("children", ns_children),
    ("code", ns_code),
    ("current", ns_current),
    ("delete", ns_delete),
    ("descendants", ns_descendants),
    ("enable", ns_enable),
    ("eval", ns_eval),
    ("exists", ns_exists),
    ("export", ns_export),
    ("forget", ns_forget),
    ("import", ns_import),
    ("inscope", ns_inscope),
    ("mappings", ns_mappings),
    ("origin", ns_origin),
    ("parent", ns_parent),
    ("qualifiers", ns_qualifiers),
    ("rename", ns_rename),
    ("tail", ns_tail),
    ("unknown", ns_unknown),
    ("which", ns_which),
];

pub fn cmd_namespace(interp: &Interpreter, words: &[String]) -> EvalResult {
    dispatch(interp, words, "namespace subcommand ?arg ...?", SUBCOMMANDS)
}

/* ===================== Overlays ===================== */

fn ns_eval(interp: &Interpreter, words: &[String]) -> EvalResult {
    match words {
        [_, _, name, script] => interp.namespace_eval(name, script),
        [_, _, name, rest @ ..] if !rest.is_empty() => interp.namespace_eval(name, &concat(rest)),
        _ => Err(wrong_args("namespace eval name arg ?arg ...?")),
    }
}

fn ns_inscope(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name, script, args @ ..] = words else {
        return Err(wrong_args("namespace inscope name arg ?arg ...?"));
    };
    interp.namespace_inscope(name, script, args)
}

/* ===================== Queries ===================== */

fn ns_current(interp: &Interpreter, words: &[String]) -> EvalResult {
    if words.len() != 2 {
        return Err(wrong_args("namespace current"));
    }
    Ok(interp.current_namespace_name()?)
}

fn ns_exists(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name] = words else {
        return Err(wrong_args("namespace exists name"));
    };
    Ok(u8::from(interp.namespace_exists(name)?).to_string())
}

fn ns_parent(interp: &Interpreter, words: &[String]) -> EvalResult {
    match words {
        [_, _] => Ok(interp.namespace_parent(None)?),
        [_, _, name] => Ok(interp.namespace_parent(Some(name))?),
        _ => Err(wrong_args("namespace parent ?name?")),
    }
}

fn ns_children(interp: &Interpreter, words: &[String]) -> EvalResult {
    let (name, pattern) = match words {
        [_, _] => (None, None),
        [_, _, name] => (Some(name.as_str()), None),
        [_, _, name, pattern] => (Some(name.as_str()), Some(pattern.as_str())),
        _ => return Err(wrong_args("namespace children ?name? ?pattern?")),
    };
    Ok(format_list(&interp.namespace_children(name, pattern)?))
}

fn ns_descendants(interp: &Interpreter, words: &[String]) -> EvalResult {
    let (name, pattern) = match words {
        [_, _] => (None, None),
        [_, _, name] => (Some(name.as_str()), None),
        [_, _, name, pattern] => (Some(name.as_str()), Some(pattern.as_str())),
        _ => return Err(wrong_args("namespace descendants ?name? ?pattern?")),
    };
    Ok(format_list(&interp.namespace_descendants(name, pattern)?))
}

fn ns_qualifiers(_interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name] = words else {
        return Err(wrong_args("namespace qualifiers string"));
    };
    Ok(names::qualifiers(name).to_string())
}

fn ns_tail(_interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name] = words else {
        return Err(wrong_args("namespace tail string"));
    };
    Ok(names::tail(name).to_string())
}

fn ns_which(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-command")];
    let (_, index) = parse_options(interp, SPECS, words, 2)?;
    let [name] = &words[index..] else {
        return Err(wrong_args("namespace which ?-command? name"));
    };
    Ok(interp.namespace_which(name)?)
}

fn ns_origin(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, name] = words else {
        return Err(wrong_args("namespace origin name"));
    };
    Ok(interp.namespace_origin(name)?)
}

fn ns_code(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, script] = words else {
        return Err(wrong_args("namespace code script"));
    };
    Ok(interp.namespace_code(script)?)
}

/* ===================== Export / Import ===================== */

fn ns_export(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-clear")];
    let (options, index) = parse_options(interp, SPECS, words, 2)?;
    let patterns = &words[index..];
    let current = interp.namespace_export(patterns, options.is_present("-clear"))?;
    if patterns.is_empty() && !options.is_present("-clear") {
        return Ok(format_list(&current));
    }
    Ok(String::new())
}

fn ns_import(interp: &Interpreter, words: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::flag("-force")];
    let (options, index) = parse_options(interp, SPECS, words, 2)?;
    let imported = interp.namespace_import(&words[index..], options.is_present("-force"))?;
    Ok(format_list(&imported))
}

fn ns_forget(interp: &Interpreter, words: &[String]) -> EvalResult {
    interp.namespace_forget(&words[2..])?;
    Ok(String::new())
}

/* ===================== Lifecycle ===================== */

fn ns_delete(interp: &Interpreter, words: &[String]) -> EvalResult {
    interp.delete_namespaces(&words[2..])?;
    Ok(String::new())
}

fn ns_rename(interp: &Interpreter, words: &[String]) -> EvalResult {
    let [_, _, old, new] = words else {
        return Err(wrong_args("namespace rename oldName newName"));
    };
    let settings = &interp.config().namespaces;
    interp.rename_namespace(old, new, settings.rename_global_ok, settings.rename_in_use_ok)?;
    Ok(String::new())
}

fn ns_enable(interp: &Interpreter, words: &[String]) -> EvalResult {
    let enabled = match words {
        [_, _] => interp.has_namespaces(),
        [_, _, enable] => interp.enable_namespaces(bool_arg(enable)?, false)?,
        [_, _, enable, force] => interp.enable_namespaces(bool_arg(enable)?, bool_arg(force)?)?,
        _ => return Err(wrong_args("namespace enable ?enabled? ?force?")),
    };
    Ok(u8::from(enabled).to_string())
}

/* ===================== Unknown / Mappings ===================== */

fn ns_unknown(interp: &Interpreter, words: &[String]) -> EvalResult {
    match words {
        [_, _] => Ok(interp.namespace_unknown()?),
        [_, _, handler] => Ok(interp.set_namespace_unknown(handler)?),
        _ => Err(wrong_args("namespace unknown ?script?")),
    }
}

fn ns_mappings(interp: &Interpreter, words: &[String]) -> EvalResult {
    match words {
        [_, _] => {
            let flat: Vec<String> = interp
                .namespace_mappings()?
                .into_iter()
                .flat_map(|(from, to)| [from, to])
                .collect();
            Ok(format_list(&flat))
        }
        [_, _, from] => Ok(interp
            .namespace_mappings()?
            .into_iter()
            .find(|(name, _)| name == from)
            .map(|(_, to)| to)
            .unwrap_or_default()),
        [_, _, from, to] => {
            interp.set_namespace_mapping(from, to)?;
            Ok(to.clone())
        }
        _ => Err(wrong_args("namespace mappings ?name? ?value?")),
    }
}
