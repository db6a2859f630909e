//! Procedure and lambda invocation

use std::sync::Arc;

use super::script::{format_list, parse_list};
use super::{EngineState, Interpreter};
use crate::error::EngineError;
use crate::frames::{Frame, FrameFlags};
use crate::namespaces::{names, Command, NamespaceId, Param, Procedure};
use crate::types::{Control, EvalResult};

impl Interpreter {
    /// Define (or redefine) a procedure; unqualified names land in the
    /// current namespace
    pub fn define_proc(&self, name: &str, params: &str, body: &str) -> Result<(), EngineError> {
        let params = parse_params(params)?;
        let mut state = self.state();
        let namespace = if names::is_qualified(name) {
            let qualifiers = names::qualifiers(name);
            if qualifiers.is_empty() {
                state.namespaces.global()
            } else {
                let current = state.current_namespace();
                state.namespaces.find(current, qualifiers)?.ok_or_else(|| {
                    EngineError::script(format!(
                        "can't create procedure \"{}\": unknown namespace",
                        name
                    ))
                })?
            }
        } else {
            state.current_namespace()
        };
        let tail = names::tail(name);
        if tail.is_empty() {
            return Err(EngineError::InvalidName(format!("invalid procedure name \"{}\"", name)));
        }

        let procedure = Procedure {
            params,
            body: body.to_string(),
        };
        let ns = state
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| EngineError::invalid("current namespace is invalid"))?;
        ns.commands
            .insert(tail.to_string(), Command::Procedure(Arc::new(procedure)));
        Ok(())
    }

    /// Call a procedure in a fresh `PROCEDURE` frame
    pub fn call_procedure(
        &self,
        name: &str,
        namespace: NamespaceId,
        procedure: &Procedure,
        args: &[String],
    ) -> EvalResult {
        let bound = bind_arguments(name, &procedure.params, args)?;
        let result = self.eval_in_frames(
            |state| push_invocation_frame(state, name, FrameFlags::PROCEDURE, namespace, bound),
            &procedure.body,
        );
        let line = self.error_line();
        finish_invocation(self, result, &format!("\n    (procedure \"{}\" line {})", name, line))
    }

    /// `apply {params body ?namespace?} ?arg ...?`
    pub fn apply_lambda(&self, lambda: &str, args: &[String]) -> EvalResult {
        let parts = parse_list(lambda)?;
        if parts.len() != 2 && parts.len() != 3 {
            return Err(EngineError::script(format!(
                "can't interpret \"{}\" as a lambda expression",
                lambda
            ))
            .into());
        }
        let params = parse_params(&parts[0])?;
        let namespace = {
            let mut state = self.state();
            let global = state.namespaces.global();
            match parts.get(2) {
                Some(ns_name) => {
                    let state = &mut *state;
                    state
                        .namespaces
                        .find_or_create(global, ns_name, &mut state.frames)?
                }
                None => global,
            }
        };

        let bound = bind_arguments(lambda, &params, args)?;
        let result = self.eval_in_frames(
            |state| {
                push_invocation_frame(
                    state,
                    lambda,
                    FrameFlags::PROCEDURE | FrameFlags::LAMBDA,
                    namespace,
                    bound,
                )
            },
            &parts[1],
        );
        let line = self.error_line();
        finish_invocation(self, result, &format!("\n    (lambda term \"{}\" line {})", lambda, line))
    }
}

fn push_invocation_frame(
    state: &mut EngineState,
    name: &str,
    flags: FrameFlags,
    namespace: NamespaceId,
    bound: Vec<(String, String)>,
) -> Result<(), EngineError> {
    let mut frame = Frame::new(name, flags).with_namespace(namespace);
    for (formal, value) in &bound {
        frame.set_var(formal, value.as_str());
    }
    frame.arguments = bound;
    let id = state.new_frame(frame);
    state.stack.push_transient(id);
    Ok(())
}

/// Map the body's completion onto the procedure's result
fn finish_invocation(interp: &Interpreter, result: EvalResult, context: &str) -> EvalResult {
    match result {
        Ok(value) | Err(Control::Return(value)) => Ok(value),
        Err(Control::Break) => Err(EngineError::script("invoked \"break\" outside of a loop").into()),
        Err(Control::Continue) => Err(EngineError::script("invoked \"continue\" outside of a loop").into()),
        Err(Control::Error(err)) => {
            interp.add_error_info(context);
            Err(Control::Error(err))
        }
        Err(exit @ Control::Exit(_)) => Err(exit),
    }
}

/* ===================== Parameters ===================== */

pub fn parse_params(spec: &str) -> Result<Vec<Param>, EngineError> {
    let mut params = Vec::new();
    for element in parse_list(spec)? {
        let fields = parse_list(&element)?;
        let param = match fields.as_slice() {
            [name] => Param {
                name: name.clone(),
                default: None,
            },
            [name, default] => Param {
                name: name.clone(),
                default: Some(default.clone()),
            },
            [] => return Err(EngineError::script("argument with no name")),
            _ => {
                return Err(EngineError::script(format!(
                    "too many fields in argument specifier \"{}\"",
                    element
                )))
            }
        };
        params.push(param);
    }
    Ok(params)
}

/// Bind actual arguments to formals; a trailing `args` collects the rest
pub fn bind_arguments(name: &str, params: &[Param], args: &[String]) -> Result<Vec<(String, String)>, EngineError> {
    let variadic = params.last().is_some_and(|p| p.name == "args" && p.default.is_none());
    let fixed = if variadic { &params[..params.len() - 1] } else { params };

    let required = fixed.iter().filter(|p| p.default.is_none()).count();
    if args.len() < required || (!variadic && args.len() > fixed.len()) {
        return Err(EngineError::usage(usage_for(name, params)));
    }

    let mut bound = Vec::with_capacity(params.len());
    let mut remaining = args.len();
    let mut supplied = args.iter();
    for param in fixed {
        // Defaults are only taken when there are too few actuals for them
        let take = remaining > 0
            && (param.default.is_none() || remaining > required_after(fixed, &param.name));
        let value = if take {
            remaining -= 1;
            supplied.next().cloned()
        } else {
            None
        };
        let value = value
            .or_else(|| param.default.clone())
            .ok_or_else(|| EngineError::usage(usage_for(name, params)))?;
        bound.push((param.name.clone(), value));
    }
    if variadic {
        let rest: Vec<String> = supplied.cloned().collect();
        bound.push(("args".to_string(), format_list(&rest)));
    }
    Ok(bound)
}

/// Number of required formals after `name`
fn required_after(params: &[Param], name: &str) -> usize {
    params
        .iter()
        .skip_while(|p| p.name != name)
        .skip(1)
        .filter(|p| p.default.is_none())
        .count()
}

fn usage_for(name: &str, params: &[Param]) -> String {
    let mut usage = vec![name.to_string()];
    for (index, param) in params.iter().enumerate() {
        if param.name == "args" && index + 1 == params.len() && param.default.is_none() {
            usage.push("?arg ...?".to_string());
        } else if param.default.is_some() {
            usage.push(format!("?{}?", param.name));
        } else {
            usage.push(param.name.clone());
        }
    }
    usage.join(" ")
}
