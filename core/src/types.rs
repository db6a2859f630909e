//! Evaluation outcome types shared by the engine, the evaluator and commands

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/* ===================== Return Codes ===================== */

/// Completion code of an evaluation, as reported to scripts (`catch`,
/// `time -statistics`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnCode {
    Ok,
    Error,
    Return,
    Break,
    Continue,
    Exit,
}

impl ReturnCode {
    /// Numeric code as returned by `catch`
    pub fn as_int(self) -> i32 {
        match self {
            ReturnCode::Ok => 0,
            ReturnCode::Error => 1,
            ReturnCode::Return => 2,
            ReturnCode::Break => 3,
            ReturnCode::Continue => 4,
            ReturnCode::Exit => 5,
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/* ===================== Control Flow ===================== */

/// Non-local completion of an evaluation
///
/// Anything other than a normal result unwinds through the evaluator as the
/// `Err` side of [`EvalResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Break,
    Continue,
    Return(String),
    Exit(i32),
    Error(EngineError),
}

impl Control {
    pub fn code(&self) -> ReturnCode {
        match self {
            Control::Break => ReturnCode::Break,
            Control::Continue => ReturnCode::Continue,
            Control::Return(_) => ReturnCode::Return,
            Control::Exit(_) => ReturnCode::Exit,
            Control::Error(_) => ReturnCode::Error,
        }
    }

    /// Value a script sees in the result slot for this completion
    pub fn value(&self) -> String {
        match self {
            Control::Return(value) => value.clone(),
            Control::Error(err) => err.to_string(),
            Control::Exit(code) => code.to_string(),
            Control::Break | Control::Continue => String::new(),
        }
    }
}

impl From<EngineError> for Control {
    fn from(err: EngineError) -> Self {
        Control::Error(err)
    }
}

pub type EvalResult = Result<String, Control>;

pub fn code_of(result: &EvalResult) -> ReturnCode {
    match result {
        Ok(_) => ReturnCode::Ok,
        Err(control) => control.code(),
    }
}
