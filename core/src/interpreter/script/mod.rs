//! Script parser and reference evaluator
//!
//! A small Tcl-shaped command language, enough to drive the engine end to
//! end: commands are lists of words, words may substitute variables and
//! nested commands, and every command goes through [`Interpreter::invoke`].

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::evaluator::Evaluate;
use super::Interpreter;
use crate::error::EngineError;
use crate::types::{Control, EvalResult};

#[cfg(test)]
mod tests;

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "interpreter/script/script.pest"]
struct ScriptParser;

/* ===================== Error Types ===================== */

#[derive(Debug)]
pub enum ParseError {
    PestError(String),
    BuildError(String),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ParseError::PestError(err.to_string())
    }
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::PestError(message) => EngineError::script(format!("syntax error: {}", message)),
            ParseError::BuildError(message) => EngineError::script(message),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Parsed Form ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Var(String),
    Command(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Word {
    /// Braced word, taken verbatim
    Literal(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub words: Vec<Word>,
    /// 1-based line within the script
    pub line: usize,
    pub text: String,
}

/* ===================== Public API ===================== */

pub fn parse_script(source: &str) -> ParseResult<Vec<ParsedCommand>> {
    let mut pairs = ScriptParser::parse(Rule::script, source)?;
    let script = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("empty parse tree".to_string()))?;

    let mut commands = Vec::new();
    for pair in script.into_inner() {
        if pair.as_rule() == Rule::command {
            commands.push(build_command(pair)?);
        }
    }
    Ok(commands)
}

/// Split a list into its elements
pub fn parse_list(source: &str) -> Result<Vec<String>, EngineError> {
    let mut pairs = ScriptParser::parse(Rule::list, source).map_err(|_| {
        EngineError::script(format!("invalid list \"{}\"", source))
    })?;
    let Some(list) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut elements = Vec::new();
    for element in list.into_inner() {
        if element.as_rule() != Rule::list_element {
            continue;
        }
        let Some(inner) = element.into_inner().next() else {
            continue;
        };
        let value = match inner.as_rule() {
            Rule::braced => inner.into_inner().next().map(|body| body.as_str().to_string()).unwrap_or_default(),
            Rule::list_quoted => inner.into_inner().next().map(|body| unescape(body.as_str())).unwrap_or_default(),
            _ => unescape(inner.as_str()),
        };
        elements.push(value);
    }
    Ok(elements)
}

/// Join elements into a well-formed list
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| quote_element(item.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote one element so that [`parse_list`] gives it back unchanged
pub fn quote_element(element: &str) -> String {
    if element.is_empty() {
        return "{}".to_string();
    }
    let special = |c: char| c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '$' | '"' | '\\' | ';');
    if !element.contains(special) && !element.starts_with('#') {
        return element.to_string();
    }
    if braces_balanced(element) && !element.ends_with('\\') {
        return format!("{{{}}}", element);
    }
    let mut out = String::with_capacity(element.len() * 2);
    for c in element.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if special(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn braces_balanced(text: &str) -> bool {
    let mut depth: i64 = 0;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/* ===================== Builder ===================== */

fn build_command(pair: Pair<Rule>) -> ParseResult<ParsedCommand> {
    let (line, _) = pair.as_span().start_pos().line_col();
    let text = pair
        .as_str()
        .trim_end_matches(|c: char| matches!(c, ';' | '\n' | '\r' | ' ' | '\t'))
        .to_string();

    let mut words = Vec::new();
    for word in pair.into_inner() {
        if word.as_rule() == Rule::word {
            words.push(build_word(word)?);
        }
    }
    Ok(ParsedCommand { words, line, text })
}

fn build_word(pair: Pair<Rule>) -> ParseResult<Word> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::BuildError("empty word".to_string()))?;

    match inner.as_rule() {
        Rule::braced => {
            let body = inner.into_inner().next().map(|b| b.as_str()).unwrap_or_default();
            Ok(Word::Literal(body.to_string()))
        }
        Rule::quoted | Rule::bare => {
            let mut parts = Vec::new();
            for part in inner.into_inner() {
                parts.push(build_part(part)?);
            }
            Ok(Word::Parts(parts))
        }
        other => Err(ParseError::BuildError(format!("unexpected word: {:?}", other))),
    }
}

fn build_part(pair: Pair<Rule>) -> ParseResult<Part> {
    match pair.as_rule() {
        Rule::quoted_text | Rule::bare_text | Rule::dollar => Ok(Part::Text(pair.as_str().to_string())),
        Rule::quoted_escape | Rule::bare_escape => Ok(Part::Text(unescape(pair.as_str()))),
        Rule::var_ref => {
            let name = pair
                .into_inner()
                .next()
                .map(|n| n.as_str().to_string())
                .unwrap_or_default();
            Ok(Part::Var(name))
        }
        Rule::cmd_sub => {
            let body = pair
                .into_inner()
                .next()
                .map(|b| b.as_str().to_string())
                .unwrap_or_default();
            Ok(Part::Command(body))
        }
        other => Err(ParseError::BuildError(format!("unexpected word part: {:?}", other))),
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\n') => out.push(' '),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/* ===================== Evaluator ===================== */

/// Reference evaluator for the command language
///
/// Polls the interpreter's cancellation flags before every command, so a
/// cancel or halt request takes effect at the next command boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    fn substitute(&self, interp: &Interpreter, words: &[Word]) -> Result<Vec<String>, Control> {
        let mut values = Vec::with_capacity(words.len());
        for word in words {
            let value = match word {
                Word::Literal(text) => text.clone(),
                Word::Parts(parts) => {
                    let mut value = String::new();
                    for part in parts {
                        match part {
                            Part::Text(text) => value.push_str(text),
                            Part::Var(name) => value.push_str(&interp.get_var(name)?),
                            Part::Command(body) => value.push_str(&self.evaluate(interp, body)?),
                        }
                    }
                    value
                }
            };
            values.push(value);
        }
        Ok(values)
    }
}

impl Evaluate for ScriptEvaluator {
    fn evaluate(&self, interp: &Interpreter, script: &str) -> EvalResult {
        let commands = parse_script(script).map_err(EngineError::from)?;

        let mut result = String::new();
        for command in &commands {
            let outcome = interp
                .check_interrupts()
                .map_err(Control::from)
                .and_then(|_| self.substitute(interp, &command.words))
                .and_then(|words| interp.invoke(&words));

            match outcome {
                Ok(value) => result = value,
                Err(Control::Error(err)) => {
                    interp.note_error(&err, &command.text, command.line);
                    return Err(Control::Error(err));
                }
                Err(control) => return Err(control),
            }
        }
        Ok(result)
    }
}
