//! Glob-style pattern matching (`*`, `?`, `[...]`, `\x`)

use regex::Regex;

use crate::error::EngineError;

/// Compiled glob pattern
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self, EngineError> {
        let regex = Regex::new(&to_regex(pattern))
            .map_err(|_| EngineError::invalid(format!("invalid pattern \"{}\"", pattern)))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Match `text` against an optional pattern; no pattern matches everything
pub fn matches(pattern: Option<&Glob>, text: &str) -> bool {
    pattern.map_or(true, |glob| glob.is_match(text))
}

fn to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => out.push_str(r"\\"),
            },
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    class.push(inner);
                }
                if closed && !class.is_empty() {
                    out.push('[');
                    for inner in class.chars() {
                        if matches!(inner, '\\' | '[' | '^' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(inner);
                    }
                    out.push(']');
                } else {
                    out.push_str(&regex::escape(&format!("[{}", class)));
                    if closed {
                        out.push_str(r"\]");
                    }
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}
