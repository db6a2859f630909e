//! Qualified name helpers
//!
//! Names are `::`-delimited. A leading `::` makes a name absolute. Runs of
//! more than two colons count as a single separator.

use crate::error::EngineError;

pub const SEPARATOR: &str = "::";

pub fn is_absolute(name: &str) -> bool {
    name.starts_with(SEPARATOR)
}

pub fn is_qualified(name: &str) -> bool {
    name.contains(SEPARATOR)
}

/// Byte range of the last separator run, if any
fn last_separator(name: &str) -> Option<(usize, usize)> {
    let end = name.rfind(SEPARATOR)? + SEPARATOR.len();
    let bytes = name.as_bytes();
    let mut start = end - SEPARATOR.len();
    while start > 0 && bytes[start - 1] == b':' {
        start -= 1;
    }
    Some((start, end))
}

/// Everything before the last separator (`namespace qualifiers`)
pub fn qualifiers(name: &str) -> &str {
    match last_separator(name) {
        Some((start, _)) => &name[..start],
        None => "",
    }
}

/// Everything after the last separator (`namespace tail`)
pub fn tail(name: &str) -> &str {
    match last_separator(name) {
        Some((_, end)) => &name[end..],
        None => name,
    }
}

/// Split into path components, rejecting malformed names
///
/// Empty components (from a leading separator or from colon runs) are
/// dropped. A name that ends in a separator has an empty tail and is
/// rejected, except for the global namespace itself.
pub fn components(name: &str) -> Result<Vec<&str>, EngineError> {
    let mut parts = Vec::new();
    let mut rest = name;
    while let Some(index) = rest.find(SEPARATOR) {
        if index > 0 {
            parts.push(&rest[..index]);
        }
        rest = rest[index..].trim_start_matches(':');
    }
    if !rest.is_empty() {
        parts.push(rest);
    } else if !parts.is_empty() && name.ends_with(':') {
        return Err(EngineError::InvalidName(format!(
            "invalid namespace name \"{}\"",
            name
        )));
    }
    Ok(parts)
}

/// Qualified name of `child` inside the namespace named `parent`
pub fn join(parent: &str, child: &str) -> String {
    if parent == SEPARATOR {
        format!("{}{}", SEPARATOR, child)
    } else {
        format!("{}{}{}", parent, SEPARATOR, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifiers_and_tail() {
        assert_eq!(qualifiers("::a::b::c"), "::a::b");
        assert_eq!(tail("::a::b::c"), "c");
        assert_eq!(qualifiers("::a"), "");
        assert_eq!(tail("::a"), "a");
        assert_eq!(qualifiers("plain"), "");
        assert_eq!(tail("plain"), "plain");
    }

    #[test]
    fn test_colon_runs_collapse() {
        assert_eq!(qualifiers("a::::b"), "a");
        assert_eq!(tail("a::::b"), "b");
        assert_eq!(qualifiers("a:::b"), "a");
        assert_eq!(tail("a:::b"), "b");
    }

    #[test]
    fn test_components() {
        assert_eq!(components("::a::b").unwrap(), vec!["a", "b"]);
        assert_eq!(components("a::::b").unwrap(), vec!["a", "b"]);
        assert_eq!(components("a:::b").unwrap(), vec!["a", "b"]);
        assert_eq!(components("a:b").unwrap(), vec!["a:b"]);
        assert!(components("::").unwrap().is_empty());
    }

    #[test]
    fn test_components_rejects_empty_tail() {
        let err = components("::a::").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidName);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("::", "a"), "::a");
        assert_eq!(join("::a", "b"), "::a::b");
    }
}
