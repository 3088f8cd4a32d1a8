//! Wrapper formula syntax.
//!
//! A wrapper formula binds one synthetic variable per embedded expression and
//! carries each expression's source as a string literal, so it can always be
//! decoded back into what the user typed:
//!
//! ```text
//! =LET(_snip0, SNIPPET("sum(Revenue)", A1:C4), _snip1, SNIPPET("count(Region)", A1:C4), _snip0 / _snip1)
//! ```
//!
//! The body (everything after the last binding) is the user's formula text with
//! each backtick span replaced by its variable, byte-for-byte otherwise.

use std::ops::Range;

use super::cell_ref::RangeRef;
use crate::error::ReconstructionError;

/// Prefix of generated variable names. Rejected in user formulas by the extractor.
pub const SYNTHETIC_PREFIX: &str = "_snip";

/// Host function that runs a compiled snippet.
pub const INVOKE_FN: &str = "SNIPPET";

pub(crate) const LET_OPEN: &str = "=LET(";

/// Name of the synthetic variable for the embedded expression at `index`.
pub fn synthetic_name(index: usize) -> String {
    format!("{SYNTHETIC_PREFIX}{index}")
}

/// Encode snippet source as a host string literal.
pub fn quote_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 2);
    out.push('"');
    for c in source.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Decode the string literal starting at `start` (which must be a `"`).
/// Returns the decoded text and the offset just past the closing quote.
fn unquote_at(text: &str, start: usize) -> Result<(String, usize), ReconstructionError> {
    if !text[start..].starts_with('"') {
        return Err(ReconstructionError::corrupt(start, "expected string literal"));
    }
    let mut out = String::new();
    let mut chars = text[start + 1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, start + 1 + i + 1)),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    break;
                };
                out.push(match escaped {
                    '\\' => '\\',
                    '"' => '"',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => {
                        return Err(ReconstructionError::corrupt(
                            start + 1 + i,
                            format!("unknown escape '\\{other}'"),
                        ));
                    }
                });
            }
            other => out.push(other),
        }
    }
    Err(ReconstructionError::corrupt(start, "unterminated string literal"))
}

/// One `name, SNIPPET(...)` pair of a wrapper formula.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrapperBinding {
    pub name: String,
    /// Decoded snippet source.
    pub source: String,
    /// Data region the snippet runs against, if any.
    pub range: Option<RangeRef>,
}

/// A decoded wrapper formula.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrapperParts {
    pub bindings: Vec<WrapperBinding>,
    /// Host formula text, without the leading `=`.
    pub body: String,
    /// Byte ranges of each variable reference inside `body`, in binding order.
    pub references: Vec<Range<usize>>,
}

impl WrapperParts {
    /// The binding the body consists of entirely, if it is just one reference.
    pub fn sole_reference(&self) -> Option<usize> {
        let trimmed = self.body.trim();
        self.bindings.iter().position(|b| b.name == trimmed)
    }
}

/// True if the text follows the wrapper naming convention.
pub fn is_wrapper_formula(text: &str) -> bool {
    text.strip_prefix(LET_OPEN)
        .and_then(|rest| rest.strip_prefix(&synthetic_name(0)))
        .is_some_and(|rest| rest.starts_with(", "))
}

/// Decode a wrapper formula into its bindings and body.
pub fn parse_wrapper(text: &str) -> Result<WrapperParts, ReconstructionError> {
    if !is_wrapper_formula(text) {
        return Err(ReconstructionError::NotAWrapper);
    }
    if !text.ends_with(')') {
        return Err(ReconstructionError::corrupt(text.len(), "missing closing parenthesis"));
    }
    let close = text.len() - 1;

    let mut pos = LET_OPEN.len();
    let mut bindings = Vec::new();
    loop {
        let name = synthetic_name(bindings.len());
        let header = format!("{name}, ");
        // The body never references an index >= the binding count, so the next
        // expected name unambiguously starts another binding.
        if pos > close || !text[pos..close].starts_with(&header) {
            break;
        }
        pos += header.len();

        let call = format!("{INVOKE_FN}(");
        if !text[pos..close].starts_with(&call) {
            return Err(ReconstructionError::corrupt(pos, format!("expected {INVOKE_FN}(")));
        }
        pos += call.len();

        let (source, after) = unquote_at(&text[..close], pos)?;
        pos = after;

        let range = if let Some(rest) = text[pos..close].strip_prefix(", ") {
            let start = pos + 2;
            let end = start + range_len(rest);
            let range = RangeRef::parse(&text[start..end])
                .ok_or_else(|| ReconstructionError::corrupt(start, "invalid range reference"))?;
            pos = end;
            Some(range)
        } else {
            None
        };

        if !text[pos..close].starts_with("), ") {
            return Err(ReconstructionError::corrupt(pos, "expected ')' after invocation"));
        }
        pos += 3;

        bindings.push(WrapperBinding {
            name,
            source,
            range,
        });
    }

    let body = text[pos..close].to_string();
    let references = locate_references(&body, bindings.len()).map_err(|e| match e {
        ReconstructionError::Corrupt { offset, reason } => ReconstructionError::Corrupt {
            offset: pos + offset,
            reason,
        },
        other => other,
    })?;

    Ok(WrapperParts {
        bindings,
        body,
        references,
    })
}

/// Length of a range reference: up to the closing `)` of the invocation,
/// skipping over a quoted sheet name.
fn range_len(rest: &str) -> usize {
    let mut in_quotes = false;
    for (i, c) in rest.char_indices() {
        match c {
            '\'' => in_quotes = !in_quotes,
            ')' if !in_quotes => return i,
            _ => {}
        }
    }
    rest.len()
}

/// Find the variable references in `body`: exactly one per binding, in order.
fn locate_references(body: &str, count: usize) -> Result<Vec<Range<usize>>, ReconstructionError> {
    let mut references = Vec::with_capacity(count);
    let mut cursor = 0;
    for index in 0..count {
        let name = synthetic_name(index);
        let Some(found) = body[cursor..].find(SYNTHETIC_PREFIX) else {
            return Err(ReconstructionError::corrupt(
                cursor,
                format!("missing reference to {name}"),
            ));
        };
        let start = cursor + found;
        if !body[start..].starts_with(&name) {
            return Err(ReconstructionError::corrupt(
                start,
                format!("expected reference to {name}"),
            ));
        }
        references.push(start..start + name.len());
        cursor = start + name.len();
    }
    if let Some(found) = body[cursor..].find(SYNTHETIC_PREFIX) {
        return Err(ReconstructionError::corrupt(
            cursor + found,
            "unexpected variable reference",
        ));
    }
    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_source_escapes() {
        assert_eq!(quote_source(r#"len("a\b")"#), r#""len(\"a\\b\")""#);
        assert_eq!(quote_source("a\nb"), r#""a\nb""#);
        let quoted = quote_source("x \"y\"\t\\");
        assert_eq!(unquote_at(&quoted, 0).unwrap(), ("x \"y\"\t\\".to_string(), quoted.len()));
    }

    #[test]
    fn test_is_wrapper_formula() {
        assert!(is_wrapper_formula("=LET(_snip0, SNIPPET(\"1\"), _snip0)"));
        assert!(!is_wrapper_formula("=LET(x, 1, x)"));
        assert!(!is_wrapper_formula("=SUM(A1:A3)"));
        assert!(!is_wrapper_formula("LET(_snip0, SNIPPET(\"1\"), _snip0)"));
    }

    #[test]
    fn test_parse_wrapper_with_ranges() {
        let text = "=LET(_snip0, SNIPPET(\"sum(Revenue)\", A1:C4), _snip1, SNIPPET(\"1\", 'Q 1'!B2:D9), _snip0 + _snip1)";
        let parts = parse_wrapper(text).unwrap();
        assert_eq!(parts.bindings.len(), 2);
        assert_eq!(parts.bindings[0].source, "sum(Revenue)");
        assert_eq!(parts.bindings[0].range, RangeRef::parse("A1:C4"));
        assert_eq!(parts.bindings[1].range.as_ref().unwrap().sheet.as_deref(), Some("Q 1"));
        assert_eq!(parts.body, "_snip0 + _snip1");
        assert_eq!(parts.references, vec![0..6, 9..15]);
    }

    #[test]
    fn test_parse_wrapper_body_adjacent_digits() {
        // `=\`1\`5` assembles to a body of "_snip05"
        let parts = parse_wrapper("=LET(_snip0, SNIPPET(\"1\"), _snip05)").unwrap();
        assert_eq!(parts.references, vec![0..6]);
        assert_eq!(parts.sole_reference(), None);
    }

    #[test]
    fn test_parse_wrapper_rejects_out_of_order_references() {
        let text = "=LET(_snip0, SNIPPET(\"1\"), _snip1, SNIPPET(\"2\"), _snip1 + _snip0)";
        assert!(matches!(
            parse_wrapper(text),
            Err(ReconstructionError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_parse_wrapper_rejects_missing_reference() {
        let text = "=LET(_snip0, SNIPPET(\"1\"), 42)";
        assert!(matches!(
            parse_wrapper(text),
            Err(ReconstructionError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_parse_wrapper_rejects_unterminated_source() {
        let text = "=LET(_snip0, SNIPPET(\"sum(, _snip0)";
        assert!(matches!(
            parse_wrapper(text),
            Err(ReconstructionError::Corrupt { .. })
        ));
    }
}
