//! Backtick span extraction.
//!
//! A formula such as ``=`sum(Revenue)` / `count(Region)` `` carries embedded
//! Rhai snippets between backticks. The scanner tracks two kinds of string
//! literal so that a backtick inside one never opens or closes a span:
//!
//! - host strings outside spans (`"..."`, backslash escapes)
//! - snippet strings and chars inside spans (`"..."`, `'x'`, backslash escapes)
//!
//! Quotes inside snippet comments (`// ...`, `/* ... */`) are plain text, but a
//! backtick still ends the span there. Spans cannot nest.

use std::ops::Range;

use super::wrapper::SYNTHETIC_PREFIX;
use crate::error::ExtractionError;

/// One backtick-delimited snippet of a formula.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedExpression {
    /// Position among the formula's spans, left to right.
    pub index: usize,
    /// Raw snippet text between the backticks.
    pub source: String,
    /// Byte range of the whole span, backticks included.
    pub span: Range<usize>,
}

impl EmbeddedExpression {
    /// Byte range of the snippet text alone.
    pub fn inner_span(&self) -> Range<usize> {
        self.span.start + 1..self.span.end - 1
    }
}

#[derive(Clone, Copy)]
enum Scan {
    Host,
    HostString,
    Snippet,
    SnippetString(u8),
    LineComment,
    /// Byte offset of the opening `/*`.
    BlockComment(usize),
}

/// True if `text` is a formula whose backtick spans are all well formed.
pub fn is_embedded_expression_formula(text: &str) -> bool {
    extract(text).is_ok()
}

/// Cheap check: does this formula look like it was meant to carry snippets?
/// Used to report malformed spans instead of silently ignoring them.
pub fn has_backtick_marker(text: &str) -> bool {
    text.starts_with('=') && text.contains('`')
}

/// Extract the embedded expressions of a formula, in order.
pub fn extract(text: &str) -> Result<Vec<EmbeddedExpression>, ExtractionError> {
    if !text.starts_with('=') {
        return Err(ExtractionError::NotAFormula);
    }

    let bytes = text.as_bytes();
    let mut expressions = Vec::new();
    let mut state = Scan::Host;
    let mut escaped = false;
    let mut open = 0usize;
    let mut string_start = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        match state {
            Scan::Host => match b {
                b'"' => {
                    state = Scan::HostString;
                    string_start = i;
                }
                b'`' => {
                    state = Scan::Snippet;
                    open = i;
                }
                _ => {}
            },
            Scan::HostString => {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    state = Scan::Host;
                }
            }
            Scan::Snippet => match b {
                b'"' | b'\'' => {
                    state = Scan::SnippetString(b);
                    string_start = i;
                }
                b'/' if bytes.get(i + 1) == Some(&b'/') => state = Scan::LineComment,
                b'/' if bytes.get(i + 1) == Some(&b'*') => state = Scan::BlockComment(i),
                b'`' => {
                    close_span(&mut expressions, text, open, i);
                    state = Scan::Host;
                }
                _ => {}
            },
            Scan::LineComment | Scan::BlockComment(_) if b == b'`' => {
                close_span(&mut expressions, text, open, i);
                state = Scan::Host;
            }
            Scan::LineComment => {
                if b == b'\n' {
                    state = Scan::Snippet;
                }
            }
            Scan::BlockComment(start) => {
                if b == b'/' && i > start + 2 && bytes[i - 1] == b'*' {
                    state = Scan::Snippet;
                }
            }
            Scan::SnippetString(quote) => {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == quote {
                    state = Scan::Snippet;
                }
            }
        }
    }

    match state {
        Scan::Snippet | Scan::LineComment | Scan::BlockComment(_) => {
            return Err(ExtractionError::Unbalanced { offset: open });
        }
        Scan::SnippetString(_) => {
            return Err(ExtractionError::UnterminatedString {
                offset: string_start,
            });
        }
        // An unterminated host string is the host's problem, not ours.
        Scan::Host | Scan::HostString => {}
    }

    if expressions.is_empty() {
        return Err(ExtractionError::NoExpressions);
    }

    if let Some(expr) = expressions.iter().find(|e| e.source.trim().is_empty()) {
        return Err(ExtractionError::EmptyExpression { index: expr.index });
    }

    for segment in skeleton_segments(text, &expressions) {
        if let Some(found) = text[segment.clone()].find(SYNTHETIC_PREFIX) {
            return Err(ExtractionError::ReservedIdentifier {
                offset: segment.start + found,
            });
        }
    }

    Ok(expressions)
}

fn close_span(expressions: &mut Vec<EmbeddedExpression>, text: &str, open: usize, close: usize) {
    expressions.push(EmbeddedExpression {
        index: expressions.len(),
        source: text[open + 1..close].to_string(),
        span: open..close + 1,
    });
}

/// Byte ranges of the text around the spans (the formula's skeleton).
pub fn skeleton_segments(text: &str, expressions: &[EmbeddedExpression]) -> Vec<Range<usize>> {
    let mut segments = Vec::with_capacity(expressions.len() + 1);
    let mut cursor = 0;
    for expr in expressions {
        segments.push(cursor..expr.span.start);
        cursor = expr.span.end;
    }
    segments.push(cursor..text.len());
    segments
}
