//! Snippet binding: which identifiers a snippet reads, and what they refer to.
//!
//! Free identifiers are found with a small tokenizer that ignores string and
//! char literals, comments, member/method names, function calls, map keys and
//! locally declared names (`let`, `const`, `for`, closure parameters, `catch`).
//! Each free identifier must then match a header of the data region
//! (case-insensitively) or one of the implicit identifiers.
//!
//! Rhai's strict-variables mode re-checks the result at compile time, so a
//! name this scan misses still ends up as a binding error rather than a
//! runtime fault.

use std::collections::HashSet;

use super::cell_ref::RangeOrigin;
use crate::error::BindingError;

/// One-based row of the data region's first cell.
pub const ORIGIN_ROW: &str = "ORIGIN_ROW";
/// One-based column of the data region's first cell.
pub const ORIGIN_COL: &str = "ORIGIN_COL";
pub const SHEET_NAME: &str = "SHEET_NAME";
/// All data rows as object maps keyed by header.
pub const ROWS: &str = "ROWS";
pub const HEADERS: &str = "HEADERS";

const KEYWORDS: &[&str] = &[
    "let", "const", "if", "else", "switch", "do", "while", "until", "loop", "for", "in", "break",
    "continue", "return", "throw", "try", "catch", "fn", "private", "import", "export", "as",
    "true", "false", "this", "global",
];

const TWO_CHAR_PUNCT: &[&str] = &[
    "::", "||", "?.", "?[", "=>", "==", "!=", "<=", ">=", "&&", "..", "#{", "+=", "-=", "*=",
    "/=", "**", "<<", ">>", "??",
];

/// What a snippet is compiled against: the data region's headers and origin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BindingContext {
    pub headers: Vec<String>,
    pub origin: Option<RangeOrigin>,
}

impl BindingContext {
    pub fn new(headers: Vec<String>, origin: Option<RangeOrigin>) -> Self {
        BindingContext { headers, origin }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingTarget {
    /// Zero-based column within the data region.
    Column(usize),
    OriginRow,
    OriginCol,
    SheetName,
    Rows,
    Headers,
}

/// A free identifier of a snippet and what it is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// The identifier exactly as written in the snippet.
    pub name: String,
    pub target: BindingTarget,
}

/// Canonicalize insignificant whitespace: trim, and collapse every run of
/// whitespace outside string/char literals and comments into one space.
/// A run that ends a `//` comment collapses into a newline instead.
pub fn normalize_snippet(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut pending_space = false;
    let mut pending_newline = false;

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if (pending_space || pending_newline) && !out.is_empty() {
            out.push(if pending_newline { '\n' } else { ' ' });
        }
        pending_space = false;
        pending_newline = false;

        match c {
            '"' | '\'' => {
                out.push(c);
                let mut escaped = false;
                for s in chars.by_ref() {
                    out.push(s);
                    if escaped {
                        escaped = false;
                    } else if s == '\\' {
                        escaped = true;
                    } else if s == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                out.push(c);
                for s in chars.by_ref() {
                    if s == '\n' {
                        pending_newline = true;
                        break;
                    }
                    out.push(s);
                }
                let trimmed = out.trim_end().len();
                out.truncate(trimmed);
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push(c);
                if let Some(star) = chars.next() {
                    out.push(star);
                }
                let mut prev = '\0';
                for s in chars.by_ref() {
                    out.push(s);
                    if prev == '*' && s == '/' {
                        break;
                    }
                    prev = s;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token<'a> {
    Ident(&'a str),
    Literal,
    Punct(&'a str),
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if source[i..].starts_with("//") {
            i = source[i..].find('\n').map_or(bytes.len(), |n| i + n);
            continue;
        }
        if source[i..].starts_with("/*") {
            i = source[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            continue;
        }
        if b == b'"' || b == b'\'' {
            let mut j = i + 1;
            let mut escaped = false;
            while j < bytes.len() {
                if escaped {
                    escaped = false;
                } else if bytes[j] == b'\\' {
                    escaped = true;
                } else if bytes[j] == b {
                    break;
                }
                j += 1;
            }
            tokens.push(Token::Literal);
            i = j + 1;
            continue;
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(&source[start..i]));
            continue;
        }
        if b.is_ascii_digit() {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric()
                    || bytes[i] == b'_'
                    || (bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)))
            {
                i += 1;
            }
            tokens.push(Token::Literal);
            continue;
        }
        if let Some(punct) = TWO_CHAR_PUNCT.iter().find(|p| source[i..].starts_with(**p)) {
            tokens.push(Token::Punct(*punct));
            i += 2;
            continue;
        }
        // Multi-byte characters are never part of an identifier Rhai accepts.
        let len = source[i..].chars().next().map_or(1, char::len_utf8);
        tokens.push(Token::Punct(&source[i..i + len]));
        i += len;
    }
    tokens
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Whether the token before `k` ends an operand (so a following `|` is a
/// binary operator rather than the start of a closure's parameter list).
fn follows_operand(tokens: &[Token<'_>], k: usize) -> bool {
    match k.checked_sub(1).map(|p| tokens[p]) {
        Some(Token::Ident(word)) => !is_keyword(word) || matches!(word, "true" | "false" | "this"),
        Some(Token::Literal) => true,
        Some(Token::Punct(p)) => matches!(p, ")" | "]" | "}"),
        None => false,
    }
}

/// Declare every identifier from `from` up to (not including) the first token
/// matching `stop`. Returns the index of the stop token.
fn declare_until<'a>(
    tokens: &[Token<'a>],
    from: usize,
    declared: &mut HashSet<&'a str>,
    stop: impl Fn(&Token<'a>) -> bool,
) -> usize {
    let mut j = from;
    while let Some(token) = tokens.get(j) {
        if stop(token) {
            break;
        }
        if let Token::Ident(name) = token {
            declared.insert(*name);
        }
        j += 1;
    }
    j
}

/// Identifiers the snippet reads but never declares, in order of first use.
pub fn free_identifiers(source: &str) -> Vec<String> {
    let tokens = tokenize(source);
    let mut declared: HashSet<&str> = HashSet::new();
    let mut free: Vec<String> = Vec::new();
    let mut k = 0;

    while k < tokens.len() {
        match tokens[k] {
            Token::Ident("let" | "const") => {
                if let Some(Token::Ident(name)) = tokens.get(k + 1) {
                    declared.insert(*name);
                    k += 2;
                    continue;
                }
            }
            Token::Ident("for") => {
                k = declare_until(&tokens, k + 1, &mut declared, |t| {
                    *t == Token::Ident("in")
                });
                continue;
            }
            Token::Ident("catch" | "fn") => {
                k = declare_until(&tokens, k + 1, &mut declared, |t| *t == Token::Punct(")"));
                continue;
            }
            Token::Punct("|") if !follows_operand(&tokens, k) => {
                k = declare_until(&tokens, k + 1, &mut declared, |t| *t == Token::Punct("|")) + 1;
                continue;
            }
            Token::Ident(word) if !is_keyword(word) => {
                let prev = k.checked_sub(1).map(|p| tokens[p]);
                let next = tokens.get(k + 1).copied();
                let is_member = matches!(prev, Some(Token::Punct("." | "?." | "::")));
                let is_call = matches!(next, Some(Token::Punct("(" | "::")));
                let is_key = matches!(next, Some(Token::Punct(":")));
                if !is_member
                    && !is_call
                    && !is_key
                    && !declared.contains(word)
                    && !free.iter().any(|f| f == word)
                {
                    free.push(word.to_string());
                }
            }
            _ => {}
        }
        k += 1;
    }
    free
}

fn canonical_header(header: &str) -> String {
    header
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

/// Resolve free identifiers against the binding context.
///
/// Headers win over implicit identifiers; the first matching header wins
/// among duplicates.
pub fn resolve_bindings(
    identifiers: &[String],
    context: &BindingContext,
) -> Result<Vec<Binding>, BindingError> {
    let canonical: Vec<String> = context.headers.iter().map(|h| canonical_header(h)).collect();

    identifiers
        .iter()
        .map(|name| {
            let lower = name.to_lowercase();
            let target = if let Some(col) = canonical.iter().position(|h| *h == lower) {
                Some(BindingTarget::Column(col))
            } else {
                implicit_target(&lower, context)
            };
            target
                .map(|target| Binding {
                    name: name.clone(),
                    target,
                })
                .ok_or_else(|| BindingError { name: name.clone() })
        })
        .collect()
}

fn implicit_target(lower: &str, context: &BindingContext) -> Option<BindingTarget> {
    let has_origin = context.origin.is_some();
    [
        (ORIGIN_ROW, BindingTarget::OriginRow, has_origin),
        (ORIGIN_COL, BindingTarget::OriginCol, has_origin),
        (SHEET_NAME, BindingTarget::SheetName, has_origin),
        (ROWS, BindingTarget::Rows, true),
        (HEADERS, BindingTarget::Headers, true),
    ]
    .into_iter()
    .find(|(name, _, available)| *available && name.to_lowercase() == lower)
    .map(|(_, target, _)| target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(headers: &[&str]) -> BindingContext {
        BindingContext::new(headers.iter().map(|h| h.to_string()).collect(), None)
    }

    #[test]
    fn test_normalize_collapses_whitespace_outside_strings() {
        assert_eq!(normalize_snippet("  sum( Revenue )\n\t* 2  "), "sum( Revenue ) * 2");
        assert_eq!(normalize_snippet(r#"x +   "a   b""#), r#"x + "a   b""#);
        assert_eq!(normalize_snippet("' '  + 1"), "' ' + 1");
    }

    #[test]
    fn test_normalize_keeps_line_comment_terminator() {
        assert_eq!(normalize_snippet("1 // one  \n   + 2"), "1 // one\n+ 2");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_snippet(" let x = 1;\n\n x +  Revenue // tail ");
        assert_eq!(normalize_snippet(&once), once);
    }

    #[test]
    fn test_free_identifiers_skips_calls_members_and_strings() {
        let idents = free_identifiers(r#"sum(Revenue) + Cost.len() + len("Region")"#);
        assert_eq!(idents, vec!["Revenue", "Cost"]);
    }

    #[test]
    fn test_free_identifiers_skips_locals_and_closure_params() {
        let idents = free_identifiers(
            "let total = sum(Revenue); Units.filter(|u, i| u > Threshold).len() + total",
        );
        assert_eq!(idents, vec!["Revenue", "Units", "Threshold"]);
    }

    #[test]
    fn test_free_identifiers_for_loop_and_map_keys() {
        let idents = free_identifiers("let acc = 0; for (r, i) in ROWS { acc += r.Revenue } #{ total: acc, n: Count }");
        assert_eq!(idents, vec!["ROWS", "Count"]);
    }

    #[test]
    fn test_logical_or_is_not_a_closure() {
        let idents = free_identifiers("Active || Pending");
        assert_eq!(idents, vec!["Active", "Pending"]);
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let ctx = context(&["Revenue", "Unit Price"]);
        let bindings =
            resolve_bindings(&["revenue".to_string(), "UNIT_PRICE".to_string()], &ctx).unwrap();
        assert_eq!(bindings[0].target, BindingTarget::Column(0));
        assert_eq!(bindings[0].name, "revenue");
        assert_eq!(bindings[1].target, BindingTarget::Column(1));
    }

    #[test]
    fn test_resolve_unknown_is_binding_error() {
        let ctx = context(&["Revenue"]);
        let err = resolve_bindings(&["Profit".to_string()], &ctx).unwrap_err();
        assert_eq!(err.name, "Profit");
    }

    #[test]
    fn test_implicit_identifiers() {
        let ctx = context(&["Revenue"]);
        let bindings = resolve_bindings(&["rows".to_string()], &ctx).unwrap();
        assert_eq!(bindings[0].target, BindingTarget::Rows);
        // Origin-derived names need an origin.
        assert!(resolve_bindings(&["ORIGIN_ROW".to_string()], &ctx).is_err());
        let with_origin = BindingContext::new(
            vec![],
            Some(RangeOrigin {
                sheet: "Data".into(),
                row: 1,
                col: 1,
            }),
        );
        let bindings = resolve_bindings(&["Sheet_Name".to_string()], &with_origin).unwrap();
        assert_eq!(bindings[0].target, BindingTarget::SheetName);
    }

    #[test]
    fn test_header_wins_over_implicit() {
        let ctx = context(&["Rows"]);
        let bindings = resolve_bindings(&["ROWS".to_string()], &ctx).unwrap();
        assert_eq!(bindings[0].target, BindingTarget::Column(0));
    }
}
