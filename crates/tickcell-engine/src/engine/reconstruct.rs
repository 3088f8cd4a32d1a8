//! Recovering the user's formula from a wrapper formula.
//!
//! The wrapper carries every snippet's source as a string literal, so the
//! original text is rebuilt by putting each source back between backticks
//! where its variable is referenced in the body.

use tracing::warn;

use super::extract::extract;
use super::wrapper::parse_wrapper;
use crate::error::ReconstructionError;

pub use super::wrapper::is_wrapper_formula;

/// Rebuild the original formula text, or explain why it cannot be done.
pub fn reconstruct(text: &str) -> Result<String, ReconstructionError> {
    let parts = parse_wrapper(text)?;

    let mut out = String::with_capacity(text.len());
    out.push('=');
    let mut cursor = 0;
    for (binding, reference) in parts.bindings.iter().zip(&parts.references) {
        out.push_str(&parts.body[cursor..reference.start]);
        out.push('`');
        out.push_str(&binding.source);
        out.push('`');
        cursor = reference.end;
    }
    out.push_str(&parts.body[cursor..]);

    // A source that would not extract back to itself (a stray backtick, say)
    // means the wrapper was edited by hand.
    let sources_match = extract(&out).is_ok_and(|exprs| {
        exprs.len() == parts.bindings.len()
            && exprs
                .iter()
                .zip(&parts.bindings)
                .all(|(e, b)| e.source == b.source)
    });
    if !sources_match {
        return Err(ReconstructionError::corrupt(0, "snippet source does not round-trip"));
    }

    Ok(out)
}

/// Rebuild the original formula text; `None` when `text` is not a wrapper or
/// is corrupt. Callers leave the raw text in place on `None`.
pub fn try_reconstruct(text: &str) -> Option<String> {
    match reconstruct(text) {
        Ok(original) => Some(original),
        Err(ReconstructionError::NotAWrapper) => None,
        Err(err) => {
            warn!(error = %err, "wrapper formula could not be reconstructed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruct_single() {
        let text = r#"=LET(_snip0, SNIPPET("sum(Revenue)", A1:B4), _snip0)"#;
        assert_eq!(try_reconstruct(text).as_deref(), Some("=`sum(Revenue)`"));
    }

    #[test]
    fn test_reconstruct_two_spans_in_order() {
        let text = "=LET(_snip0, SNIPPET(\"sum(Revenue)\", A1:B4), _snip1, SNIPPET(\"count(Region)\", A1:B4), _snip0  / _snip1 & \" `x` \")";
        assert_eq!(
            reconstruct(text).unwrap(),
            "=`sum(Revenue)`  / `count(Region)` & \" `x` \""
        );
    }

    #[test]
    fn test_reconstruct_unescapes_source() {
        let text = r#"=LET(_snip0, SNIPPET("\"a\\\"b\" + \"c\""), _snip0)"#;
        assert_eq!(reconstruct(text).unwrap(), r#"=`"a\"b" + "c"`"#);
    }

    #[test]
    fn test_not_a_wrapper_is_none() {
        assert_eq!(try_reconstruct("=SUM(A1:A3)"), None);
        assert_eq!(
            reconstruct("=LET(x, 1, x)"),
            Err(ReconstructionError::NotAWrapper)
        );
    }

    #[test]
    fn test_corrupt_wrapper_is_none() {
        assert_eq!(try_reconstruct("=LET(_snip0, SNIPPET(\"1\"), _snip0 + _snip0)"), None);
        assert_eq!(try_reconstruct("=LET(_snip0, SNIPPET(\"1\"), 2"), None);
        assert!(matches!(
            reconstruct("=LET(_snip0, SNIPPET(\"a ` b\"), _snip0)"),
            Err(ReconstructionError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_is_wrapper_formula_reexport() {
        assert!(is_wrapper_formula("=LET(_snip0, SNIPPET(\"1\"), _snip0)"));
    }
}
