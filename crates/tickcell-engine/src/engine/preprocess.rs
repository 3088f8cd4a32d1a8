//! Host formula preprocessing.
//!
//! Before a host formula (or the body of a wrapper formula) can be evaluated
//! by Rhai, cell references like `A1` must be transformed into function calls
//! like `CELL(0, 0)`:
//!
//! - `A1` → `CELL(0, 0)` and `@A1` → `VALUE(0, 0)`
//! - `SUM(A1:B5)` → `SUM_RANGE(0, 0, 1, 4)` (col/row)
//!
//! String literals are left untouched. Synthetic names such as `_snip0` never
//! match a cell reference because of the leading underscore.

use regex::Regex;
use std::sync::OnceLock;

use super::cell_ref::CellRef;

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Za-z]+)([0-9]+)\b").expect("cell reference regex must compile")
    })
}

fn value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@([A-Za-z]+)([0-9]+)\b").expect("value reference regex must compile")
    })
}

/// Replace cell references like "A1" with Rhai function calls like "CELL(0, 0)".
/// Typed refs like "@A1" become "VALUE(0, 0)" (returns Dynamic).
/// Also transforms range functions like SUM(A1:B5) into SUM_RANGE(0, 0, 1, 4).
pub fn preprocess_script(script: &str) -> String {
    let with_ranges = crate::builtins::range_fn_re()
        .replace_all(script, |caps: &regex::Captures| {
            let Some(rhai_name) = crate::builtins::range_rhai_name(&caps[1]) else {
                return caps[0].to_string();
            };

            match (CellRef::from_str(&caps[2]), CellRef::from_str(&caps[3])) {
                (Some(start), Some(end)) => format!(
                    "{}({}, {}, {}, {})",
                    rhai_name, start.col, start.row, end.col, end.row
                ),
                _ => caps[0].to_string(),
            }
        })
        .to_string();

    map_outside_strings(&with_ranges, replace_cells)
}

fn replace_cells(seg: &str) -> String {
    let seg = value_re()
        .replace_all(seg, |caps: &regex::Captures| {
            let cell_ref = format!("{}{}", &caps[1], &caps[2]);
            match CellRef::from_str(&cell_ref) {
                Some(cr) => format!("VALUE({}, {})", cr.col, cr.row),
                None => caps[0].to_string(),
            }
        })
        .to_string();

    cell_re()
        .replace_all(&seg, |caps: &regex::Captures| {
            let cell_ref = format!("{}{}", &caps[1], &caps[2]);
            match CellRef::from_str(&cell_ref) {
                Some(cr) => format!("CELL({}, {})", cr.col, cr.row),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

/// Apply `f` to every segment of `script` outside `"..."` literals.
fn map_outside_strings(script: &str, f: impl Fn(&str) -> String) -> String {
    let bytes = script.as_bytes();
    let mut out = String::with_capacity(script.len());
    let mut seg_start = 0;
    let mut in_string = false;
    let mut backslashes = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if b == b'\\' {
                backslashes += 1;
                continue;
            }
            if b == b'"' && backslashes.is_multiple_of(2) {
                out.push_str(&script[seg_start..=i]);
                in_string = false;
                seg_start = i + 1;
            }
            backslashes = 0;
            continue;
        }

        if b == b'"' {
            out.push_str(&f(&script[seg_start..i]));
            in_string = true;
            seg_start = i;
            backslashes = 0;
        }
    }

    if seg_start < script.len() {
        if in_string {
            out.push_str(&script[seg_start..]);
        } else {
            out.push_str(&f(&script[seg_start..]));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_cells_and_ranges() {
        assert_eq!(
            preprocess_script("SUM(A1:B3) + @C2 * D4"),
            "SUM_RANGE(0, 0, 1, 2) + VALUE(2, 1) * CELL(3, 3)"
        );
    }

    #[test]
    fn test_preprocess_leaves_strings_alone() {
        assert_eq!(
            preprocess_script(r#"A1 + "A1 \"B2\"""#),
            r#"CELL(0, 0) + "A1 \"B2\"""#
        );
    }

    #[test]
    fn test_preprocess_ignores_synthetic_names() {
        assert_eq!(preprocess_script("_snip0 / _snip1 * A1"), "_snip0 / _snip1 * CELL(0, 0)");
    }
}
