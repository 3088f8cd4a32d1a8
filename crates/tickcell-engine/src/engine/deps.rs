//! Dependency extraction from host formula text.
//!
//! Finds the cells a host formula (or a wrapper body) reads, so recalculation
//! can evaluate them first. Handles:
//! - Simple cell references: `A1`, `@B2`
//! - Range references in built-ins: `SUM(A1:B5)`
//! - Ignores references inside string literals

use regex::Regex;
use std::sync::OnceLock;

use super::cell_ref::CellRef;

const MAX_DEPENDENCY_RANGE_CELLS: usize = 1_000_000;

fn cell_ref_re() -> &'static Regex {
    static CELL_RE: OnceLock<Regex> = OnceLock::new();
    CELL_RE.get_or_init(|| {
        Regex::new(r"\b([A-Za-z]+)([0-9]+)\b")
            .expect("dependency cell reference regex must compile")
    })
}

/// Extract all cell references from a formula body as dependencies.
pub fn extract_dependencies(script: &str) -> Vec<CellRef> {
    let mut deps = Vec::new();
    let script = strip_string_literals(script);

    let range_re = crate::builtins::range_fn_re();
    // Remove range calls first so their corners are not counted twice.
    let script_without_ranges = range_re.replace_all(&script, "").to_string();

    for caps in range_re.captures_iter(&script) {
        let (Some(start), Some(end)) = (CellRef::from_str(&caps[2]), CellRef::from_str(&caps[3]))
        else {
            continue;
        };
        let min_row = start.row.min(end.row);
        let max_row = start.row.max(end.row);
        let min_col = start.col.min(end.col);
        let max_col = start.col.max(end.col);

        let row_count = max_row - min_row + 1;
        let col_count = max_col - min_col + 1;
        let Some(cell_count) = row_count.checked_mul(col_count) else {
            continue;
        };
        if cell_count > MAX_DEPENDENCY_RANGE_CELLS {
            continue;
        }

        for row in min_row..=max_row {
            for col in min_col..=max_col {
                deps.push(CellRef::new(col, row));
            }
        }
    }

    for caps in cell_ref_re().captures_iter(&script_without_ranges) {
        let cell_ref = format!("{}{}", &caps[1], &caps[2]);
        if let Some(cr) = CellRef::from_str(&cell_ref) {
            deps.push(cr);
        }
    }

    deps.sort();
    deps.dedup();
    deps
}

fn strip_string_literals(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in script.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(' ');
                continue;
            }
            if ch == '\\' {
                escaped = true;
                out.push(' ');
                continue;
            }
            if ch == '"' {
                in_string = false;
                out.push('"');
            } else {
                out.push(' ');
            }
        } else if ch == '"' {
            in_string = true;
            out.push('"');
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_dependencies_cells_and_ranges() {
        let deps = extract_dependencies("SUM(A1:A2) + @B1 + _snip0");
        assert_eq!(
            deps,
            vec![CellRef::new(0, 0), CellRef::new(1, 0), CellRef::new(0, 1)]
        );
    }

    #[test]
    fn test_extract_dependencies_skips_strings() {
        assert!(extract_dependencies(r#"len("A1")"#).is_empty());
    }

    #[test]
    fn test_extract_dependencies_skips_over_limit_ranges() {
        let deps = extract_dependencies("SUM(A1:A1000001)+B2");
        assert_eq!(deps, vec![CellRef::new(1, 1)]);
    }
}
