//! CSV import.

use std::path::Path;

use tickcell_engine::engine::{CellAddress, CellRef};
use tracing::info;

use crate::document::Workbook;
use crate::error::{CoreError, Result};
use crate::host::HostDocument;

/// Read a CSV file into `sheet`, top-left at `start`. Every field is stored
/// as a literal, so a field starting with `=` never becomes a formula.
/// Returns the number of cells written.
pub fn import_csv(workbook: &Workbook, sheet: &str, path: &Path, start: CellRef) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let cells = parse_csv_str(&content, &start);
    if cells.is_empty() {
        return Err(CoreError::EmptyCsv);
    }
    workbook.add_sheet(sheet);
    for (cell, text) in &cells {
        workbook.set_cell_text(&CellAddress::new(sheet, cell.clone()), text, true)?;
    }
    info!(path = %path.display(), cells = cells.len(), "imported CSV");
    Ok(cells.len())
}

/// Non-empty fields of CSV text with their cell positions.
pub fn parse_csv_str(content: &str, start: &CellRef) -> Vec<(CellRef, String)> {
    let mut cells = Vec::new();
    for (row_idx, line) in content.lines().enumerate() {
        for (col_idx, field) in parse_csv_line(line).into_iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            cells.push((CellRef::new(start.col + col_idx, start.row + row_idx), field));
        }
    }
    cells
}

/// Parse a single CSV line, handling quoted fields
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => {
                    in_quotes = true;
                    field_was_quoted = true;
                }
                ',' => {
                    fields.push(finish_field(std::mem::take(&mut current), field_was_quoted));
                    field_was_quoted = false;
                }
                _ => current.push(c),
            }
        }
    }
    fields.push(finish_field(current, field_was_quoted));
    fields
}

// Quoted fields keep their whitespace.
fn finish_field(field: String, quoted: bool) -> String {
    if quoted { field } else { field.trim().to_string() }
}
