//! Cell and range addressing.
//!
//! Converts between spreadsheet-style references (`A1`, `$B$2`, `Data!A1:C4`,
//! `'Q1 Sales'!A1:B9`) and zero-indexed column/row coordinates.
//!
//! # Examples
//!
//! ```ignore
//! let cell = CellRef::from_str("B3").unwrap();
//! assert_eq!(cell.col, 1);  // 0-indexed
//! assert_eq!(cell.row, 2);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A reference to a cell by column and row indices (0-indexed).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

fn a1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\$?(?<letters>[A-Za-z]+)\$?(?<numbers>[0-9]+)$")
            .expect("A1 reference regex must compile")
    })
}

impl CellRef {
    pub fn new(col: usize, row: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a cell reference from spreadsheet notation (e.g. "A1", "$B$2", "AA10").
    /// Returns None if the input is invalid.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<CellRef> {
        Self::parse_a1(name)
    }

    fn parse_a1(name: &str) -> Option<CellRef> {
        let caps = a1_re().captures(name)?;
        let letters = &caps["letters"];
        let numbers = &caps["numbers"];

        let mut col_acc = 0usize;
        for c in letters.to_ascii_uppercase().bytes() {
            let digit = (c - b'A') as usize + 1;
            col_acc = col_acc.checked_mul(26)?.checked_add(digit)?;
        }
        let col = col_acc.checked_sub(1)?;

        let row = numbers.parse::<usize>().ok()?.checked_sub(1)?;

        Some(CellRef::new(col, row))
    }

    /// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_a1(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.col), self.row + 1)
    }
}

/// A cell on a named sheet.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellAddress {
    pub sheet: String,
    pub cell: CellRef,
}

impl CellAddress {
    pub fn new(sheet: impl Into<String>, cell: CellRef) -> CellAddress {
        CellAddress {
            sheet: sheet.into(),
            cell,
        }
    }

    /// Parse `Sheet!A1` or `'My Sheet'!A1`.
    pub fn parse(text: &str) -> Option<CellAddress> {
        let (sheet, rest) = split_sheet(text)?;
        let cell = CellRef::from_str(rest)?;
        Some(CellAddress::new(sheet?, cell))
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", quote_sheet(&self.sheet), self.cell)
    }
}

/// Rectangular block of cells, optionally qualified with a sheet name.
///
/// `start` is always the top-left corner and `end` the bottom-right one.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeRef {
    pub sheet: Option<String>,
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeRef {
    pub fn new(sheet: Option<String>, a: CellRef, b: CellRef) -> RangeRef {
        RangeRef {
            sheet,
            start: CellRef::new(a.col.min(b.col), a.row.min(b.row)),
            end: CellRef::new(a.col.max(b.col), a.row.max(b.row)),
        }
    }

    /// Parse `A1:C4`, `Data!A1:C4` or `'Q1 Sales'!$A$1:$C$4`.
    pub fn parse(text: &str) -> Option<RangeRef> {
        let (sheet, rest) = split_sheet(text.trim())?;
        let (a, b) = rest.split_once(':')?;
        Some(RangeRef::new(
            sheet,
            CellRef::from_str(a)?,
            CellRef::from_str(b)?,
        ))
    }

    pub fn width(&self) -> usize {
        self.end.col - self.start.col + 1
    }

    pub fn height(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        (self.start.col..=self.end.col).contains(&cell.col)
            && (self.start.row..=self.end.row).contains(&cell.row)
    }

    /// The reference as it should be written in a formula living on `current_sheet`:
    /// the sheet prefix is only emitted when the range lives elsewhere.
    pub fn to_formula_ref(&self, current_sheet: &str) -> String {
        match &self.sheet {
            Some(sheet) if sheet != current_sheet => {
                format!("{}!{}:{}", quote_sheet(sheet), self.start, self.end)
            }
            _ => format!("{}:{}", self.start, self.end),
        }
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet(sheet))?;
        }
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Sheet name plus one-based row/column of a data region's first cell.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeOrigin {
    pub sheet: String,
    pub row: usize,
    pub col: usize,
}

impl RangeOrigin {
    pub fn of(sheet: impl Into<String>, range: &RangeRef) -> RangeOrigin {
        RangeOrigin {
            sheet: sheet.into(),
            row: range.start.row + 1,
            col: range.start.col + 1,
        }
    }
}

fn needs_quotes(sheet: &str) -> bool {
    sheet.is_empty()
        || !sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        || sheet.starts_with(|c: char| c.is_ascii_digit())
}

/// Quote a sheet name for use in a reference (`My Sheet` -> `'My Sheet'`).
pub fn quote_sheet(sheet: &str) -> String {
    if needs_quotes(sheet) {
        format!("'{}'", sheet.replace('\'', "''"))
    } else {
        sheet.to_string()
    }
}

/// Split an optional `Sheet!` / `'Sheet'!` prefix from a reference.
///
/// Returns `None` only for a malformed quoted sheet name.
fn split_sheet(text: &str) -> Option<(Option<String>, &str)> {
    if let Some(quoted) = text.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c != '\'' {
                name.push(c);
                continue;
            }
            if matches!(chars.peek(), Some((_, '\''))) {
                name.push('\'');
                chars.next();
                continue;
            }
            let rest = quoted[i + 1..].strip_prefix('!')?;
            return Some((Some(name), rest));
        }
        return None;
    }

    match text.split_once('!') {
        Some((sheet, rest)) if !sheet.is_empty() => Some((Some(sheet.to_string()), rest)),
        Some(_) => None,
        None => Some((None, text)),
    }
}
