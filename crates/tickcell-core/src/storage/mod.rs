//! Loading data into a workbook.

mod csv;

pub use csv::{import_csv, parse_csv_line, parse_csv_str};
