//! Workbook: the in-memory host document (UI-agnostic).

mod adapter;
mod cycle;
mod ops;
mod recalc;
mod state;

pub use cycle::detect_cycle;
pub use state::{CellContent, CellEntry, DEFAULT_SHEET, Grid, Sheet, Workbook};
