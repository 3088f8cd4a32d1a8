//! Embedded-expression engine API.
//!
//! - [`extract`] - Find backtick-delimited snippets in a formula
//! - [`DynamicCompiler`], [`UnitCache`] - Bind, compile and cache snippets
//! - [`assemble`] - Build the `LET(...)` wrapper formula
//! - [`reconstruct`], [`try_reconstruct`] - Recover the original formula
//! - [`normalize_result`] - Marshal a snippet's output into a host [`Value`]
//! - [`create_host_engine`], [`eval_host_formula`] - Evaluate host formulas
//! - [`CellRef`], [`RangeRef`] - A1 addressing

mod assemble;
mod bind;
mod cell_ref;
mod compile;
mod deps;
mod eval;
mod extract;
mod marshal;
mod preprocess;
mod reconstruct;
mod value;
mod wrapper;

use dashmap::DashMap;
use std::sync::Arc;

pub use assemble::{SourceFormula, WrapperFormula, assemble};
pub use bind::{
    Binding, BindingContext, BindingTarget, HEADERS, ORIGIN_COL, ORIGIN_ROW, ROWS, SHEET_NAME,
    free_identifiers, normalize_snippet, resolve_bindings,
};
pub use cell_ref::{CellAddress, CellRef, RangeOrigin, RangeRef, quote_sheet};
pub use compile::{CacheStats, CompiledUnit, DynamicCompiler, Fingerprint, TableData, UnitCache};
pub use deps::extract_dependencies;
pub use eval::{EngineLimits, create_host_engine, create_snippet_engine, eval_host_formula};
pub use extract::{
    EmbeddedExpression, extract, has_backtick_marker, is_embedded_expression_formula,
};
pub use marshal::{ToHostValue, normalize_result, normalize_result_with_headers};
pub use preprocess::preprocess_script;
pub use reconstruct::{is_wrapper_formula, reconstruct, try_reconstruct};
pub use value::{ErrorCode, Value, format_number};
pub use wrapper::{
    INVOKE_FN, SYNTHETIC_PREFIX, WrapperBinding, WrapperParts, parse_wrapper, quote_source,
    synthetic_name,
};

pub use rhai::{AST, Dynamic};

/// Computed cell values of one sheet, read by the host formula built-ins.
pub type ValueGrid = Arc<DashMap<CellRef, Value>>;
