//! tickcell-engine - backtick snippet extraction, Rhai compilation, wrapper formulas.

pub mod builtins;
pub mod engine;
pub mod error;

pub use error::{
    AssembleError, BindingError, CompileError, ExtractionError, ReconstructionError, RuntimeError,
};
