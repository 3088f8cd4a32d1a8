//! Error types for the tickcell command line

use thiserror::Error;

/// Errors in the command line arguments
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CliError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("Nothing to do: pass --formula or --reconstruct")]
    NothingToDo,
}
