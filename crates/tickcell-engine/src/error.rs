//! Error types for the tickcell engine.

use rhai::{EvalAltResult, ParseError, ParseErrorType};
use thiserror::Error;

use crate::engine::ErrorCode;

/// The formula's backtick spans are structurally malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("not a formula (missing leading '=')")]
    NotAFormula,

    #[error("formula contains no embedded expressions")]
    NoExpressions,

    #[error("unbalanced backtick at offset {offset}")]
    Unbalanced { offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("embedded expression #{index} is empty")]
    EmptyExpression { index: usize },

    #[error("reserved identifier prefix at offset {offset}")]
    ReservedIdentifier { offset: usize },
}

/// A free identifier in a snippet did not match any header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unresolved identifier `{name}`: no matching header")]
pub struct BindingError {
    pub name: String,
}

/// A snippet could not be turned into an executable unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        let position = err.1;
        match *err.0 {
            ParseErrorType::VariableUndefined(name) => CompileError::Binding(BindingError { name }),
            other => CompileError::Syntax {
                line: position.line().unwrap_or(0),
                column: position.position().unwrap_or(0),
                message: other.to_string(),
            },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("expected {expected} compiled units, got {found}")]
    UnitCountMismatch { expected: usize, found: usize },
}

/// Text looked like a wrapper formula but could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("not a wrapper formula")]
    NotAWrapper,

    #[error("corrupt wrapper formula at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },
}

impl ReconstructionError {
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        ReconstructionError::Corrupt {
            offset,
            reason: reason.into(),
        }
    }
}

/// A compiled unit (or the host formula around it) faulted while being evaluated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("evaluation failed at line {line}: {message}")]
    Script { line: usize, message: String },

    #[error("operation limit exceeded")]
    OperationLimit,

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("invalid invocation: {0}")]
    Invocation(String),
}

impl RuntimeError {
    /// The host error value this failure is displayed as.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RuntimeError::Compile(CompileError::Binding(_)) => ErrorCode::Name,
            RuntimeError::Compile(CompileError::Syntax { .. }) => ErrorCode::Name,
            RuntimeError::OperationLimit => ErrorCode::Calc,
            RuntimeError::Invocation(_) => ErrorCode::Ref,
            RuntimeError::Script { .. } => ErrorCode::Value,
        }
    }
}

impl From<Box<EvalAltResult>> for RuntimeError {
    fn from(err: Box<EvalAltResult>) -> Self {
        match *err {
            EvalAltResult::ErrorTooManyOperations(_) => RuntimeError::OperationLimit,
            other => RuntimeError::Script {
                line: other.position().line().unwrap_or(0),
                message: other.to_string(),
            },
        }
    }
}
