//! Error types for tickcell core.

use thiserror::Error;

use tickcell_engine::{AssembleError, CompileError, ExtractionError, ReconstructionError};

use crate::diagnostics::Stage;

/// A host document refused a read or write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("unknown sheet '{0}'")]
    UnknownSheet(String),
}

/// Why a formula could not be transformed or restored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("embedded expression #{index}: {source}")]
    Compile {
        index: usize,
        #[source]
        source: CompileError,
    },

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl PipelineError {
    /// Which step of the pipeline failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Extraction(_) => Stage::Extraction,
            PipelineError::Compile { .. } => Stage::Compilation,
            PipelineError::Assemble(_) => Stage::Assembly,
            PipelineError::Reconstruction(_) => Stage::Reconstruction,
            PipelineError::Host(_) => Stage::Commit,
        }
    }
}

/// Errors that can occur outside the macro pipeline.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV file is empty")]
    EmptyCsv,

    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
