//! User-visible reports of failed macro runs.
//!
//! Every diagnostic is logged with `warn!`; a session can also forward them
//! to a channel so a front end can show them next to the cell.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use tickcell_engine::engine::CellAddress;
use tracing::warn;

/// Pipeline step a diagnostic came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Compilation,
    Assembly,
    Reconstruction,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extraction => "extraction",
            Stage::Compilation => "compilation",
            Stage::Assembly => "assembly",
            Stage::Reconstruction => "reconstruction",
            Stage::Commit => "commit",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub address: CellAddress,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.address, self.stage, self.message)
    }
}

/// Where diagnostics go besides the log.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    sender: Option<Sender<Diagnostic>>,
}

impl Diagnostics {
    /// Log only.
    pub fn log_only() -> Self {
        Diagnostics::default()
    }

    /// Log and forward to the returned receiver.
    pub fn channel() -> (Self, Receiver<Diagnostic>) {
        let (sender, receiver) = mpsc::channel();
        (
            Diagnostics {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        warn!(
            cell = %diagnostic.address,
            stage = %diagnostic.stage,
            "{}",
            diagnostic.message
        );
        if let Some(sender) = &self.sender {
            // A dropped receiver just means nobody is listening any more.
            let _ = sender.send(diagnostic);
        }
    }
}
