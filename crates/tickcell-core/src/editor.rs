//! The floating editor's side of a session.
//!
//! The editor may live on another thread; it only enqueues macros and never
//! waits for them. Failures reach the user through diagnostics.

use tickcell_engine::engine::CellAddress;
use tracing::warn;

use crate::queue::{Macro, MacroSender};

#[derive(Clone, Debug)]
pub struct EditorHandle {
    sender: MacroSender,
}

impl EditorHandle {
    pub fn new(sender: MacroSender) -> Self {
        EditorHandle { sender }
    }

    /// Submit edited source text for a cell.
    pub fn apply(&self, address: CellAddress, text: impl Into<String>) {
        self.submit(Macro::Apply {
            address,
            text: text.into(),
        });
    }

    /// Ask for a cell's wrapper to be replaced by its source text.
    pub fn unwrap_cell(&self, address: CellAddress) {
        self.submit(Macro::Unwrap { address });
    }

    fn submit(&self, job: Macro) {
        let address = job.address().clone();
        if !self.sender.send(job) {
            warn!(cell = %address, "session closed, edit dropped");
        }
    }
}
