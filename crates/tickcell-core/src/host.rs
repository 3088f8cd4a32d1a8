//! The boundary between the macro pipeline and a spreadsheet host.
//!
//! A host exposes cell text, data region lookup and change notifications.
//! Writes made by the pipeline happen inside a [`NotificationGate`]
//! suppression scope so the interceptor never reacts to its own commits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tickcell_engine::engine::{CellAddress, RangeOrigin, RangeRef};

use crate::error::HostError;

/// A cell's text changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellChanged {
    pub address: CellAddress,
    pub text: String,
    /// The text was stored verbatim rather than as a formula.
    pub literal: bool,
}

pub type ChangeListener = Box<dyn Fn(&CellChanged) + Send + Sync>;

/// A host's handle to a data region.
pub type RangeHandle = RangeRef;

/// Shared suppression counter. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct NotificationGate {
    depth: Arc<AtomicUsize>,
}

impl NotificationGate {
    pub fn new() -> Self {
        NotificationGate::default()
    }

    /// Suppress until the returned guard is dropped. Scopes nest.
    pub fn suppress(&self) -> SuppressionGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        SuppressionGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

/// Ends a suppression scope on drop, including during unwinding.
#[must_use = "suppression ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SuppressionGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What the pipeline needs from a spreadsheet document.
pub trait HostDocument {
    /// Current text of a cell, formulas included with their `=`.
    fn cell_text(&self, address: &CellAddress) -> Option<String>;

    /// Replace a cell's text. With `store_as_literal` the text is kept
    /// verbatim even if it starts with `=`.
    fn set_cell_text(
        &self,
        address: &CellAddress,
        text: &str,
        store_as_literal: bool,
    ) -> Result<(), HostError>;

    /// The data region a formula in `address` runs against, sheet-qualified.
    fn resolve_range(&self, address: &CellAddress) -> Option<RangeHandle>;

    /// Header row of a data region.
    fn headers(&self, range: &RangeHandle) -> Option<Vec<String>>;

    /// Sheet and one-based position of a data region's first cell.
    fn origin(&self, range: &RangeHandle) -> Option<RangeOrigin>;

    fn subscribe(&self, listener: ChangeListener);

    fn notifications(&self) -> &NotificationGate;
}
