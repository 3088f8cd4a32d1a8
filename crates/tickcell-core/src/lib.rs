//! tickcell-core - change interception, macro queue and an in-memory workbook host.

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod editor;
pub mod error;
pub mod host;
pub mod interceptor;
pub mod queue;
pub mod session;
pub mod storage;

pub use config::Settings;
pub use diagnostics::{Diagnostic, Diagnostics, Stage};
pub use document::{CellContent, CellEntry, Workbook};
pub use editor::EditorHandle;
pub use error::{CoreError, HostError, PipelineError, Result};
pub use host::{
    CellChanged, ChangeListener, HostDocument, NotificationGate, RangeHandle, SuppressionGuard,
};
pub use interceptor::ChangeInterceptor;
pub use queue::{Macro, MacroQueue, MacroSender};
pub use session::{RunReport, RunState, Session};
