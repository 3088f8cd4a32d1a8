//! A document session: the macro queue, its interceptor and the pipeline runs.
//!
//! Each run moves through `Received -> Scheduled -> Running` and ends as
//! `Committed`, `Rejected` or `Superseded`. Only `run_pending` touches the
//! document, on the thread that owns the session.

use std::sync::Arc;

use tickcell_engine::engine::{
    BindingContext, CellAddress, DynamicCompiler, SourceFormula, WrapperFormula, assemble, extract,
    reconstruct, try_reconstruct,
};
use tickcell_engine::ExtractionError;
use tracing::debug;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::document::Workbook;
use crate::editor::EditorHandle;
use crate::error::{HostError, PipelineError};
use crate::host::HostDocument;
use crate::interceptor::ChangeInterceptor;
use crate::queue::{Macro, MacroQueue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    Received,
    Scheduled,
    Running,
    Committed,
    Rejected,
    /// The cell changed again before the run started.
    Superseded,
}

/// Outcome of one macro run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub address: CellAddress,
    pub state: RunState,
    /// What was written to the cell, when the run committed.
    pub written: Option<String>,
    pub error: Option<PipelineError>,
}

impl RunReport {
    fn committed(address: CellAddress, written: String) -> Self {
        RunReport {
            address,
            state: RunState::Committed,
            written: Some(written),
            error: None,
        }
    }

    fn rejected(address: CellAddress, error: PipelineError) -> Self {
        RunReport {
            address,
            state: RunState::Rejected,
            written: None,
            error: Some(error),
        }
    }

    fn superseded(address: CellAddress) -> Self {
        RunReport {
            address,
            state: RunState::Superseded,
            written: None,
            error: None,
        }
    }
}

pub struct Session<H: HostDocument> {
    host: Arc<H>,
    compiler: Arc<DynamicCompiler>,
    queue: MacroQueue,
    diagnostics: Diagnostics,
}

impl Session<Workbook> {
    /// A session over a workbook, sharing the workbook's compiler and cache.
    pub fn for_workbook(workbook: Arc<Workbook>, diagnostics: Diagnostics) -> Self {
        let compiler = Arc::clone(workbook.compiler());
        Session::new(workbook, compiler, diagnostics)
    }
}

impl<H: HostDocument> Session<H> {
    /// Start a session and subscribe its interceptor to `host`.
    pub fn new(host: Arc<H>, compiler: Arc<DynamicCompiler>, diagnostics: Diagnostics) -> Self {
        let queue = MacroQueue::new();
        ChangeInterceptor::new(queue.sender(), host.notifications().clone()).install(host.as_ref());
        Session {
            host,
            compiler,
            queue,
            diagnostics,
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn compiler(&self) -> &Arc<DynamicCompiler> {
        &self.compiler
    }

    pub fn editor(&self) -> EditorHandle {
        EditorHandle::new(self.queue.sender())
    }

    /// Run every queued macro, oldest first.
    pub fn run_pending(&self) -> Vec<RunReport> {
        let mut reports = Vec::new();
        while let Some(job) = self.queue.try_next() {
            reports.push(self.run(job));
        }
        reports
    }

    fn run(&self, job: Macro) -> RunReport {
        debug!(cell = %job.address(), state = ?RunState::Running, "macro started");
        let report = match job {
            Macro::Transform { address, text } => {
                if self.host.cell_text(&address).as_deref() != Some(text.as_str()) {
                    RunReport::superseded(address)
                } else {
                    self.compile_and_commit(address, &text)
                }
            }
            Macro::Apply { address, text } => match extract(&text) {
                // Nothing to compile: a plain value or host formula.
                Err(ExtractionError::NotAFormula | ExtractionError::NoExpressions) => {
                    match self.commit(&address, &text, false) {
                        Ok(()) => RunReport::committed(address, text),
                        Err(err) => self.reject(address, err.into()),
                    }
                }
                _ => self.compile_and_commit(address, &text),
            },
            Macro::Unwrap { address } => self.unwrap_cell(address),
        };
        debug!(cell = %report.address, state = ?report.state, "macro finished");
        report
    }

    /// Extract, compile and assemble without touching the document.
    pub fn transform(
        &self,
        address: &CellAddress,
        text: &str,
    ) -> Result<WrapperFormula, PipelineError> {
        let expressions = extract(text)?;

        let mut source = SourceFormula::new(text, address.clone());
        if let Some(range) = self.host.resolve_range(address) {
            let headers = self.host.headers(&range).unwrap_or_default();
            let origin = self.host.origin(&range);
            source = source.with_region(range, BindingContext::new(headers, origin));
        }

        let units = expressions
            .iter()
            .map(|expr| {
                self.compiler
                    .compile(&expr.source, &source.context)
                    .map_err(|err| PipelineError::Compile {
                        index: expr.index,
                        source: err,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(assemble(&source, &units)?)
    }

    /// Text to show in the editor: the original formula for a wrapper,
    /// otherwise the raw cell text.
    pub fn edit_text(&self, address: &CellAddress) -> Option<String> {
        let text = self.host.cell_text(address)?;
        Some(try_reconstruct(&text).unwrap_or(text))
    }

    fn compile_and_commit(&self, address: CellAddress, text: &str) -> RunReport {
        let wrapper = match self.transform(&address, text) {
            Ok(wrapper) => wrapper,
            // A backtick inside a host string is not an embedded expression;
            // the formula stays as typed.
            Err(err @ PipelineError::Extraction(ExtractionError::NoExpressions)) => {
                return RunReport::rejected(address, err);
            }
            Err(err) => return self.reject(address, err),
        };
        match self.commit(&address, &wrapper.text, false) {
            Ok(()) => RunReport::committed(address, wrapper.text),
            Err(err) => self.reject(address, err.into()),
        }
    }

    /// Replace a wrapper with the formula it was built from, stored as a
    /// literal so it is not transformed again.
    fn unwrap_cell(&self, address: CellAddress) -> RunReport {
        let text = self.host.cell_text(&address).unwrap_or_default();
        match reconstruct(&text) {
            Ok(original) => match self.commit(&address, &original, true) {
                Ok(()) => RunReport::committed(address, original),
                Err(err) => self.reject(address, err.into()),
            },
            Err(err) => self.reject(address, err.into()),
        }
    }

    fn commit(&self, address: &CellAddress, text: &str, literal: bool) -> Result<(), HostError> {
        let _guard = self.host.notifications().suppress();
        self.host.set_cell_text(address, text, literal)
    }

    fn reject(&self, address: CellAddress, err: PipelineError) -> RunReport {
        self.diagnostics.emit(Diagnostic {
            address: address.clone(),
            stage: err.stage(),
            message: err.to_string(),
        });
        RunReport::rejected(address, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Stage;
    use tickcell_engine::engine::{CellRef, Value};
    use tickcell_engine::{BindingError, CompileError, ExtractionError, ReconstructionError};

    fn addr(cell: &str) -> CellAddress {
        CellAddress::new("Sheet1", CellRef::from_str(cell).unwrap())
    }

    fn sales() -> Arc<Workbook> {
        let wb = Workbook::default();
        for (cell, text) in [
            ("A1", "Region"),
            ("B1", "Revenue"),
            ("A2", "East"),
            ("B2", "100"),
            ("A3", "West"),
            ("B3", "250"),
            ("A4", "North"),
            ("B4", "50"),
        ] {
            wb.set_cell_text(&addr(cell), text, true).unwrap();
        }
        Arc::new(wb)
    }

    const WRAPPED: &str = r#"=LET(_snip0, SNIPPET("sum(Revenue)", A1:B4), _snip0)"#;

    #[test]
    fn test_typed_formula_is_transformed() {
        let wb = sales();
        let session = Session::for_workbook(Arc::clone(&wb), Diagnostics::log_only());

        wb.set_cell_from_input(&addr("D1"), "=`sum(Revenue)`").unwrap();
        // Nothing happens inside the notification.
        assert_eq!(wb.cell_text(&addr("D1")).as_deref(), Some("=`sum(Revenue)`"));

        let reports = session.run_pending();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state, RunState::Committed);
        assert_eq!(wb.cell_text(&addr("D1")).as_deref(), Some(WRAPPED));
        assert_eq!(wb.value(&addr("D1")), Value::Number(400.0));
    }

    #[test]
    fn test_commit_does_not_reschedule() {
        let wb = sales();
        let session = Session::for_workbook(Arc::clone(&wb), Diagnostics::log_only());
        wb.set_cell_from_input(&addr("D1"), "=`sum(Revenue)`").unwrap();
        session.run_pending();
        assert!(session.run_pending().is_empty());
        assert!(!wb.notifications().is_suppressed());
    }

    #[test]
    fn test_rapid_edits_supersede() {
        let wb = sales();
        let session = Session::for_workbook(Arc::clone(&wb), Diagnostics::log_only());
        wb.set_cell_from_input(&addr("D1"), "=`sum(Revenue)`").unwrap();
        wb.set_cell_from_input(&addr("D1"), "=`count(Region)`").unwrap();

        let states: Vec<_> = session.run_pending().iter().map(|r| r.state).collect();
        assert_eq!(states, vec![RunState::Superseded, RunState::Committed]);
        assert_eq!(
            wb.cell_text(&addr("D1")).as_deref(),
            Some(r#"=LET(_snip0, SNIPPET("count(Region)", A1:B4), _snip0)"#)
        );
        assert_eq!(wb.value(&addr("D1")), Value::Number(3.0));
    }

    #[test]
    fn test_binding_failure_leaves_cell_untouched() {
        let wb = sales();
        let (diagnostics, receiver) = Diagnostics::channel();
        let session = Session::for_workbook(Arc::clone(&wb), diagnostics);

        wb.set_cell_from_input(&addr("D1"), "=`sum(Revnue)`").unwrap();
        let reports = session.run_pending();
        assert_eq!(reports[0].state, RunState::Rejected);
        assert_eq!(
            reports[0].error,
            Some(PipelineError::Compile {
                index: 0,
                source: CompileError::Binding(BindingError {
                    name: "Revnue".into()
                }),
            })
        );
        assert_eq!(wb.cell_text(&addr("D1")).as_deref(), Some("=`sum(Revnue)`"));

        let diagnostic = receiver.try_recv().unwrap();
        assert_eq!(diagnostic.stage, Stage::Compilation);
        assert_eq!(diagnostic.address, addr("D1"));
        assert!(session.compiler().cache().is_empty());
    }

    #[test]
    fn test_unbalanced_backticks_rejected() {
        let wb = sales();
        let (diagnostics, receiver) = Diagnostics::channel();
        let session = Session::for_workbook(Arc::clone(&wb), diagnostics);

        wb.set_cell_from_input(&addr("D1"), "=`sum(Revenue)` + `1").unwrap();
        let reports = session.run_pending();
        assert_eq!(
            reports[0].error,
            Some(PipelineError::Extraction(ExtractionError::Unbalanced {
                offset: 18
            }))
        );
        assert_eq!(receiver.try_recv().unwrap().stage, Stage::Extraction);
        assert_eq!(
            wb.cell_text(&addr("D1")).as_deref(),
            Some("=`sum(Revenue)` + `1")
        );
    }

    #[test]
    fn test_unwrap_writes_literal() {
        let wb = sales();
        let session = Session::for_workbook(Arc::clone(&wb), Diagnostics::log_only());
        wb.set_cell_from_input(&addr("D1"), "=`sum(Revenue)`").unwrap();
        session.run_pending();

        assert_eq!(session.edit_text(&addr("D1")).as_deref(), Some("=`sum(Revenue)`"));
        session.editor().unwrap_cell(addr("D1"));
        let reports = session.run_pending();
        assert_eq!(reports[0].state, RunState::Committed);

        let entry = wb.cell_entry(&addr("D1")).unwrap();
        assert!(!entry.content.is_formula());
        assert_eq!(entry.content.text(), "=`sum(Revenue)`");
        assert!(session.run_pending().is_empty());
    }

    #[test]
    fn test_unwrap_corrupt_wrapper_keeps_text() {
        let wb = sales();
        let (diagnostics, receiver) = Diagnostics::channel();
        let session = Session::for_workbook(Arc::clone(&wb), diagnostics);
        let corrupt = r#"=LET(_snip0, SNIPPET("sum(Revenue)", A1:B4), _snip0 + _snip1)"#;
        wb.set_cell_from_input(&addr("D1"), corrupt).unwrap();

        session.editor().unwrap_cell(addr("D1"));
        let reports = session.run_pending();
        assert_eq!(reports[0].state, RunState::Rejected);
        assert!(matches!(
            reports[0].error,
            Some(PipelineError::Reconstruction(ReconstructionError::Corrupt { .. }))
        ));
        assert_eq!(receiver.try_recv().unwrap().stage, Stage::Reconstruction);
        assert_eq!(wb.cell_text(&addr("D1")).as_deref(), Some(corrupt));
        assert_eq!(session.edit_text(&addr("D1")).as_deref(), Some(corrupt));
    }

    #[test]
    fn test_editor_apply_from_other_thread() {
        let wb = sales();
        let session = Session::for_workbook(Arc::clone(&wb), Diagnostics::log_only());
        let editor = session.editor();

        std::thread::spawn(move || editor.apply(addr("D2"), "=`max(Revenue)` + 1"))
            .join()
            .unwrap();
        let reports = session.run_pending();
        assert_eq!(reports[0].state, RunState::Committed);
        assert_eq!(
            wb.cell_text(&addr("D2")).as_deref(),
            Some(r#"=LET(_snip0, SNIPPET("max(Revenue)", A1:B4), _snip0 + 1)"#)
        );
        assert_eq!(wb.value(&addr("D2")), Value::Number(251.0));
    }

    #[test]
    fn test_apply_plain_formula() {
        let wb = sales();
        let session = Session::for_workbook(Arc::clone(&wb), Diagnostics::log_only());
        session.editor().apply(addr("D1"), "=SUM(B2:B4)");
        assert_eq!(session.run_pending()[0].state, RunState::Committed);
        assert_eq!(wb.value(&addr("D1")), Value::Number(400.0));
    }

    #[test]
    fn test_reapply_hits_cache() {
        let wb = sales();
        let session = Session::for_workbook(Arc::clone(&wb), Diagnostics::log_only());
        wb.set_cell_from_input(&addr("D1"), "=`sum(Revenue)`").unwrap();
        session.run_pending();
        wb.value(&addr("D1"));
        let before = session.compiler().cache().stats();

        session.editor().unwrap_cell(addr("D1"));
        session.run_pending();
        let source = session.edit_text(&addr("D1")).unwrap();
        session.editor().apply(addr("D1"), source);
        session.run_pending();
        assert_eq!(wb.value(&addr("D1")), Value::Number(400.0));

        let after = session.compiler().cache().stats();
        assert_eq!(after.compilations, before.compilations);
        assert!(after.hits > before.hits);
    }

    #[test]
    fn test_apply_backtick_in_host_string_is_plain_write() {
        let wb = sales();
        let (diagnostics, receiver) = Diagnostics::channel();
        let session = Session::for_workbook(Arc::clone(&wb), diagnostics);
        let text = "=\"it`s \" + \"here\"";

        session.editor().apply(addr("C1"), text);
        let reports = session.run_pending();
        assert_eq!(reports[0].state, RunState::Committed);
        assert_eq!(reports[0].written.as_deref(), Some(text));
        let entry = wb.cell_entry(&addr("C1")).unwrap();
        assert!(entry.content.is_formula());
        assert_eq!(entry.content.text(), text);
        assert!(receiver.try_recv().is_err());
        assert!(session.run_pending().is_empty());
    }

    #[test]
    fn test_typed_backtick_in_host_string_is_left_alone() {
        let wb = sales();
        let (diagnostics, receiver) = Diagnostics::channel();
        let session = Session::for_workbook(Arc::clone(&wb), diagnostics);

        wb.set_cell_from_input(&addr("C1"), "=\"it`s\"").unwrap();
        let reports = session.run_pending();
        assert_eq!(reports[0].state, RunState::Rejected);
        assert_eq!(
            reports[0].error,
            Some(PipelineError::Extraction(ExtractionError::NoExpressions))
        );
        assert!(receiver.try_recv().is_err());
        assert_eq!(wb.cell_text(&addr("C1")).as_deref(), Some("=\"it`s\""));
    }
}
