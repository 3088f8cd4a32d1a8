use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use tickcell_engine::engine::{CellRef, DynamicCompiler, EngineLimits, UnitCache, ValueGrid};

use crate::host::{ChangeListener, NotificationGate};

pub const DEFAULT_SHEET: &str = "Sheet1";

/// What a cell holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellContent {
    /// Stored verbatim, even when it starts with `=`.
    Literal(String),
    /// Host formula text, leading `=` included.
    Formula(String),
}

impl CellContent {
    /// Interpret typed input: text starting with `=` is a formula.
    pub fn from_input(input: &str) -> CellContent {
        if input.starts_with('=') {
            CellContent::Formula(input.to_string())
        } else {
            CellContent::Literal(input.to_string())
        }
    }

    pub fn text(&self) -> &str {
        match self {
            CellContent::Literal(text) | CellContent::Formula(text) => text,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellContent::Formula(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellEntry {
    pub content: CellContent,
    pub wrap_text: bool,
}

pub type Grid = Arc<DashMap<CellRef, CellEntry>>;

/// One sheet: stored cells plus the values computed from them.
#[derive(Clone)]
pub struct Sheet {
    pub name: String,
    pub grid: Grid,
    pub values: ValueGrid,
}

impl Sheet {
    fn new(name: &str) -> Self {
        Sheet {
            name: name.to_string(),
            grid: Arc::new(DashMap::new()),
            values: Arc::new(DashMap::new()),
        }
    }
}

/// In-memory spreadsheet implementing [`crate::HostDocument`].
///
/// All methods take `&self`: grids are `DashMap`s and the sheet list sits
/// behind a lock, so a workbook can be shared through an `Arc`.
pub struct Workbook {
    pub(crate) sheets: RwLock<Vec<Sheet>>,
    pub(crate) listeners: RwLock<Vec<ChangeListener>>,
    pub(crate) gate: NotificationGate,
    pub(crate) compiler: Arc<DynamicCompiler>,
    pub(crate) limits: EngineLimits,
}

impl Workbook {
    /// A workbook with one empty sheet, evaluating snippets through `compiler`.
    pub fn new(compiler: Arc<DynamicCompiler>, limits: EngineLimits) -> Self {
        Workbook {
            sheets: RwLock::new(vec![Sheet::new(DEFAULT_SHEET)]),
            listeners: RwLock::new(Vec::new()),
            gate: NotificationGate::new(),
            compiler,
            limits,
        }
    }

    pub fn compiler(&self) -> &Arc<DynamicCompiler> {
        &self.compiler
    }

    pub fn sheet(&self, name: &str) -> Option<Sheet> {
        read(&self.sheets).iter().find(|s| s.name == name).cloned()
    }

    /// Add a sheet, or return the existing one with that name.
    pub fn add_sheet(&self, name: &str) -> Sheet {
        let mut sheets = write(&self.sheets);
        if let Some(existing) = sheets.iter().find(|s| s.name == name) {
            return existing.clone();
        }
        let sheet = Sheet::new(name);
        sheets.push(sheet.clone());
        sheet
    }

    pub(crate) fn all_sheets(&self) -> Vec<Sheet> {
        read(&self.sheets).clone()
    }
}

impl Default for Workbook {
    fn default() -> Self {
        let limits = EngineLimits::default();
        let compiler = DynamicCompiler::new(Arc::new(UnitCache::default()), limits);
        Workbook::new(Arc::new(compiler), limits)
    }
}

// A panicking listener must not take the whole workbook down with it.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
