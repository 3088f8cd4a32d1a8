//! Computing cell values on demand.
//!
//! Values are cached in each sheet's `ValueGrid` until the next write. A
//! wrapper formula runs each `SNIPPET` binding through the shared compiler,
//! then evaluates its body as a host formula with the bindings in scope.

use tickcell_engine::engine::{
    CellAddress, CellRef, ErrorCode, RangeOrigin, RangeRef, TableData, Value, create_host_engine,
    eval_host_formula, extract_dependencies, is_wrapper_formula, normalize_result, parse_wrapper,
};
use tracing::{debug, warn};

use super::cycle::detect_cycle;
use super::state::{CellContent, Workbook};

impl Workbook {
    /// Computed value of a cell.
    pub fn value(&self, address: &CellAddress) -> Value {
        self.evaluate(address, false)
    }

    /// Compute every formula cell of every sheet.
    pub fn recalculate(&self) {
        for sheet in self.all_sheets() {
            let formulas: Vec<CellRef> = sheet
                .grid
                .iter()
                .filter(|e| e.value().content.is_formula())
                .map(|e| e.key().clone())
                .collect();
            for cell in formulas {
                self.evaluate(&CellAddress::new(sheet.name.clone(), cell), false);
            }
        }
    }

    /// `acyclic` is set once the caller has already checked the cells
    /// reachable from `address`.
    fn evaluate(&self, address: &CellAddress, acyclic: bool) -> Value {
        let Some(sheet) = self.sheet(&address.sheet) else {
            return Value::Error(ErrorCode::Ref);
        };
        if let Some(value) = sheet.values.get(&address.cell) {
            return value.clone();
        }

        let content = sheet.grid.get(&address.cell).map(|e| e.content.clone());
        let value = match content {
            None => return Value::Empty,
            Some(CellContent::Literal(text)) => Value::from_literal(&text),
            Some(CellContent::Formula(text)) => {
                if !acyclic
                    && let Some(path) = detect_cycle(address, |a| self.formula_dependencies(a))
                {
                    warn!(
                        cell = %address,
                        cycle = ?path.iter().map(|a| a.cell.to_string()).collect::<Vec<_>>(),
                        "circular dependency"
                    );
                    Value::Error(ErrorCode::Ref)
                } else if is_wrapper_formula(&text) {
                    self.evaluate_wrapper(address, &text)
                } else {
                    self.evaluate_host(address, &text[1..], &[])
                }
            }
        };

        sheet.values.insert(address.cell.clone(), value.clone());
        value
    }

    fn evaluate_wrapper(&self, address: &CellAddress, text: &str) -> Value {
        let parts = match parse_wrapper(text) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(cell = %address, error = %err, "unreadable wrapper formula");
                return Value::Error(ErrorCode::Name);
            }
        };

        let mut locals = Vec::with_capacity(parts.bindings.len());
        for binding in &parts.bindings {
            let data = match &binding.range {
                Some(range) => self.read_table(address, range),
                None => TableData::default(),
            };
            match self.compiler.run(&binding.source, &data) {
                Ok(value) if value.is_error() => return value,
                Ok(value) => locals.push((binding.name.clone(), value)),
                Err(err) => {
                    warn!(cell = %address, binding = %binding.name, error = %err, "snippet failed");
                    return Value::Error(err.error_code());
                }
            }
        }
        debug!(cell = %address, bindings = locals.len(), "evaluated snippet bindings");

        // A bare reference keeps the binding's value as is, arrays included.
        if let Some(index) = parts.sole_reference() {
            return locals.swap_remove(index).1;
        }
        self.evaluate_host(address, &parts.body, &locals)
    }

    fn evaluate_host(&self, address: &CellAddress, body: &str, locals: &[(String, Value)]) -> Value {
        for dep in extract_dependencies(body) {
            self.evaluate(&CellAddress::new(address.sheet.clone(), dep), true);
        }
        let Some(sheet) = self.sheet(&address.sheet) else {
            return Value::Error(ErrorCode::Ref);
        };
        let engine = create_host_engine(sheet.values.clone(), self.limits);
        match eval_host_formula(&engine, body, locals) {
            Ok(raw) => normalize_result(raw),
            Err(err) => {
                warn!(cell = %address, error = %err, "formula failed");
                Value::Error(err.error_code())
            }
        }
    }

    /// Values of a data region. The formula's own cell reads as empty.
    fn read_table(&self, address: &CellAddress, range: &RangeRef) -> TableData {
        let sheet = range.sheet.clone().unwrap_or_else(|| address.sheet.clone());
        let block = (range.start.row..=range.end.row)
            .map(|row| {
                (range.start.col..=range.end.col)
                    .map(|col| {
                        let cell = CellAddress::new(sheet.clone(), CellRef::new(col, row));
                        if &cell == address {
                            Value::Empty
                        } else {
                            self.evaluate(&cell, true)
                        }
                    })
                    .collect()
            })
            .collect();
        TableData::from_block(block, Some(RangeOrigin::of(sheet, range)))
    }

    /// Formula cells a formula cell reads.
    fn formula_dependencies(&self, address: &CellAddress) -> Vec<CellAddress> {
        let Some(sheet) = self.sheet(&address.sheet) else {
            return Vec::new();
        };
        let text = match sheet.grid.get(&address.cell).map(|e| e.content.clone()) {
            Some(CellContent::Formula(text)) => text,
            _ => return Vec::new(),
        };

        let mut deps: Vec<CellAddress> = Vec::new();
        let body = match parse_wrapper(&text) {
            Ok(parts) => {
                for range in parts.bindings.iter().filter_map(|b| b.range.as_ref()) {
                    let range_sheet = range.sheet.clone().unwrap_or_else(|| address.sheet.clone());
                    for row in range.start.row..=range.end.row {
                        for col in range.start.col..=range.end.col {
                            let cell = CellAddress::new(range_sheet.clone(), CellRef::new(col, row));
                            if &cell != address {
                                deps.push(cell);
                            }
                        }
                    }
                }
                parts.body
            }
            Err(_) => text[1..].to_string(),
        };
        deps.extend(
            extract_dependencies(&body)
                .into_iter()
                .map(|cell| CellAddress::new(address.sheet.clone(), cell)),
        );

        deps.retain(|dep| {
            self.sheet(&dep.sheet).is_some_and(|s| {
                s.grid.get(&dep.cell).is_some_and(|e| e.content.is_formula())
            })
        });
        deps
    }
}
