use tickcell_engine::engine::{CellAddress, CellRef, RangeRef, Value};

use super::state::{CellContent, CellEntry, Sheet, Workbook, read, write};
use crate::error::HostError;
use crate::host::CellChanged;

impl Workbook {
    /// Store typed input: text starting with `=` becomes a formula.
    pub fn set_cell_from_input(&self, address: &CellAddress, input: &str) -> Result<(), HostError> {
        self.write_cell(address, input, false)
    }

    /// Remove a cell's content.
    pub fn clear_cell(&self, address: &CellAddress) -> Result<(), HostError> {
        self.write_cell(address, "", true)
    }

    pub fn cell_entry(&self, address: &CellAddress) -> Option<CellEntry> {
        let sheet = self.sheet(&address.sheet)?;
        sheet.grid.get(&address.cell).map(|e| e.clone())
    }

    /// Turn text wrapping on or off for an existing cell.
    pub fn set_wrap_text(&self, address: &CellAddress, wrap: bool) -> Result<(), HostError> {
        let sheet = self.require_sheet(&address.sheet)?;
        if let Some(mut entry) = sheet.grid.get_mut(&address.cell) {
            entry.wrap_text = wrap;
        }
        Ok(())
    }

    /// Store `text` and notify listeners. Empty text clears the cell.
    pub(crate) fn write_cell(
        &self,
        address: &CellAddress,
        text: &str,
        literal: bool,
    ) -> Result<(), HostError> {
        let sheet = self.require_sheet(&address.sheet)?;
        if text.is_empty() {
            sheet.grid.remove(&address.cell);
        } else {
            let content = if literal {
                CellContent::Literal(text.to_string())
            } else {
                CellContent::from_input(text)
            };
            sheet.grid.insert(
                address.cell.clone(),
                CellEntry {
                    content,
                    wrap_text: false,
                },
            );
        }
        self.invalidate();
        self.notify(&CellChanged {
            address: address.clone(),
            text: text.to_string(),
            literal,
        });
        Ok(())
    }

    pub(crate) fn require_sheet(&self, name: &str) -> Result<Sheet, HostError> {
        self.sheet(name)
            .ok_or_else(|| HostError::UnknownSheet(name.to_string()))
    }

    /// Drop every computed value; they are recomputed on demand.
    pub(crate) fn invalidate(&self) {
        for sheet in read(&self.sheets).iter() {
            sheet.values.clear();
        }
    }

    fn notify(&self, event: &CellChanged) {
        for listener in read(&self.listeners).iter() {
            listener(event);
        }
    }

    pub(crate) fn add_listener(&self, listener: crate::host::ChangeListener) {
        write(&self.listeners).push(listener);
    }

    /// Bounding box of the sheet's data cells, ignoring `address` itself.
    /// Formulas, and literals that look like formulas, are not data.
    pub fn data_region(&self, address: &CellAddress) -> Option<RangeRef> {
        self.data_bounds(&address.sheet, Some(&address.cell))
    }

    /// Bounding box of all data cells of a sheet.
    pub fn used_range(&self, sheet: &str) -> Option<RangeRef> {
        self.data_bounds(sheet, None)
    }

    fn data_bounds(&self, sheet: &str, skip: Option<&CellRef>) -> Option<RangeRef> {
        let sheet = self.sheet(sheet)?;
        let mut bounds: Option<(CellRef, CellRef)> = None;
        for entry in sheet.grid.iter() {
            let cell = entry.key();
            if Some(cell) == skip || !is_data(&entry.value().content) {
                continue;
            }
            bounds = Some(match bounds {
                None => (cell.clone(), cell.clone()),
                Some((min, max)) => (
                    CellRef::new(min.col.min(cell.col), min.row.min(cell.row)),
                    CellRef::new(max.col.max(cell.col), max.row.max(cell.row)),
                ),
            });
        }
        let (start, end) = bounds?;
        Some(RangeRef::new(Some(sheet.name.clone()), start, end))
    }

    /// First row of `range`, as the compiler sees header names.
    pub fn header_row(&self, range: &RangeRef, current_sheet: &str) -> Option<Vec<String>> {
        let sheet = self.sheet(range.sheet.as_deref().unwrap_or(current_sheet))?;
        let row = range.start.row;
        Some(
            (range.start.col..=range.end.col)
                .map(|col| {
                    sheet
                        .grid
                        .get(&CellRef::new(col, row))
                        .map(|e| header_text(&e.content))
                        .unwrap_or_default()
                })
                .collect(),
        )
    }
}

fn is_data(content: &CellContent) -> bool {
    match content {
        CellContent::Literal(text) => {
            let trimmed = text.trim();
            !trimmed.is_empty() && !trimmed.starts_with('=')
        }
        CellContent::Formula(_) => false,
    }
}

/// Header names go through the same literal interpretation as cell values,
/// so `1.50` and `1.5` name the same column at compile and run time.
fn header_text(content: &CellContent) -> String {
    match content {
        CellContent::Literal(text) => Value::from_literal(text).to_string().trim().to_string(),
        CellContent::Formula(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(cell: &str) -> CellAddress {
        CellAddress::new("Sheet1", CellRef::from_str(cell).unwrap())
    }

    #[test]
    fn test_set_cell_from_input() {
        let wb = Workbook::default();
        wb.set_cell_from_input(&addr("A1"), "Revenue").unwrap();
        wb.set_cell_from_input(&addr("B1"), "=A1").unwrap();
        assert_eq!(
            wb.cell_entry(&addr("A1")).unwrap().content,
            CellContent::Literal("Revenue".into())
        );
        assert!(wb.cell_entry(&addr("B1")).unwrap().content.is_formula());
    }

    #[test]
    fn test_unknown_sheet() {
        let wb = Workbook::default();
        let missing = CellAddress::new("Nope", CellRef::new(0, 0));
        assert_eq!(
            wb.set_cell_from_input(&missing, "1"),
            Err(HostError::UnknownSheet("Nope".into()))
        );
    }

    #[test]
    fn test_write_disables_wrap() {
        let wb = Workbook::default();
        wb.set_cell_from_input(&addr("A1"), "x").unwrap();
        wb.set_wrap_text(&addr("A1"), true).unwrap();
        assert!(wb.cell_entry(&addr("A1")).unwrap().wrap_text);
        wb.set_cell_from_input(&addr("A1"), "y").unwrap();
        assert!(!wb.cell_entry(&addr("A1")).unwrap().wrap_text);
    }

    #[test]
    fn test_clear_cell() {
        let wb = Workbook::default();
        wb.set_cell_from_input(&addr("A1"), "x").unwrap();
        wb.clear_cell(&addr("A1")).unwrap();
        assert!(wb.cell_entry(&addr("A1")).is_none());
    }

    #[test]
    fn test_data_region_skips_formulas_and_self() {
        let wb = Workbook::default();
        wb.set_cell_from_input(&addr("A1"), "Region").unwrap();
        wb.set_cell_from_input(&addr("B1"), "Revenue").unwrap();
        wb.set_cell_from_input(&addr("A3"), "West").unwrap();
        wb.set_cell_from_input(&addr("B3"), "250").unwrap();
        wb.set_cell_from_input(&addr("D1"), "=B3 * 2").unwrap();
        wb.write_cell(&addr("D2"), "=`x`", true).unwrap();

        let region = wb.data_region(&addr("D1")).unwrap();
        assert_eq!(region.to_string(), "Sheet1!A1:B3");
        assert_eq!(wb.data_region(&addr("A1")).unwrap().to_string(), "Sheet1!A1:B3");
        assert_eq!(wb.used_range("Sheet1").unwrap().to_string(), "Sheet1!A1:B3");
    }

    #[test]
    fn test_data_region_empty_sheet() {
        let wb = Workbook::default();
        assert_eq!(wb.data_region(&addr("A1")), None);
    }

    #[test]
    fn test_header_row() {
        let wb = Workbook::default();
        wb.set_cell_from_input(&addr("A1"), " Region ").unwrap();
        wb.set_cell_from_input(&addr("C1"), "1.50").unwrap();
        wb.set_cell_from_input(&addr("A2"), "East").unwrap();
        let region = wb.data_region(&addr("E1")).unwrap();
        assert_eq!(
            wb.header_row(&region, "Sheet1").unwrap(),
            vec!["Region".to_string(), String::new(), "1.5".to_string()]
        );
    }
}
