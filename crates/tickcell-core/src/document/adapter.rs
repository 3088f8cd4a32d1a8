use tickcell_engine::engine::{CellAddress, RangeOrigin, RangeRef};

use super::state::Workbook;
use crate::error::HostError;
use crate::host::{ChangeListener, HostDocument, NotificationGate};

impl HostDocument for Workbook {
    fn cell_text(&self, address: &CellAddress) -> Option<String> {
        self.cell_entry(address)
            .map(|entry| entry.content.text().to_string())
    }

    fn set_cell_text(
        &self,
        address: &CellAddress,
        text: &str,
        store_as_literal: bool,
    ) -> Result<(), HostError> {
        self.write_cell(address, text, store_as_literal)
    }

    fn resolve_range(&self, address: &CellAddress) -> Option<RangeRef> {
        self.data_region(address)
    }

    fn headers(&self, range: &RangeRef) -> Option<Vec<String>> {
        let sheet = range.sheet.as_deref()?;
        self.header_row(range, sheet)
    }

    fn origin(&self, range: &RangeRef) -> Option<RangeOrigin> {
        let sheet = range.sheet.as_deref()?;
        self.sheet(sheet)?;
        Some(RangeOrigin::of(sheet, range))
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.add_listener(listener);
    }

    fn notifications(&self) -> &NotificationGate {
        &self.gate
    }
}
