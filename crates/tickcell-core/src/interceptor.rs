//! Turning host change notifications into scheduled transform runs.

use tickcell_engine::engine::{has_backtick_marker, is_wrapper_formula};
use tracing::debug;

use crate::host::{CellChanged, HostDocument, NotificationGate};
use crate::queue::{Macro, MacroSender};
use crate::session::RunState;

/// Watches a host for formulas with embedded expressions and schedules a
/// transform for each one. It never touches the document itself.
#[derive(Clone, Debug)]
pub struct ChangeInterceptor {
    sender: MacroSender,
    gate: NotificationGate,
}

impl ChangeInterceptor {
    pub fn new(sender: MacroSender, gate: NotificationGate) -> Self {
        ChangeInterceptor { sender, gate }
    }

    /// Register with the host's change stream.
    pub fn install<H: HostDocument + ?Sized>(self, host: &H) {
        host.subscribe(Box::new(move |event| {
            self.on_change(event);
        }));
    }

    /// Handle one notification; true when a run was scheduled.
    pub fn on_change(&self, event: &CellChanged) -> bool {
        debug!(cell = %event.address, state = ?RunState::Received, "cell changed");

        if self.gate.is_suppressed() {
            debug!(cell = %event.address, "ignored: notifications suppressed");
            return false;
        }
        if !is_candidate(event) {
            return false;
        }

        let scheduled = self.sender.send(Macro::Transform {
            address: event.address.clone(),
            text: event.text.clone(),
        });
        if scheduled {
            debug!(cell = %event.address, state = ?RunState::Scheduled, "transform queued");
        } else {
            debug!(cell = %event.address, "ignored: macro queue closed");
        }
        scheduled
    }
}

/// A formula someone typed that still has its backticks. Malformed spans
/// count too, so the run can report them.
fn is_candidate(event: &CellChanged) -> bool {
    !event.literal && has_backtick_marker(&event.text) && !is_wrapper_formula(&event.text)
}
