//! Deferred macro runs.
//!
//! Change handlers only enqueue; the session drains the queue afterwards, so
//! a cell is never rewritten from inside the notification that reported it.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use tickcell_engine::engine::CellAddress;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Macro {
    /// A formula with embedded expressions was typed into a cell.
    Transform { address: CellAddress, text: String },
    /// The editor submitted new source text for a cell.
    Apply { address: CellAddress, text: String },
    /// Replace a wrapper with its original text, stored as a literal.
    Unwrap { address: CellAddress },
}

impl Macro {
    pub fn address(&self) -> &CellAddress {
        match self {
            Macro::Transform { address, .. }
            | Macro::Apply { address, .. }
            | Macro::Unwrap { address } => address,
        }
    }
}

/// Cloneable, thread-safe producer end of a [`MacroQueue`].
#[derive(Clone, Debug)]
pub struct MacroSender(Sender<Macro>);

impl MacroSender {
    /// Enqueue a run. Returns false once the queue is gone.
    pub fn send(&self, job: Macro) -> bool {
        self.0.send(job).is_ok()
    }
}

#[derive(Debug)]
pub struct MacroQueue {
    sender: Sender<Macro>,
    receiver: Receiver<Macro>,
}

impl Default for MacroQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        MacroQueue { sender, receiver }
    }

    pub fn sender(&self) -> MacroSender {
        MacroSender(self.sender.clone())
    }

    pub fn try_next(&self) -> Option<Macro> {
        match self.receiver.try_recv() {
            Ok(job) => Some(job),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickcell_engine::engine::CellRef;

    #[test]
    fn test_fifo_order() {
        let queue = MacroQueue::new();
        let sender = queue.sender();
        let a = CellAddress::new("S", CellRef::new(0, 0));
        let b = CellAddress::new("S", CellRef::new(1, 0));
        assert!(sender.send(Macro::Unwrap { address: a.clone() }));
        assert!(sender.send(Macro::Transform {
            address: b.clone(),
            text: "=`1`".into()
        }));
        assert_eq!(queue.try_next().map(|m| m.address().clone()), Some(a));
        assert_eq!(queue.try_next().map(|m| m.address().clone()), Some(b));
        assert_eq!(queue.try_next(), None);
    }

    #[test]
    fn test_send_from_other_thread() {
        let queue = MacroQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || {
            sender.send(Macro::Unwrap {
                address: CellAddress::new("S", CellRef::new(2, 2)),
            })
        })
        .join()
        .unwrap();
        assert!(matches!(queue.try_next(), Some(Macro::Unwrap { .. })));
    }

    #[test]
    fn test_send_after_queue_dropped() {
        let queue = MacroQueue::new();
        let sender = queue.sender();
        drop(queue);
        assert!(!sender.send(Macro::Unwrap {
            address: CellAddress::new("S", CellRef::new(0, 0)),
        }));
    }
}
