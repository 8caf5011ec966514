//! Acquire/release bookkeeping for reference backend handles.

use std::cell::RefCell;
use std::rc::Rc;

/// Kinds of handle the reference backend hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Context,
    Queue,
    Program,
    Kernel,
    Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEvent {
    Acquired { kind: ResourceKind, id: u64 },
    Released { kind: ResourceKind, id: u64 },
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    events: Vec<LedgerEvent>,
}

/// Shared, append-only record of every handle created and released.
///
/// Cloning yields another view of the same record.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    state: Rc<RefCell<LedgerState>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn acquire(&self, kind: ResourceKind) -> Tracked {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.events.push(LedgerEvent::Acquired { kind, id });
        Tracked { kind, id, ledger: self.clone() }
    }

    fn release(&self, kind: ResourceKind, id: u64) {
        self.state.borrow_mut().events.push(LedgerEvent::Released { kind, id });
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state.borrow().events.clone()
    }

    /// Kinds in acquisition order.
    pub fn acquired(&self) -> Vec<ResourceKind> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEvent::Acquired { kind, .. } => Some(kind),
                LedgerEvent::Released { .. } => None,
            })
            .collect()
    }

    /// Kinds in release order.
    pub fn released(&self) -> Vec<ResourceKind> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEvent::Released { kind, .. } => Some(kind),
                LedgerEvent::Acquired { .. } => None,
            })
            .collect()
    }

    /// Handles acquired but not yet released.
    pub fn outstanding(&self) -> usize {
        self.events().iter().fold(0usize, |n, e| match e {
            LedgerEvent::Acquired { .. } => n + 1,
            LedgerEvent::Released { .. } => n.saturating_sub(1),
        })
    }

    /// How many times the handle `id` was released.
    pub fn release_count(&self, id: u64) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, LedgerEvent::Released { id: r, .. } if *r == id))
            .count()
    }

    /// Ids of every handle ever acquired.
    pub fn acquired_ids(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEvent::Acquired { id, .. } => Some(id),
                LedgerEvent::Released { .. } => None,
            })
            .collect()
    }
}

/// Releases its ledger entry on drop.
#[derive(Debug)]
pub(crate) struct Tracked {
    kind: ResourceKind,
    id: u64,
    ledger: Ledger,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.ledger.release(self.kind, self.id);
    }
}
