use crate::{EntryId, TreeId};

/// Notifications published by the manager
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    EntryStarted {
        entry_id: EntryId,
        tree: TreeId,
        action: String,
    },
    EntryCompleted {
        entry_id: EntryId,
        index: usize,
    },
    EntryDiscarded {
        entry_id: EntryId,
    },
    Navigated {
        from: usize,
        to: usize,
    },
}

impl HistoryEvent {
    pub fn entry_id(&self) -> Option<&EntryId> {
        match self {
            HistoryEvent::EntryStarted { entry_id, .. }
            | HistoryEvent::EntryCompleted { entry_id, .. }
            | HistoryEvent::EntryDiscarded { entry_id } => Some(entry_id),
            HistoryEvent::Navigated { .. } => None,
        }
    }
}
