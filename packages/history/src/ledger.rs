//! Bookkeeping for entries that are still recording and the completed log

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use crate::{CDocument, EntryId, Exchange, HistoryEntry, HistoryError, TreeId, TreePatchRecord};

/// Lifecycle position of an entry as seen by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Unknown,
    /// Still collecting records, or complete and waiting for an earlier entry
    Recording,
    Complete,
    /// Never entered the log: pruned as empty, its tree was removed, or a
    /// cascade guard abandoned it
    Discarded,
}

/// An entry that left the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settled {
    Completed { entry_id: EntryId, index: usize },
    Discarded { entry_id: EntryId },
}

/// Entries are committed to the log in slot order. Slots are handed out as
/// entries are reserved, which happens while the initiating tree is still
/// locked, so an entry that completes early waits for every earlier entry
/// to complete (or be discarded) first.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pending: HashMap<EntryId, HistoryEntry>,
    /// Reserved entries still waiting for the log, by slot
    slots: BTreeMap<u64, EntryId>,
    /// Next slot to hand out
    issued: u64,
    /// Next slot to leave the ledger
    next_slot: u64,
    document: CDocument,
    /// (tree, shared model) pairs already cascaded, per recording entry
    cascades: HashMap<EntryId, HashSet<(TreeId, String)>>,
    discarded: HashSet<EntryId>,
    prune_empty_entries: bool,
    /// Cursor a restored document was saved with
    restore_index: usize,
}

impl Ledger {
    pub fn new(prune_empty_entries: bool) -> Self {
        Self {
            prune_empty_entries,
            ..Default::default()
        }
    }

    /// Adopt a persisted log. Fresh trees reflect none of it, so the cursor
    /// starts at zero and the saved one is kept for `restore_index`.
    pub fn with_document(mut document: CDocument, prune_empty_entries: bool) -> Self {
        let restore_index = document.current_history_index;
        document.set_current_history_index(0);
        Self {
            document,
            prune_empty_entries,
            restore_index,
            ..Default::default()
        }
    }

    pub fn document(&self) -> &CDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut CDocument {
        &mut self.document
    }

    pub fn restore_index(&self) -> usize {
        self.restore_index
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reserved entries that have not left the ledger yet
    pub fn in_flight(&self) -> usize {
        (self.issued - self.next_slot) as usize
    }

    /// Register a new entry with `exchange` open on it. Returns its slot.
    pub fn reserve(&mut self, exchange: &Exchange, tree: &str, action: &str, undoable: bool) -> u64 {
        let slot = self.issued;
        self.issued += 1;
        let id = exchange.history_entry_id.clone();
        let mut entry = HistoryEntry::new(id.clone(), tree, action, undoable);
        entry.active_exchanges.insert(exchange.exchange_id.clone());
        debug!(entry = %id, exchange = %exchange.exchange_id, slot, tree, action, "history entry reserved");
        self.pending.insert(id.clone(), entry);
        self.slots.insert(slot, id);
        slot
    }

    /// Open `exchange` on its entry, reserving the entry when it is new.
    /// Returns true when the entry was created.
    pub fn add_history_entry(
        &mut self,
        exchange: &Exchange,
        tree: &str,
        action: &str,
        undoable: bool,
    ) -> Result<bool, HistoryError> {
        let id = &exchange.history_entry_id;
        if self.document.entry(id).is_some() {
            return Err(HistoryError::EntryAlreadyComplete(id.clone()));
        }

        if let Some(entry) = self.pending.get_mut(id) {
            entry.open_exchange(exchange.exchange_id.clone())?;
            debug!(entry = %id, exchange = %exchange.exchange_id, "history entry joined");
            return Ok(false);
        }

        self.reserve(exchange, tree, action, undoable);
        Ok(true)
    }

    pub fn start_exchange(&mut self, exchange: &Exchange, reason: &str) -> Result<(), HistoryError> {
        let entry = self.pending_entry(&exchange.history_entry_id)?;
        entry.open_exchange(exchange.exchange_id.clone())?;
        debug!(entry = %exchange.history_entry_id, exchange = %exchange.exchange_id, reason, "exchange started");
        Ok(())
    }

    /// Close an exchange. Returns every entry that left the ledger as a result.
    pub fn add_tree_patch_record(
        &mut self,
        exchange: &Exchange,
        record: TreePatchRecord,
    ) -> Result<Vec<Settled>, HistoryError> {
        let id = &exchange.history_entry_id;
        if self.discarded.contains(id) {
            debug!(entry = %id, tree = %record.tree, "ignoring record for discarded entry");
            return Ok(Vec::new());
        }

        let entry = self.pending_entry(id)?;
        debug!(entry = %id, tree = %record.tree, action = %record.action, patches = record.patches.len(), "tree patch record");

        if !entry.close_exchange(exchange, record)? {
            return Ok(Vec::new());
        }
        self.cascades.remove(id);
        Ok(self.flush())
    }

    /// Drop a reserved entry without logging it. Returns the entry with the
    /// records submitted so far, plus any later entries it was holding back.
    pub fn discard(&mut self, id: &EntryId) -> (Option<HistoryEntry>, Vec<Settled>) {
        let entry = self.pending.remove(id);
        if entry.is_some() {
            self.cascades.remove(id);
            self.discarded.insert(id.clone());
            debug!(entry = %id, "history entry discarded");
        }
        (entry, self.flush())
    }

    /// Remember that `shared_model_id` cascaded in `tree` for this entry
    pub fn begin_cascade(&mut self, entry_id: &EntryId, tree: &str, shared_model_id: &str) -> Result<(), HistoryError> {
        let visited = self.cascades.entry(entry_id.clone()).or_default();
        if !visited.insert((tree.to_string(), shared_model_id.to_string())) {
            return Err(HistoryError::CascadeCycle {
                entry_id: entry_id.clone(),
                tree: tree.to_string(),
                shared_model_id: shared_model_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn status(&self, id: &EntryId) -> EntryStatus {
        if self.pending.contains_key(id) {
            EntryStatus::Recording
        } else if self.document.entry(id).is_some() {
            EntryStatus::Complete
        } else if self.discarded.contains(id) {
            EntryStatus::Discarded
        } else {
            EntryStatus::Unknown
        }
    }

    pub fn entry(&self, id: &EntryId) -> Option<&HistoryEntry> {
        self.pending.get(id).or_else(|| self.document.entry(id))
    }

    /// Move finished entries at the front of the slot order into the log
    fn flush(&mut self) -> Vec<Settled> {
        let mut settled = Vec::new();
        while let Some((&slot, id)) = self.slots.first_key_value() {
            if slot != self.next_slot {
                break;
            }
            let ready = self.pending.get(id).map_or(true, HistoryEntry::is_complete);
            if !ready {
                break;
            }

            let id = id.clone();
            self.slots.remove(&slot);
            self.next_slot += 1;

            // Discarded entries only give up their slot
            let Some(entry) = self.pending.remove(&id) else {
                continue;
            };

            if self.prune_empty_entries && entry.is_empty() {
                debug!(entry = %id, action = %entry.action, "discarding empty history entry");
                self.discarded.insert(id.clone());
                settled.push(Settled::Discarded { entry_id: id });
                continue;
            }

            let action = entry.action.clone();
            let index = self.document.push_completed(entry);
            info!(entry = %id, action = %action, index, "history entry complete");
            settled.push(Settled::Completed { entry_id: id, index });
        }
        settled
    }

    fn pending_entry(&mut self, id: &EntryId) -> Result<&mut HistoryEntry, HistoryError> {
        if self.document.entry(id).is_some() {
            return Err(HistoryError::EntryAlreadyComplete(id.clone()));
        }
        self.pending
            .get_mut(id)
            .ok_or_else(|| HistoryError::UnknownEntry(id.clone()))
    }
}
