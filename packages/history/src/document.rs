//! The persisted history log

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::{EntryId, HistoryEntry, HistoryError, TreeId};

/// Completed history entries plus the navigation cursor.
///
/// `current_history_index` counts applied entries: 0 means none are applied,
/// `history.len()` means the trees reflect every entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CDocument {
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub current_history_index: usize,
}

impl CDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn current_history_index(&self) -> usize {
        self.current_history_index
    }

    pub fn entry(&self, id: &EntryId) -> Option<&HistoryEntry> {
        self.history.iter().find(|e| &e.id == id)
    }

    pub fn index_of(&self, id: &EntryId) -> Option<usize> {
        self.history.iter().position(|e| &e.id == id)
    }

    /// Every tree named by a record
    pub fn tree_ids(&self) -> BTreeSet<TreeId> {
        self.history
            .iter()
            .flat_map(|e| e.records.iter().map(|r| r.tree.clone()))
            .collect()
    }

    /// Append a completed entry at the cursor, dropping any redo branch
    pub(crate) fn push_completed(&mut self, entry: HistoryEntry) -> usize {
        if self.current_history_index < self.history.len() {
            let dropped = self.history.len() - self.current_history_index;
            tracing::debug!(dropped, "truncating redo branch");
            self.history.truncate(self.current_history_index);
        }
        self.history.push(entry);
        self.current_history_index = self.history.len();
        self.history.len() - 1
    }

    pub(crate) fn set_current_history_index(&mut self, index: usize) {
        self.current_history_index = index;
    }

    pub fn validate(&self) -> Result<(), HistoryError> {
        if self.current_history_index > self.history.len() {
            return Err(HistoryError::InvalidSnapshot(format!(
                "cursor {} is past the end of {} entries",
                self.current_history_index,
                self.history.len()
            )));
        }

        let mut seen = HashSet::new();
        for entry in &self.history {
            if !seen.insert(&entry.id) {
                return Err(HistoryError::InvalidSnapshot(format!(
                    "duplicate entry id {}",
                    entry.id
                )));
            }
            if !entry.is_complete() || !entry.active_exchanges.is_empty() {
                return Err(HistoryError::InvalidSnapshot(format!(
                    "entry {} is still recording",
                    entry.id
                )));
            }
            for record in &entry.records {
                if record.patches.len() != record.inverse_patches.len() {
                    return Err(HistoryError::InvalidSnapshot(format!(
                        "record {} in entry {} has mismatched inverse patches",
                        record.action, entry.id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let content = std::fs::read_to_string(path)?;
        let document: CDocument = serde_json::from_str(&content)?;
        document.validate()?;
        Ok(document)
    }
}
