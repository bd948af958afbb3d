//! History entries and the per-tree records they collect

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tiledoc_patch::Patch;

use crate::{EntryId, Exchange, ExchangeId, HistoryError, TreeId};

/// The patches one action produced in one tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreePatchRecord {
    pub tree: TreeId,
    pub action: String,
    pub patches: Vec<Patch>,
    pub inverse_patches: Vec<Patch>,
}

impl TreePatchRecord {
    pub fn new(
        tree: impl Into<TreeId>,
        action: impl Into<String>,
        patches: Vec<Patch>,
        inverse_patches: Vec<Patch>,
    ) -> Self {
        Self {
            tree: tree.into(),
            action: action.into(),
            patches,
            inverse_patches,
        }
    }

    /// A record that closes an exchange without contributing changes
    pub fn empty(tree: impl Into<TreeId>, action: impl Into<String>) -> Self {
        Self::new(tree, action, Vec::new(), Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryState {
    Recording,
    Complete,
}

/// One user-visible undo step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: EntryId,
    pub created: DateTime<Utc>,
    /// Tree that initiated the entry
    pub tree: TreeId,
    /// Name of the initiating action
    pub action: String,
    pub records: Vec<TreePatchRecord>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub active_exchanges: BTreeSet<ExchangeId>,
    pub state: EntryState,
    #[serde(default = "default_undoable")]
    pub undoable: bool,
}

fn default_undoable() -> bool {
    true
}

impl HistoryEntry {
    pub fn new(id: EntryId, tree: impl Into<TreeId>, action: impl Into<String>, undoable: bool) -> Self {
        Self {
            id,
            created: Utc::now(),
            tree: tree.into(),
            action: action.into(),
            records: Vec::new(),
            active_exchanges: BTreeSet::new(),
            state: EntryState::Recording,
            undoable,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == EntryState::Complete
    }

    /// True when no record carries a patch
    pub fn is_empty(&self) -> bool {
        self.records.iter().all(TreePatchRecord::is_empty)
    }

    pub fn patch_count(&self) -> usize {
        self.records.iter().map(|r| r.patches.len()).sum()
    }

    /// Trees touched by this entry, in first-record order
    pub fn trees(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.tree.as_str()) {
                seen.push(record.tree.as_str());
            }
        }
        seen
    }

    pub(crate) fn open_exchange(&mut self, exchange_id: ExchangeId) -> Result<(), HistoryError> {
        if self.is_complete() {
            return Err(HistoryError::EntryAlreadyComplete(self.id.clone()));
        }
        self.active_exchanges.insert(exchange_id);
        Ok(())
    }

    /// Close an exchange with its record. Returns true when this completed the entry.
    pub(crate) fn close_exchange(
        &mut self,
        exchange: &Exchange,
        record: TreePatchRecord,
    ) -> Result<bool, HistoryError> {
        if !self.active_exchanges.remove(&exchange.exchange_id) {
            return Err(HistoryError::UnknownExchange {
                entry_id: exchange.history_entry_id.clone(),
                exchange_id: exchange.exchange_id.clone(),
            });
        }
        self.records.push(record);
        if self.active_exchanges.is_empty() {
            self.state = EntryState::Complete;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exchange_on(entry: &HistoryEntry) -> Exchange {
        Exchange::new(entry.id.clone(), ExchangeId::random())
    }

    #[test]
    fn test_entry_completes_when_last_exchange_closes() {
        let mut entry = HistoryEntry::new(EntryId::random(), "doc", "setFlag", true);
        let first = exchange_on(&entry);
        let second = exchange_on(&entry);
        entry.open_exchange(first.exchange_id.clone()).unwrap();
        entry.open_exchange(second.exchange_id.clone()).unwrap();

        assert!(!entry
            .close_exchange(&first, TreePatchRecord::empty("doc", "setFlag"))
            .unwrap());
        assert!(entry
            .close_exchange(&second, TreePatchRecord::empty("doc", "react"))
            .unwrap());
        assert!(entry.is_complete());
        assert_eq!(entry.records.len(), 2);
    }

    #[test]
    fn test_closing_unknown_exchange_fails() {
        let mut entry = HistoryEntry::new(EntryId::random(), "doc", "setFlag", true);
        let stray = exchange_on(&entry);
        let err = entry
            .close_exchange(&stray, TreePatchRecord::empty("doc", "setFlag"))
            .unwrap_err();
        assert!(matches!(err, HistoryError::UnknownExchange { .. }));
        assert!(entry.records.is_empty());
    }

    #[test]
    fn test_complete_entry_refuses_new_exchanges() {
        let mut entry = HistoryEntry::new(EntryId::random(), "doc", "setFlag", true);
        let only = exchange_on(&entry);
        entry.open_exchange(only.exchange_id.clone()).unwrap();
        entry
            .close_exchange(&only, TreePatchRecord::empty("doc", "setFlag"))
            .unwrap();

        let err = entry.open_exchange(ExchangeId::random()).unwrap_err();
        assert!(matches!(err, HistoryError::EntryAlreadyComplete(_)));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = TreePatchRecord::new(
            "doc",
            "setFlag",
            vec![Patch::replace("/tiles/t1/content/flag", json!(true))],
            vec![Patch::replace("/tiles/t1/content/flag", json!(false))],
        );
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("inversePatches").is_some());
        assert_eq!(value["patches"][0]["op"], "replace");
    }

    #[test]
    fn test_trees_are_deduplicated() {
        let mut entry = HistoryEntry::new(EntryId::random(), "a", "edit", true);
        entry.records.push(TreePatchRecord::empty("a", "edit"));
        entry.records.push(TreePatchRecord::empty("b", "snapshot"));
        entry.records.push(TreePatchRecord::empty("a", "react"));
        assert_eq!(entry.trees(), vec!["a", "b"]);
    }
}
