//! Moving trees through the completed log: undo, redo, jump, replay

use std::collections::BTreeMap;
use tracing::{error, info};

use crate::{DocumentTree, EntryId, HistoryError, HistoryEvent, Manager, TreeHandle, TreeId, TreePatchRecord};

enum Step<'a> {
    Apply(&'a TreePatchRecord),
    Revert(&'a TreePatchRecord),
}

impl Step<'_> {
    fn tree(&self) -> &str {
        match self {
            Step::Apply(record) | Step::Revert(record) => &record.tree,
        }
    }

    fn run(&self, tree: &mut DocumentTree) -> Result<(), HistoryError> {
        match self {
            Step::Apply(record) => tree.apply_patches_from_manager(&record.patches),
            Step::Revert(record) => tree.revert_patches_from_manager(&record.inverse_patches),
        }
    }

    fn rollback(&self, tree: &mut DocumentTree) -> Result<(), HistoryError> {
        match self {
            Step::Apply(record) => tree.revert_patches_from_manager(&record.inverse_patches),
            Step::Revert(record) => tree.apply_patches_from_manager(&record.patches),
        }
    }
}

impl Manager {
    /// Move every tree to the state right after the first `target` entries.
    ///
    /// Going back reverts entries newest first, each entry's records in
    /// reverse. Going forward applies entries oldest first, records in order.
    /// Every tree stays locked for the whole move. If a record fails to apply,
    /// the records already applied are rolled back and the cursor stays put.
    /// Refused while any entry is recording or coordination work is queued.
    pub async fn go_to_history_entry(&self, target: usize) -> Result<(), HistoryError> {
        let handles: Vec<(TreeId, TreeHandle)> = {
            let trees = self.inner.trees.read().await;
            let mut handles: Vec<_> = trees.iter().map(|(id, h)| (id.clone(), h.clone())).collect();
            handles.sort_by(|a, b| a.0.cmp(&b.0));
            handles
        };
        let mut trees = BTreeMap::new();
        for (id, handle) in &handles {
            trees.insert(id.as_str(), handle.lock().await);
        }

        let queued = self.queued_tasks().await;
        let mut ledger = self.inner.ledger.lock().await;

        let in_flight = ledger.in_flight().max(queued);
        if in_flight > 0 {
            return Err(HistoryError::EntriesInFlight(in_flight));
        }

        let document = ledger.document();
        let len = document.len();
        if target > len {
            return Err(HistoryError::IndexOutOfRange { index: target, len });
        }
        let current = document.current_history_index();
        if target == current {
            return Ok(());
        }

        let mut steps = Vec::new();
        if target < current {
            for entry in document.history[target..current].iter().rev() {
                steps.extend(entry.records.iter().rev().map(Step::Revert));
            }
        } else {
            for entry in &document.history[current..target] {
                steps.extend(entry.records.iter().map(Step::Apply));
            }
        }

        if let Some(missing) = steps.iter().find(|step| !trees.contains_key(step.tree())) {
            return Err(HistoryError::TreeNotFound(missing.tree().to_string()));
        }

        for (applied, step) in steps.iter().enumerate() {
            let Some(tree) = trees.get_mut(step.tree()) else {
                continue;
            };
            if let Err(err) = step.run(tree) {
                error!(tree = step.tree(), from = current, to = target, error = %err, "history navigation failed, rolling back");
                for done in steps[..applied].iter().rev() {
                    if let Some(tree) = trees.get_mut(done.tree()) {
                        if let Err(rollback_err) = done.rollback(tree) {
                            error!(tree = done.tree(), error = %rollback_err, "rollback did not apply");
                        }
                    }
                }
                return Err(err);
            }
        }
        drop(steps);

        ledger.document_mut().set_current_history_index(target);
        drop(ledger);
        drop(trees);

        info!(from = current, to = target, "history navigated");
        self.emit(HistoryEvent::Navigated {
            from: current,
            to: target,
        });
        Ok(())
    }

    /// Move to the state right after `entry_id`
    pub async fn go_to_entry(&self, entry_id: &EntryId) -> Result<(), HistoryError> {
        let index = self
            .inner
            .ledger
            .lock()
            .await
            .document()
            .index_of(entry_id)
            .ok_or_else(|| HistoryError::UnknownEntry(entry_id.clone()))?;
        self.go_to_history_entry(index + 1).await
    }

    /// Step back over the most recent undoable entry. Returns false when
    /// there is nothing to undo.
    pub async fn undo(&self) -> Result<bool, HistoryError> {
        match self.undo_index().await {
            Some(index) => {
                self.go_to_history_entry(index).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Step forward past the next undoable entry
    pub async fn redo(&self) -> Result<bool, HistoryError> {
        match self.redo_index().await {
            Some(index) => {
                self.go_to_history_entry(index).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn can_undo(&self) -> bool {
        self.undo_index().await.is_some()
    }

    pub async fn can_redo(&self) -> bool {
        self.redo_index().await.is_some()
    }

    /// Undoable entries behind the cursor, newest first
    pub async fn undo_targets(&self) -> Vec<EntryId> {
        let ledger = self.inner.ledger.lock().await;
        let document = ledger.document();
        document.history[..document.current_history_index()]
            .iter()
            .rev()
            .filter(|e| e.undoable)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Undoable entries ahead of the cursor, oldest first
    pub async fn redo_targets(&self) -> Vec<EntryId> {
        let ledger = self.inner.ledger.lock().await;
        let document = ledger.document();
        document.history[document.current_history_index()..]
            .iter()
            .filter(|e| e.undoable)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Bring fresh trees through every entry of a loaded log
    pub async fn replay_history_to_trees(&self) -> Result<(), HistoryError> {
        let len = self.inner.ledger.lock().await.document().len();
        self.go_to_history_entry(len).await
    }

    /// Replay, then return to the cursor the log was saved with
    pub async fn restore_history(&self) -> Result<(), HistoryError> {
        self.replay_history_to_trees().await?;
        let index = self.inner.ledger.lock().await.restore_index();
        self.go_to_history_entry(index).await
    }

    async fn undo_index(&self) -> Option<usize> {
        let ledger = self.inner.ledger.lock().await;
        let document = ledger.document();
        document.history[..document.current_history_index()]
            .iter()
            .rposition(|e| e.undoable)
    }

    async fn redo_index(&self) -> Option<usize> {
        let ledger = self.inner.ledger.lock().await;
        let document = ledger.document();
        let current = document.current_history_index();
        document.history[current..]
            .iter()
            .position(|e| e.undoable)
            .map(|offset| current + offset + 1)
    }
}
