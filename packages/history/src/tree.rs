//! # Document Tree
//!
//! A monitored JSON state tree holding tiles and shared models:
//!
//! ```text
//! {
//!   "tiles":          { "<tileId>": { "id", "type", "content": {..} } },
//!   "sharedModelMap": { "<id>": { "id", "sharedModel": {..}, "tiles": ["<tileId>"] } }
//! }
//! ```
//!
//! All tracked mutation goes through [`DocumentTree::run_action`]. The only
//! untracked path is the manager's patch-application bracket used while
//! navigating or replaying history.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tiledoc_patch::shared::{shared_model_entry_path, shared_model_path};
use tiledoc_patch::{apply_patches, revert_patches, CallId, CallIdGenerator, Patch};

use crate::middleware::TrackedCall;
use crate::paths::{linked_tiles, tile_path};
use crate::{HistoryError, TileRegistry, TreeId};

pub struct DocumentTree {
    pub(crate) id: TreeId,
    pub(crate) state: Value,
    pub(crate) registry: Arc<TileRegistry>,
    pub(crate) call_ids: CallIdGenerator,
    pub(crate) tracked: HashMap<CallId, TrackedCall>,
    pub(crate) applying_patches_from_manager: bool,
    destroyed: bool,
}

impl DocumentTree {
    pub fn new(id: impl Into<TreeId>) -> Self {
        Self::with_registry(id, Arc::new(TileRegistry::new()))
    }

    pub fn with_registry(id: impl Into<TreeId>, registry: Arc<TileRegistry>) -> Self {
        let id = id.into();
        Self {
            call_ids: CallIdGenerator::new(id.clone()),
            id,
            state: json!({ "tiles": {}, "sharedModelMap": {} }),
            registry,
            tracked: HashMap::new(),
            applying_patches_from_manager: false,
            destroyed: false,
        }
    }

    pub fn id(&self) -> &TreeId {
        &self.id
    }

    pub fn snapshot(&self) -> &Value {
        &self.state
    }

    pub fn registry(&self) -> &Arc<TileRegistry> {
        &self.registry
    }

    pub fn tile(&self, tile_id: &str) -> Option<&Value> {
        self.state.pointer(&tile_path(tile_id))
    }

    pub fn has_shared_model(&self, shared_model_id: &str) -> bool {
        self.state.pointer(&shared_model_entry_path(shared_model_id)).is_some()
    }

    pub fn shared_model_snapshot(&self, shared_model_id: &str) -> Option<Value> {
        self.state.pointer(&shared_model_path(shared_model_id)).cloned()
    }

    pub fn tiles_referencing(&self, shared_model_id: &str) -> Vec<String> {
        linked_tiles(&self.state, shared_model_id)
    }

    /// Number of tracked actions currently in progress
    pub fn tracked_calls(&self) -> usize {
        self.tracked.len()
    }

    pub fn start_applying_patches_from_manager(&mut self) {
        self.applying_patches_from_manager = true;
    }

    pub fn finish_applying_patches_from_manager(&mut self) {
        self.applying_patches_from_manager = false;
    }

    pub fn is_applying_patches_from_manager(&self) -> bool {
        self.applying_patches_from_manager
    }

    /// Apply recorded patches in order, outside any tracked action
    pub fn apply_patches_from_manager(&mut self, patches: &[Patch]) -> Result<(), HistoryError> {
        self.start_applying_patches_from_manager();
        let result = apply_patches(&mut self.state, patches);
        self.finish_applying_patches_from_manager();
        result?;
        Ok(())
    }

    /// Undo recorded patches by applying their inverses in reverse order
    pub fn revert_patches_from_manager(&mut self, inverse_patches: &[Patch]) -> Result<(), HistoryError> {
        self.start_applying_patches_from_manager();
        let result = revert_patches(&mut self.state, inverse_patches);
        self.finish_applying_patches_from_manager();
        result?;
        Ok(())
    }

    /// Mark the tree as gone. Pending manager work against it is dropped.
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl std::fmt::Debug for DocumentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentTree")
            .field("id", &self.id)
            .field("tracked", &self.tracked.len())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_layout() {
        let tree = DocumentTree::new("doc");
        assert_eq!(tree.snapshot(), &json!({ "tiles": {}, "sharedModelMap": {} }));
        assert!(!tree.has_shared_model("ds"));
        assert_eq!(tree.tracked_calls(), 0);
    }

    #[test]
    fn test_manager_bracket_resets_flag_on_error() {
        let mut tree = DocumentTree::new("doc");
        let result = tree.apply_patches_from_manager(&[Patch::remove("/tiles/missing")]);
        assert!(result.is_err());
        assert!(!tree.is_applying_patches_from_manager());
        assert_eq!(tree.snapshot(), &json!({ "tiles": {}, "sharedModelMap": {} }));
    }

    #[test]
    fn test_apply_and_revert_from_manager() {
        let mut tree = DocumentTree::new("doc");
        let patches = vec![Patch::add("/tiles/t1", json!({ "id": "t1", "type": "text", "content": {} }))];
        let inverse = vec![Patch::remove("/tiles/t1")];

        tree.apply_patches_from_manager(&patches).unwrap();
        assert!(tree.tile("t1").is_some());

        tree.revert_patches_from_manager(&inverse).unwrap();
        assert!(tree.tile("t1").is_none());
    }
}
