//! Tile behaviors: how a tile type reacts when a linked shared model changes

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tiledoc_patch::shared::shared_model_path;
use tiledoc_patch::Draft;

use crate::paths::{field_path, tile_content_path};
use crate::HistoryError;

pub trait TileBehavior: Send + Sync {
    /// The `type` field of tiles this behavior drives
    fn tile_type(&self) -> &str;

    /// Update the tile after `shared_model_id` changed. Writes made through
    /// `tile` join the running history entry.
    fn react_to_shared_model_change(
        &self,
        tile: &mut TileDraft<'_, '_>,
        shared_model_id: &str,
    ) -> Result<(), HistoryError>;
}

/// Write access to one tile during a reaction
pub struct TileDraft<'d, 'a> {
    draft: &'d mut Draft<'a>,
    tile_id: &'d str,
    content_path: String,
}

impl<'d, 'a> TileDraft<'d, 'a> {
    pub(crate) fn new(draft: &'d mut Draft<'a>, tile_id: &'d str) -> Self {
        Self {
            draft,
            tile_id,
            content_path: tile_content_path(tile_id),
        }
    }

    pub fn tile_id(&self) -> &str {
        self.tile_id
    }

    pub fn content(&self) -> Option<&Value> {
        self.draft.get(&self.content_path)
    }

    pub fn field(&self, field: &str) -> Option<&Value> {
        self.draft.get(&field_path(&self.content_path, field))
    }

    /// Current payload of a shared model
    pub fn shared_model(&self, shared_model_id: &str) -> Option<&Value> {
        self.draft.get(&shared_model_path(shared_model_id))
    }

    pub fn set(&mut self, field: &str, value: Value) -> Result<(), HistoryError> {
        let path = field_path(&self.content_path, field);
        self.draft.set(&path, value)?;
        Ok(())
    }

    /// Write a field that never enters history
    pub fn set_volatile(&mut self, field: &str, value: Value) -> Result<(), HistoryError> {
        let path = field_path(&self.content_path, field);
        self.draft.set_volatile(&path, value)?;
        Ok(())
    }

    /// Write into a shared model payload. This schedules a further cascade.
    pub fn set_shared_field(
        &mut self,
        shared_model_id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), HistoryError> {
        let base = shared_model_path(shared_model_id);
        if !self.draft.contains(&base) {
            return Err(HistoryError::SharedModelNotFound(shared_model_id.to_string()));
        }
        self.draft.set(&field_path(&base, field), value)?;
        Ok(())
    }
}

/// Behaviors by tile type
#[derive(Default, Clone)]
pub struct TileRegistry {
    behaviors: HashMap<String, Arc<dyn TileBehavior>>,
}

impl TileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, behavior: impl TileBehavior + 'static) {
        self.behaviors
            .insert(behavior.tile_type().to_string(), Arc::new(behavior));
    }

    pub fn with_behavior(mut self, behavior: impl TileBehavior + 'static) -> Self {
        self.register(behavior);
        self
    }

    pub fn get(&self, tile_type: &str) -> Option<Arc<dyn TileBehavior>> {
        self.behaviors.get(tile_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

impl fmt::Debug for TileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.behaviors.keys().collect();
        types.sort();
        f.debug_struct("TileRegistry").field("types", &types).finish()
    }
}
