//! Shared-model path classification.
//!
//! A patch touches shared state when its path runs through
//! `sharedModelMap/<id>/sharedModel`. Paths under `sharedModelMap/<id>/tiles`
//! only change which tiles use a model and are not content changes.

use std::collections::BTreeMap;

use crate::pointer::{format_pointer, parse_pointer};

pub const SHARED_MODEL_MAP: &str = "sharedModelMap";
pub const SHARED_MODEL: &str = "sharedModel";
pub const SHARED_MODEL_TILES: &str = "tiles";

/// Id of the shared model whose payload `path` points into, if any
pub fn shared_model_id(path: &str) -> Option<String> {
    let segments = parse_pointer(path).ok()?;
    let map_index = segments.iter().position(|s| s == SHARED_MODEL_MAP)?;

    match (segments.get(map_index + 1), segments.get(map_index + 2)) {
        (Some(id), Some(field)) if field == SHARED_MODEL => Some(id.clone()),
        _ => None,
    }
}

/// Pointer to the map entry of a shared model
pub fn shared_model_entry_path(id: &str) -> String {
    format_pointer(&[SHARED_MODEL_MAP, id])
}

/// Pointer to the payload of a shared model
pub fn shared_model_path(id: &str) -> String {
    format_pointer(&[SHARED_MODEL_MAP, id, SHARED_MODEL])
}

/// Pointer to the tile membership list of a shared model
pub fn shared_model_tiles_path(id: &str) -> String {
    format_pointer(&[SHARED_MODEL_MAP, id, SHARED_MODEL_TILES])
}

/// Per-action touch counts of shared models
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedModelModifications {
    counts: BTreeMap<String, usize>,
}

impl SharedModelModifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&mut self, id: impl Into<String>) {
        *self.counts.entry(id.into()).or_insert(0) += 1;
    }

    pub fn count(&self, id: &str) -> usize {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Ids with a non-zero touch count, in id order
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, _)| id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.changed().next().is_none()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
