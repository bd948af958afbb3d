//! Pointer helpers for the document tree layout

use serde_json::Value;
use tiledoc_patch::pointer::{format_pointer, join_pointer};
use tiledoc_patch::shared::{SHARED_MODEL_MAP, SHARED_MODEL_TILES};

pub const TILES: &str = "tiles";

pub fn tile_path(tile_id: &str) -> String {
    format_pointer(&[TILES, tile_id])
}

pub fn tile_content_path(tile_id: &str) -> String {
    format_pointer(&[TILES, tile_id, "content"])
}

/// Resolve `field` under `base`. A field starting with `/` is a pointer
/// relative to `base`, anything else is a single key.
pub fn field_path(base: &str, field: &str) -> String {
    if field.starts_with('/') {
        format!("{}{}", base, field)
    } else {
        join_pointer(base, field)
    }
}

/// Ids of tiles listed against a shared model
pub fn linked_tiles(root: &Value, shared_model_id: &str) -> Vec<String> {
    root.get(SHARED_MODEL_MAP)
        .and_then(|map| map.get(shared_model_id))
        .and_then(|entry| entry.get(SHARED_MODEL_TILES))
        .and_then(Value::as_array)
        .map(|tiles| {
            tiles
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Shared models whose tile list mentions `tile_id`
pub fn models_linking(root: &Value, tile_id: &str) -> Vec<String> {
    let Some(map) = root.get(SHARED_MODEL_MAP).and_then(Value::as_object) else {
        return Vec::new();
    };
    map.keys()
        .filter(|id| linked_tiles(root, id).iter().any(|t| t == tile_id))
        .cloned()
        .collect()
}
