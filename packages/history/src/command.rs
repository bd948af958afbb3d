//! # Commands
//!
//! Named, typed operations a user (or a script) performs on a document tree.
//!
//! ## Semantics
//!
//! - Every command runs as one tracked action and becomes one history entry
//! - A command that fails leaves the tree exactly as it found it
//! - `Batch` runs its children as nested calls; all of them share one entry
//! - `WithoutUndo` applies its child but records nothing
//! - `SetVolatileField` writes state that is never part of history

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tiledoc_patch::shared::{shared_model_entry_path, shared_model_path, shared_model_tiles_path};
use tiledoc_patch::Draft;

use crate::paths::{field_path, linked_tiles, models_linking, tile_content_path, tile_path};
use crate::HistoryError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Insert a tile
    AddTile {
        tile_id: String,
        tile_type: String,
        #[serde(default)]
        content: Value,
    },

    /// Remove a tile, unlinking it from every shared model first
    RemoveTile { tile_id: String },

    /// Add or replace a content field. `field` may be a relative pointer.
    SetTileField {
        tile_id: String,
        field: String,
        value: Value,
    },

    RemoveTileField { tile_id: String, field: String },

    /// Write a content field that history ignores
    SetVolatileField {
        tile_id: String,
        field: String,
        value: Value,
    },

    AddSharedModel {
        shared_model_id: String,
        #[serde(default)]
        model: Value,
    },

    RemoveSharedModel { shared_model_id: String },

    /// Add or replace a field of a shared model payload
    SetSharedModelField {
        shared_model_id: String,
        field: String,
        value: Value,
    },

    /// Make a tile a user of a shared model
    LinkTile {
        shared_model_id: String,
        tile_id: String,
    },

    UnlinkTile {
        shared_model_id: String,
        tile_id: String,
    },

    /// Run several commands as one undo step
    Batch { name: String, commands: Vec<Command> },

    /// Apply a command without creating undoable patches
    WithoutUndo { command: Box<Command> },
}

impl Command {
    /// Action name recorded in history
    pub fn name(&self) -> &str {
        match self {
            Command::AddTile { .. } => "addTile",
            Command::RemoveTile { .. } => "removeTile",
            Command::SetTileField { .. } => "setTileField",
            Command::RemoveTileField { .. } => "removeTileField",
            Command::SetVolatileField { .. } => "setVolatileField",
            Command::AddSharedModel { .. } => "addSharedModel",
            Command::RemoveSharedModel { .. } => "removeSharedModel",
            Command::SetSharedModelField { .. } => "setSharedModelField",
            Command::LinkTile { .. } => "linkTile",
            Command::UnlinkTile { .. } => "unlinkTile",
            Command::Batch { name, .. } => name,
            Command::WithoutUndo { command } => command.name(),
        }
    }

    /// Whether the resulting entry is a target for undo/redo
    pub fn undoable(&self) -> bool {
        !matches!(self, Command::WithoutUndo { .. })
    }

    pub fn batch(name: impl Into<String>, commands: Vec<Command>) -> Self {
        Command::Batch {
            name: name.into(),
            commands,
        }
    }

    pub fn without_undo(command: Command) -> Self {
        Command::WithoutUndo {
            command: Box::new(command),
        }
    }

    pub fn set_tile_field(tile_id: impl Into<String>, field: impl Into<String>, value: Value) -> Self {
        Command::SetTileField {
            tile_id: tile_id.into(),
            field: field.into(),
            value,
        }
    }

    pub fn set_shared_model_field(
        shared_model_id: impl Into<String>,
        field: impl Into<String>,
        value: Value,
    ) -> Self {
        Command::SetSharedModelField {
            shared_model_id: shared_model_id.into(),
            field: field.into(),
            value,
        }
    }

    pub(crate) fn apply(&self, draft: &mut Draft<'_>) -> Result<(), HistoryError> {
        match self {
            Command::AddTile {
                tile_id,
                tile_type,
                content,
            } => {
                let path = tile_path(tile_id);
                if draft.contains(&path) {
                    return Err(HistoryError::DuplicateTile(tile_id.clone()));
                }
                let content = if content.is_null() { json!({}) } else { content.clone() };
                draft.add(
                    &path,
                    json!({ "id": tile_id, "type": tile_type, "content": content }),
                )?;
            }

            Command::RemoveTile { tile_id } => {
                let path = require_tile(draft, tile_id)?;
                for shared_model_id in models_linking(draft.root(), tile_id) {
                    draft.nested("unlinkTile", |d| unlink(d, &shared_model_id, tile_id))?;
                }
                draft.remove(&path)?;
            }

            Command::SetTileField {
                tile_id,
                field,
                value,
            } => {
                require_tile(draft, tile_id)?;
                draft.set(&field_path(&tile_content_path(tile_id), field), value.clone())?;
            }

            Command::RemoveTileField { tile_id, field } => {
                require_tile(draft, tile_id)?;
                draft.remove(&field_path(&tile_content_path(tile_id), field))?;
            }

            Command::SetVolatileField {
                tile_id,
                field,
                value,
            } => {
                require_tile(draft, tile_id)?;
                draft.set_volatile(&field_path(&tile_content_path(tile_id), field), value.clone())?;
            }

            Command::AddSharedModel {
                shared_model_id,
                model,
            } => {
                let path = shared_model_entry_path(shared_model_id);
                if draft.contains(&path) {
                    return Err(HistoryError::DuplicateSharedModel(shared_model_id.clone()));
                }
                let model = if model.is_null() { json!({}) } else { model.clone() };
                draft.add(
                    &path,
                    json!({ "id": shared_model_id, "sharedModel": model, "tiles": [] }),
                )?;
            }

            Command::RemoveSharedModel { shared_model_id } => {
                let path = require_shared_model(draft, shared_model_id)?;
                draft.remove(&path)?;
            }

            Command::SetSharedModelField {
                shared_model_id,
                field,
                value,
            } => {
                require_shared_model(draft, shared_model_id)?;
                draft.set(&field_path(&shared_model_path(shared_model_id), field), value.clone())?;
            }

            Command::LinkTile {
                shared_model_id,
                tile_id,
            } => {
                require_tile(draft, tile_id)?;
                require_shared_model(draft, shared_model_id)?;
                if !linked_tiles(draft.root(), shared_model_id).contains(tile_id) {
                    let path = format!("{}/-", shared_model_tiles_path(shared_model_id));
                    draft.add(&path, json!(tile_id))?;
                }
            }

            Command::UnlinkTile {
                shared_model_id,
                tile_id,
            } => {
                require_shared_model(draft, shared_model_id)?;
                unlink(draft, shared_model_id, tile_id)?;
            }

            Command::Batch { commands, .. } => {
                for command in commands {
                    draft.nested(command.name(), |d| command.apply(d))?;
                }
            }

            Command::WithoutUndo { command } => {
                draft.without_undo(|d| command.apply(d))?;
            }
        }

        Ok(())
    }
}

fn require_tile(draft: &Draft<'_>, tile_id: &str) -> Result<String, HistoryError> {
    let path = tile_path(tile_id);
    if draft.contains(&path) {
        Ok(path)
    } else {
        Err(HistoryError::TileNotFound(tile_id.to_string()))
    }
}

fn require_shared_model(draft: &Draft<'_>, shared_model_id: &str) -> Result<String, HistoryError> {
    let path = shared_model_entry_path(shared_model_id);
    if draft.contains(&path) {
        Ok(path)
    } else {
        Err(HistoryError::SharedModelNotFound(shared_model_id.to_string()))
    }
}

fn unlink(draft: &mut Draft<'_>, shared_model_id: &str, tile_id: &str) -> Result<(), HistoryError> {
    let position = linked_tiles(draft.root(), shared_model_id)
        .iter()
        .position(|t| t == tile_id);
    if let Some(index) = position {
        let path = format!("{}/{}", shared_model_tiles_path(shared_model_id), index);
        draft.remove(&path)?;
    }
    Ok(())
}
