#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use tiledoc_history::{
    Command, DocumentTree, HistoryConfig, HistoryError, Manager, TileBehavior, TileDraft, TileRegistry,
};

/// Mirrors the number of rows in a linked data set
pub struct ChartTile;

impl TileBehavior for ChartTile {
    fn tile_type(&self) -> &str {
        "chart"
    }

    fn react_to_shared_model_change(
        &self,
        tile: &mut TileDraft<'_, '_>,
        shared_model_id: &str,
    ) -> Result<(), HistoryError> {
        let rows = tile
            .shared_model(shared_model_id)
            .and_then(|model| model.get("rows"))
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        tile.set("pointCount", json!(rows))
    }
}

/// Writes back into the model it observes
pub struct EchoTile;

impl TileBehavior for EchoTile {
    fn tile_type(&self) -> &str {
        "echo"
    }

    fn react_to_shared_model_change(
        &self,
        tile: &mut TileDraft<'_, '_>,
        shared_model_id: &str,
    ) -> Result<(), HistoryError> {
        let seen = tile
            .shared_model(shared_model_id)
            .and_then(|model| model.get("echoes"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        tile.set_shared_field(shared_model_id, "echoes", json!(seen + 1))
    }
}

pub struct FailingTile;

impl TileBehavior for FailingTile {
    fn tile_type(&self) -> &str {
        "failing"
    }

    fn react_to_shared_model_change(
        &self,
        tile: &mut TileDraft<'_, '_>,
        _shared_model_id: &str,
    ) -> Result<(), HistoryError> {
        tile.set("attempted", json!(true))?;
        Err(HistoryError::TileReaction(format!("{} cannot react", tile.tile_id())))
    }
}

pub fn registry() -> Arc<TileRegistry> {
    Arc::new(
        TileRegistry::new()
            .with_behavior(ChartTile)
            .with_behavior(EchoTile)
            .with_behavior(FailingTile),
    )
}

pub async fn manager_with_trees(config: HistoryConfig, ids: &[&str]) -> Manager {
    let manager = Manager::with_config(config);
    let registry = registry();
    for id in ids {
        manager
            .add_tree(DocumentTree::with_registry(*id, registry.clone()))
            .await
            .unwrap();
    }
    manager
}

pub fn add_tile(tile_id: &str, tile_type: &str) -> Command {
    Command::AddTile {
        tile_id: tile_id.into(),
        tile_type: tile_type.into(),
        content: json!({}),
    }
}

pub fn add_data_set(shared_model_id: &str) -> Command {
    Command::AddSharedModel {
        shared_model_id: shared_model_id.into(),
        model: json!({ "rows": [] }),
    }
}

pub fn link(shared_model_id: &str, tile_id: &str) -> Command {
    Command::LinkTile {
        shared_model_id: shared_model_id.into(),
        tile_id: tile_id.into(),
    }
}

/// Give `tree` a data set `ds` and a linked tile of `tile_type`
pub async fn link_data_set(manager: &Manager, tree: &str, tile_id: &str, tile_type: &str) {
    let setup = Command::batch(
        "setup",
        vec![add_data_set("ds"), add_tile(tile_id, tile_type), link("ds", tile_id)],
    );
    manager.execute(tree, setup).await.unwrap();
    manager.settle().await.unwrap();
}
