//! Shared-model cascades across trees

mod common;

use common::{link_data_set, manager_with_trees, registry};
use pretty_assertions::assert_eq;
use serde_json::json;
use tiledoc_history::{CDocument, Command, DocumentTree, EntryStatus, HistoryConfig, HistoryError, Manager, Patch};

async fn linked_pair(config: HistoryConfig) -> Manager {
    let manager = manager_with_trees(config, &["left", "right"]).await;
    link_data_set(&manager, "left", "chartL", "chart").await;
    link_data_set(&manager, "right", "chartR", "chart").await;
    manager
}

fn append_row(value: i64) -> Command {
    Command::set_shared_model_field("ds", "/rows/-", json!(value))
}

/// Load `manager`'s log into fresh trees and replay it to the end
async fn replay(manager: &Manager, trees: &[&str]) -> Manager {
    let replayed = Manager::with_history(HistoryConfig::default(), manager.history_snapshot().await).unwrap();
    let registry = registry();
    for id in trees {
        replayed
            .add_tree(DocumentTree::with_registry(*id, registry.clone()))
            .await
            .unwrap();
    }
    replayed.replay_history_to_trees().await.unwrap();
    replayed
}

async fn actions(manager: &Manager) -> Vec<String> {
    manager.history().await.into_iter().map(|e| e.action).collect()
}

#[tokio::test]
async fn test_cascades_join_one_entry() {
    let manager = linked_pair(HistoryConfig::default()).await;

    let receipt = manager.execute("left", append_row(10)).await.unwrap();
    manager.settle().await.unwrap();

    let history = manager.history().await;
    assert_eq!(history.len(), 3);

    let entry = manager.entry(&receipt.history_entry_id).await.unwrap();
    assert!(entry.is_complete());
    assert!(entry.active_exchanges.is_empty());

    let actions: Vec<_> = entry
        .records
        .iter()
        .map(|r| (r.tree.as_str(), r.action.as_str()))
        .collect();
    assert_eq!(
        actions,
        vec![
            ("left", "setSharedModelField"),
            ("left", "handleSharedModelChanges"),
            ("right", "applySharedModelSnapshotFromManager"),
            ("right", "handleSharedModelChanges"),
        ]
    );

    let left = manager.tree_snapshot("left").await.unwrap();
    let right = manager.tree_snapshot("right").await.unwrap();
    assert_eq!(left["tiles"]["chartL"]["content"]["pointCount"], json!(1));
    assert_eq!(right["tiles"]["chartR"]["content"]["pointCount"], json!(1));
    assert_eq!(right["sharedModelMap"]["ds"]["sharedModel"], json!({ "rows": [10] }));
}

#[tokio::test]
async fn test_undo_reverts_every_tree_in_the_entry() {
    let manager = linked_pair(HistoryConfig::default()).await;
    let left_before = manager.tree_snapshot("left").await.unwrap();
    let right_before = manager.tree_snapshot("right").await.unwrap();

    manager.execute("left", append_row(10)).await.unwrap();
    manager.settle().await.unwrap();
    let left_after = manager.tree_snapshot("left").await.unwrap();
    let right_after = manager.tree_snapshot("right").await.unwrap();

    assert!(manager.undo().await.unwrap());
    assert_eq!(manager.tree_snapshot("left").await.unwrap(), left_before);
    assert_eq!(manager.tree_snapshot("right").await.unwrap(), right_before);

    assert!(manager.redo().await.unwrap());
    assert_eq!(manager.tree_snapshot("left").await.unwrap(), left_after);
    assert_eq!(manager.tree_snapshot("right").await.unwrap(), right_after);
}

#[tokio::test]
async fn test_replay_across_trees() {
    let manager = linked_pair(HistoryConfig::default()).await;
    manager.execute("left", append_row(1)).await.unwrap();
    manager.settle().await.unwrap();
    manager.execute("right", append_row(2)).await.unwrap();
    manager.settle().await.unwrap();
    let right = manager.tree_snapshot("right").await.unwrap();
    assert_eq!(right["sharedModelMap"]["ds"]["sharedModel"]["rows"], json!([1, 2]));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    manager.history_snapshot().await.save(&path).unwrap();

    let replayed = Manager::with_history(HistoryConfig::default(), CDocument::load(&path).unwrap()).unwrap();
    for id in ["left", "right"] {
        replayed.add_tree(DocumentTree::new(id)).await.unwrap();
    }
    replayed.replay_history_to_trees().await.unwrap();

    for id in ["left", "right"] {
        assert_eq!(
            replayed.tree_snapshot(id).await.unwrap(),
            manager.tree_snapshot(id).await.unwrap()
        );
    }
}

#[tokio::test]
async fn test_reaction_writing_its_trigger_is_a_cycle() {
    let manager = manager_with_trees(HistoryConfig::default(), &["solo"]).await;
    link_data_set(&manager, "solo", "echo1", "echo").await;

    manager
        .execute("solo", Command::set_shared_model_field("ds", "title", json!("Sales")))
        .await
        .unwrap();
    let err = manager.settle().await.unwrap_err();

    assert!(matches!(
        err,
        HistoryError::CascadeCycle { ref tree, ref shared_model_id, .. }
            if tree == "solo" && shared_model_id == "ds"
    ));
}

#[tokio::test]
async fn test_cycle_abandons_and_reverts_the_entry() {
    let manager = manager_with_trees(HistoryConfig::default(), &["solo"]).await;
    link_data_set(&manager, "solo", "echo1", "echo").await;
    let before = manager.tree_snapshot("solo").await.unwrap();

    let receipt = manager
        .execute("solo", Command::set_shared_model_field("ds", "title", json!("Sales")))
        .await
        .unwrap();
    assert!(manager.settle().await.is_err());

    assert_eq!(manager.entry_status(&receipt.history_entry_id).await, EntryStatus::Discarded);
    assert_eq!(manager.tree_snapshot("solo").await.unwrap(), before);
    assert_eq!(manager.pending_entries().await, 0);
    assert_eq!(actions(&manager).await, vec!["setup"]);

    // Later work is neither blocked nor refused
    manager
        .execute("solo", Command::set_tile_field("echo1", "note", json!("hi")))
        .await
        .unwrap();
    manager.settle().await.unwrap();
    assert_eq!(manager.history().await.len(), 2);
    assert!(manager.undo().await.unwrap());
    assert_eq!(manager.tree_snapshot("solo").await.unwrap(), before);
}

#[tokio::test]
async fn test_cascade_depth_limit() {
    let config = HistoryConfig {
        max_cascade_depth: 1,
        ..Default::default()
    };
    let manager = linked_pair(config).await;

    manager.execute("left", append_row(1)).await.unwrap();
    let err = manager.settle().await.unwrap_err();

    assert!(matches!(err, HistoryError::CascadeDepthExceeded { depth: 2, limit: 1, .. }));
}

#[tokio::test]
async fn test_depth_limit_reverts_every_tree() {
    let config = HistoryConfig {
        max_cascade_depth: 1,
        ..Default::default()
    };
    let manager = linked_pair(config).await;
    let left_before = manager.tree_snapshot("left").await.unwrap();
    let right_before = manager.tree_snapshot("right").await.unwrap();

    let receipt = manager.execute("left", append_row(1)).await.unwrap();
    assert!(manager.settle().await.is_err());

    assert_eq!(manager.entry_status(&receipt.history_entry_id).await, EntryStatus::Discarded);
    assert_eq!(manager.tree_snapshot("left").await.unwrap(), left_before);
    assert_eq!(manager.tree_snapshot("right").await.unwrap(), right_before);

    manager.settle().await.unwrap();
    manager.go_to_history_entry(1).await.unwrap();
    assert_eq!(manager.current_history_index().await, 1);
}

#[tokio::test]
async fn test_completion_for_removed_tree_is_dropped() {
    let manager = manager_with_trees(HistoryConfig::default(), &["left", "right"]).await;
    let receipt = manager.execute("right", common::add_tile("x", "text")).await.unwrap();
    manager.remove_tree("right").await.unwrap();

    manager.settle().await.unwrap();

    assert_eq!(manager.entry_status(&receipt.history_entry_id).await, EntryStatus::Discarded);
    assert!(manager.history().await.is_empty());
    assert_eq!(manager.tree_ids().await, vec!["left".to_string()]);

    // The dropped entry does not hold back the next one
    manager.execute("left", common::add_tile("y", "text")).await.unwrap();
    manager.settle().await.unwrap();
    assert_eq!(manager.history().await.len(), 1);
    assert_eq!(manager.pending_entries().await, 0);
}

#[tokio::test]
async fn test_removed_tree_receives_no_snapshot() {
    let manager = linked_pair(HistoryConfig::default()).await;
    let receipt = manager.execute("left", append_row(4)).await.unwrap();
    manager.remove_tree("right").await.unwrap();
    manager.settle().await.unwrap();

    let entry = manager.entry(&receipt.history_entry_id).await.unwrap();
    assert!(entry.is_complete());
    assert_eq!(entry.trees(), vec!["left"]);
}

#[tokio::test]
async fn test_remote_patches_do_not_cascade() {
    let manager = linked_pair(HistoryConfig::default()).await;
    let right_before = manager.tree_snapshot("right").await.unwrap();

    let receipt = manager
        .apply_remote_patches("left", vec![Patch::add("/sharedModelMap/ds/sharedModel/rows/-", json!(5))])
        .await
        .unwrap();
    manager.settle().await.unwrap();

    let entry = manager.entry(&receipt.history_entry_id).await.unwrap();
    assert!(entry.is_complete());
    assert!(!entry.undoable);
    assert_eq!(entry.records.len(), 1);
    assert_eq!(
        entry.records[0].patches,
        vec![Patch::add("/sharedModelMap/ds/sharedModel/rows/0", json!(5))]
    );

    let left = manager.tree_snapshot("left").await.unwrap();
    assert_eq!(left["sharedModelMap"]["ds"]["sharedModel"]["rows"], json!([5]));
    assert!(left["tiles"]["chartL"]["content"].get("pointCount").is_none());
    assert_eq!(manager.tree_snapshot("right").await.unwrap(), right_before);
}

#[tokio::test]
async fn test_failed_reaction_closes_its_exchange() {
    let manager = manager_with_trees(HistoryConfig::default(), &["solo"]).await;
    link_data_set(&manager, "solo", "bad", "failing").await;

    let receipt = manager.execute("solo", append_row(1)).await.unwrap();
    manager.settle().await.unwrap();

    let entry = manager.entry(&receipt.history_entry_id).await.unwrap();
    assert!(entry.is_complete());
    assert_eq!(entry.records.len(), 2);
    assert!(entry.records[1].is_empty());

    let snapshot = manager.tree_snapshot("solo").await.unwrap();
    assert!(snapshot["tiles"]["bad"]["content"].get("attempted").is_none());
    assert_eq!(snapshot["sharedModelMap"]["ds"]["sharedModel"]["rows"], json!([1]));
}

#[tokio::test]
async fn test_plain_action_overlapping_a_cascade_keeps_run_order() {
    let manager = manager_with_trees(HistoryConfig::default(), &["solo"]).await;
    link_data_set(&manager, "solo", "chart", "chart").await;
    let before = manager.tree_snapshot("solo").await.unwrap();

    let add_point = Command::batch(
        "addPoint",
        vec![Command::set_tile_field("chart", "x", json!(1)), append_row(1)],
    );
    let first = manager.execute("solo", add_point).await.unwrap();
    let second = manager
        .execute("solo", Command::set_tile_field("chart", "x", json!(2)))
        .await
        .unwrap();
    manager.settle().await.unwrap();

    let live = manager.tree_snapshot("solo").await.unwrap();
    assert_eq!(live["tiles"]["chart"]["content"], json!({ "x": 2, "pointCount": 1 }));
    assert_eq!(actions(&manager).await, vec!["setup", "addPoint", "setTileField"]);

    let history = manager.history().await;
    assert_eq!(history[1].id, first.history_entry_id);
    assert_eq!(history[2].id, second.history_entry_id);
    assert_eq!(
        history[2].records[0].inverse_patches,
        vec![Patch::replace("/tiles/chart/content/x", json!(1))]
    );

    let replayed = replay(&manager, &["solo"]).await;
    assert_eq!(replayed.tree_snapshot("solo").await.unwrap(), live);

    assert!(manager.undo().await.unwrap());
    let snapshot = manager.tree_snapshot("solo").await.unwrap();
    assert_eq!(snapshot["tiles"]["chart"]["content"], json!({ "x": 1, "pointCount": 1 }));

    assert!(manager.undo().await.unwrap());
    assert_eq!(manager.tree_snapshot("solo").await.unwrap(), before);

    assert!(manager.redo().await.unwrap());
    assert!(manager.redo().await.unwrap());
    assert_eq!(manager.tree_snapshot("solo").await.unwrap(), live);
}

#[tokio::test]
async fn test_overlapping_actions_across_trees_replay_and_undo() {
    let manager = linked_pair(HistoryConfig::default()).await;
    let left_before = manager.tree_snapshot("left").await.unwrap();
    let right_before = manager.tree_snapshot("right").await.unwrap();

    manager.execute("left", append_row(3)).await.unwrap();
    manager
        .execute("right", Command::set_tile_field("chartR", "label", json!("r")))
        .await
        .unwrap();
    manager
        .execute("left", Command::set_tile_field("chartL", "label", json!("l")))
        .await
        .unwrap();
    manager.settle().await.unwrap();

    assert_eq!(
        actions(&manager).await,
        vec!["setup", "setup", "setSharedModelField", "setTileField", "setTileField"]
    );
    let left = manager.tree_snapshot("left").await.unwrap();
    let right = manager.tree_snapshot("right").await.unwrap();
    assert_eq!(right["tiles"]["chartR"]["content"], json!({ "label": "r", "pointCount": 1 }));

    let replayed = replay(&manager, &["left", "right"]).await;
    assert_eq!(replayed.tree_snapshot("left").await.unwrap(), left);
    assert_eq!(replayed.tree_snapshot("right").await.unwrap(), right);

    for _ in 0..3 {
        assert!(manager.undo().await.unwrap());
    }
    assert_eq!(manager.tree_snapshot("left").await.unwrap(), left_before);
    assert_eq!(manager.tree_snapshot("right").await.unwrap(), right_before);
}
