//! Recording a mixed sequence of writes and replaying / reverting it

use pretty_assertions::assert_eq;
use serde_json::json;
use tiledoc_patch::{
    apply_patches, revert_patches, CallEnv, CallIdGenerator, Draft, PatchRecorder,
};

fn initial_tree() -> serde_json::Value {
    json!({
        "tiles": {
            "t1": { "id": "t1", "type": "text", "content": { "text": "hello" } }
        },
        "sharedModelMap": {
            "ds": { "id": "ds", "sharedModel": { "rows": [1, 2] }, "tiles": ["t1"] }
        }
    })
}

#[test]
fn test_recorded_patches_replay_and_revert() {
    let before = initial_tree();
    let mut live = before.clone();
    let mut ids = CallIdGenerator::new("tree");
    let call = CallEnv::root(ids.next_id(), "batch");
    let mut recorder = PatchRecorder::start(&call);

    {
        let mut draft = Draft::new(&mut live, &mut ids, call);
        draft.attach(&mut recorder);

        draft.set("/tiles/t1/content/text", json!("world")).unwrap();
        draft.nested("addRow", |d| {
            d.add("/sharedModelMap/ds/sharedModel/rows/-", json!(3)).unwrap();
        });
        draft
            .add("/tiles/t2", json!({ "id": "t2", "type": "chart", "content": {} }))
            .unwrap();
        draft.add("/sharedModelMap/ds/tiles/-", json!("t2")).unwrap();
        draft.remove("/sharedModelMap/ds/sharedModel/rows/0").unwrap();
    }
    recorder.stop();

    // Forward replay from the pre-action snapshot reproduces the live tree
    let mut replayed = before.clone();
    apply_patches(&mut replayed, &recorder.patches()).unwrap();
    assert_eq!(replayed, live);

    // Reverting restores the pre-action snapshot exactly
    revert_patches(&mut replayed, &recorder.inverse_patches()).unwrap();
    assert_eq!(replayed, before);

    // Two payload touches, membership change not counted
    assert_eq!(recorder.shared_model_modifications().count("ds"), 2);
}

#[test]
fn test_concurrent_recorders_only_see_their_call() {
    let mut live = initial_tree();
    let mut ids = CallIdGenerator::new("tree");
    let first = CallEnv::root(ids.next_id(), "first");
    let second = CallEnv::root(ids.next_id(), "second");
    let mut first_recorder = PatchRecorder::start(&first);
    let mut second_recorder = PatchRecorder::start(&second);

    {
        let mut draft = Draft::new(&mut live, &mut ids, first);
        draft.attach(&mut first_recorder);
        draft.attach(&mut second_recorder);
        draft.set("/tiles/t1/content/text", json!("from first")).unwrap();
    }

    assert_eq!(first_recorder.len(), 1);
    assert!(second_recorder.is_empty());
}

#[test]
fn test_undo_after_partial_failure() {
    let before = initial_tree();
    let mut live = before.clone();
    let mut ids = CallIdGenerator::new("tree");
    let call = CallEnv::root(ids.next_id(), "batch");
    let mut recorder = PatchRecorder::start(&call);

    let result = {
        let mut draft = Draft::new(&mut live, &mut ids, call);
        draft.attach(&mut recorder);
        draft.set("/tiles/t1/content/text", json!("changed")).unwrap();
        draft.set_volatile("/tiles/t1/content/tick", json!(7)).unwrap();
        draft.replace("/tiles/missing/content/text", json!("boom"))
    };

    assert!(result.is_err());
    recorder.undo(&mut live).unwrap();
    assert_eq!(live, before);
}
