use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use tiledoc_patch::{apply_patches, CallEnv, CallIdGenerator, Draft, PatchRecorder};

fn tree_with_tiles(count: usize) -> serde_json::Value {
    let mut tiles = serde_json::Map::new();
    for i in 0..count {
        let id = format!("t{}", i);
        tiles.insert(id.clone(), json!({ "id": id, "type": "text", "content": { "text": "" } }));
    }
    json!({ "tiles": tiles, "sharedModelMap": {} })
}

fn record_writes(c: &mut Criterion) {
    c.bench_function("record_100_field_writes", |b| {
        b.iter(|| {
            let mut tree = tree_with_tiles(100);
            let mut ids = CallIdGenerator::new("bench");
            let call = CallEnv::root(ids.next_id(), "batch");
            let mut recorder = PatchRecorder::start(&call);
            {
                let mut draft = Draft::new(&mut tree, &mut ids, call);
                draft.attach(&mut recorder);
                for i in 0..100 {
                    let path = format!("/tiles/t{}/content/text", i);
                    draft.set(&path, json!(i)).unwrap();
                }
            }
            black_box(recorder.len())
        })
    });
}

fn replay_patches(c: &mut Criterion) {
    let mut source = tree_with_tiles(100);
    let mut ids = CallIdGenerator::new("bench");
    let call = CallEnv::root(ids.next_id(), "batch");
    let mut recorder = PatchRecorder::start(&call);
    {
        let mut draft = Draft::new(&mut source, &mut ids, call);
        draft.attach(&mut recorder);
        for i in 0..100 {
            let path = format!("/tiles/t{}/content/text", i);
            draft.set(&path, json!(i)).unwrap();
        }
    }
    let patches = recorder.patches();

    c.bench_function("replay_100_patches", |b| {
        b.iter(|| {
            let mut tree = tree_with_tiles(100);
            apply_patches(&mut tree, black_box(&patches)).unwrap();
        })
    });
}

criterion_group!(benches, record_writes, replay_patches);
criterion_main!(benches);
