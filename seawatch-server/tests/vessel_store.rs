use std::fs;

use seawatch_core::{KinematicSnapshot, Position, VesselSource};
use seawatch_server::VesselStore;
use tempfile::TempDir;

fn report(id: u32, timestamp: u64) -> KinematicSnapshot {
    KinematicSnapshot::new(id, Position::new(51.9, 4.1), timestamp).with_motion(90.0, 8.0)
}

#[test]
fn test_upsert_keeps_newest_report() {
    let store = VesselStore::new();
    store.upsert(report(1, 2_000));
    store.upsert(report(1, 1_000));
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(1).unwrap().timestamp, 2_000);

    store.upsert(report(1, 3_000));
    assert_eq!(store.get(1).unwrap().timestamp, 3_000);
}

#[test]
fn test_prune_and_remove() {
    let store = VesselStore::new();
    store.upsert(report(1, 1_000));
    store.upsert(report(2, 5_000));
    store.upsert(report(3, 9_000));

    assert_eq!(store.prune_older_than(5_000), 1);
    assert!(store.get(1).is_none());
    assert!(store.remove(2).is_some());
    assert!(store.remove(2).is_none());

    let all = store.all_vessels();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].vessel_id, 3);
}

#[test]
fn test_clones_share_state() {
    let store = VesselStore::new();
    let writer = store.clone();
    writer.upsert(report(7, 1_000));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_load_json_lines_skips_bad_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vessels.jsonl");
    fs::write(
        &path,
        concat!(
            r#"{"vesselId":244123456,"position":{"latitude":51.9,"longitude":4.1},"course":90.0,"speed":8.5,"timestamp":1000}"#,
            "\n\n",
            "not json\n",
            r#"{"vesselId":211000111,"position":{"latitude":53.5,"longitude":9.9},"timestamp":1000}"#,
            "\n",
        ),
    )
    .unwrap();

    let store = VesselStore::new();
    assert_eq!(store.load_json_lines(&path).unwrap(), 2);
    assert_eq!(store.get(244_123_456).unwrap().speed, Some(8.5));
    assert_eq!(store.get(211_000_111).unwrap().speed, None);
}
