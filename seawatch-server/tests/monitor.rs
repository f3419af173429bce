use std::collections::BTreeMap;
use std::time::Duration;

use seawatch_core::activity::{ActivityType, AlertState, HistoryEventType, Severity};
use seawatch_core::geo::destination;
use seawatch_core::{KinematicSnapshot, MonitorSettings, Position};
use seawatch_server::monitor::UpdateKind;
use seawatch_server::{now_millis, ActivityFilter, MonitorError, MonitorService, VesselStore};

fn head_on_store() -> VesselStore {
    let now = now_millis();
    let a = Position::new(30.0, -40.0);
    let b = destination(&a, 0.0, 1.0);
    let store = VesselStore::new();
    store.upsert(KinematicSnapshot::new(1, a, now).with_motion(0.0, 10.0));
    store.upsert(KinematicSnapshot::new(2, b, now).with_motion(180.0, 10.0));
    store
}

#[tokio::test]
async fn test_tick_turns_collision_into_pending_activity() {
    let (service, handle) = MonitorService::new(&MonitorSettings::default(), head_on_store());
    let task = tokio::spawn(service.run());

    let update = handle.tick().await.unwrap();
    assert_eq!(update.kind, UpdateKind::Activity);
    assert_eq!(update.vessel_count, 2);
    assert_eq!(update.collision_alerts.len(), 1);

    let pending = handle.activities(ActivityFilter::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].activity_type, ActivityType::Collision);
    assert_eq!(pending[0].severity, Severity::High);

    handle.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_lifecycle_through_handle() {
    let (service, handle) = MonitorService::new(&MonitorSettings::default(), head_on_store());
    let task = tokio::spawn(service.run());

    handle.tick().await.unwrap();
    let id = handle.activities(ActivityFilter::All).await.unwrap()[0].id.clone();

    assert!(handle.acknowledge(&id, "alice").await);
    assert!(!handle.acknowledge(&id, "alice").await);
    assert!(handle.investigate(&id, "alice").await);
    assert!(handle.add_note(&id, "alice", "hailed on VHF 16").await);
    assert!(handle.escalate(&id, "alice", "VTS", "no response").await);
    assert!(handle.resolve(&id, "bob", "vessels passed clear").await);
    assert!(!handle.resolve(&id, "bob", "again").await);

    let activity = handle.activity(&id).await.unwrap().unwrap();
    assert_eq!(activity.state, AlertState::Resolved);
    assert_eq!(activity.notes.len(), 1);

    let history = handle.history(&id).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|h| h.event).collect();
    assert_eq!(
        kinds,
        vec![
            HistoryEventType::Created,
            HistoryEventType::Acknowledged,
            HistoryEventType::InvestigationStarted,
            HistoryEventType::NoteAdded,
            HistoryEventType::Escalated,
            HistoryEventType::Resolved,
        ]
    );
    assert!(handle.activities(ActivityFilter::Active).await.unwrap().is_empty());

    handle.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_operator_raised_activity() {
    let (service, handle) = MonitorService::new(&MonitorSettings::default(), VesselStore::new());
    let task = tokio::spawn(service.run());

    let mut metrics = BTreeMap::new();
    metrics.insert("darkHours".to_string(), 6.0);
    let id = handle
        .create_other(
            Severity::Medium,
            vec![244_123_456],
            Position::new(52.0, 3.5),
            "AIS gap reported by patrol",
            metrics,
        )
        .await
        .unwrap();

    let stats = handle.statistics().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 1);

    let by_vessel = handle
        .activities(ActivityFilter::Vessel(244_123_456))
        .await
        .unwrap();
    assert_eq!(by_vessel.len(), 1);
    assert_eq!(by_vessel[0].id, id);
    assert_eq!(by_vessel[0].evidence.metrics()["darkHours"], 6.0);

    handle.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_updates_are_broadcast() {
    let (service, handle) = MonitorService::new(&MonitorSettings::default(), head_on_store());
    let mut rx = handle.subscribe();
    let task = tokio::spawn(service.run());

    let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no update within timeout")
        .unwrap();
    assert_eq!(update.vessel_count, 2);

    handle.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_completed_loitering_reaches_updates() {
    let mut settings = MonitorSettings::default();
    settings.loitering.duration_threshold = 0.001;
    let position = Position::new(30.0, -40.0);
    let store = VesselStore::new();
    store.upsert(KinematicSnapshot::new(9, position, now_millis()).with_motion(0.0, 0.5));

    let (service, handle) = MonitorService::new(&settings, store.clone());
    let task = tokio::spawn(service.run());

    handle.tick().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let update = handle.tick().await.unwrap();
    assert_eq!(update.loitering_events.len(), 1);
    assert!(update.completed_loitering.is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    store.upsert(KinematicSnapshot::new(9, position, now_millis()).with_motion(0.0, 9.0));
    let update = handle.tick().await.unwrap();
    assert!(update.loitering_events.is_empty());
    assert_eq!(update.completed_loitering.len(), 1);
    assert_eq!(update.completed_loitering[0].vessel_id, 9);
    assert!(update.completed_loitering[0].end_time.is_some());
    assert!(update.completed_rendezvous.is_empty());

    handle.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stopped_service_rejects_commands() {
    let (service, handle) = MonitorService::new(&MonitorSettings::default(), head_on_store());
    let task = tokio::spawn(service.run());

    handle.tick().await.unwrap();
    let id = handle.activities(ActivityFilter::All).await.unwrap()[0].id.clone();

    handle.stop();
    assert!(handle.is_stopped());
    task.await.unwrap().unwrap();

    assert!(!handle.acknowledge(&id, "alice").await);
    assert_eq!(handle.statistics().await.unwrap_err(), MonitorError::Stopped);
}
