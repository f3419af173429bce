//! Detector fan-out and conversion to suspicious activities
//!
//! One orchestrator owns every detector and the lifecycle manager. Each
//! activity tick runs all three detectors against the same snapshot, then
//! creates or refreshes one activity per detector record. The mapping from
//! detector record id to activity id is dropped once the record is no longer
//! open; the activity itself stays with the operator.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::lifecycle::AlertLifecycleManager;
use super::types::{
    CollisionEvidence, Evidence, EvidenceDetails, LoiteringEvidence, NewActivity,
    RendezvousEvidence, Severity, TimelineEntry, TimelineMarker,
};
use crate::collision::{AlertLevel, CollisionAlert, CollisionAlertTracker};
use crate::geo::midpoint;
use crate::loitering::{LoiteringDetector, LoiteringEvent, LoiteringTick};
use crate::rendezvous::{RendezvousDetector, RendezvousEvent, RendezvousTick};
use crate::settings::MonitorSettings;
use crate::vessel::{KinematicSnapshot, VesselId};

/// Outcome of one activity tick
#[derive(Debug, Clone, Default)]
pub struct ActivityTick {
    /// Open collision alerts after the tick
    pub collision_alerts: Vec<CollisionAlert>,
    pub rendezvous: RendezvousTick,
    pub loitering: LoiteringTick,
    /// Activity ids created this tick
    pub created: Vec<String>,
    /// Activity ids whose evidence was refreshed this tick
    pub updated: Vec<String>,
}

/// Counts removed by one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub collision_alerts: usize,
    pub rendezvous_events: usize,
    pub loitering_events: usize,
    pub activities: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.collision_alerts + self.rendezvous_events + self.loitering_events + self.activities
    }
}

pub fn collision_severity(level: AlertLevel) -> Severity {
    match level {
        AlertLevel::Critical => Severity::Critical,
        AlertLevel::Danger => Severity::High,
        AlertLevel::Warning => Severity::Medium,
        AlertLevel::Info => Severity::Low,
    }
}

pub fn rendezvous_severity(event: &RendezvousEvent) -> Severity {
    if event.minimum_distance < 0.1 && event.duration_sec > 600.0 {
        Severity::Critical
    } else if event.duration_sec > 1800.0 {
        Severity::High
    } else {
        Severity::Medium
    }
}

pub fn loitering_severity(event: &LoiteringEvent) -> Severity {
    if event.duration_sec > 43_200.0 && event.max_radius_nm < 0.1 {
        Severity::Critical
    } else if event.duration_sec > 28_800.0 {
        Severity::High
    } else if event.duration_sec > 14_400.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn offset(start: u64, seconds: f64) -> u64 {
    start + (seconds * 1000.0).round() as u64
}

fn collision_evidence(alert: &CollisionAlert) -> Evidence {
    let p = &alert.proximity;
    let description = if p.has_tcpa() {
        format!(
            "Collision risk between {} and {}: {:.2} NM apart, CPA {:.2} NM in {:.1} min",
            alert.vessel_a, alert.vessel_b, p.distance, p.cpa, p.tcpa
        )
    } else {
        format!(
            "Close quarters between {} and {}: {:.2} NM apart",
            alert.vessel_a, alert.vessel_b, p.distance
        )
    };

    let mut timeline = vec![TimelineEntry::new(
        alert.created_at,
        TimelineMarker::Detected,
        format!("{} alert raised", alert.level),
    )];
    if alert.updated_at > alert.created_at {
        timeline.push(TimelineEntry::new(
            alert.updated_at,
            TimelineMarker::Ongoing,
            format!("{} at {:.2} NM", alert.level, p.distance),
        ));
    }

    Evidence {
        description,
        details: EvidenceDetails::Collision(CollisionEvidence {
            alert_id: alert.id.clone(),
            level: alert.level,
            distance_nm: p.distance,
            cpa_nm: p.cpa,
            tcpa_min: p.tcpa,
            bearing: p.bearing,
            relative_speed_kn: p.relative_speed,
        }),
        timeline,
    }
}

fn rendezvous_evidence(event: &RendezvousEvent) -> Evidence {
    let mut timeline = vec![
        TimelineEntry::new(
            event.start_time,
            TimelineMarker::Approach,
            format!("Closed to {:.2} NM at low speed", event.approach_distance),
        ),
        TimelineEntry::new(
            offset(event.start_time, event.duration_sec),
            TimelineMarker::Meeting,
            format!(
                "Alongside for {:.0} min, closest {:.2} NM",
                event.duration_sec / 60.0,
                event.minimum_distance
            ),
        ),
    ];
    if let Some(end) = event.end_time {
        timeline.push(TimelineEntry::new(
            end,
            TimelineMarker::Departure,
            "Vessels separated",
        ));
    }

    Evidence {
        description: format!(
            "Vessels {} and {} met for {:.0} min, closest {:.2} NM",
            event.vessel_a,
            event.vessel_b,
            event.duration_sec / 60.0,
            event.minimum_distance
        ),
        details: EvidenceDetails::Rendezvous(RendezvousEvidence {
            event_id: event.id.clone(),
            duration_sec: event.duration_sec,
            minimum_distance_nm: event.minimum_distance,
            approach_distance_nm: event.approach_distance,
            speeds_a: event.speeds_a,
            speeds_b: event.speeds_b,
            completed: event.is_completed(),
        }),
        timeline,
    }
}

fn loitering_evidence(event: &LoiteringEvent) -> Evidence {
    let mut timeline = vec![TimelineEntry::new(
        event.start_time,
        TimelineMarker::Start,
        format!("Slowed below threshold, {:.1} kn", event.avg_speed),
    )];
    match event.end_time {
        Some(end) => timeline.push(TimelineEntry::new(
            end,
            TimelineMarker::End,
            "Resumed passage",
        )),
        None => timeline.push(TimelineEntry::new(
            offset(event.start_time, event.duration_sec),
            TimelineMarker::Ongoing,
            format!("Within {:.2} NM of centroid", event.max_radius_nm),
        )),
    }

    Evidence {
        description: format!(
            "Vessel {} loitering for {:.1} h within {:.2} NM",
            event.vessel_id,
            event.duration_sec / 3600.0,
            event.max_radius_nm
        ),
        details: EvidenceDetails::Loitering(LoiteringEvidence {
            event_id: event.id.clone(),
            duration_sec: event.duration_sec,
            max_radius_nm: event.max_radius_nm,
            avg_speed_kn: event.avg_speed,
            max_speed_kn: event.max_speed,
            in_anchorage_area: event.in_anchorage_area,
            completed: event.is_completed(),
        }),
        timeline,
    }
}

/// Owns the detectors and the lifecycle manager for one monitored area
#[derive(Debug)]
pub struct ActivityOrchestrator {
    collision: CollisionAlertTracker,
    rendezvous: RendezvousDetector,
    loitering: LoiteringDetector,
    lifecycle: AlertLifecycleManager,
    /// Detector record id -> activity id, for records still open
    linked: HashMap<String, String>,
}

impl ActivityOrchestrator {
    pub fn new(settings: &MonitorSettings) -> Self {
        ActivityOrchestrator {
            collision: CollisionAlertTracker::new(settings.collision.clone()),
            rendezvous: RendezvousDetector::new(
                settings.rendezvous.clone(),
                settings.areas.ports.clone(),
            ),
            loitering: LoiteringDetector::new(
                settings.loitering.clone(),
                settings.areas.anchorages.clone(),
            ),
            lifecycle: AlertLifecycleManager::new(),
            linked: HashMap::new(),
        }
    }

    /// Collision alerts only, for the fast tick
    pub fn collision_tick(&mut self, vessels: &[KinematicSnapshot], now: u64) -> Vec<CollisionAlert> {
        self.collision.update(vessels, now)
    }

    /// Run every detector against one snapshot and fold the results into
    /// activities
    pub fn activity_tick(&mut self, vessels: &[KinematicSnapshot], now: u64) -> ActivityTick {
        let collision_alerts = self.collision.update(vessels, now);
        let rendezvous = self.rendezvous.tick(vessels, now);
        let loitering = self.loitering.tick(vessels, now);

        let mut tick = ActivityTick::default();
        let mut open: HashSet<String> = HashSet::new();

        let positions: HashMap<VesselId, &KinematicSnapshot> =
            vessels.iter().map(|v| (v.vessel_id, v)).collect();

        for alert in &collision_alerts {
            let (Some(a), Some(b)) = (positions.get(&alert.vessel_a), positions.get(&alert.vessel_b))
            else {
                continue;
            };
            open.insert(alert.id.clone());
            self.upsert(
                &alert.id,
                NewActivity {
                    severity: collision_severity(alert.level),
                    vessels: vec![alert.vessel_a, alert.vessel_b],
                    detected_at: now,
                    location: midpoint(&a.position, &b.position),
                    evidence: collision_evidence(alert),
                },
                now,
                &mut tick,
            );
        }

        let duration_threshold = self.rendezvous.settings().duration_threshold;
        let meetings = self
            .rendezvous
            .active_events()
            .into_iter()
            .filter(|e| e.duration_sec >= duration_threshold)
            .chain(rendezvous.completed.iter().cloned());
        for event in meetings {
            if event.in_port_area {
                continue;
            }
            if !event.is_completed() {
                open.insert(event.id.clone());
            }
            self.upsert(
                &event.id,
                NewActivity {
                    severity: rendezvous_severity(&event),
                    vessels: vec![event.vessel_a, event.vessel_b],
                    detected_at: now,
                    location: event.meeting_location,
                    evidence: rendezvous_evidence(&event),
                },
                now,
                &mut tick,
            );
        }

        let dwellers = self
            .loitering
            .active_events()
            .into_iter()
            .chain(loitering.completed.iter().cloned());
        for event in dwellers {
            if event.in_anchorage_area {
                continue;
            }
            if !event.is_completed() {
                open.insert(event.id.clone());
            }
            self.upsert(
                &event.id,
                NewActivity {
                    severity: loitering_severity(&event),
                    vessels: vec![event.vessel_id],
                    detected_at: now,
                    location: event.centroid,
                    evidence: loitering_evidence(&event),
                },
                now,
                &mut tick,
            );
        }

        self.linked.retain(|source, _| open.contains(source));

        tick.collision_alerts = collision_alerts;
        tick.rendezvous = rendezvous;
        tick.loitering = loitering;
        tick
    }

    fn upsert(&mut self, source: &str, new: NewActivity, now: u64, tick: &mut ActivityTick) {
        if let Some(activity_id) = self.linked.get(source) {
            if self.lifecycle.update_evidence(
                activity_id,
                new.evidence,
                new.severity,
                new.location,
                now,
            ) {
                tick.updated.push(activity_id.clone());
            }
            return;
        }
        let activity_id = self.lifecycle.create(new);
        self.linked.insert(source.to_string(), activity_id.clone());
        tick.created.push(activity_id);
    }

    /// Age out closed records everywhere
    pub fn cleanup(&mut self, max_age_hours: f64, collision_grace_minutes: f64, now: u64) -> CleanupReport {
        let report = CleanupReport {
            collision_alerts: self.collision.cleanup(collision_grace_minutes, now),
            rendezvous_events: self.rendezvous.cleanup(max_age_hours, now),
            loitering_events: self.loitering.cleanup(max_age_hours, now),
            activities: self.lifecycle.cleanup(max_age_hours, now),
        };
        if report.total() > 0 {
            log::info!("Cleanup removed {:?}", report);
        }
        report
    }

    pub fn collision(&self) -> &CollisionAlertTracker {
        &self.collision
    }

    pub fn rendezvous(&self) -> &RendezvousDetector {
        &self.rendezvous
    }

    pub fn loitering(&self) -> &LoiteringDetector {
        &self.loitering
    }

    pub fn lifecycle(&self) -> &AlertLifecycleManager {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut AlertLifecycleManager {
        &mut self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::types::{ActivityType, AlertState, HistoryEventType};
    use crate::geo::{destination, NamedArea, Position};

    const T0: u64 = 1_700_000_000_000;
    const TICK: u64 = 30_000;
    const HOUR: u64 = 3_600_000;

    fn orchestrator() -> ActivityOrchestrator {
        ActivityOrchestrator::new(&MonitorSettings::default())
    }

    fn head_on(distance: f64, now: u64) -> Vec<KinematicSnapshot> {
        let a = Position::new(30.0, -40.0);
        let b = destination(&a, 0.0, distance);
        vec![
            KinematicSnapshot::new(1, a, now).with_motion(0.0, 10.0),
            KinematicSnapshot::new(2, b, now).with_motion(180.0, 10.0),
        ]
    }

    fn rendezvous_event(duration_sec: f64, minimum_distance: f64) -> RendezvousEvent {
        RendezvousEvent {
            id: "rendezvous-1-2-0".to_string(),
            vessel_a: 1,
            vessel_b: 2,
            start_time: T0,
            end_time: None,
            meeting_location: Position::new(10.0, 10.0),
            approach_distance: 0.45,
            duration_sec,
            minimum_distance,
            speeds_a: Default::default(),
            speeds_b: Default::default(),
            in_port_area: false,
            port_name: None,
        }
    }

    fn loitering_event(duration_sec: f64, max_radius_nm: f64) -> LoiteringEvent {
        LoiteringEvent {
            id: "loitering-7-0".to_string(),
            vessel_id: 7,
            start_time: T0,
            end_time: None,
            centroid: Position::new(10.0, 10.0),
            duration_sec,
            max_radius_nm,
            avg_speed: 0.5,
            max_speed: 1.0,
            in_anchorage_area: false,
            anchorage_name: None,
        }
    }

    #[test]
    fn test_rendezvous_scoring() {
        assert_eq!(rendezvous_severity(&rendezvous_event(400.0, 0.3)), Severity::Medium);
        assert_eq!(rendezvous_severity(&rendezvous_event(2000.0, 0.3)), Severity::High);
        assert_eq!(rendezvous_severity(&rendezvous_event(700.0, 0.05)), Severity::Critical);
        assert_eq!(rendezvous_severity(&rendezvous_event(500.0, 0.05)), Severity::Medium);
    }

    #[test]
    fn test_loitering_scoring() {
        assert_eq!(loitering_severity(&loitering_event(8000.0, 0.3)), Severity::Low);
        assert_eq!(loitering_severity(&loitering_event(15_000.0, 0.3)), Severity::Medium);
        assert_eq!(loitering_severity(&loitering_event(30_000.0, 0.3)), Severity::High);
        assert_eq!(loitering_severity(&loitering_event(50_000.0, 0.3)), Severity::High);
        assert_eq!(loitering_severity(&loitering_event(50_000.0, 0.05)), Severity::Critical);
    }

    #[test]
    fn test_collision_alert_becomes_activity() {
        let mut orch = orchestrator();
        let tick = orch.activity_tick(&head_on(1.0, T0), T0);

        assert_eq!(tick.collision_alerts.len(), 1);
        assert_eq!(tick.created.len(), 1);

        let activity = orch.lifecycle().get(&tick.created[0]).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Collision);
        assert_eq!(activity.severity, Severity::High);
        assert_eq!(activity.vessels, vec![1, 2]);
        assert_eq!(activity.state, AlertState::New);
    }

    #[test]
    fn test_repeated_ticks_refresh_instead_of_duplicating() {
        let mut orch = orchestrator();
        let first = orch.activity_tick(&head_on(1.0, T0), T0);
        let second = orch.activity_tick(&head_on(0.4, T0 + TICK), T0 + TICK);

        assert!(second.created.is_empty());
        assert_eq!(second.updated, first.created);
        assert_eq!(orch.lifecycle().len(), 1);

        let id = &first.created[0];
        assert_eq!(orch.lifecycle().get(id).unwrap().severity, Severity::Critical);
        let last = orch.lifecycle().history(id).last().unwrap();
        assert_eq!(last.event, HistoryEventType::Updated);
    }

    #[test]
    fn test_departed_vessel_unlinks_activity() {
        let mut orch = orchestrator();
        let first = orch.activity_tick(&head_on(1.0, T0), T0);
        let mut remaining = head_on(1.0, T0 + TICK);
        remaining.truncate(1);
        let second = orch.activity_tick(&remaining, T0 + TICK);

        assert!(second.collision_alerts.is_empty());
        assert!(second.updated.is_empty());
        // The activity stays with the operator
        assert!(orch.lifecycle().get(&first.created[0]).is_some());

        // A new encounter opens a new activity
        let third = orch.activity_tick(&head_on(1.0, T0 + 2 * TICK), T0 + 2 * TICK);
        assert_eq!(third.created.len(), 1);
        assert_ne!(third.created[0], first.created[0]);
    }

    #[test]
    fn test_closed_activity_is_not_refreshed() {
        let mut orch = orchestrator();
        let first = orch.activity_tick(&head_on(1.0, T0), T0);
        let id = first.created[0].clone();
        assert!(orch
            .lifecycle_mut()
            .mark_false_positive(&id, "alice", "escort", T0 + 1));

        let second = orch.activity_tick(&head_on(0.4, T0 + TICK), T0 + TICK);
        assert!(second.updated.is_empty());
        assert_eq!(orch.lifecycle().get(&id).unwrap().severity, Severity::High);
    }

    #[test]
    fn test_loitering_vessel_becomes_activity() {
        let mut orch = orchestrator();
        let center = Position::new(20.0, -30.0);
        let mut created = Vec::new();

        let mut t = T0;
        while t <= T0 + 2 * HOUR + 10 * TICK {
            let step = ((t - T0) / TICK) as f64;
            let p = destination(&center, step * 37.0, 0.15);
            let vessels = vec![KinematicSnapshot::new(7, p, t).with_motion(0.0, 0.8)];
            created.extend(orch.activity_tick(&vessels, t).created);
            t += TICK;
        }

        assert_eq!(created.len(), 1);
        let activity = orch.lifecycle().get(&created[0]).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Loitering);
        assert_eq!(activity.severity, Severity::Low);
        assert_eq!(activity.vessels, vec![7]);
        assert!(activity
            .evidence
            .timeline
            .iter()
            .any(|e| e.marker == TimelineMarker::Start));
    }

    #[test]
    fn test_rendezvous_becomes_activity_and_closes() {
        let mut orch = orchestrator();
        let origin = Position::new(30.0, -40.0);
        let pair = |distance: f64, speed: f64, t: u64| {
            vec![
                KinematicSnapshot::new(1, origin, t).with_motion(90.0, speed),
                KinematicSnapshot::new(2, destination(&origin, 90.0, distance), t)
                    .with_motion(270.0, speed),
            ]
        };

        orch.activity_tick(&pair(3.0, 2.0, T0), T0);
        for i in 1..=13u64 {
            let t = T0 + i * TICK;
            orch.activity_tick(&pair(0.3, 1.0, t), t);
            let found = orch.lifecycle().by_type(ActivityType::Rendezvous).len();
            // Raised once the meeting reaches five minutes
            assert_eq!(found, usize::from(i >= 11), "tick {}", i);
        }
        let t = T0 + 14 * TICK;
        let tick = orch.activity_tick(&pair(1.5, 2.0, t), t);
        assert_eq!(tick.rendezvous.completed.len(), 1);

        let activities = orch.lifecycle().by_type(ActivityType::Rendezvous);
        assert_eq!(activities.len(), 1);
        let activity = &activities[0];
        assert_eq!(activity.severity, Severity::Medium);
        assert_eq!(activity.vessels, vec![1, 2]);
        assert!(tick.updated.contains(&activity.id));
        assert_eq!(
            activity.evidence.timeline.last().map(|e| e.marker),
            Some(TimelineMarker::Departure)
        );
        match &activity.evidence.details {
            EvidenceDetails::Rendezvous(r) => assert!(r.completed),
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_port_meetings_and_anchorage_dwelling_stay_out_of_lifecycle() {
        let origin = Position::new(30.0, -40.0);
        let center = Position::new(20.0, -30.0);
        let mut settings = MonitorSettings::default();
        settings.areas.ports = vec![NamedArea::new("Test Port", 30.0, -40.0, 2.0)];
        settings.areas.anchorages = vec![NamedArea::new("Test Anchorage", 20.0, -30.0, 2.0)];
        let mut orch = ActivityOrchestrator::new(&settings);

        let pair = |distance: f64, speed: f64, t: u64| {
            vec![
                KinematicSnapshot::new(1, origin, t).with_motion(90.0, speed),
                KinematicSnapshot::new(2, destination(&origin, 90.0, distance), t)
                    .with_motion(270.0, speed),
            ]
        };
        orch.activity_tick(&pair(3.0, 2.0, T0), T0);
        for i in 1..=13u64 {
            let t = T0 + i * TICK;
            orch.activity_tick(&pair(0.3, 1.0, t), t);
        }
        let meetings = orch.rendezvous().active_events();
        assert_eq!(meetings.len(), 1);
        assert!(meetings[0].in_port_area);
        assert!(meetings[0].duration_sec >= 300.0);
        assert!(orch.lifecycle().by_type(ActivityType::Rendezvous).is_empty());

        let mut t = T0 + 14 * TICK;
        let end = t + 2 * HOUR + 10 * TICK;
        while t <= end {
            let step = ((t - T0) / TICK) as f64;
            let p = destination(&center, step * 37.0, 0.15);
            let vessels = vec![KinematicSnapshot::new(7, p, t).with_motion(0.0, 0.8)];
            orch.activity_tick(&vessels, t);
            t += TICK;
        }
        let dwelling = orch.loitering().active_events();
        assert_eq!(dwelling.len(), 1);
        assert!(dwelling[0].in_anchorage_area);
        assert_eq!(dwelling[0].anchorage_name.as_deref(), Some("Test Anchorage"));
        assert!(orch.lifecycle().by_type(ActivityType::Loitering).is_empty());
    }

    #[test]
    fn test_cleanup_reaches_every_component() {
        let mut orch = orchestrator();
        let first = orch.activity_tick(&head_on(1.0, T0), T0);
        let id = first.created[0].clone();
        assert!(orch.lifecycle_mut().resolve(&id, "alice", "passed", T0 + 1));
        // Vessels gone, alert resolved
        orch.activity_tick(&[], T0 + TICK);

        let report = orch.cleanup(24.0, 10.0, T0 + 25 * HOUR);
        assert_eq!(report.collision_alerts, 1);
        assert_eq!(report.activities, 1);
        assert!(orch.collision().is_empty());
        assert!(orch.lifecycle().is_empty());
    }
}
