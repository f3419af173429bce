//! Loitering detection
//!
//! Tracks each slow vessel's positions, their centroid and the largest
//! distance from it. A vessel that stays slow and inside the radius threshold
//! for the duration threshold gets one active event, refreshed until the
//! vessel speeds up again or drifts beyond the radius threshold.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;
use crate::geo::{centroid, find_area, haversine_distance, NamedArea, Position};
use crate::settings::LoiteringSettings;
use crate::vessel::{KinematicSnapshot, VesselId};

/// Positions older than this are dropped from the dispersion window
pub const POSITION_RETENTION_MS: u64 = 4 * 60 * 60 * 1000;

/// A vessel dwelling in a small area at low speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoiteringEvent {
    pub id: String,
    pub vessel_id: VesselId,
    /// Unix ms when slow tracking began
    pub start_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    pub centroid: Position,
    pub duration_sec: f64,
    /// Largest distance (NM) from the centroid
    pub max_radius_nm: f64,
    pub avg_speed: f64,
    pub max_speed: f64,
    pub in_anchorage_area: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchorage_name: Option<String>,
}

impl LoiteringEvent {
    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Clone)]
struct LoiteringTrack {
    start_time: u64,
    positions: VecDeque<(u64, Position)>,
    speed_sum: f64,
    speed_count: u32,
    max_speed: f64,
    centroid: Position,
    max_radius: f64,
    event: Option<LoiteringEvent>,
}

impl LoiteringTrack {
    fn new(position: Position, speed: f64, now: u64) -> Self {
        let mut positions = VecDeque::new();
        positions.push_back((now, position));
        LoiteringTrack {
            start_time: now,
            positions,
            speed_sum: speed,
            speed_count: 1,
            max_speed: speed,
            centroid: position,
            max_radius: 0.0,
            event: None,
        }
    }

    fn add(&mut self, position: Position, speed: f64, now: u64) {
        self.positions.push_back((now, position));
        let since = now.saturating_sub(POSITION_RETENTION_MS);
        while self.positions.front().is_some_and(|(t, _)| *t < since) {
            self.positions.pop_front();
        }

        self.speed_sum += speed;
        self.speed_count += 1;
        self.max_speed = self.max_speed.max(speed);

        if let Some(c) = centroid(self.positions.iter().map(|(_, p)| p)) {
            self.centroid = c;
        }
        self.max_radius = self
            .positions
            .iter()
            .map(|(_, p)| haversine_distance(&self.centroid, p))
            .fold(0.0, f64::max);
    }

    fn elapsed_sec(&self, now: u64) -> f64 {
        now.saturating_sub(self.start_time) as f64 / 1000.0
    }

    fn avg_speed(&self) -> f64 {
        if self.speed_count == 0 {
            0.0
        } else {
            self.speed_sum / self.speed_count as f64
        }
    }
}

enum SlowOutcome {
    Started(LoiteringEvent),
    /// Left the radius while an event was open
    Drifted,
}

/// Events produced by one loitering tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoiteringTick {
    pub started: Vec<LoiteringEvent>,
    pub completed: Vec<LoiteringEvent>,
}

/// Per-vessel loitering state machine
#[derive(Debug)]
pub struct LoiteringDetector {
    settings: LoiteringSettings,
    anchorages: Vec<NamedArea>,
    tracks: HashMap<VesselId, LoiteringTrack>,
    completed: Vec<LoiteringEvent>,
}

impl LoiteringDetector {
    pub fn new(settings: LoiteringSettings, anchorages: Vec<NamedArea>) -> Self {
        LoiteringDetector {
            settings,
            anchorages,
            tracks: HashMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn settings(&self) -> &LoiteringSettings {
        &self.settings
    }

    /// Run one tick. A failed tick is logged and yields no events.
    pub fn tick(&mut self, vessels: &[KinematicSnapshot], now: u64) -> LoiteringTick {
        match self.try_tick(vessels, now) {
            Ok(tick) => tick,
            Err(e) => {
                log::error!("Loitering tick failed: {}", e);
                LoiteringTick::default()
            }
        }
    }

    pub fn try_tick(
        &mut self,
        vessels: &[KinematicSnapshot],
        now: u64,
    ) -> Result<LoiteringTick, DetectionError> {
        let radius_limit = self.settings.radius_threshold;
        if !(radius_limit.is_finite() && radius_limit > 0.0) {
            return Err(DetectionError::InvalidSetting {
                name: "radiusThreshold",
                value: radius_limit,
            });
        }

        let present: HashSet<VesselId> = vessels.iter().map(|v| v.vessel_id).collect();
        self.tracks.retain(|id, track| {
            if present.contains(id) {
                return true;
            }
            if let Some(event) = &track.event {
                log::debug!("Vessel {} departed, dropping loitering event {}", id, event.id);
            }
            false
        });

        let mut tick = LoiteringTick::default();
        for vessel in vessels {
            if !vessel.position.is_valid() {
                continue;
            }
            // Unknown speed: hold the current state until a usable report
            let Some(speed) = vessel.speed() else {
                continue;
            };

            if speed >= self.settings.speed_threshold {
                if let Some(event) = self.finish(vessel.vessel_id, now) {
                    tick.completed.push(event);
                }
                continue;
            }

            match self.observe_slow(vessel, speed, now) {
                Some(SlowOutcome::Started(event)) => tick.started.push(event),
                Some(SlowOutcome::Drifted) => {
                    if let Some(event) = self.finish(vessel.vessel_id, now) {
                        tick.completed.push(event);
                    }
                }
                None => {}
            }
        }

        Ok(tick)
    }

    fn observe_slow(
        &mut self,
        vessel: &KinematicSnapshot,
        speed: f64,
        now: u64,
    ) -> Option<SlowOutcome> {
        let id = vessel.vessel_id;
        let track = self
            .tracks
            .entry(id)
            .or_insert_with(|| LoiteringTrack::new(vessel.position, speed, now));
        if track.start_time != now {
            track.add(vessel.position, speed, now);
        }

        // Drifting out of the radius restarts the window, or ends an open event
        if track.max_radius > self.settings.radius_threshold {
            if track.event.is_some() {
                return Some(SlowOutcome::Drifted);
            }
            *track = LoiteringTrack::new(vessel.position, speed, now);
            return None;
        }

        let elapsed = track.elapsed_sec(now);
        let avg_speed = track.avg_speed();
        if let Some(event) = track.event.as_mut() {
            event.duration_sec = elapsed;
            event.centroid = track.centroid;
            event.max_radius_nm = track.max_radius;
            event.avg_speed = avg_speed;
            event.max_speed = track.max_speed;
            return None;
        }
        if elapsed < self.settings.duration_threshold {
            return None;
        }

        let anchorage = find_area(&self.anchorages, &track.centroid);
        let event = LoiteringEvent {
            id: format!("loitering-{}-{}", id, track.start_time),
            vessel_id: id,
            start_time: track.start_time,
            end_time: None,
            centroid: track.centroid,
            duration_sec: elapsed,
            max_radius_nm: track.max_radius,
            avg_speed,
            max_speed: track.max_speed,
            in_anchorage_area: anchorage.is_some(),
            anchorage_name: anchorage.map(|a| a.name.clone()),
        };
        log::info!(
            "Vessel {} loitering for {:.0}s within {:.2} NM{}",
            id,
            elapsed,
            track.max_radius,
            if event.in_anchorage_area { " (anchorage)" } else { "" }
        );
        track.event = Some(event.clone());
        Some(SlowOutcome::Started(event))
    }

    /// Vessel sped up: finalize its event, or just forget the transient state
    fn finish(&mut self, id: VesselId, now: u64) -> Option<LoiteringEvent> {
        let track = self.tracks.remove(&id)?;
        let mut event = track.event?;
        event.end_time = Some(now);
        event.duration_sec = now.saturating_sub(event.start_time) as f64 / 1000.0;
        log::info!(
            "Loitering {} ended after {:.0}s",
            event.id,
            event.duration_sec
        );
        self.completed.push(event.clone());
        Some(event)
    }

    pub fn active_events(&self) -> Vec<LoiteringEvent> {
        self.tracks
            .values()
            .filter_map(|t| t.event.clone())
            .collect()
    }

    pub fn completed_events(&self) -> &[LoiteringEvent] {
        &self.completed
    }

    pub fn events_for_vessel(&self, vessel: VesselId) -> Vec<LoiteringEvent> {
        self.tracks
            .get(&vessel)
            .and_then(|t| t.event.clone())
            .into_iter()
            .chain(
                self.completed
                    .iter()
                    .filter(|e| e.vessel_id == vessel)
                    .cloned(),
            )
            .collect()
    }

    /// Number of vessels currently tracked as slow
    pub fn tracked_vessels(&self) -> usize {
        self.tracks.len()
    }

    /// Drop completed events that ended more than `max_age_hours` ago
    pub fn cleanup(&mut self, max_age_hours: f64, now: u64) -> usize {
        let cutoff = now.saturating_sub((max_age_hours * 3_600_000.0) as u64);
        let before = self.completed.len();
        self.completed
            .retain(|e| e.end_time.map_or(true, |end| end >= cutoff));
        before - self.completed.len()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.completed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::destination;

    const T0: u64 = 1_700_000_000_000;
    const TICK: u64 = 30_000;

    fn vessel(position: Position, speed: f64) -> KinematicSnapshot {
        KinematicSnapshot::new(7, position, T0).with_motion(0.0, speed)
    }

    fn detector() -> LoiteringDetector {
        LoiteringDetector::new(LoiteringSettings::default(), Vec::new())
    }

    /// Circle a center at 0.15 NM for `seconds`, one report per tick
    fn circle(
        detector: &mut LoiteringDetector,
        center: Position,
        start: u64,
        seconds: u64,
    ) -> (u64, Vec<LoiteringEvent>) {
        let mut started = Vec::new();
        let mut t = start;
        let mut step = 0u64;
        while t <= start + seconds * 1000 {
            let bearing = (step * 15 % 360) as f64;
            let p = destination(&center, bearing, 0.15);
            started.extend(detector.tick(&[vessel(p, 0.8)], t).started);
            t += TICK;
            step += 1;
        }
        (t, started)
    }

    #[test]
    fn test_dwelling_vessel_raises_one_event_then_completes() {
        let mut detector = detector();
        let center = Position::new(30.0, -40.0);
        let (t, started) = circle(&mut detector, center, T0, 9000);

        assert_eq!(started.len(), 1);
        let active = detector.active_events();
        assert_eq!(active.len(), 1);
        assert!(active[0].max_radius_nm <= 0.2, "radius {}", active[0].max_radius_nm);
        assert!(active[0].duration_sec >= 9000.0);
        assert!(!active[0].in_anchorage_area);
        assert!(haversine_distance(&active[0].centroid, &center) < 0.05);

        let tick = detector.tick(&[vessel(destination(&center, 0.0, 0.5), 9.0)], t);
        assert_eq!(tick.completed.len(), 1);
        assert_eq!(tick.completed[0].end_time, Some(t));
        assert!(detector.active_events().is_empty());
        assert_eq!(detector.completed_events().len(), 1);
    }

    #[test]
    fn test_slow_drift_out_of_radius_completes_event() {
        let mut detector = detector();
        let center = Position::new(30.0, -40.0);
        let (mut t, started) = circle(&mut detector, center, T0, 9000);
        assert_eq!(started.len(), 1);

        // 1.5 knots due east, still below the speed threshold
        let mut p = destination(&center, 90.0, 0.15);
        let mut completed = Vec::new();
        for _ in 0..240 {
            let tick = detector.tick(&[vessel(p, 1.5)], t);
            assert!(tick.started.is_empty());
            completed.extend(tick.completed);
            if !completed.is_empty() {
                break;
            }
            p = destination(&p, 90.0, 1.5 * 30.0 / 3600.0);
            t += TICK;
        }

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].end_time, Some(t));
        assert!(completed[0].max_radius_nm <= 1.0, "radius {}", completed[0].max_radius_nm);
        assert!(detector.active_events().is_empty());
        assert_eq!(detector.completed_events().len(), 1);
    }

    #[test]
    fn test_speeding_up_before_threshold_leaves_nothing() {
        let mut detector = detector();
        let center = Position::new(30.0, -40.0);
        let (t, started) = circle(&mut detector, center, T0, 3600);
        assert!(started.is_empty());
        let tick = detector.tick(&[vessel(center, 9.0)], t);
        assert!(tick.completed.is_empty());
        assert_eq!(detector.tracked_vessels(), 0);
    }

    #[test]
    fn test_slow_transit_never_loiters() {
        let mut detector = detector();
        let mut p = Position::new(30.0, -40.0);
        let mut t = T0;
        // 1.5 knots in a straight line for four hours
        for _ in 0..480 {
            assert!(detector.tick(&[vessel(p, 1.5)], t).started.is_empty());
            p = destination(&p, 90.0, 1.5 * 30.0 / 3600.0);
            t += TICK;
        }
        assert!(detector.active_events().is_empty());
    }

    #[test]
    fn test_absent_vessel_state_dropped() {
        let mut detector = detector();
        let center = Position::new(30.0, -40.0);
        let (t, _) = circle(&mut detector, center, T0, 9000);
        assert_eq!(detector.active_events().len(), 1);

        detector.tick(&[], t);
        assert!(detector.active_events().is_empty());
        assert!(detector.completed_events().is_empty());
    }

    #[test]
    fn test_anchorage_tagged_not_suppressed() {
        let center = Position::new(30.0, -40.0);
        let anchorage = NamedArea::new("Test Anchorage", 30.0, -40.0, 2.0);
        let mut detector = LoiteringDetector::new(LoiteringSettings::default(), vec![anchorage]);
        let (_, started) = circle(&mut detector, center, T0, 7300);
        assert_eq!(started.len(), 1);
        assert!(started[0].in_anchorage_area);
        assert_eq!(started[0].anchorage_name.as_deref(), Some("Test Anchorage"));
    }

    #[test]
    fn test_unknown_speed_holds_state() {
        let mut detector = detector();
        let center = Position::new(30.0, -40.0);
        detector.tick(&[vessel(center, 0.5)], T0);
        let mut unknown = vessel(center, 0.0);
        unknown.speed = None;
        detector.tick(&[unknown], T0 + TICK);
        assert_eq!(detector.tracked_vessels(), 1);
    }
}
