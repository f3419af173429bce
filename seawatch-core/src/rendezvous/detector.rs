//! Rendezvous detection
//!
//! A meeting opens when two previously separated vessels come within the
//! proximity threshold at low speed, is extended while they stay close, and
//! is finalized when they part again. Meetings shorter than the duration
//! threshold are dropped as noise, as are meetings inside a port circle.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::history::PairHistoryTracker;
use crate::error::DetectionError;
use crate::geo::{find_area, haversine_distance, midpoint, NamedArea, Position};
use crate::settings::RendezvousSettings;
use crate::spatial::Quadtree;
use crate::vessel::{KinematicSnapshot, PairKey, VesselId};

/// Window used for the pre-encounter average speed
const PRE_ENCOUNTER_WINDOW_MS: u64 = 10 * 60 * 1000;

/// Pairs within this multiple of `min_separation_before` get distance history
const WATCH_RADIUS_FACTOR: f64 = 2.0;

/// Speed of one vessel before, during and after a meeting (knots)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub during: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<f64>,
}

/// A close, slow meeting between two vessels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendezvousEvent {
    pub id: String,
    pub vessel_a: VesselId,
    pub vessel_b: VesselId,
    /// Unix ms
    pub start_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    /// Midpoint of both vessels when the meeting opened
    pub meeting_location: Position,
    /// Separation (NM) when the meeting opened
    pub approach_distance: f64,
    pub duration_sec: f64,
    /// Smallest separation (NM) seen during the meeting
    pub minimum_distance: f64,
    pub speeds_a: SpeedProfile,
    pub speeds_b: SpeedProfile,
    pub in_port_area: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
}

impl RendezvousEvent {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.vessel_a, self.vessel_b)
    }

    pub fn involves(&self, id: VesselId) -> bool {
        self.vessel_a == id || self.vessel_b == id
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Clone)]
struct ActiveMeeting {
    event: RendezvousEvent,
    speed_sum_a: f64,
    speed_sum_b: f64,
    samples: u32,
}

impl ActiveMeeting {
    fn extend(&mut self, distance: f64, speed_a: f64, speed_b: f64, now: u64) {
        self.speed_sum_a += speed_a;
        self.speed_sum_b += speed_b;
        self.samples += 1;

        let event = &mut self.event;
        event.duration_sec = now.saturating_sub(event.start_time) as f64 / 1000.0;
        event.minimum_distance = event.minimum_distance.min(distance);
        event.speeds_a.during = Some(self.speed_sum_a / self.samples as f64);
        event.speeds_b.during = Some(self.speed_sum_b / self.samples as f64);
    }
}

/// Events produced by one rendezvous tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RendezvousTick {
    /// Meetings opened this tick
    pub started: Vec<RendezvousEvent>,
    /// Meetings finalized this tick (port meetings excluded)
    pub completed: Vec<RendezvousEvent>,
}

/// Per-pair rendezvous state machine
#[derive(Debug)]
pub struct RendezvousDetector {
    settings: RendezvousSettings,
    ports: Vec<NamedArea>,
    history: PairHistoryTracker,
    active: HashMap<PairKey, ActiveMeeting>,
    completed: Vec<RendezvousEvent>,
}

impl RendezvousDetector {
    pub fn new(settings: RendezvousSettings, ports: Vec<NamedArea>) -> Self {
        RendezvousDetector {
            settings,
            ports,
            history: PairHistoryTracker::new(),
            active: HashMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RendezvousSettings {
        &self.settings
    }

    pub fn history(&self) -> &PairHistoryTracker {
        &self.history
    }

    /// Run one tick. A failed tick is logged and yields no events.
    pub fn tick(&mut self, vessels: &[KinematicSnapshot], now: u64) -> RendezvousTick {
        match self.try_tick(vessels, now) {
            Ok(tick) => tick,
            Err(e) => {
                log::error!("Rendezvous tick failed: {}", e);
                RendezvousTick::default()
            }
        }
    }

    pub fn try_tick(
        &mut self,
        vessels: &[KinematicSnapshot],
        now: u64,
    ) -> Result<RendezvousTick, DetectionError> {
        let proximity = self.settings.proximity_threshold;
        if !(proximity.is_finite() && proximity > 0.0) {
            return Err(DetectionError::InvalidSetting {
                name: "proximityThreshold",
                value: proximity,
            });
        }
        let watch_radius = (self.settings.min_separation_before * WATCH_RADIUS_FACTOR).max(proximity);

        let by_id: HashMap<VesselId, &KinematicSnapshot> = vessels
            .iter()
            .filter(|v| v.position.is_valid())
            .map(|v| (v.vessel_id, v))
            .collect();

        let mut index = Quadtree::world();
        for (id, vessel) in &by_id {
            if !index.insert(*id, vessel.position) {
                return Err(DetectionError::IndexRejected(*id));
            }
        }

        let mut tick = RendezvousTick::default();
        let mut seen: HashSet<PairKey> = HashSet::new();
        let mut proximate: HashSet<PairKey> = HashSet::new();

        for (id, vessel) in &by_id {
            for other_id in index.query_around(&vessel.position, watch_radius) {
                if other_id == *id {
                    continue;
                }
                let key = PairKey::new(*id, other_id);
                if !seen.insert(key) {
                    continue;
                }
                let (Some(a), Some(b)) = (by_id.get(&key.0), by_id.get(&key.1)) else {
                    continue;
                };

                let distance = haversine_distance(&a.position, &b.position);
                if !distance.is_finite() {
                    return Err(DetectionError::NonFinite {
                        quantity: "distance",
                        a: key.0,
                        b: key.1,
                    });
                }
                if distance > watch_radius {
                    continue;
                }
                let location = midpoint(&a.position, &b.position);
                self.history.record_pair(key, distance, location, now);

                if distance <= proximity {
                    proximate.insert(key);
                    if let Some(started) = self.observe_close_pair(key, a, b, distance, location, now)
                    {
                        tick.started.push(started);
                    }
                }
            }
        }

        let parted: Vec<PairKey> = self
            .active
            .keys()
            .filter(|key| !proximate.contains(key))
            .copied()
            .collect();
        for key in parted {
            let speeds = (
                by_id.get(&key.0).and_then(|v| v.speed()),
                by_id.get(&key.1).and_then(|v| v.speed()),
            );
            if let Some(event) = self.finish(key, speeds, now) {
                tick.completed.push(event);
            }
        }

        for vessel in by_id.values() {
            self.history.record_vessel(vessel, now);
        }
        self.history.prune(now);

        Ok(tick)
    }

    /// Extend an open meeting or open a new one. Returns a newly opened event.
    fn observe_close_pair(
        &mut self,
        key: PairKey,
        a: &KinematicSnapshot,
        b: &KinematicSnapshot,
        distance: f64,
        location: Position,
        now: u64,
    ) -> Option<RendezvousEvent> {
        let speed_a = a.speed_or_zero();
        let speed_b = b.speed_or_zero();

        if let Some(meeting) = self.active.get_mut(&key) {
            meeting.extend(distance, speed_a, speed_b, now);
            return None;
        }

        if speed_a >= self.settings.speed_threshold || speed_b >= self.settings.speed_threshold {
            return None;
        }
        if !self
            .history
            .was_previously_separated(key, self.settings.min_separation_before, now)
        {
            return None;
        }

        let window_start = now.saturating_sub(PRE_ENCOUNTER_WINDOW_MS);
        let before_a = self
            .history
            .average_speed(key.0, window_start, now)
            .or(a.speed());
        let before_b = self
            .history
            .average_speed(key.1, window_start, now)
            .or(b.speed());

        let port = find_area(&self.ports, &location);
        let event = RendezvousEvent {
            id: format!("rendezvous-{}-{}", key, now),
            vessel_a: key.0,
            vessel_b: key.1,
            start_time: now,
            end_time: None,
            meeting_location: location,
            approach_distance: distance,
            duration_sec: 0.0,
            minimum_distance: distance,
            speeds_a: SpeedProfile {
                before: before_a,
                during: Some(speed_a),
                after: None,
            },
            speeds_b: SpeedProfile {
                before: before_b,
                during: Some(speed_b),
                after: None,
            },
            in_port_area: port.is_some(),
            port_name: port.map(|p| p.name.clone()),
        };

        log::info!(
            "Rendezvous {} opened: {} and {} at {:.2} NM{}",
            event.id,
            key.0,
            key.1,
            distance,
            match &event.port_name {
                Some(name) => format!(" (inside {})", name),
                None => String::new(),
            }
        );

        self.active.insert(
            key,
            ActiveMeeting {
                event: event.clone(),
                speed_sum_a: speed_a,
                speed_sum_b: speed_b,
                samples: 1,
            },
        );
        Some(event)
    }

    /// Close a meeting whose vessels parted (or one of them vanished)
    fn finish(
        &mut self,
        key: PairKey,
        (after_a, after_b): (Option<f64>, Option<f64>),
        now: u64,
    ) -> Option<RendezvousEvent> {
        let meeting = self.active.remove(&key)?;
        let mut event = meeting.event;
        event.duration_sec = now.saturating_sub(event.start_time) as f64 / 1000.0;

        if event.duration_sec < self.settings.duration_threshold {
            log::debug!(
                "Discarding rendezvous {} after {:.0}s (too brief)",
                event.id,
                event.duration_sec
            );
            return None;
        }

        event.end_time = Some(now);
        event.speeds_a.after = after_a;
        event.speeds_b.after = after_b;

        if event.in_port_area {
            log::debug!(
                "Suppressing rendezvous {} inside {}",
                event.id,
                event.port_name.as_deref().unwrap_or("port")
            );
            return None;
        }

        log::info!(
            "Rendezvous {} completed: {:.0}s, closest {:.2} NM",
            event.id,
            event.duration_sec,
            event.minimum_distance
        );
        self.completed.push(event.clone());
        Some(event)
    }

    /// Meetings currently in progress
    pub fn active_events(&self) -> Vec<RendezvousEvent> {
        self.active.values().map(|m| m.event.clone()).collect()
    }

    pub fn completed_events(&self) -> &[RendezvousEvent] {
        &self.completed
    }

    pub fn events_for_vessel(&self, vessel: VesselId) -> Vec<RendezvousEvent> {
        self.active
            .values()
            .map(|m| &m.event)
            .chain(self.completed.iter())
            .filter(|e| e.involves(vessel))
            .cloned()
            .collect()
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
        self.history.clear();
        self.active.clear();
        self.completed.clear();
    }
}
