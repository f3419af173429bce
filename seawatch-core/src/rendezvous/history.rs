//! Rolling vessel and pair history
//!
//! Per-vessel position/speed samples are kept for two hours; per-pair
//! distance samples are capped at [`PAIR_HISTORY_CAPACITY`]. Both exist to
//! answer one question: were these two vessels apart before they met?

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::geo::{haversine_distance, Position};
use crate::vessel::{KinematicSnapshot, PairKey, VesselId};

/// How long vessel and pair samples are retained
pub const HISTORY_RETENTION_MS: u64 = 2 * 60 * 60 * 1000;

/// Maximum samples per pair
pub const PAIR_HISTORY_CAPACITY: usize = 100;

/// Samples of two vessels further apart in time than this are not compared
pub const ALIGNMENT_TOLERANCE_MS: u64 = 60 * 1000;

/// Maximum samples per vessel (two hours at one sample every five seconds)
const VESSEL_HISTORY_CAPACITY: usize = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselSample {
    pub timestamp: u64,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// One distance observation of a pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairSample {
    pub timestamp: u64,
    /// Separation in NM
    pub distance: f64,
    /// Midpoint of the two vessels
    pub location: Position,
}

/// Distance history of one vessel pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairHistory {
    pub key: PairKey,
    pub samples: VecDeque<PairSample>,
    pub first_encounter: u64,
    pub last_update: u64,
}

impl PairHistory {
    fn new(key: PairKey, timestamp: u64) -> Self {
        PairHistory {
            key,
            samples: VecDeque::with_capacity(PAIR_HISTORY_CAPACITY),
            first_encounter: timestamp,
            last_update: timestamp,
        }
    }

    fn push(&mut self, sample: PairSample) {
        if self.samples.len() >= PAIR_HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.last_update = sample.timestamp;
        self.samples.push_back(sample);
    }

    /// Largest separation seen at or after `since`
    pub fn max_distance_since(&self, since: u64) -> Option<f64> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= since)
            .map(|s| s.distance)
            .reduce(f64::max)
    }
}

/// Vessel and pair histories used by the rendezvous detector
#[derive(Debug, Default)]
pub struct PairHistoryTracker {
    vessels: HashMap<VesselId, VecDeque<VesselSample>>,
    pairs: HashMap<PairKey, PairHistory>,
}

impl PairHistoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the vessel's current report. Samples stay sorted by time.
    pub fn record_vessel(&mut self, vessel: &KinematicSnapshot, now: u64) {
        let samples = self.vessels.entry(vessel.vessel_id).or_default();
        if samples.back().is_some_and(|s| s.timestamp >= now) {
            return;
        }
        if samples.len() >= VESSEL_HISTORY_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(VesselSample {
            timestamp: now,
            position: vessel.position,
            speed: vessel.speed(),
        });
    }

    /// Append a distance observation for a pair
    pub fn record_pair(&mut self, key: PairKey, distance: f64, location: Position, now: u64) {
        self.pairs
            .entry(key)
            .or_insert_with(|| PairHistory::new(key, now))
            .push(PairSample {
                timestamp: now,
                distance,
                location,
            });
    }

    /// True if the pair was at least `min_separation` NM apart within the
    /// retention window.
    ///
    /// Checks the pair's own distance samples first, then falls back to
    /// comparing time-aligned samples of both vessels (covers pairs that were
    /// too far apart to be recorded as a pair).
    pub fn was_previously_separated(&self, key: PairKey, min_separation: f64, now: u64) -> bool {
        let since = now.saturating_sub(HISTORY_RETENTION_MS);

        if let Some(max) = self
            .pairs
            .get(&key)
            .and_then(|p| p.max_distance_since(since))
        {
            if max >= min_separation {
                return true;
            }
        }

        let (Some(a), Some(b)) = (self.vessels.get(&key.0), self.vessels.get(&key.1)) else {
            return false;
        };

        a.range(a.partition_point(|s| s.timestamp < since)..)
            .filter_map(|sa| {
                nearest_sample(b, sa.timestamp)
                    .map(|sb| haversine_distance(&sa.position, &sb.position))
            })
            .any(|d| d >= min_separation)
    }

    /// Mean reported speed of a vessel over [from, to), if any samples exist
    pub fn average_speed(&self, vessel: VesselId, from: u64, to: u64) -> Option<f64> {
        let samples = self.vessels.get(&vessel)?;
        let (sum, count) = samples
            .iter()
            .filter(|s| s.timestamp >= from && s.timestamp < to)
            .filter_map(|s| s.speed)
            .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    pub fn vessel_history(&self, vessel: VesselId) -> Option<&VecDeque<VesselSample>> {
        self.vessels.get(&vessel)
    }

    pub fn pair_history(&self, key: PairKey) -> Option<&PairHistory> {
        self.pairs.get(&key)
    }

    /// Drop samples older than the retention window and empty histories
    pub fn prune(&mut self, now: u64) {
        let since = now.saturating_sub(HISTORY_RETENTION_MS);

        self.vessels.retain(|_, samples| {
            while samples.front().is_some_and(|s| s.timestamp < since) {
                samples.pop_front();
            }
            !samples.is_empty()
        });

        self.pairs.retain(|_, history| {
            while history.samples.front().is_some_and(|s| s.timestamp < since) {
                history.samples.pop_front();
            }
            !history.samples.is_empty()
        });
    }

    pub fn vessel_count(&self) -> usize {
        self.vessels.len()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn clear(&mut self) {
        self.vessels.clear();
        self.pairs.clear();
    }
}

/// Closest sample within the alignment tolerance; `samples` is sorted by time
fn nearest_sample(samples: &VecDeque<VesselSample>, timestamp: u64) -> Option<&VesselSample> {
    let idx = samples.partition_point(|s| s.timestamp < timestamp);
    let before = idx.checked_sub(1).and_then(|i| samples.get(i));
    let after = samples.get(idx);
    before
        .into_iter()
        .chain(after)
        .filter(|s| s.timestamp.abs_diff(timestamp) <= ALIGNMENT_TOLERANCE_MS)
        .min_by_key(|s| s.timestamp.abs_diff(timestamp))
}
