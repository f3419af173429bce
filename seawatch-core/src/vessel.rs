//! Vessel kinematic snapshots and the snapshot source seam

use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// Vessel identifier (MMSI)
pub type VesselId = u32;

/// One vessel's normalized position/kinematic report for a tick.
///
/// Produced by the upstream AIS decoder; the core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinematicSnapshot {
    pub vessel_id: VesselId,
    pub position: Position,
    /// Course over ground in degrees (0-360)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Speed over ground in knots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// True heading in degrees (0-360)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Unix timestamp in milliseconds of the report
    pub timestamp: u64,
}

impl KinematicSnapshot {
    pub fn new(vessel_id: VesselId, position: Position, timestamp: u64) -> Self {
        KinematicSnapshot {
            vessel_id,
            position,
            course: None,
            speed: None,
            heading: None,
            timestamp,
        }
    }

    /// Set course and speed over ground
    pub fn with_motion(mut self, course: f64, speed: f64) -> Self {
        self.course = Some(course);
        self.speed = Some(speed);
        self
    }

    /// Course if present and usable
    pub fn course(&self) -> Option<f64> {
        self.course.filter(|c| c.is_finite())
    }

    /// Speed if present and usable (negative speeds are treated as unknown)
    pub fn speed(&self) -> Option<f64> {
        self.speed.filter(|s| s.is_finite() && *s >= 0.0)
    }

    /// Speed, degrading unknown to 0 knots
    pub fn speed_or_zero(&self) -> f64 {
        self.speed().unwrap_or(0.0)
    }
}

/// Source of the vessel snapshot pulled once per tick.
///
/// The service implements this over its live vessel store; tests pass plain
/// vectors.
pub trait VesselSource {
    fn all_vessels(&self) -> Vec<KinematicSnapshot>;
}

impl VesselSource for Vec<KinematicSnapshot> {
    fn all_vessels(&self) -> Vec<KinematicSnapshot> {
        self.clone()
    }
}

impl VesselSource for [KinematicSnapshot] {
    fn all_vessels(&self) -> Vec<KinematicSnapshot> {
        self.to_vec()
    }
}

/// Sorted vessel pair, so (A, B) and (B, A) share one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(pub VesselId, pub VesselId);

impl PairKey {
    pub fn new(a: VesselId, b: VesselId) -> Self {
        if a <= b {
            PairKey(a, b)
        } else {
            PairKey(b, a)
        }
    }

    pub fn contains(&self, id: VesselId) -> bool {
        self.0 == id || self.1 == id
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}
