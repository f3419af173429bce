//! Pairwise proximity and CPA/TCPA prediction
//!
//! The relative speed is the length of the velocity-difference vector when
//! both courses are known (law of cosines on the two speeds and the course
//! difference), and the plain speed difference when either course is
//! missing. It is used as a closing speed without projecting it onto the
//! line of sight. The time to CPA is the time needed to close the current
//! range at that speed, and the CPA is the distance between both
//! dead-reckoned positions at that time. Crossing geometries therefore get a
//! coarse TCPA.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;
use crate::geo::{dead_reckon, haversine_distance, initial_bearing, midpoint, normalize_bearing, Position};
use crate::settings::CollisionSettings;
use crate::spatial::Quadtree;
use crate::vessel::{KinematicSnapshot, PairKey, VesselId};

/// Below this relative speed (knots) a pair is treated as not approaching
pub const MIN_RELATIVE_SPEED_KN: f64 = 0.1;

/// TCPA value reported when no approach can be computed
pub const TCPA_UNKNOWN: f64 = -1.0;

/// Proximity of one unordered vessel pair, recomputed every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityPair {
    /// Lower MMSI of the pair
    pub id_a: VesselId,
    /// Higher MMSI of the pair
    pub id_b: VesselId,
    /// Current great-circle distance in NM
    pub distance: f64,
    /// Bearing from A to B, 0-360
    pub bearing: f64,
    /// (course B - course A) mod 360, 0 when either course is unknown
    pub relative_course: f64,
    /// Knots, 0 when either speed is unknown
    pub relative_speed: f64,
    /// Predicted closest distance in NM
    pub cpa: f64,
    /// Minutes to CPA, or -1 when the pair is not closing
    pub tcpa: f64,
    /// Midpoint of both predicted positions at TCPA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpa_position: Option<Position>,
}

impl ProximityPair {
    pub fn key(&self) -> PairKey {
        PairKey(self.id_a, self.id_b)
    }

    /// TCPA is meaningful (pair is closing)
    pub fn has_tcpa(&self) -> bool {
        self.tcpa >= 0.0
    }
}

/// Relative speed in knots between two vessels.
///
/// With both courses known this is the magnitude of the velocity
/// difference; otherwise the plain speed difference.
pub fn relative_speed(a: &KinematicSnapshot, b: &KinematicSnapshot) -> f64 {
    let (Some(va), Some(vb)) = (a.speed(), b.speed()) else {
        return 0.0;
    };
    match (a.course(), b.course()) {
        (Some(ca), Some(cb)) => {
            let delta = (cb - ca).to_radians();
            (va * va + vb * vb - 2.0 * va * vb * delta.cos()).max(0.0).sqrt()
        }
        _ => (vb - va).abs(),
    }
}

/// (course B - course A) normalized to 0-360, 0 if either is unknown
pub fn relative_course(a: &KinematicSnapshot, b: &KinematicSnapshot) -> f64 {
    match (a.course(), b.course()) {
        (Some(ca), Some(cb)) => normalize_bearing(cb - ca),
        _ => 0.0,
    }
}

/// Minutes to close `distance` NM at `relative_speed` knots.
///
/// Clamped to [0, max_prediction]; -1 when the relative speed is too small.
pub fn time_to_cpa(distance: f64, relative_speed: f64, max_prediction: f64) -> f64 {
    if relative_speed < MIN_RELATIVE_SPEED_KN {
        return TCPA_UNKNOWN;
    }
    let tcpa = distance / relative_speed * 60.0;
    if !tcpa.is_finite() {
        return TCPA_UNKNOWN;
    }
    tcpa.clamp(0.0, max_prediction)
}

/// Distance between both vessels dead-reckoned `tcpa` minutes ahead.
///
/// Falls back to the current distance when kinematics are unknown.
pub fn closest_point_of_approach(
    a: &KinematicSnapshot,
    b: &KinematicSnapshot,
    tcpa: f64,
    distance: f64,
) -> (f64, Option<Position>) {
    if tcpa < 0.0 {
        return (distance, None);
    }
    let (Some(ca), Some(sa), Some(cb), Some(sb)) = (a.course(), a.speed(), b.course(), b.speed())
    else {
        return (distance, None);
    };

    let pa = dead_reckon(&a.position, ca, sa, tcpa);
    let pb = dead_reckon(&b.position, cb, sb, tcpa);
    let cpa = haversine_distance(&pa, &pb);
    if !cpa.is_finite() || !pa.is_valid() || !pb.is_valid() {
        return (distance, None);
    }
    (cpa, Some(midpoint(&pa, &pb)))
}

/// Computes proximity pairs for a vessel snapshot
#[derive(Debug)]
pub struct ProximityEngine {
    settings: CollisionSettings,
}

impl ProximityEngine {
    pub fn new(settings: CollisionSettings) -> Self {
        ProximityEngine { settings }
    }

    pub fn settings(&self) -> &CollisionSettings {
        &self.settings
    }

    /// Compute every unique pair within the safety zone bounding box of at
    /// least one moving vessel.
    ///
    /// Vessels with invalid positions are skipped. Vessels slower than
    /// `min_speed` never originate a query but are still found as
    /// neighbours of moving vessels.
    pub fn compute(
        &self,
        vessels: &[KinematicSnapshot],
    ) -> Result<Vec<ProximityPair>, DetectionError> {
        let radius = self.settings.safety_zone_radius;
        if !(radius.is_finite() && radius > 0.0) {
            return Err(DetectionError::InvalidSetting {
                name: "safetyZoneRadius",
                value: radius,
            });
        }

        let mut by_id: HashMap<VesselId, &KinematicSnapshot> = HashMap::with_capacity(vessels.len());
        for vessel in vessels {
            if !vessel.position.is_valid() {
                log::debug!(
                    "Skipping vessel {} with invalid position {:?}",
                    vessel.vessel_id,
                    vessel.position
                );
                continue;
            }
            by_id.insert(vessel.vessel_id, vessel);
        }

        let mut index = Quadtree::world();
        for (id, vessel) in &by_id {
            if !index.insert(*id, vessel.position) {
                return Err(DetectionError::IndexRejected(*id));
            }
        }

        let mut processed: HashSet<PairKey> = HashSet::new();
        let mut pairs = Vec::new();

        for (id, vessel) in &by_id {
            if vessel.speed_or_zero() < self.settings.min_speed {
                continue;
            }

            for neighbour_id in index.query_around(&vessel.position, radius) {
                if neighbour_id == *id {
                    continue;
                }
                let key = PairKey::new(*id, neighbour_id);
                if !processed.insert(key) {
                    continue;
                }
                let (Some(a), Some(b)) = (by_id.get(&key.0), by_id.get(&key.1)) else {
                    continue;
                };
                pairs.push(self.compute_pair(a, b)?);
            }
        }

        Ok(pairs)
    }

    /// Proximity of `a` and `b`; `a` should be the lower id
    pub fn compute_pair(
        &self,
        a: &KinematicSnapshot,
        b: &KinematicSnapshot,
    ) -> Result<ProximityPair, DetectionError> {
        let distance = haversine_distance(&a.position, &b.position);
        if !distance.is_finite() {
            return Err(DetectionError::NonFinite {
                quantity: "distance",
                a: a.vessel_id,
                b: b.vessel_id,
            });
        }

        let relative_speed = relative_speed(a, b);
        let tcpa = time_to_cpa(distance, relative_speed, self.settings.max_prediction_time);
        let (cpa, cpa_position) = closest_point_of_approach(a, b, tcpa, distance);

        Ok(ProximityPair {
            id_a: a.vessel_id,
            id_b: b.vessel_id,
            distance,
            bearing: initial_bearing(&a.position, &b.position),
            relative_course: relative_course(a, b),
            relative_speed,
            cpa,
            tcpa,
            cpa_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::destination;

    fn vessel(id: VesselId, position: Position, course: f64, speed: f64) -> KinematicSnapshot {
        KinematicSnapshot::new(id, position, 0).with_motion(course, speed)
    }

    fn reciprocal_pair() -> (KinematicSnapshot, KinematicSnapshot) {
        let a_pos = Position::new(30.0, -40.0);
        let b_pos = destination(&a_pos, 0.0, 1.0);
        (vessel(1, a_pos, 0.0, 10.0), vessel(2, b_pos, 180.0, 10.0))
    }

    #[test]
    fn test_reciprocal_courses_closing() {
        let (a, b) = reciprocal_pair();
        let engine = ProximityEngine::new(CollisionSettings::default());
        let pair = engine.compute_pair(&a, &b).unwrap();

        assert!((pair.distance - 1.0).abs() < 1e-6);
        assert!((pair.relative_speed - 20.0).abs() < 1e-9);
        assert!((pair.relative_course - 180.0).abs() < 1e-9);
        assert!(pair.tcpa > 0.0 && pair.tcpa <= 5.0, "tcpa {}", pair.tcpa);
        assert!(pair.cpa < 0.05, "cpa {}", pair.cpa);
        assert!(pair.cpa_position.is_some());
    }

    #[test]
    fn test_crossing_uses_velocity_difference_length() {
        let a = KinematicSnapshot::new(1, Position::new(0.0, 0.0), 0).with_motion(0.0, 6.0);
        let b = KinematicSnapshot::new(2, Position::new(0.0, 0.01), 0).with_motion(90.0, 8.0);
        assert!((relative_speed(&a, &b) - 10.0).abs() < 1e-9);

        let same = KinematicSnapshot::new(3, Position::new(0.0, 0.02), 0).with_motion(0.0, 6.0);
        assert!(relative_speed(&a, &same) < 1e-9);
    }

    #[test]
    fn test_speed_difference_without_courses() {
        let mut a = KinematicSnapshot::new(1, Position::new(0.0, 0.0), 0);
        let mut b = KinematicSnapshot::new(2, Position::new(0.0, 0.01), 0);
        a.speed = Some(4.0);
        b.speed = Some(10.0);
        assert_eq!(relative_speed(&a, &b), 6.0);
        assert_eq!(relative_course(&a, &b), 0.0);

        b.speed = None;
        assert_eq!(relative_speed(&a, &b), 0.0);
    }

    #[test]
    fn test_tcpa_unknown_for_stationary_pair() {
        assert_eq!(time_to_cpa(1.0, 0.05, 60.0), TCPA_UNKNOWN);
        assert_eq!(time_to_cpa(100.0, 1.0, 60.0), 60.0);
        assert!((time_to_cpa(1.0, 20.0, 60.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpa_falls_back_to_distance() {
        let a = KinematicSnapshot::new(1, Position::new(0.0, 0.0), 0);
        let b = KinematicSnapshot::new(2, Position::new(0.0, 0.01), 0);
        assert_eq!(closest_point_of_approach(&a, &b, 5.0, 0.6), (0.6, None));
    }

    #[test]
    fn test_compute_deduplicates_pairs() {
        let (a, b) = reciprocal_pair();
        let engine = ProximityEngine::new(CollisionSettings::default());
        let pairs = engine.compute(&[b, a]).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key(), PairKey(1, 2));
    }

    #[test]
    fn test_slow_vessels_only_found_as_neighbours() {
        let origin = Position::new(30.0, -40.0);
        let moored_a = vessel(1, origin, 0.0, 0.0);
        let moored_b = vessel(2, destination(&origin, 90.0, 0.5), 0.0, 0.0);
        let engine = ProximityEngine::new(CollisionSettings::default());
        assert!(engine.compute(&[moored_a.clone(), moored_b.clone()]).unwrap().is_empty());

        let mover = vessel(3, destination(&origin, 0.0, 1.0), 180.0, 8.0);
        let pairs = engine.compute(&[moored_a, moored_b, mover]).unwrap();
        let mut keys: Vec<_> = pairs.iter().map(|p| p.key()).collect();
        keys.sort();
        assert_eq!(keys, vec![PairKey(1, 3), PairKey(2, 3)]);
    }

    #[test]
    fn test_invalid_positions_skipped() {
        let (a, b) = reciprocal_pair();
        let broken = vessel(9, Position::new(f64::NAN, 10.0), 0.0, 10.0);
        let engine = ProximityEngine::new(CollisionSettings::default());
        assert_eq!(engine.compute(&[a, b, broken]).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_radius_fails_tick() {
        let settings = CollisionSettings {
            safety_zone_radius: f64::NAN,
            ..CollisionSettings::default()
        };
        let engine = ProximityEngine::new(settings);
        assert!(matches!(
            engine.compute(&[]),
            Err(DetectionError::InvalidSetting { .. })
        ));
    }
}
