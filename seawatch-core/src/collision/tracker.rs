//! Collision-risk alert bookkeeping
//!
//! One alert per unordered vessel pair at a time. Later detections refresh the
//! existing record. Alerts resolve only when a vessel leaves the snapshot or
//! the alert outlives `alert_max_age_minutes`; an improving CPA does not
//! resolve them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::proximity::{ProximityEngine, ProximityPair};
use crate::error::DetectionError;
use crate::geo::Position;
use crate::settings::CollisionSettings;
use crate::vessel::{KinematicSnapshot, PairKey, VesselId};

const MS_PER_MINUTE: f64 = 60_000.0;

/// Collision alert level, least severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Danger,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Danger => write!(f, "DANGER"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Why an alert was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionReason {
    /// One of the vessels is no longer reported
    VesselDeparted,
    /// Alert stayed open longer than the maximum age
    Expired,
}

/// Collision-risk alert for one vessel pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionAlert {
    pub id: String,
    pub vessel_a: VesselId,
    pub vessel_b: VesselId,
    /// Latest proximity computation for the pair
    pub proximity: ProximityPair,
    pub level: AlertLevel,
    /// Unix ms
    pub created_at: u64,
    /// Unix ms of the latest refresh
    pub updated_at: u64,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionReason>,
    /// Where the vessels are expected to be closest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_point: Option<Position>,
    /// Unix ms of the predicted closest approach
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_time: Option<u64>,
}

impl CollisionAlert {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.vessel_a, self.vessel_b)
    }

    pub fn involves(&self, id: VesselId) -> bool {
        self.vessel_a == id || self.vessel_b == id
    }

    fn refresh(&mut self, pair: ProximityPair, level: AlertLevel, now: u64) {
        self.predicted_point = pair.cpa_position;
        self.predicted_time = predicted_time(&pair, now);
        self.proximity = pair;
        self.level = level;
        self.updated_at = now;
    }

    fn resolve(&mut self, reason: ResolutionReason, now: u64) {
        self.resolved = true;
        self.resolved_at = Some(now);
        self.resolution = Some(reason);
    }
}

fn predicted_time(pair: &ProximityPair, now: u64) -> Option<u64> {
    if pair.has_tcpa() {
        Some(now + (pair.tcpa * MS_PER_MINUTE).round() as u64)
    } else {
        None
    }
}

/// Classify a pair by joint distance and TCPA thresholds, most severe first
pub fn classify(pair: &ProximityPair, settings: &CollisionSettings) -> AlertLevel {
    let within = |tcpa_limit: f64| pair.tcpa >= 0.0 && pair.tcpa <= tcpa_limit;

    if pair.distance <= settings.critical_threshold && within(settings.tcpa_critical_threshold) {
        AlertLevel::Critical
    } else if pair.distance <= settings.danger_threshold && within(settings.tcpa_danger_threshold)
    {
        AlertLevel::Danger
    } else if pair.distance <= settings.warning_threshold
        && within(settings.tcpa_warning_threshold)
    {
        AlertLevel::Warning
    } else {
        AlertLevel::Info
    }
}

/// Maintains collision alerts across ticks
#[derive(Debug)]
pub struct CollisionAlertTracker {
    engine: ProximityEngine,
    /// All alerts, resolved ones included until cleanup
    alerts: HashMap<String, CollisionAlert>,
    /// Open alert id per pair
    open_by_pair: HashMap<PairKey, String>,
}

impl CollisionAlertTracker {
    pub fn new(settings: CollisionSettings) -> Self {
        CollisionAlertTracker {
            engine: ProximityEngine::new(settings),
            alerts: HashMap::new(),
            open_by_pair: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &CollisionSettings {
        self.engine.settings()
    }

    /// Run one detection tick and return the open alerts.
    ///
    /// A failed tick is logged and leaves every alert as it was.
    pub fn update(&mut self, vessels: &[KinematicSnapshot], now: u64) -> Vec<CollisionAlert> {
        if let Err(e) = self.try_update(vessels, now) {
            log::error!("Collision tick failed, keeping previous alerts: {}", e);
        }
        self.active_alerts()
    }

    /// Fallible tick body; nothing is modified unless proximity succeeds
    pub fn try_update(
        &mut self,
        vessels: &[KinematicSnapshot],
        now: u64,
    ) -> Result<(), DetectionError> {
        let pairs = self.engine.compute(vessels)?;

        let present: HashSet<VesselId> = vessels.iter().map(|v| v.vessel_id).collect();
        self.resolve_stale(&present, now);

        let settings = self.engine.settings().clone();
        for pair in pairs {
            if pair.distance > settings.safety_zone_radius {
                continue;
            }
            let level = classify(&pair, &settings);
            let key = pair.key();

            if let Some(alert) = self
                .open_by_pair
                .get(&key)
                .and_then(|id| self.alerts.get_mut(id))
            {
                if alert.level != level {
                    log::debug!("Collision alert {} {} -> {}", alert.id, alert.level, level);
                }
                alert.refresh(pair, level, now);
                continue;
            }

            let id = format!("collision-{}-{}", key, now);
            log::info!(
                "New {} collision alert {}: {:.2} NM, CPA {:.2} NM, TCPA {:.1} min",
                level,
                id,
                pair.distance,
                pair.cpa,
                pair.tcpa
            );
            let alert = CollisionAlert {
                id: id.clone(),
                vessel_a: key.0,
                vessel_b: key.1,
                predicted_point: pair.cpa_position,
                predicted_time: predicted_time(&pair, now),
                proximity: pair,
                level,
                created_at: now,
                updated_at: now,
                resolved: false,
                resolved_at: None,
                resolution: None,
            };
            self.alerts.insert(id.clone(), alert);
            self.open_by_pair.insert(key, id);
        }

        Ok(())
    }

    fn resolve_stale(&mut self, present: &HashSet<VesselId>, now: u64) {
        let max_age_ms = (self.engine.settings().alert_max_age_minutes * MS_PER_MINUTE) as u64;

        self.open_by_pair.retain(|_, id| {
            let Some(alert) = self.alerts.get_mut(id) else {
                return false;
            };
            let reason = if !present.contains(&alert.vessel_a) || !present.contains(&alert.vessel_b)
            {
                Some(ResolutionReason::VesselDeparted)
            } else if now.saturating_sub(alert.created_at) > max_age_ms {
                Some(ResolutionReason::Expired)
            } else {
                None
            };
            match reason {
                Some(reason) => {
                    log::debug!("Resolving collision alert {} ({:?})", alert.id, reason);
                    alert.resolve(reason, now);
                    false
                }
                None => true,
            }
        });
    }

    /// Purge resolved alerts whose resolution is older than `grace_minutes`
    pub fn cleanup(&mut self, grace_minutes: f64, now: u64) -> usize {
        let cutoff = now.saturating_sub((grace_minutes * MS_PER_MINUTE) as u64);
        let before = self.alerts.len();
        self.alerts
            .retain(|_, a| !(a.resolved && a.resolved_at.is_some_and(|t| t < cutoff)));
        before - self.alerts.len()
    }

    /// Open alerts, most severe first
    pub fn active_alerts(&self) -> Vec<CollisionAlert> {
        let mut alerts: Vec<_> = self
            .alerts
            .values()
            .filter(|a| !a.resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then(a.proximity.distance.total_cmp(&b.proximity.distance))
        });
        alerts
    }

    /// Every alert still held, resolved ones included
    pub fn all_alerts(&self) -> Vec<CollisionAlert> {
        self.alerts.values().cloned().collect()
    }

    pub fn alert(&self, id: &str) -> Option<&CollisionAlert> {
        self.alerts.get(id)
    }

    pub fn alerts_for_vessel(&self, vessel: VesselId) -> Vec<CollisionAlert> {
        self.alerts
            .values()
            .filter(|a| a.involves(vessel))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
