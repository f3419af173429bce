//! Detector thresholds
//!
//! Static for the lifetime of a monitor. Deserialized from camelCase JSON;
//! any field left out takes its default.

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::geo::NamedArea;

/// Collision-risk thresholds (distances in NM, times in minutes, speeds in knots)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollisionSettings {
    /// Radius around each moving vessel searched for neighbours
    pub safety_zone_radius: f64,
    pub warning_threshold: f64,
    pub danger_threshold: f64,
    pub critical_threshold: f64,
    pub tcpa_warning_threshold: f64,
    pub tcpa_danger_threshold: f64,
    pub tcpa_critical_threshold: f64,
    /// Vessels slower than this do not originate proximity queries
    pub min_speed: f64,
    /// Upper clamp for TCPA
    pub max_prediction_time: f64,
    /// Unresolved alerts older than this are auto-resolved
    pub alert_max_age_minutes: f64,
}

impl Default for CollisionSettings {
    fn default() -> Self {
        CollisionSettings {
            safety_zone_radius: 5.0,
            warning_threshold: 3.0,
            danger_threshold: 1.5,
            critical_threshold: 0.5,
            tcpa_warning_threshold: 30.0,
            tcpa_danger_threshold: 15.0,
            tcpa_critical_threshold: 5.0,
            min_speed: 0.5,
            max_prediction_time: 60.0,
            alert_max_age_minutes: 30.0,
        }
    }
}

/// Rendezvous thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RendezvousSettings {
    /// Pair distance (NM) at or below which vessels count as meeting
    pub proximity_threshold: f64,
    /// Minimum meeting duration in seconds for a completed event
    pub duration_threshold: f64,
    /// Both vessels must be slower than this (knots) to open a meeting
    pub speed_threshold: f64,
    /// Pair must have been at least this far apart (NM) in recent history
    pub min_separation_before: f64,
}

impl Default for RendezvousSettings {
    fn default() -> Self {
        RendezvousSettings {
            proximity_threshold: 0.5,
            duration_threshold: 300.0,
            speed_threshold: 3.0,
            min_separation_before: 2.0,
        }
    }
}

/// Loitering thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoiteringSettings {
    /// Seconds of slow, confined movement before an event is raised
    pub duration_threshold: f64,
    /// Knots
    pub speed_threshold: f64,
    /// Maximum distance (NM) from the centroid
    pub radius_threshold: f64,
}

impl Default for LoiteringSettings {
    fn default() -> Self {
        LoiteringSettings {
            duration_threshold: 7200.0,
            speed_threshold: 2.0,
            radius_threshold: 0.5,
        }
    }
}

/// Tick and cleanup schedule for the monitor service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivitySettings {
    /// Seconds between collision-only ticks
    pub collision_tick: f64,
    /// Seconds between full activity ticks
    pub activity_tick: f64,
    /// Seconds between cleanup passes
    pub cleanup_interval: f64,
    /// Closed activities and completed events older than this (hours) are removed
    pub cleanup_max_age: f64,
    /// Resolved collision alerts are kept this long (minutes)
    pub collision_grace: f64,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        ActivitySettings {
            collision_tick: 5.0,
            activity_tick: 30.0,
            cleanup_interval: 3600.0,
            cleanup_max_age: 24.0,
            collision_grace: 10.0,
        }
    }
}

/// Known port and anchorage circles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AreaSettings {
    /// Meetings inside these are treated as ordinary port activity
    pub ports: Vec<NamedArea>,
    /// Loitering inside these is tagged, not suppressed
    pub anchorages: Vec<NamedArea>,
}

impl Default for AreaSettings {
    fn default() -> Self {
        AreaSettings {
            ports: vec![
                NamedArea::new("Port of Rotterdam", 51.95, 4.05, 3.0),
                NamedArea::new("Port of Hamburg", 53.54, 9.97, 2.0),
                NamedArea::new("Port of Singapore", 1.264, 103.84, 5.0),
                NamedArea::new("Port of Los Angeles", 33.74, -118.26, 4.0),
            ],
            anchorages: vec![
                NamedArea::new("Maas Anchorage", 52.05, 3.70, 3.0),
                NamedArea::new("Singapore Eastern Anchorage", 1.29, 103.90, 2.0),
                NamedArea::new("San Pedro Bay Anchorage", 33.70, -118.17, 3.0),
            ],
        }
    }
}

/// All detector settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub collision: CollisionSettings,
    pub rendezvous: RendezvousSettings,
    pub loitering: LoiteringSettings,
    pub activity: ActivitySettings,
    pub areas: AreaSettings,
}

fn positive(section: &'static str, name: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::NotPositive {
            section,
            name,
            value,
        })
    }
}

fn ordered(
    section: &'static str,
    smaller: (&'static str, f64),
    larger: (&'static str, f64),
) -> Result<(), SettingsError> {
    if smaller.1 <= larger.1 {
        Ok(())
    } else {
        Err(SettingsError::Misordered {
            section,
            smaller: smaller.0,
            smaller_value: smaller.1,
            larger: larger.0,
            larger_value: larger.1,
        })
    }
}

impl CollisionSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        const S: &str = "collision";
        positive(S, "safetyZoneRadius", self.safety_zone_radius)?;
        positive(S, "warningThreshold", self.warning_threshold)?;
        positive(S, "dangerThreshold", self.danger_threshold)?;
        positive(S, "criticalThreshold", self.critical_threshold)?;
        positive(S, "tcpaWarningThreshold", self.tcpa_warning_threshold)?;
        positive(S, "tcpaDangerThreshold", self.tcpa_danger_threshold)?;
        positive(S, "tcpaCriticalThreshold", self.tcpa_critical_threshold)?;
        positive(S, "maxPredictionTime", self.max_prediction_time)?;
        positive(S, "alertMaxAgeMinutes", self.alert_max_age_minutes)?;
        if !self.min_speed.is_finite() || self.min_speed < 0.0 {
            return Err(SettingsError::NotPositive {
                section: S,
                name: "minSpeed",
                value: self.min_speed,
            });
        }
        ordered(
            S,
            ("criticalThreshold", self.critical_threshold),
            ("dangerThreshold", self.danger_threshold),
        )?;
        ordered(
            S,
            ("dangerThreshold", self.danger_threshold),
            ("warningThreshold", self.warning_threshold),
        )?;
        ordered(
            S,
            ("warningThreshold", self.warning_threshold),
            ("safetyZoneRadius", self.safety_zone_radius),
        )
    }
}

impl RendezvousSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        const S: &str = "rendezvous";
        positive(S, "proximityThreshold", self.proximity_threshold)?;
        positive(S, "durationThreshold", self.duration_threshold)?;
        positive(S, "speedThreshold", self.speed_threshold)?;
        positive(S, "minSeparationBefore", self.min_separation_before)?;
        ordered(
            S,
            ("proximityThreshold", self.proximity_threshold),
            ("minSeparationBefore", self.min_separation_before),
        )
    }
}

impl LoiteringSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        const S: &str = "loitering";
        positive(S, "durationThreshold", self.duration_threshold)?;
        positive(S, "speedThreshold", self.speed_threshold)?;
        positive(S, "radiusThreshold", self.radius_threshold)
    }
}

impl ActivitySettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        const S: &str = "activity";
        positive(S, "collisionTick", self.collision_tick)?;
        positive(S, "activityTick", self.activity_tick)?;
        positive(S, "cleanupInterval", self.cleanup_interval)?;
        positive(S, "cleanupMaxAge", self.cleanup_max_age)?;
        positive(S, "collisionGrace", self.collision_grace)
    }
}

impl AreaSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        for area in self.ports.iter().chain(self.anchorages.iter()) {
            if !area.center.is_valid() || !(area.radius_nm.is_finite() && area.radius_nm > 0.0) {
                return Err(SettingsError::InvalidArea(area.name.clone()));
            }
        }
        Ok(())
    }
}

impl MonitorSettings {
    /// Check every section, reporting the first problem found
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.collision.validate()?;
        self.rendezvous.validate()?;
        self.loitering.validate()?;
        self.activity.validate()?;
        self.areas.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(MonitorSettings::default().validate(), Ok(()));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{"collision":{"safetyZoneRadius":4.0},"loitering":{"radiusThreshold":0.3}}"#;
        let settings: MonitorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.collision.safety_zone_radius, 4.0);
        assert_eq!(settings.collision.danger_threshold, 1.5);
        assert_eq!(settings.loitering.radius_threshold, 0.3);
        assert_eq!(settings.rendezvous, RendezvousSettings::default());
        assert!(!settings.areas.ports.is_empty());
        assert_eq!(settings.activity.activity_tick, 30.0);
    }

    #[test]
    fn test_rejects_misordered_thresholds() {
        let mut settings = MonitorSettings::default();
        settings.collision.critical_threshold = 2.0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Misordered { smaller: "criticalThreshold", .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive() {
        let mut settings = MonitorSettings::default();
        settings.loitering.speed_threshold = 0.0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::NotPositive { name: "speedThreshold", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_area() {
        let mut settings = MonitorSettings::default();
        settings.areas.ports.push(NamedArea::new("Nowhere", 95.0, 0.0, 1.0));
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidArea("Nowhere".to_string()))
        );
    }
}
