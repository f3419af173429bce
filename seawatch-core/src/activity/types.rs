//! Suspicious activity records shared with transport and UI layers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collision::AlertLevel;
use crate::geo::Position;
use crate::rendezvous::SpeedProfile;
use crate::vessel::VesselId;

/// Kind of suspicious activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Collision,
    Rendezvous,
    Loitering,
    Other,
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityType::Collision => write!(f, "collision"),
            ActivityType::Rendezvous => write!(f, "rendezvous"),
            ActivityType::Loitering => write!(f, "loitering"),
            ActivityType::Other => write!(f, "other"),
        }
    }
}

/// Activity severity, least severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Operator-facing lifecycle state of an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    New,
    Acknowledged,
    Investigating,
    Resolved,
    FalsePositive,
    Escalated,
}

impl AlertState {
    /// Resolved or dismissed; eligible for cleanup
    pub fn is_closed(&self) -> bool {
        matches!(self, AlertState::Resolved | AlertState::FalsePositive)
    }
}

impl Default for AlertState {
    fn default() -> Self {
        AlertState::New
    }
}

/// Marker on an evidence timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineMarker {
    Detected,
    Approach,
    Meeting,
    Departure,
    Start,
    Ongoing,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Unix ms
    pub timestamp: u64,
    pub marker: TimelineMarker,
    pub description: String,
}

impl TimelineEntry {
    pub fn new(timestamp: u64, marker: TimelineMarker, description: impl Into<String>) -> Self {
        TimelineEntry {
            timestamp,
            marker,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionEvidence {
    pub alert_id: String,
    pub level: AlertLevel,
    pub distance_nm: f64,
    pub cpa_nm: f64,
    /// Minutes, -1 when not closing
    pub tcpa_min: f64,
    pub bearing: f64,
    pub relative_speed_kn: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendezvousEvidence {
    pub event_id: String,
    pub duration_sec: f64,
    pub minimum_distance_nm: f64,
    pub approach_distance_nm: f64,
    pub speeds_a: SpeedProfile,
    pub speeds_b: SpeedProfile,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoiteringEvidence {
    pub event_id: String,
    pub duration_sec: f64,
    pub max_radius_nm: f64,
    pub avg_speed_kn: f64,
    pub max_speed_kn: f64,
    pub in_anchorage_area: bool,
    pub completed: bool,
}

/// Typed evidence payload, one variant per activity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EvidenceDetails {
    Collision(CollisionEvidence),
    Rendezvous(RendezvousEvidence),
    Loitering(LoiteringEvidence),
    /// Operator-raised or externally detected activity
    Other { metrics: BTreeMap<String, f64> },
}

impl EvidenceDetails {
    pub fn activity_type(&self) -> ActivityType {
        match self {
            EvidenceDetails::Collision(_) => ActivityType::Collision,
            EvidenceDetails::Rendezvous(_) => ActivityType::Rendezvous,
            EvidenceDetails::Loitering(_) => ActivityType::Loitering,
            EvidenceDetails::Other { .. } => ActivityType::Other,
        }
    }

    /// Flat metric map for display
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let pairs: Vec<(String, f64)> = match self {
            EvidenceDetails::Collision(c) => vec![
                ("distanceNm".into(), c.distance_nm),
                ("cpaNm".into(), c.cpa_nm),
                ("tcpaMin".into(), c.tcpa_min),
                ("bearing".into(), c.bearing),
                ("relativeSpeedKn".into(), c.relative_speed_kn),
            ],
            EvidenceDetails::Rendezvous(r) => {
                let mut v = vec![
                    ("durationSec".into(), r.duration_sec),
                    ("minimumDistanceNm".into(), r.minimum_distance_nm),
                    ("approachDistanceNm".into(), r.approach_distance_nm),
                ];
                v.extend(speed_metrics("vesselA", &r.speeds_a));
                v.extend(speed_metrics("vesselB", &r.speeds_b));
                v
            }
            EvidenceDetails::Loitering(l) => vec![
                ("durationSec".into(), l.duration_sec),
                ("maxRadiusNm".into(), l.max_radius_nm),
                ("avgSpeedKn".into(), l.avg_speed_kn),
                ("maxSpeedKn".into(), l.max_speed_kn),
            ],
            EvidenceDetails::Other { metrics } => {
                return metrics.clone();
            }
        };
        pairs.into_iter().collect()
    }
}

fn speed_metrics(prefix: &str, speeds: &SpeedProfile) -> Vec<(String, f64)> {
    [
        ("SpeedBefore", speeds.before),
        ("SpeedDuring", speeds.during),
        ("SpeedAfter", speeds.after),
    ]
    .into_iter()
    .filter_map(|(suffix, value)| value.map(|v| (format!("{}{}", prefix, suffix), v)))
    .collect()
}

/// Evidence attached to an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub description: String,
    pub details: EvidenceDetails,
    pub timeline: Vec<TimelineEntry>,
}

impl Evidence {
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        self.details.metrics()
    }
}

/// Free-text operator note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub timestamp: u64,
    pub user: String,
    pub text: String,
}

/// Input for creating an activity
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub severity: Severity,
    pub vessels: Vec<VesselId>,
    /// Unix ms
    pub detected_at: u64,
    pub location: Position,
    pub evidence: Evidence,
}

/// Externally visible alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub severity: Severity,
    pub vessels: Vec<VesselId>,
    pub detected_at: u64,
    pub updated_at: u64,
    pub location: Position,
    pub evidence: Evidence,
    pub state: AlertState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub notes: Vec<Note>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_to: Option<String>,
}

impl SuspiciousActivity {
    pub(crate) fn from_new(id: String, new: NewActivity) -> Self {
        SuspiciousActivity {
            id,
            activity_type: new.evidence.details.activity_type(),
            severity: new.severity,
            vessels: new.vessels,
            detected_at: new.detected_at,
            updated_at: new.detected_at,
            location: new.location,
            evidence: new.evidence,
            state: AlertState::New,
            assigned_to: None,
            notes: Vec::new(),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution: None,
            escalated_at: None,
            escalated_to: None,
        }
    }

    pub fn involves(&self, vessel: VesselId) -> bool {
        self.vessels.contains(&vessel)
    }
}

/// Kind of entry in an activity's audit history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    Created,
    Acknowledged,
    InvestigationStarted,
    Resolved,
    FalsePositive,
    Escalated,
    NoteAdded,
    Updated,
}

/// Immutable audit record for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub event: HistoryEventType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Counts over all held activities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatistics {
    pub total: usize,
    /// Not resolved and not dismissed
    pub active: usize,
    /// Still in state NEW
    pub pending: usize,
    pub by_state: BTreeMap<AlertState, usize>,
    pub by_type: BTreeMap<ActivityType, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
}
