//! Operator workflow over suspicious activities
//!
//! State changes:
//!
//! ```text
//!   NEW ──acknowledge──> ACKNOWLEDGED ──investigate──> INVESTIGATING
//!    │                                                      │
//!    └──investigate──────────────────────────────────────────┘
//!
//!   any state except RESOLVED        ──resolve──>        RESOLVED
//!   any state except FALSE_POSITIVE  ──falsePositive──>  FALSE_POSITIVE
//!   any state except RESOLVED        ──escalate──>       ESCALATED
//! ```
//!
//! Every mutation appends to the activity's history. Rejected transitions
//! return `false` and change nothing.

use std::collections::{BTreeMap, HashMap};

use serde_json::json;

use super::types::{
    ActivityStatistics, ActivityType, AlertState, Evidence, EvidenceDetails, HistoryEntry,
    HistoryEventType, NewActivity, Note, Severity, SuspiciousActivity,
};
use crate::geo::Position;
use crate::vessel::VesselId;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Default)]
pub struct AlertLifecycleManager {
    activities: HashMap<String, SuspiciousActivity>,
    history: HashMap<String, Vec<HistoryEntry>>,
    next_sequence: u64,
}

impl AlertLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new activity in state NEW and return its id
    pub fn create(&mut self, new: NewActivity) -> String {
        self.next_sequence += 1;
        let id = format!("activity-{}", self.next_sequence);
        let activity = SuspiciousActivity::from_new(id.clone(), new);

        log::info!(
            "New {} activity {} ({}) for vessels {:?}",
            activity.activity_type,
            id,
            activity.severity,
            activity.vessels
        );

        let entry = HistoryEntry {
            timestamp: activity.detected_at,
            event: HistoryEventType::Created,
            description: activity.evidence.description.clone(),
            data: Some(json!({
                "type": activity.activity_type,
                "severity": activity.severity,
            })),
        };
        self.history.insert(id.clone(), vec![entry]);
        self.activities.insert(id.clone(), activity);
        id
    }

    /// Raise an activity that no detector produced
    pub fn create_other(
        &mut self,
        severity: Severity,
        vessels: Vec<VesselId>,
        location: Position,
        description: &str,
        metrics: BTreeMap<String, f64>,
        now: u64,
    ) -> String {
        self.create(NewActivity {
            severity,
            vessels,
            detected_at: now,
            location,
            evidence: Evidence {
                description: description.to_string(),
                details: EvidenceDetails::Other { metrics },
                timeline: Vec::new(),
            },
        })
    }

    pub fn acknowledge(&mut self, id: &str, user: &str, now: u64) -> bool {
        let Some(activity) = self.activities.get_mut(id) else {
            return false;
        };
        if activity.state != AlertState::New {
            return false;
        }
        activity.state = AlertState::Acknowledged;
        activity.acknowledged_at = Some(now);
        activity.acknowledged_by = Some(user.to_string());
        activity.updated_at = now;
        self.record(
            id,
            now,
            HistoryEventType::Acknowledged,
            format!("Acknowledged by {}", user),
            None,
        );
        true
    }

    pub fn investigate(&mut self, id: &str, user: &str, now: u64) -> bool {
        let Some(activity) = self.activities.get_mut(id) else {
            return false;
        };
        if !matches!(activity.state, AlertState::New | AlertState::Acknowledged) {
            return false;
        }
        activity.state = AlertState::Investigating;
        activity.assigned_to = Some(user.to_string());
        activity.updated_at = now;
        self.record(
            id,
            now,
            HistoryEventType::InvestigationStarted,
            format!("Investigation started by {}", user),
            None,
        );
        true
    }

    /// Close an activity. Allowed from every state except RESOLVED, so a
    /// dismissed or escalated activity can still be resolved.
    pub fn resolve(&mut self, id: &str, user: &str, resolution: &str, now: u64) -> bool {
        let Some(activity) = self.activities.get_mut(id) else {
            return false;
        };
        if activity.state == AlertState::Resolved {
            return false;
        }
        let from = activity.state;
        activity.state = AlertState::Resolved;
        activity.resolved_at = Some(now);
        activity.resolved_by = Some(user.to_string());
        activity.resolution = Some(resolution.to_string());
        activity.updated_at = now;
        self.record(
            id,
            now,
            HistoryEventType::Resolved,
            format!("Resolved by {}: {}", user, resolution),
            Some(json!({ "from": from })),
        );
        true
    }

    pub fn mark_false_positive(&mut self, id: &str, user: &str, reason: &str, now: u64) -> bool {
        let Some(activity) = self.activities.get_mut(id) else {
            return false;
        };
        if activity.state == AlertState::FalsePositive {
            return false;
        }
        let from = activity.state;
        activity.state = AlertState::FalsePositive;
        activity.resolved_at = Some(now);
        activity.resolved_by = Some(user.to_string());
        activity.resolution = Some(reason.to_string());
        activity.updated_at = now;
        self.record(
            id,
            now,
            HistoryEventType::FalsePositive,
            format!("Marked false positive by {}: {}", user, reason),
            Some(json!({ "from": from })),
        );
        true
    }

    pub fn escalate(&mut self, id: &str, user: &str, target: &str, reason: &str, now: u64) -> bool {
        let Some(activity) = self.activities.get_mut(id) else {
            return false;
        };
        if activity.state == AlertState::Resolved {
            return false;
        }
        activity.state = AlertState::Escalated;
        activity.escalated_at = Some(now);
        activity.escalated_to = Some(target.to_string());
        activity.updated_at = now;
        self.record(
            id,
            now,
            HistoryEventType::Escalated,
            format!("Escalated to {} by {}: {}", target, user, reason),
            Some(json!({ "target": target })),
        );
        true
    }

    pub fn add_note(&mut self, id: &str, user: &str, text: &str, now: u64) -> bool {
        let Some(activity) = self.activities.get_mut(id) else {
            return false;
        };
        activity.notes.push(Note {
            timestamp: now,
            user: user.to_string(),
            text: text.to_string(),
        });
        activity.updated_at = now;
        self.record(
            id,
            now,
            HistoryEventType::NoteAdded,
            format!("Note added by {}", user),
            None,
        );
        true
    }

    /// Replace evidence and severity from a fresh detection. Closed
    /// activities are left untouched. A severity change is recorded in
    /// the history.
    pub fn update_evidence(
        &mut self,
        id: &str,
        evidence: Evidence,
        severity: Severity,
        location: Position,
        now: u64,
    ) -> bool {
        let Some(activity) = self.activities.get_mut(id) else {
            return false;
        };
        if activity.state.is_closed() {
            return false;
        }
        let previous = activity.severity;
        activity.evidence = evidence;
        activity.severity = severity;
        activity.location = location;
        activity.updated_at = now;

        if previous != severity {
            log::debug!("Activity {} severity {} -> {}", id, previous, severity);
            self.record(
                id,
                now,
                HistoryEventType::Updated,
                format!("Severity changed from {} to {}", previous, severity),
                Some(json!({ "from": previous, "to": severity })),
            );
        }
        true
    }

    fn record(
        &mut self,
        id: &str,
        timestamp: u64,
        event: HistoryEventType,
        description: String,
        data: Option<serde_json::Value>,
    ) {
        self.history
            .entry(id.to_string())
            .or_default()
            .push(HistoryEntry {
                timestamp,
                event,
                description,
                data,
            });
    }

    pub fn get(&self, id: &str) -> Option<&SuspiciousActivity> {
        self.activities.get(id)
    }

    /// All activities, newest first
    pub fn all(&self) -> Vec<SuspiciousActivity> {
        self.collect(|_| true)
    }

    /// Activities still in state NEW
    pub fn pending(&self) -> Vec<SuspiciousActivity> {
        self.collect(|a| a.state == AlertState::New)
    }

    /// Activities neither resolved nor dismissed
    pub fn active(&self) -> Vec<SuspiciousActivity> {
        self.collect(|a| !a.state.is_closed())
    }

    pub fn by_vessel(&self, vessel: VesselId) -> Vec<SuspiciousActivity> {
        self.collect(|a| a.involves(vessel))
    }

    pub fn by_type(&self, activity_type: ActivityType) -> Vec<SuspiciousActivity> {
        self.collect(|a| a.activity_type == activity_type)
    }

    fn collect<F>(&self, filter: F) -> Vec<SuspiciousActivity>
    where
        F: Fn(&SuspiciousActivity) -> bool,
    {
        let mut out: Vec<SuspiciousActivity> = self
            .activities
            .values()
            .filter(|a| filter(a))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Audit history of one activity, oldest first
    pub fn history(&self, id: &str) -> &[HistoryEntry] {
        self.history.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn statistics(&self) -> ActivityStatistics {
        let mut stats = ActivityStatistics {
            total: self.activities.len(),
            ..Default::default()
        };
        for activity in self.activities.values() {
            if !activity.state.is_closed() {
                stats.active += 1;
            }
            if activity.state == AlertState::New {
                stats.pending += 1;
            }
            *stats.by_state.entry(activity.state).or_default() += 1;
            *stats.by_type.entry(activity.activity_type).or_default() += 1;
            *stats.by_severity.entry(activity.severity).or_default() += 1;
        }
        stats
    }

    /// Remove resolved or dismissed activities closed more than
    /// `max_age_hours` ago, together with their history
    pub fn cleanup(&mut self, max_age_hours: f64, now: u64) -> usize {
        let cutoff = now.saturating_sub((max_age_hours * MS_PER_HOUR) as u64);
        let expired: Vec<String> = self
            .activities
            .values()
            .filter(|a| a.state.is_closed() && a.resolved_at.is_some_and(|t| t < cutoff))
            .map(|a| a.id.clone())
            .collect();

        for id in &expired {
            self.activities.remove(id);
            self.history.remove(id);
        }
        if !expired.is_empty() {
            log::debug!("Removed {} closed activities", expired.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;
    const HOUR: u64 = 3_600_000;

    fn manager_with_one() -> (AlertLifecycleManager, String) {
        let mut manager = AlertLifecycleManager::new();
        let id = manager.create_other(
            Severity::Medium,
            vec![244_123_456],
            Position::new(51.9, 4.1),
            "Reported by patrol",
            BTreeMap::new(),
            T0,
        );
        (manager, id)
    }

    #[test]
    fn test_create_starts_new_with_history() {
        let (manager, id) = manager_with_one();
        let activity = manager.get(&id).unwrap();
        assert_eq!(id, "activity-1");
        assert_eq!(activity.state, AlertState::New);
        assert_eq!(activity.activity_type, ActivityType::Other);
        assert_eq!(manager.history(&id).len(), 1);
        assert_eq!(manager.history(&id)[0].event, HistoryEventType::Created);
        assert_eq!(manager.pending().len(), 1);
    }

    #[test]
    fn test_acknowledge_only_from_new() {
        let (mut manager, id) = manager_with_one();
        assert!(manager.acknowledge(&id, "alice", T0 + 1));
        assert!(!manager.acknowledge(&id, "bob", T0 + 2));
        let activity = manager.get(&id).unwrap();
        assert_eq!(activity.state, AlertState::Acknowledged);
        assert_eq!(activity.acknowledged_by.as_deref(), Some("alice"));
        assert_eq!(activity.acknowledged_at, Some(T0 + 1));
        assert_eq!(manager.history(&id).len(), 2);
    }

    #[test]
    fn test_investigate_from_new_or_acknowledged() {
        let (mut manager, id) = manager_with_one();
        assert!(manager.investigate(&id, "alice", T0 + 1));
        assert_eq!(manager.get(&id).unwrap().assigned_to.as_deref(), Some("alice"));
        // Already investigating
        assert!(!manager.investigate(&id, "bob", T0 + 2));

        let (mut manager, id) = manager_with_one();
        assert!(manager.acknowledge(&id, "alice", T0 + 1));
        assert!(manager.investigate(&id, "alice", T0 + 2));
        assert_eq!(manager.get(&id).unwrap().state, AlertState::Investigating);
    }

    #[test]
    fn test_resolve_twice_fails() {
        let (mut manager, id) = manager_with_one();
        assert!(manager.resolve(&id, "alice", "fishing vessel", T0 + 1));
        assert!(!manager.resolve(&id, "alice", "again", T0 + 2));
        assert!(!manager.acknowledge(&id, "alice", T0 + 3));
        assert!(!manager.escalate(&id, "alice", "coast guard", "late", T0 + 4));
        assert_eq!(manager.get(&id).unwrap().resolved_at, Some(T0 + 1));
    }

    #[test]
    fn test_false_positive_can_be_resolved() {
        let (mut manager, id) = manager_with_one();
        assert!(manager.mark_false_positive(&id, "alice", "AIS glitch", T0 + 1));
        assert!(!manager.mark_false_positive(&id, "alice", "again", T0 + 2));
        assert!(manager.resolve(&id, "bob", "closed", T0 + 3));
        assert_eq!(manager.get(&id).unwrap().state, AlertState::Resolved);
    }

    #[test]
    fn test_escalated_can_be_resolved() {
        let (mut manager, id) = manager_with_one();
        assert!(manager.escalate(&id, "alice", "coast guard", "suspected transfer", T0 + 1));
        let activity = manager.get(&id).unwrap();
        assert_eq!(activity.state, AlertState::Escalated);
        assert_eq!(activity.escalated_to.as_deref(), Some("coast guard"));
        assert_eq!(manager.active().len(), 1);
        assert!(manager.resolve(&id, "bob", "boarded", T0 + 2));
        assert!(manager.active().is_empty());
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let mut manager = AlertLifecycleManager::new();
        assert!(!manager.acknowledge("activity-9", "alice", T0));
        assert!(!manager.add_note("activity-9", "alice", "hello", T0));
        assert!(manager.history("activity-9").is_empty());
    }

    #[test]
    fn test_notes_allowed_in_any_state() {
        let (mut manager, id) = manager_with_one();
        assert!(manager.resolve(&id, "alice", "done", T0 + 1));
        assert!(manager.add_note(&id, "bob", "follow-up call made", T0 + 2));
        let activity = manager.get(&id).unwrap();
        assert_eq!(activity.notes.len(), 1);
        assert_eq!(activity.notes[0].user, "bob");
        assert_eq!(
            manager.history(&id).last().unwrap().event,
            HistoryEventType::NoteAdded
        );
    }

    #[test]
    fn test_severity_change_is_recorded() {
        let (mut manager, id) = manager_with_one();
        let evidence = manager.get(&id).unwrap().evidence.clone();
        let location = Position::new(51.9, 4.1);

        assert!(manager.update_evidence(&id, evidence.clone(), Severity::Medium, location, T0 + 1));
        assert_eq!(manager.history(&id).len(), 1);

        assert!(manager.update_evidence(&id, evidence.clone(), Severity::High, location, T0 + 2));
        let last = manager.history(&id).last().unwrap();
        assert_eq!(last.event, HistoryEventType::Updated);
        assert_eq!(last.data.as_ref().unwrap()["to"], "high");

        assert!(manager.resolve(&id, "alice", "done", T0 + 3));
        assert!(!manager.update_evidence(&id, evidence, Severity::Low, location, T0 + 4));
        assert_eq!(manager.get(&id).unwrap().severity, Severity::High);
    }

    #[test]
    fn test_cleanup_removes_only_old_closed_activities() {
        let mut manager = AlertLifecycleManager::new();
        let location = Position::new(1.2, 103.8);
        let old_resolved =
            manager.create_other(Severity::Low, vec![1], location, "a", BTreeMap::new(), T0);
        let recent_resolved =
            manager.create_other(Severity::Low, vec![2], location, "b", BTreeMap::new(), T0);
        let old_open =
            manager.create_other(Severity::Low, vec![3], location, "c", BTreeMap::new(), T0);

        assert!(manager.resolve(&old_resolved, "alice", "done", T0));
        assert!(manager.mark_false_positive(&recent_resolved, "alice", "noise", T0 + 20 * HOUR));

        let now = T0 + 25 * HOUR;
        assert_eq!(manager.cleanup(24.0, now), 1);
        assert!(manager.get(&old_resolved).is_none());
        assert!(manager.history(&old_resolved).is_empty());
        assert!(manager.get(&recent_resolved).is_some());
        assert!(manager.get(&old_open).is_some());
    }

    #[test]
    fn test_statistics_and_queries() {
        let mut manager = AlertLifecycleManager::new();
        let location = Position::new(1.2, 103.8);
        let a = manager.create_other(Severity::High, vec![1, 2], location, "a", BTreeMap::new(), T0);
        let _b =
            manager.create_other(Severity::Low, vec![2], location, "b", BTreeMap::new(), T0 + 1);
        assert!(manager.acknowledge(&a, "alice", T0 + 2));

        let stats = manager.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.by_state[&AlertState::Acknowledged], 1);
        assert_eq!(stats.by_severity[&Severity::Low], 1);
        assert_eq!(stats.by_type[&ActivityType::Other], 2);

        assert_eq!(manager.by_vessel(2).len(), 2);
        assert_eq!(manager.by_vessel(1).len(), 1);
        assert!(manager.by_type(ActivityType::Loitering).is_empty());
        // Newest first
        assert_eq!(manager.all()[0].detected_at, T0 + 1);
    }
}
