//! Suspicious activities and their operator lifecycle
//!
//! - **types**: activity record, typed evidence, history entries
//! - **lifecycle**: state machine, audit history and cleanup
//! - **orchestrator**: runs the detectors and turns their records into
//!   activities with a severity

mod lifecycle;
mod orchestrator;
mod types;

pub use lifecycle::AlertLifecycleManager;
pub use orchestrator::{
    collision_severity, loitering_severity, rendezvous_severity, ActivityOrchestrator,
    ActivityTick, CleanupReport,
};
pub use types::{
    ActivityStatistics, ActivityType, AlertState, CollisionEvidence, Evidence, EvidenceDetails,
    HistoryEntry, HistoryEventType, LoiteringEvidence, NewActivity, Note, RendezvousEvidence,
    Severity, SuspiciousActivity, TimelineEntry, TimelineMarker,
};
