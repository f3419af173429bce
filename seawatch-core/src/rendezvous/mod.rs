//! Rendezvous detection
//!
//! - **history**: rolling vessel and pair history (the "were they apart
//!   before?" check)
//! - **detector**: per-pair meeting state machine

mod detector;
mod history;

pub use detector::{RendezvousDetector, RendezvousEvent, RendezvousTick, SpeedProfile};
pub use history::{
    PairHistory, PairHistoryTracker, PairSample, VesselSample, ALIGNMENT_TOLERANCE_MS,
    HISTORY_RETENTION_MS, PAIR_HISTORY_CAPACITY,
};
