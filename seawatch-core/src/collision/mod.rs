//! Collision risk prediction
//!
//! - **proximity**: pairwise distance, bearing, relative motion and CPA/TCPA
//!   over a per-tick quadtree
//! - **tracker**: collision alert records keyed by vessel pair
//!
//! ```rust
//! use seawatch_core::collision::{AlertLevel, CollisionAlertTracker};
//! use seawatch_core::geo::{destination, Position};
//! use seawatch_core::settings::CollisionSettings;
//! use seawatch_core::vessel::KinematicSnapshot;
//!
//! let a = Position::new(30.0, -40.0);
//! let b = destination(&a, 0.0, 1.0);
//! let vessels = vec![
//!     KinematicSnapshot::new(1, a, 0).with_motion(0.0, 10.0),
//!     KinematicSnapshot::new(2, b, 0).with_motion(180.0, 10.0),
//! ];
//!
//! let mut tracker = CollisionAlertTracker::new(CollisionSettings::default());
//! let alerts = tracker.update(&vessels, 0);
//! assert_eq!(alerts[0].level, AlertLevel::Danger);
//! ```

mod proximity;
mod tracker;

pub use proximity::{
    closest_point_of_approach, relative_course, relative_speed, time_to_cpa, ProximityEngine,
    ProximityPair, MIN_RELATIVE_SPEED_KN, TCPA_UNKNOWN,
};
pub use tracker::{classify, AlertLevel, CollisionAlert, CollisionAlertTracker, ResolutionReason};
