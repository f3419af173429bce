//! # Seawatch Core
//!
//! Platform-independent maritime traffic analytics over AIS vessel reports.
//!
//! This crate contains pure detection logic with **zero I/O dependencies**:
//! no sockets, no clocks, no async runtime. Every tick takes the current
//! vessel snapshot and an explicit `now` (Unix milliseconds), so the same
//! code runs in the server, in replay tools and in tests.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  seawatch-core (platform-independent, no tokio/async deps)  │
//! │  ├── spatial/     (quadtree index)                          │
//! │  ├── collision/   (proximity, CPA/TCPA, alert tracker)      │
//! │  ├── rendezvous/  (pair history, meeting state machine)     │
//! │  ├── loitering    (per-vessel dwell state machine)          │
//! │  └── activity/    (orchestrator, lifecycle manager)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                ┌─────────────┴─────────────┐
//!                │  seawatch-server          │
//!                │  (ticks, store, config)   │
//!                └───────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`spatial`] - Quadtree over vessel positions
//! - [`collision`] - Proximity pairs, CPA/TCPA and collision alerts
//! - [`rendezvous`] - Close, slow meetings of previously separated vessels
//! - [`loitering`] - Vessels dwelling in a small area at low speed
//! - [`activity`] - Suspicious activities and their operator workflow
//! - [`settings`] - Detector thresholds
//!
//! ## Example: One Activity Tick
//!
//! ```rust
//! use seawatch_core::{ActivityOrchestrator, KinematicSnapshot, MonitorSettings, Position};
//!
//! let mut orchestrator = ActivityOrchestrator::new(&MonitorSettings::default());
//! let vessels = vec![
//!     KinematicSnapshot::new(244_123_456, Position::new(51.5, 2.5), 0).with_motion(90.0, 12.0),
//! ];
//! let tick = orchestrator.activity_tick(&vessels, 0);
//! assert!(tick.created.is_empty());
//! ```

pub mod activity;
pub mod collision;
pub mod error;
pub mod geo;
pub mod loitering;
pub mod rendezvous;
pub mod settings;
pub mod spatial;
pub mod vessel;

pub use activity::{ActivityOrchestrator, AlertLifecycleManager, AlertState, SuspiciousActivity};
pub use error::{DetectionError, SettingsError};
pub use geo::Position;
pub use settings::MonitorSettings;
pub use vessel::{KinematicSnapshot, VesselId, VesselSource};
