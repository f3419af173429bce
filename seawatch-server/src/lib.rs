//! # Seawatch Server
//!
//! Runs the [`seawatch_core`] detectors on a schedule against a live vessel
//! store and exposes the operator workflow through an async handle.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    seawatch-server                      │
//! │  ┌─────────────┐        ┌────────────────────────────┐  │
//! │  │ VesselStore │──────▶ │ MonitorService (actor)     │  │
//! │  │ (Arc<RwLock>)│ pull  │  - collision tick    5 s   │  │
//! │  └─────────────┘        │  - activity tick    30 s   │  │
//! │                         │  - cleanup          1 h    │  │
//! │                         │  owns ActivityOrchestrator │  │
//! │                         └──────┬──────────────▲──────┘  │
//! │                   broadcast    │              │ mpsc    │
//! │                 MonitorUpdate  ▼              │         │
//! │                         ┌──────────────────────────┐    │
//! │                         │ MonitorHandle (clonable) │    │
//! │                         └──────────────────────────┘    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-c, --config` - Settings file (JSON, camelCase keys)
//! - `--init-config` - Write a default settings file and exit
//! - `--vessels` - JSON-lines file of vessel snapshots to load at start-up
//! - `--output` - Write every monitor update to stdout as JSON
//! - `-v` - Increase verbosity (use multiple times)

use std::path::PathBuf;

use clap::Parser;

pub mod config;
pub mod monitor;
pub mod vessel_store;

pub use monitor::{ActivityFilter, MonitorError, MonitorHandle, MonitorService, MonitorUpdate};
pub use vessel_store::VesselStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Settings file, defaults to settings.json in the user config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the default settings to the settings file and exit
    #[arg(long, default_value_t = false)]
    pub init_config: bool,

    /// JSON-lines file of vessel snapshots loaded into the store at start-up
    #[arg(long)]
    pub vessels: Option<PathBuf>,

    /// Write every monitor update to stdout as one JSON line
    #[arg(long, default_value_t = false)]
    pub output: bool,

    /// Drop vessels not reported for this many seconds
    #[arg(long)]
    pub vessel_timeout: Option<u64>,
}

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
