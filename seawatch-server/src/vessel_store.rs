//! Live vessel store.
//!
//! Holds the latest snapshot per MMSI. Writers (an AIS feed, a replay file)
//! upsert; the monitor pulls one full copy per tick through
//! [`VesselSource`].

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use log::{debug, warn};
use seawatch_core::{KinematicSnapshot, VesselId, VesselSource};

#[derive(Clone, Debug, Default)]
pub struct VesselStore {
    inner: Arc<RwLock<HashMap<VesselId, KinematicSnapshot>>>,
}

impl VesselStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a vessel's snapshot. An older report never
    /// overwrites a newer one.
    pub fn upsert(&self, snapshot: KinematicSnapshot) {
        let mut vessels = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let newest = vessels.get(&snapshot.vessel_id).map(|v| v.timestamp);
        match newest {
            Some(newest) if newest > snapshot.timestamp => {
                debug!(
                    "Ignoring stale report for {} ({} < {})",
                    snapshot.vessel_id, snapshot.timestamp, newest
                );
            }
            _ => {
                vessels.insert(snapshot.vessel_id, snapshot);
            }
        }
    }

    pub fn remove(&self, vessel: VesselId) -> Option<KinematicSnapshot> {
        match self.inner.write() {
            Ok(mut guard) => guard.remove(&vessel),
            Err(poisoned) => poisoned.into_inner().remove(&vessel),
        }
    }

    pub fn get(&self, vessel: VesselId) -> Option<KinematicSnapshot> {
        self.read(|v| v.get(&vessel).cloned())
    }

    /// Drop vessels whose last report is older than `cutoff` (Unix ms)
    pub fn prune_older_than(&self, cutoff: u64) -> usize {
        let mut vessels = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = vessels.len();
        vessels.retain(|_, v| v.timestamp >= cutoff);
        before - vessels.len()
    }

    pub fn len(&self) -> usize {
        self.read(|v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a JSON-lines file of snapshots, one per line.
    ///
    /// Blank lines are skipped; malformed lines are logged and skipped.
    /// Returns the number of snapshots stored.
    pub fn load_json_lines(&self, path: &Path) -> anyhow::Result<usize> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut loaded = 0;
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<KinematicSnapshot>(line) {
                Ok(snapshot) => {
                    self.upsert(snapshot);
                    loaded += 1;
                }
                Err(e) => warn!("{}:{}: skipping snapshot: {}", path.display(), number + 1, e),
            }
        }
        Ok(loaded)
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<VesselId, KinematicSnapshot>) -> T) -> T {
        match self.inner.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

impl VesselSource for VesselStore {
    fn all_vessels(&self) -> Vec<KinematicSnapshot> {
        self.read(|v| v.values().cloned().collect())
    }
}
