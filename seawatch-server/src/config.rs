//! Settings file location and loading.
//!
//! Settings live in `<config dir>/settings.json` unless `--config` names
//! another file. A missing default file means built-in defaults; a file that
//! exists but does not parse or validate is a startup error. `--init-config`
//! writes the defaults out as a starting point for editing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use directories::ProjectDirs;
use log::{debug, info};
use seawatch_core::MonitorSettings;

pub const SETTINGS_FILE: &str = "settings.json";

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "seawatch", "seawatch")
}

/// Default settings path, if the platform has a config directory
pub fn default_settings_path() -> Option<PathBuf> {
    get_project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

/// Load settings from `path`, or from the default location when `None`
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<MonitorSettings> {
    let path = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Settings file {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => match default_settings_path() {
            Some(path) if path.exists() => path,
            Some(path) => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(MonitorSettings::default());
            }
            None => {
                debug!("No config directory, using default settings");
                return Ok(MonitorSettings::default());
            }
        },
    };

    let settings = read_settings(&path)?;
    info!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn read_settings(path: &Path) -> anyhow::Result<MonitorSettings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings: MonitorSettings = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(settings)
}

/// Write settings as pretty JSON, creating parent directories
pub fn save_settings(path: &Path, settings: &MonitorSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write a settings file holding the defaults, to `path` or the default
/// location. An existing file is left alone.
pub fn init_settings(path: Option<&Path>) -> anyhow::Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_settings_path().context("No config directory on this platform")?,
    };
    if path.exists() {
        bail!("Settings file {} already exists", path.display());
    }
    save_settings(&path, &MonitorSettings::default())?;
    info!("Wrote default settings to {}", path.display());
    Ok(path)
}
