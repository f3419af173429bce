//! Error types for detection ticks and settings validation

use thiserror::Error;

/// Errors that abort a whole detection tick.
///
/// Detectors never propagate these out of their public tick methods; the
/// tick boundary logs them and keeps the previous result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// A threshold or radius is unusable for geometry (NaN, zero or negative)
    #[error("Invalid setting {name}: {value}")]
    InvalidSetting { name: &'static str, value: f64 },

    /// A computed quantity came out non-finite
    #[error("Non-finite {quantity} for pair {a}/{b}")]
    NonFinite { quantity: &'static str, a: u32, b: u32 },

    /// The spatial index refused a position that passed validation
    #[error("Spatial index rejected vessel {0}")]
    IndexRejected(u32),
}

/// Errors found when validating [`crate::settings::MonitorSettings`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// Value must be a positive finite number
    #[error("{section}.{name} must be positive and finite, got {value}")]
    NotPositive {
        section: &'static str,
        name: &'static str,
        value: f64,
    },

    /// Thresholds must be ordered critical <= danger <= warning <= safety zone
    #[error("{section}: {smaller} ({smaller_value}) must not exceed {larger} ({larger_value})")]
    Misordered {
        section: &'static str,
        smaller: &'static str,
        smaller_value: f64,
        larger: &'static str,
        larger_value: f64,
    },

    /// A named area has an unusable center or radius
    #[error("Area '{0}' has an invalid center or radius")]
    InvalidArea(String),
}
