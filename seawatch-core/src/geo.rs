//! Great-circle geometry on a spherical Earth
//!
//! Distances are in nautical miles, angles in degrees, speeds in knots.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in nautical miles
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Nautical miles per degree of latitude on the sphere above
pub const NM_PER_DEGREE_LATITUDE: f64 = EARTH_RADIUS_NM * std::f64::consts::PI / 180.0;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Position {
            latitude,
            longitude,
        }
    }

    /// Finite and inside [-90, 90] x [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance to `other` in nautical miles
    pub fn distance_to(&self, other: &Position) -> f64 {
        haversine_distance(self, other)
    }

    /// Initial great-circle bearing to `other`, 0-360
    pub fn bearing_to(&self, other: &Position) -> f64 {
        initial_bearing(self, other)
    }
}

/// Haversine great-circle distance in nautical miles
pub fn haversine_distance(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_NM * c
}

/// Forward azimuth from `a` to `b`, normalized to [0, 360)
pub fn initial_bearing(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

/// Position reached from `start` after `distance_nm` along `bearing_deg`
///
/// Spherical forward-position (dead-reckoning) formula.
pub fn destination(start: &Position, bearing_deg: f64, distance_nm: f64) -> Position {
    let delta = distance_nm / EARTH_RADIUS_NM;
    let theta = bearing_deg.to_radians();
    let lat1 = start.latitude.to_radians();
    let lon1 = start.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    Position {
        latitude: lat2.to_degrees(),
        longitude: normalize_longitude(lon2.to_degrees()),
    }
}

/// Predict where a vessel will be after `minutes` at constant course and speed
pub fn dead_reckon(start: &Position, course_deg: f64, speed_kn: f64, minutes: f64) -> Position {
    destination(start, course_deg, speed_kn * minutes / 60.0)
}

/// Great-circle midpoint between two positions
pub fn midpoint(a: &Position, b: &Position) -> Position {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let lon1 = a.longitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let bx = lat2.cos() * dlon.cos();
    let by = lat2.cos() * dlon.sin();
    let lat3 = (lat1.sin() + lat2.sin()).atan2(((lat1.cos() + bx).powi(2) + by * by).sqrt());
    let lon3 = lon1 + by.atan2(lat1.cos() + bx);

    Position {
        latitude: lat3.to_degrees(),
        longitude: normalize_longitude(lon3.to_degrees()),
    }
}

/// Arithmetic centroid of a set of positions.
///
/// Adequate for the sub-mile clusters it is used on; returns `None` for an
/// empty slice.
pub fn centroid<'a, I>(positions: I) -> Option<Position>
where
    I: IntoIterator<Item = &'a Position>,
{
    let mut count = 0usize;
    let mut lat = 0.0;
    let mut lon = 0.0;
    for p in positions {
        lat += p.latitude;
        lon += p.longitude;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(Position::new(lat / count as f64, lon / count as f64))
}

/// Normalize bearing to 0-360 range
pub fn normalize_bearing(bearing: f64) -> f64 {
    let mut b = bearing % 360.0;
    if b < 0.0 {
        b += 360.0;
    }
    b
}

fn normalize_longitude(lon: f64) -> f64 {
    (lon + 540.0) % 360.0 - 180.0
}

/// Half-widths in degrees (latitude, longitude) of a box covering `radius_nm`
/// around `center`.
pub fn degree_span(center: &Position, radius_nm: f64) -> (f64, f64) {
    let dlat = radius_nm / NM_PER_DEGREE_LATITUDE;
    // Near the poles a longitude degree collapses; cap the widening
    let cos_lat = center.latitude.to_radians().cos().abs().max(0.01);
    let dlon = (dlat / cos_lat).min(180.0);
    (dlat, dlon)
}

/// A named circular area, used for port and anchorage exemptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedArea {
    pub name: String,
    pub center: Position,
    pub radius_nm: f64,
}

impl NamedArea {
    pub fn new(name: &str, latitude: f64, longitude: f64, radius_nm: f64) -> Self {
        NamedArea {
            name: name.to_string(),
            center: Position::new(latitude, longitude),
            radius_nm,
        }
    }

    pub fn contains(&self, position: &Position) -> bool {
        haversine_distance(&self.center, position) <= self.radius_nm
    }
}

/// First area containing `position`, if any
pub fn find_area<'a>(areas: &'a [NamedArea], position: &Position) -> Option<&'a NamedArea> {
    areas.iter().find(|area| area.contains(position))
}
