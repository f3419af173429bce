//! Region quadtree over vessel positions
//!
//! Rebuilt from the full vessel set every tick. Each node keeps up to
//! `capacity` points of its own; once full it splits into four equal
//! quadrants and further points go to the children.

use serde::{Deserialize, Serialize};

use crate::geo::{degree_span, Position};
use crate::vessel::VesselId;

/// Default points per node before subdividing
pub const DEFAULT_NODE_CAPACITY: usize = 8;

/// Axis-aligned latitude/longitude box, edges inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min_lat: -90.0,
        min_lon: -180.0,
        max_lat: 90.0,
        max_lon: 180.0,
    };

    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        BoundingBox {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Box covering a circle of `radius_nm` around `center`, clamped to the
    /// world edges. Use [`BoundingBox::around_wrapped`] near the antimeridian.
    pub fn around(center: &Position, radius_nm: f64) -> Self {
        let (dlat, dlon) = degree_span(center, radius_nm);
        BoundingBox {
            min_lat: (center.latitude - dlat).max(-90.0),
            min_lon: (center.longitude - dlon).max(-180.0),
            max_lat: (center.latitude + dlat).min(90.0),
            max_lon: (center.longitude + dlon).min(180.0),
        }
    }

    /// Like [`BoundingBox::around`], but a box crossing ±180° longitude is
    /// split into one box on each side.
    pub fn around_wrapped(center: &Position, radius_nm: f64) -> Vec<BoundingBox> {
        let (dlat, dlon) = degree_span(center, radius_nm);
        let min_lat = (center.latitude - dlat).max(-90.0);
        let max_lat = (center.latitude + dlat).min(90.0);
        let min_lon = center.longitude - dlon;
        let max_lon = center.longitude + dlon;

        if dlon >= 180.0 {
            vec![BoundingBox::new(min_lat, -180.0, max_lat, 180.0)]
        } else if min_lon < -180.0 {
            vec![
                BoundingBox::new(min_lat, -180.0, max_lat, max_lon),
                BoundingBox::new(min_lat, min_lon + 360.0, max_lat, 180.0),
            ]
        } else if max_lon > 180.0 {
            vec![
                BoundingBox::new(min_lat, min_lon, max_lat, 180.0),
                BoundingBox::new(min_lat, -180.0, max_lat, max_lon - 360.0),
            ]
        } else {
            vec![BoundingBox::new(min_lat, min_lon, max_lat, max_lon)]
        }
    }

    pub fn contains(&self, p: &Position) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lon
            && p.longitude <= self.max_lon
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(other.min_lat > self.max_lat
            || other.max_lat < self.min_lat
            || other.min_lon > self.max_lon
            || other.max_lon < self.min_lon)
    }

    fn quadrants(&self) -> [BoundingBox; 4] {
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let mid_lon = (self.min_lon + self.max_lon) / 2.0;
        [
            // NE
            BoundingBox::new(mid_lat, mid_lon, self.max_lat, self.max_lon),
            // NW
            BoundingBox::new(mid_lat, self.min_lon, self.max_lat, mid_lon),
            // SE
            BoundingBox::new(self.min_lat, mid_lon, mid_lat, self.max_lon),
            // SW
            BoundingBox::new(self.min_lat, self.min_lon, mid_lat, mid_lon),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
struct QuadPoint {
    id: VesselId,
    position: Position,
}

/// Point quadtree keyed by vessel id
#[derive(Debug)]
pub struct Quadtree {
    boundary: BoundingBox,
    capacity: usize,
    points: Vec<QuadPoint>,
    children: Option<Box<[Quadtree; 4]>>,
}

impl Quadtree {
    pub fn new(boundary: BoundingBox, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Quadtree {
            boundary,
            capacity,
            points: Vec::with_capacity(capacity),
            children: None,
        }
    }

    /// Quadtree covering the whole globe with the default node capacity
    pub fn world() -> Self {
        Self::new(BoundingBox::WORLD, DEFAULT_NODE_CAPACITY)
    }

    pub fn boundary(&self) -> &BoundingBox {
        &self.boundary
    }

    /// Insert a point. Returns false if it lies outside this tree's bounds.
    ///
    /// There is no depth limit. Each node retains `capacity` points of its
    /// own, so the depth grows with n / capacity even for coincident points.
    pub fn insert(&mut self, id: VesselId, position: Position) -> bool {
        if !self.boundary.contains(&position) {
            return false;
        }

        if self.children.is_none() && self.points.len() < self.capacity {
            self.points.push(QuadPoint { id, position });
            return true;
        }

        let capacity = self.capacity;
        let boundary = self.boundary;
        let children = self.children.get_or_insert_with(|| {
            let [ne, nw, se, sw] = boundary.quadrants();
            Box::new([
                Quadtree::new(ne, capacity),
                Quadtree::new(nw, capacity),
                Quadtree::new(se, capacity),
                Quadtree::new(sw, capacity),
            ])
        });

        children.iter_mut().any(|child| child.insert(id, position))
    }

    /// Ids of all points inside `range`
    pub fn query(&self, range: &BoundingBox) -> Vec<VesselId> {
        let mut found = Vec::new();
        self.query_into(range, &mut found);
        found
    }

    /// Candidate ids within `radius_nm` of `center`, across the antimeridian.
    /// Callers still filter by true distance.
    pub fn query_around(&self, center: &Position, radius_nm: f64) -> Vec<VesselId> {
        let mut found = Vec::new();
        for range in BoundingBox::around_wrapped(center, radius_nm) {
            self.query_into(&range, &mut found);
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    fn query_into(&self, range: &BoundingBox, found: &mut Vec<VesselId>) {
        if !self.boundary.intersects(range) {
            return;
        }

        found.extend(
            self.points
                .iter()
                .filter(|p| range.contains(&p.position))
                .map(|p| p.id),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_into(range, found);
            }
        }
    }

    /// Total number of points stored
    pub fn len(&self) -> usize {
        self.points.len()
            + self
                .children
                .as_ref()
                .map(|c| c.iter().map(Quadtree::len).sum())
                .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth of the deepest node (a lone root is depth 1)
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map(|c| c.iter().map(Quadtree::depth).max().unwrap_or(0))
            .unwrap_or(0)
    }
}
