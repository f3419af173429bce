//! Spatial indexing for sub-quadratic proximity queries

mod quadtree;

pub use quadtree::{BoundingBox, Quadtree, DEFAULT_NODE_CAPACITY};
