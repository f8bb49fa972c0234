//! Planar geometry helpers.

use psaodv_env::Position;

/// Euclidean distance between two points in meters.
pub fn distance(a: &Position, b: &Position) -> f64 {
    nalgebra::distance(a, b)
}

/// Returns true if `b` lies within `range` meters of `a` (boundary inclusive).
pub fn within_range(a: &Position, b: &Position, range: f64) -> bool {
    distance(a, b) <= range
}
