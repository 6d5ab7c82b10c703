//! Geometry helpers for the deployment square.
//!
//! Contains helper functions for:
//! - Distance calculations (squared distance to avoid sqrt in hot paths)
//! - Point-in-square tests
//! - Uniform random positions inside the square

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use super::types::Point;

/// Squared Euclidean distance in grid units.
///
/// Comparisons between distances can use d² directly; only the RSSI
/// calculation needs the actual distance.
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Convert squared distance back to distance (only when needed for RSSI calc).
pub fn distance_from_d2(d2: f64) -> f64 {
    d2.sqrt()
}

/// Euclidean distance in grid units.
pub fn distance(a: &Point, b: &Point) -> f64 {
    distance_from_d2(distance2(a, b))
}

/// Center of a square of the given side anchored at the origin.
pub fn square_center(side: f64) -> Point {
    Point::new(side / 2.0, side / 2.0)
}

/// Inclusive point-in-square test for `[0, side] × [0, side]`.
pub fn point_in_square(p: &Point, side: f64) -> bool {
    p.x >= 0.0 && p.x <= side && p.y >= 0.0 && p.y <= side
}

/// Draw a point uniformly inside `[0, side) × [0, side)`.
///
/// `side` must be positive and finite; settings validation ensures this.
pub fn random_point_in_square<R: Rng + ?Sized>(side: f64, rng: &mut R) -> Point {
    let axis = Uniform::new(0.0, side);
    Point::new(axis.sample(rng), axis.sample(rng))
}
