//! Three-dimensional points.
//!
//! A [`Point`] is a plain coordinate triple with no identity of its own. Vertex
//! identity lives in the mesh arena ([`VertexKey`](crate::core::tet_mesh::VertexKey));
//! points are copied freely between the background field, the sizing evaluator and
//! the local operators.

#![forbid(unsafe_code)]

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A location in 3D space.
///
/// # Examples
///
/// ```
/// use tetrefine::geometry::point::Point;
///
/// let p = Point::new([1.0, 2.0, 3.0]);
/// assert_eq!(p.x(), 1.0);
/// assert_eq!(p.offset([0.5, 0.0, -1.0]).coords(), [1.5, 2.0, 2.0]);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Point {
    coords: [f64; 3],
}

impl Point {
    /// Creates a point from its coordinates.
    #[must_use]
    pub const fn new(coords: [f64; 3]) -> Self {
        Self { coords }
    }

    /// The origin.
    #[must_use]
    pub const fn origin() -> Self {
        Self::new([0.0; 3])
    }

    /// Returns the coordinates as an array.
    #[must_use]
    pub const fn coords(&self) -> [f64; 3] {
        self.coords
    }

    /// X coordinate.
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.coords[0]
    }

    /// Y coordinate.
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.coords[1]
    }

    /// Z coordinate.
    #[must_use]
    pub const fn z(&self) -> f64 {
        self.coords[2]
    }

    /// Returns `true` if every coordinate is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.coords.iter().all(|c| c.is_finite())
    }

    /// Returns this point translated by `delta`.
    #[must_use]
    pub fn offset(&self, delta: [f64; 3]) -> Self {
        Self::new([
            self.coords[0] + delta[0],
            self.coords[1] + delta[1],
            self.coords[2] + delta[2],
        ])
    }

    /// Position vector of the point.
    #[must_use]
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::from(self.coords)
    }

    /// Builds a point from a position vector.
    #[must_use]
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new([v.x, v.y, v.z])
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (*other - *self).norm()
    }

    /// Arithmetic mean of a non-empty set of points; `None` when `points` is empty.
    #[must_use]
    pub fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let sum = points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.to_vector());
        #[expect(
            clippy::cast_precision_loss,
            reason = "point sets are cavity sized, far below 2^52"
        )]
        let n = points.len() as f64;
        Some(Self::from_vector(&(sum / n)))
    }
}

impl From<[f64; 3]> for Point {
    fn from(coords: [f64; 3]) -> Self {
        Self::new(coords)
    }
}

impl From<Point> for [f64; 3] {
    fn from(p: Point) -> Self {
        p.coords
    }
}

impl Sub for Point {
    type Output = Vector3<f64>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.to_vector() - rhs.to_vector()
    }
}

impl Add<Vector3<f64>> for Point {
    type Output = Self;

    fn add(self, rhs: Vector3<f64>) -> Self::Output {
        Self::from_vector(&(self.to_vector() + rhs))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.coords[0], self.coords[1], self.coords[2])
    }
}
