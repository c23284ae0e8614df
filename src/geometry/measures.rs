//! Geometric measure computations for tetrahedra.
//!
//! These are the derived quantities of a tetrahedron record (volume,
//! circumradius, inradius, edge lengths). They are computed on demand from the
//! four vertex positions; nothing is cached in the mesh.

#![forbid(unsafe_code)]

use crate::geometry::point::Point;
use crate::geometry::predicates::signed_volume_of;
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

/// Local vertex pairs of the six edges of a tetrahedron.
pub const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

/// Errors from geometric measure computations.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum MeasureError {
    /// The tetrahedron has (numerically) zero volume.
    #[error("Degenerate tetrahedron: volume {volume:e}")]
    DegenerateTetrahedron {
        /// Signed volume that triggered the error.
        volume: f64,
    },
    /// A coordinate or intermediate value was not finite.
    #[error("Non-finite value in measure computation: {message}")]
    NonFinite {
        /// Which quantity was not finite.
        message: String,
    },
}

/// Unsigned volume of a tetrahedron.
#[must_use]
pub fn volume(points: &[Point; 4]) -> f64 {
    signed_volume_of(points).abs()
}

/// Lengths of the six edges in [`TET_EDGES`] order.
#[must_use]
pub fn edge_lengths(points: &[Point; 4]) -> [f64; 6] {
    TET_EDGES.map(|[i, j]| points[i].distance(&points[j]))
}

/// Areas of the four faces; face `i` is the face opposite vertex `i`.
#[must_use]
pub fn face_areas(points: &[Point; 4]) -> [f64; 4] {
    std::array::from_fn(|i| {
        let [a, b, c] = opposite_face(points, i);
        0.5 * (b - a).cross(&(c - a)).norm()
    })
}

fn opposite_face(points: &[Point; 4], omit: usize) -> [Point; 3] {
    let mut face = [Point::origin(); 3];
    let mut k = 0;
    for (i, p) in points.iter().enumerate() {
        if i != omit {
            face[k] = *p;
            k += 1;
        }
    }
    face
}

/// Circumcenter of a tetrahedron.
///
/// # Errors
///
/// Returns [`MeasureError::DegenerateTetrahedron`] when the four points are
/// coplanar and the circumsphere is undefined.
pub fn circumcenter(points: &[Point; 4]) -> Result<Point, MeasureError> {
    // |x - p0|² = |x - pi|²  ⇔  2 (pi - p0)·(x - p0) = |pi - p0|²
    let e1 = points[1] - points[0];
    let e2 = points[2] - points[0];
    let e3 = points[3] - points[0];
    let m = Matrix3::from_rows(&[e1.transpose(), e2.transpose(), e3.transpose()]) * 2.0;
    let rhs = Vector3::new(e1.norm_squared(), e2.norm_squared(), e3.norm_squared());
    let offset = m
        .lu()
        .solve(&rhs)
        .ok_or_else(|| MeasureError::DegenerateTetrahedron {
            volume: signed_volume_of(points),
        })?;
    let center = points[0] + offset;
    if !center.is_finite() {
        return Err(MeasureError::NonFinite {
            message: "circumcenter".to_string(),
        });
    }
    Ok(center)
}

/// Circumradius of a tetrahedron.
///
/// # Errors
///
/// Same as [`circumcenter`].
pub fn circumradius(points: &[Point; 4]) -> Result<f64, MeasureError> {
    circumcenter(points).map(|c| c.distance(&points[0]))
}

/// Inradius of a tetrahedron, `3 |V| / S` with `S` the total face area.
///
/// # Errors
///
/// Returns [`MeasureError::DegenerateTetrahedron`] if the surface area vanishes.
pub fn inradius(points: &[Point; 4]) -> Result<f64, MeasureError> {
    let area: f64 = face_areas(points).iter().sum();
    if area <= 0.0 || !area.is_finite() {
        return Err(MeasureError::DegenerateTetrahedron {
            volume: signed_volume_of(points),
        });
    }
    Ok(3.0 * volume(points) / area)
}

/// Volume-weighted centroid of a set of tetrahedra.
///
/// Equals the centroid of the region they tile. Returns `None` when the total
/// volume is zero.
#[must_use]
pub fn weighted_centroid<'a, I>(tets: I) -> Option<Point>
where
    I: IntoIterator<Item = &'a [Point; 4]>,
{
    let mut total = 0.0;
    let mut acc = Vector3::zeros();
    for tet in tets {
        let v = volume(tet);
        let c = tet
            .iter()
            .fold(Vector3::zeros(), |sum, p| sum + p.to_vector())
            * 0.25;
        acc += c * v;
        total += v;
    }
    (total > 0.0).then(|| Point::from_vector(&(acc / total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn regular_tet() -> [Point; 4] {
        [
            Point::new([1.0, 1.0, 1.0]),
            Point::new([1.0, -1.0, -1.0]),
            Point::new([-1.0, 1.0, -1.0]),
            Point::new([-1.0, -1.0, 1.0]),
        ]
    }

    #[test]
    fn test_regular_tet_measures() {
        let t = regular_tet();
        let a = 8.0_f64.sqrt();
        for l in edge_lengths(&t) {
            assert_relative_eq!(l, a, epsilon = 1e-12);
        }
        assert_relative_eq!(volume(&t), a.powi(3) / (6.0 * 2.0_f64.sqrt()), epsilon = 1e-12);
        assert_relative_eq!(circumradius(&t).unwrap(), 3.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(inradius(&t).unwrap(), 3.0_f64.sqrt() / 3.0, epsilon = 1e-12);
        let c = circumcenter(&t).unwrap();
        assert_relative_eq!(c.distance(&Point::origin()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_face_areas_of_corner_tet() {
        let t = [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
        ];
        let areas = face_areas(&t);
        assert_relative_eq!(areas[0], 3.0_f64.sqrt() / 2.0, epsilon = 1e-12);
        for a in &areas[1..] {
            assert_relative_eq!(*a, 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_circumradius_of_flat_tet_fails() {
        let flat = [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([1.0, 1.0, 0.0]),
        ];
        assert!(matches!(
            circumradius(&flat),
            Err(MeasureError::DegenerateTetrahedron { .. })
        ));
    }

    #[test]
    fn test_weighted_centroid_single_tet() {
        let a = [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
        ];
        let c = weighted_centroid([&a]).unwrap();
        assert_relative_eq!(c.x(), 0.25, epsilon = 1e-12);
        assert!(weighted_centroid(std::iter::empty()).is_none());
    }
}
