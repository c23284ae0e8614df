//! Orientation and containment predicates for tetrahedra.
//!
//! Orientation is decided on the signed volume with a tolerance relative to the
//! cube of the longest edge, so the same threshold works for meshes at any scale.

use crate::geometry::point::Point;
use nalgebra::{Matrix3, Vector3};

/// Represents the orientation of a tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// The tetrahedron has negative orientation (determinant < 0)
    NEGATIVE,
    /// The tetrahedron is degenerate (determinant ≈ 0)
    DEGENERATE,
    /// The tetrahedron has positive orientation (determinant > 0)
    POSITIVE,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

/// Signed volume of the tetrahedron `(a, b, c, d)`.
///
/// Positive when `d` lies on the side of plane `(a, b, c)` that makes
/// `(b - a, c - a, d - a)` a right-handed frame.
///
/// # Examples
///
/// ```
/// use tetrefine::geometry::point::Point;
/// use tetrefine::geometry::predicates::signed_volume;
///
/// let v = signed_volume(
///     &Point::new([0.0, 0.0, 0.0]),
///     &Point::new([1.0, 0.0, 0.0]),
///     &Point::new([0.0, 1.0, 0.0]),
///     &Point::new([0.0, 0.0, 1.0]),
/// );
/// assert!((v - 1.0 / 6.0).abs() < 1e-15);
/// ```
#[must_use]
pub fn signed_volume(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    let m = Matrix3::from_columns(&[*b - *a, *c - *a, *d - *a]);
    m.determinant() / 6.0
}

/// Signed volume of a tetrahedron given as a point array.
#[must_use]
pub fn signed_volume_of(points: &[Point; 4]) -> f64 {
    signed_volume(&points[0], &points[1], &points[2], &points[3])
}

/// Longest of the six edges of a tetrahedron.
#[must_use]
pub fn longest_edge(points: &[Point; 4]) -> f64 {
    let mut longest = 0.0_f64;
    for i in 0..4 {
        for j in (i + 1)..4 {
            longest = longest.max(points[i].distance(&points[j]));
        }
    }
    longest
}

/// Orientation of a tetrahedron with a scale-relative degeneracy threshold.
///
/// The tetrahedron is `DEGENERATE` when `|V| <= tolerance * L³` where `L` is
/// its longest edge.
#[must_use]
pub fn orientation(points: &[Point; 4], tolerance: f64) -> Orientation {
    let volume = signed_volume_of(points);
    let scale = longest_edge(points).powi(3);
    if !volume.is_finite() || volume.abs() <= tolerance * scale {
        Orientation::DEGENERATE
    } else if volume > 0.0 {
        Orientation::POSITIVE
    } else {
        Orientation::NEGATIVE
    }
}

/// Barycentric coordinates of `p` with respect to tetrahedron `points`.
///
/// Returns `None` if the tetrahedron is singular.
#[must_use]
pub fn barycentric(points: &[Point; 4], p: &Point) -> Option<[f64; 4]> {
    let m = Matrix3::from_columns(&[
        points[1] - points[0],
        points[2] - points[0],
        points[3] - points[0],
    ]);
    let rhs: Vector3<f64> = *p - points[0];
    let lambda = m.lu().solve(&rhs)?;
    if !lambda.iter().all(|l| l.is_finite()) {
        return None;
    }
    Some([
        1.0 - lambda.x - lambda.y - lambda.z,
        lambda.x,
        lambda.y,
        lambda.z,
    ])
}

/// Returns `true` if every barycentric coordinate is at least `-tolerance`.
#[must_use]
pub fn barycentric_inside(lambda: &[f64; 4], tolerance: f64) -> bool {
    lambda.iter().all(|&l| l >= -tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_tet() -> [Point; 4] {
        [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn test_signed_volume_sign_follows_vertex_order() {
        let t = unit_tet();
        assert_relative_eq!(signed_volume_of(&t), 1.0 / 6.0);
        let swapped = [t[1], t[0], t[2], t[3]];
        assert_relative_eq!(signed_volume_of(&swapped), -1.0 / 6.0);
    }

    #[test]
    fn test_orientation_classes() {
        let t = unit_tet();
        assert_eq!(orientation(&t, 1e-12), Orientation::POSITIVE);
        assert_eq!(
            orientation(&[t[0], t[2], t[1], t[3]], 1e-12),
            Orientation::NEGATIVE
        );
        let flat = [t[0], t[1], t[2], Point::new([0.3, 0.3, 0.0])];
        assert_eq!(orientation(&flat, 1e-12), Orientation::DEGENERATE);
        assert_eq!(format!("{}", Orientation::DEGENERATE), "DEGENERATE");
    }

    #[test]
    fn test_orientation_tolerance_is_scale_relative() {
        let tiny: [Point; 4] = unit_tet().map(|p| Point::new(p.coords().map(|c| c * 1e-6)));
        assert_eq!(orientation(&tiny, 1e-12), Orientation::POSITIVE);
    }

    #[test]
    fn test_barycentric_vertices_and_centroid() {
        let t = unit_tet();
        let at_vertex = barycentric(&t, &t[2]).unwrap();
        assert_relative_eq!(at_vertex[2], 1.0, epsilon = 1e-14);
        assert_relative_eq!(at_vertex[0], 0.0, epsilon = 1e-14);

        let c = barycentric(&t, &Point::new([0.25, 0.25, 0.25])).unwrap();
        for l in c {
            assert_relative_eq!(l, 0.25, epsilon = 1e-14);
        }
        assert!(barycentric_inside(&c, 0.0));
    }

    #[test]
    fn test_barycentric_outside_and_singular() {
        let t = unit_tet();
        let out = barycentric(&t, &Point::new([1.0, 1.0, 1.0])).unwrap();
        assert!(!barycentric_inside(&out, 1e-10));

        let flat = [t[0], t[1], t[2], Point::new([1.0, 1.0, 0.0])];
        assert!(barycentric(&flat, &Point::new([0.1, 0.1, 0.0])).is_none());
    }
}
