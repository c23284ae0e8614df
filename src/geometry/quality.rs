//! Geometric quality measures for tetrahedra.
//!
//! A quality measure maps a tetrahedron to a scalar where **higher is better**,
//! so candidate re-triangulations can be ranked by their worst element. Every
//! measure here is normalised so that the regular tetrahedron scores `1.0`.
//!
//! Orientation is part of the measure: an inverted tetrahedron scores a
//! negative value and a degenerate one scores exactly `0.0`, whatever its
//! aspect ratio. Local operators therefore never need a separate sign test to
//! reject inverted candidates, although they perform one for diagnostics.
//!
//! # Quality Metrics
//!
//! - **Gamma**: `2√6 · r_in / l_max`, inradius over longest edge.
//! - **Eta**: `12 (3V)^{2/3} / Σ l²`, volume over mean squared edge length.
//! - **Rho**: `l_min / l_max`, edge-length ratio. Blind to slivers.
//! - **Radius-edge**: `(√6/4) · l_min / R`, inverse of the circumradius to
//!   shortest-edge ratio used by Delaunay refinement.
//!
//! # References
//!
//! - Shewchuk, J.R. "What Is a Good Linear Element? Interpolation, Conditioning,
//!   Anisotropy, and Quality Measures" (2002)
//! - Liu, A. and Joe, B. "Relationship between tetrahedron shape measures"
//!   *BIT Numerical Mathematics* 34.2 (1994): 268-287

use crate::core::tet_mesh::{MeshError, TetKey, TetMesh};
use crate::geometry::measures::{circumradius, edge_lengths, face_areas};
use crate::geometry::point::Point;
use crate::geometry::predicates::{Orientation, orientation, signed_volume_of};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative volume threshold under which a tetrahedron counts as degenerate.
pub const DEGENERACY_TOLERANCE: f64 = 1e-12;

const SQRT_6: f64 = 2.449_489_742_783_178;

/// A scalar fitness function on tetrahedra, higher is better.
///
/// Implementations must be pure: no interior mutability, no dependence on
/// anything but the four points. Inverted tetrahedra must score `< 0` and
/// degenerate ones `<= 0`.
pub trait QualityMeasure: Send + Sync {
    /// Evaluates the tetrahedron `points`.
    fn quality(&self, points: &[Point; 4]) -> f64;

    /// Short name, used in diagnostics.
    fn name(&self) -> &'static str;
}

impl<Q: QualityMeasure + ?Sized> QualityMeasure for &Q {
    fn quality(&self, points: &[Point; 4]) -> f64 {
        (**self).quality(points)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// The built-in quality measures.
///
/// # Examples
///
/// ```
/// use tetrefine::geometry::point::Point;
/// use tetrefine::geometry::quality::{QualityMeasure, TetQuality};
///
/// let regular = [
///     Point::new([1.0, 1.0, 1.0]),
///     Point::new([1.0, -1.0, -1.0]),
///     Point::new([-1.0, 1.0, -1.0]),
///     Point::new([-1.0, -1.0, 1.0]),
/// ];
/// assert!((TetQuality::Gamma.quality(&regular) - 1.0).abs() < 1e-12);
///
/// let inverted = [regular[1], regular[0], regular[2], regular[3]];
/// assert!(TetQuality::Gamma.quality(&inverted) < 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TetQuality {
    /// Normalised inradius over longest edge.
    #[default]
    Gamma,
    /// Normalised volume over mean squared edge length.
    Eta,
    /// Shortest over longest edge.
    Rho,
    /// Normalised shortest edge over circumradius.
    RadiusEdge,
}

impl TetQuality {
    /// All built-in measures.
    pub const ALL: [Self; 4] = [Self::Gamma, Self::Eta, Self::Rho, Self::RadiusEdge];

    fn unsigned_quality(self, points: &[Point; 4], volume: f64) -> f64 {
        let lengths = edge_lengths(points);
        let l_max = lengths.iter().copied().fold(0.0_f64, f64::max);
        let l_min = lengths.iter().copied().fold(f64::INFINITY, f64::min);
        match self {
            Self::Gamma => {
                let area: f64 = face_areas(points).iter().sum();
                let r_in = 3.0 * volume / area;
                2.0 * SQRT_6 * r_in / l_max
            }
            Self::Eta => {
                let sum_sq: f64 = lengths.iter().map(|l| l * l).sum();
                12.0 * (3.0 * volume).powf(2.0 / 3.0) / sum_sq
            }
            Self::Rho => l_min / l_max,
            Self::RadiusEdge => circumradius(points)
                .map_or(0.0, |r| SQRT_6 / 4.0 * l_min / r),
        }
    }
}

impl QualityMeasure for TetQuality {
    fn quality(&self, points: &[Point; 4]) -> f64 {
        let sign = match orientation(points, DEGENERACY_TOLERANCE) {
            Orientation::DEGENERATE => return 0.0,
            Orientation::POSITIVE => 1.0,
            Orientation::NEGATIVE => -1.0,
        };
        let q = self.unsigned_quality(points, signed_volume_of(points).abs());
        if q.is_finite() { sign * q } else { 0.0 }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Gamma => "gamma",
            Self::Eta => "eta",
            Self::Rho => "rho",
            Self::RadiusEdge => "radius-edge",
        }
    }
}

impl fmt::Display for TetQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Minimum quality over a set of tetrahedra; `None` for an empty set.
#[must_use]
pub fn min_quality<'a, Q, I>(measure: &Q, tets: I) -> Option<f64>
where
    Q: QualityMeasure + ?Sized,
    I: IntoIterator<Item = &'a [Point; 4]>,
{
    tets.into_iter()
        .map(|t| measure.quality(t))
        .reduce(f64::min)
}

/// Quality of the tetrahedron `tet_key` in `mesh`.
///
/// # Errors
///
/// Returns [`MeshError`] if the tetrahedron or one of its vertices is missing.
pub fn tet_quality<Q>(mesh: &TetMesh, tet_key: TetKey, measure: &Q) -> Result<f64, MeshError>
where
    Q: QualityMeasure + ?Sized,
{
    let points = mesh.tet_points(tet_key)?;
    Ok(measure.quality(&points))
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

    fn corner_tet() -> [Point; 4] {
        [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
        ]
    }

    // =============================================================================
    // NORMALISATION
    // =============================================================================

    #[test]
    fn test_regular_tet_scores_one_for_every_measure() {
        let t = regular_tet();
        for m in TetQuality::ALL {
            assert_relative_eq!(m.quality(&t), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_corner_tet_is_worse_than_regular() {
        let t = corner_tet();
        for m in TetQuality::ALL {
            let q = m.quality(&t);
            assert!(q > 0.0 && q < 1.0, "{m}: {q}");
        }
    }

    #[test]
    fn test_quality_is_scale_invariant() {
        let t = corner_tet();
        let big = t.map(|p| Point::new(p.coords().map(|c| c * 1000.0)));
        for m in TetQuality::ALL {
            assert_relative_eq!(m.quality(&t), m.quality(&big), epsilon = 1e-9);
        }
    }

    // =============================================================================
    // ORIENTATION AND DEGENERACY
    // =============================================================================

    #[test]
    fn test_inverted_tet_scores_negative() {
        let t = corner_tet();
        let inverted = [t[0], t[2], t[1], t[3]];
        for m in TetQuality::ALL {
            assert!(m.quality(&inverted) < 0.0);
            assert_relative_eq!(m.quality(&inverted), -m.quality(&t), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_flat_tet_scores_zero() {
        let t = corner_tet();
        let flat = [t[0], t[1], t[2], Point::new([0.2, 0.2, 0.0])];
        for m in TetQuality::ALL {
            assert_relative_eq!(m.quality(&flat), 0.0);
        }
    }

    #[test]
    fn test_sliver_detected_by_volume_measures_only() {
        // Four nearly coplanar points at the corners of a square: edge lengths are
        // fine, volume is tiny.
        let sliver = [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 1.0, 0.0]),
            Point::new([1.0, 0.0, 0.01]),
            Point::new([0.0, 1.0, 0.01]),
        ];
        let sliver = if signed_volume_of(&sliver) < 0.0 {
            [sliver[1], sliver[0], sliver[2], sliver[3]]
        } else {
            sliver
        };
        let corner = corner_tet();
        for m in [TetQuality::Gamma, TetQuality::Eta] {
            assert!(m.quality(&sliver) < 0.1, "{m}");
            assert!(m.quality(&sliver) < m.quality(&corner), "{m}");
        }
        // Edge ratios of a sliver look healthy.
        assert!(TetQuality::Rho.quality(&sliver) > 0.5);
        assert!(TetQuality::RadiusEdge.quality(&sliver) > 0.5);
    }

    #[test]
    fn test_min_quality() {
        let good = regular_tet();
        let poor = corner_tet();
        let q = min_quality(&TetQuality::Gamma, [&good, &poor]).unwrap();
        assert_relative_eq!(q, TetQuality::Gamma.quality(&poor));
        assert!(min_quality(&TetQuality::Gamma, std::iter::empty()).is_none());
    }

    #[test]
    fn test_measure_names_and_serde() {
        assert_eq!(TetQuality::RadiusEdge.to_string(), "radius-edge");
        let json = serde_json::to_string(&TetQuality::Eta).unwrap();
        let back: TetQuality = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TetQuality::Eta);
    }
}
