//! Edge swap: retriangulates the star of an interior edge.
//!
//! The `N` tetrahedra around edge `(a, b)` are `(a, b, r_i, r_{i+1})` for the
//! ring `r_0 .. r_{N-1}`. Removing the edge leaves a bipyramid over the ring
//! polygon; every triangulation of that polygon gives a candidate with `2(N-2)`
//! tetrahedra, one above and one below each triangle. There are
//! Catalan(`N - 2`) candidates: 1 for `N = 3` (the 3-2 flip), 2 for `N = 4`,
//! 5 for `N = 5`.

use crate::core::algorithms::local_mod::{
    LocalModError, ModContext, RejectReason, SwapOutcome, SwapReport, assess_candidate,
    boundary_or_fatal, cavity_quality, commit, conforms, rejection_reason, select_best,
};
use crate::core::cavity::edge_star;
use crate::core::tet_mesh::{TetKey, TetMesh, VertexKey};

/// Triangle `[i, k, j]` with `i < k < j`, by polygon vertex index.
type PolygonTriangle = [usize; 3];

/// All triangulations of a convex polygon with `n` vertices, by vertex index.
///
/// Each triangulation lists `n - 2` triangles.
pub(crate) fn polygon_triangulations(n: usize) -> Vec<Vec<PolygonTriangle>> {
    if n < 3 {
        return Vec::new();
    }
    triangulations_between(0, n - 1)
}

/// Triangulations of the sub-polygon `i, i + 1, .., j`.
fn triangulations_between(i: usize, j: usize) -> Vec<Vec<PolygonTriangle>> {
    if j < i + 2 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for k in i + 1..j {
        let left = triangulations_between(i, k);
        let right = triangulations_between(k, j);
        for l in &left {
            for r in &right {
                let mut tris = Vec::with_capacity(l.len() + r.len() + 1);
                tris.extend_from_slice(l);
                tris.push([i, k, j]);
                tris.extend_from_slice(r);
                out.push(tris);
            }
        }
    }
    out
}

/// Tetrahedra of a candidate, positively oriented when the ring is convex.
fn candidate_tets(
    [a, b]: [VertexKey; 2],
    ring: &[VertexKey],
    triangles: &[PolygonTriangle],
) -> Vec<[VertexKey; 4]> {
    triangles
        .iter()
        .flat_map(|&[i, k, j]| {
            [
                [a, ring[i], ring[k], ring[j]],
                [b, ring[i], ring[j], ring[k]],
            ]
        })
        .collect()
}

/// Returns `true` if some diagonal of the triangulation is already a mesh edge.
fn reuses_existing_edge(
    mesh: &TetMesh,
    ring: &[VertexKey],
    triangles: &[PolygonTriangle],
) -> Result<bool, LocalModError> {
    let n = ring.len();
    for &[i, k, j] in triangles {
        for (x, y) in [(i, k), (k, j), (i, j)] {
            let side = y - x == 1 || y - x == n - 1;
            if !side && mesh.has_edge(ring[x], ring[y])? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

pub(crate) fn try_edge_swap(
    mesh: &mut TetMesh,
    tet: TetKey,
    local_edge: usize,
    ctx: &mut ModContext<'_>,
) -> Result<SwapOutcome, LocalModError> {
    let star = match edge_star(mesh, tet, local_edge) {
        Ok(star) => star,
        Err(err) => {
            let reason = boundary_or_fatal(err)?;
            tracing::debug!("[edge_swap] rejected tet={tet:?} edge={local_edge}: {reason:?}");
            return Ok(SwapOutcome::Rejected {
                reason,
                report: None,
            });
        }
    };
    if star.len() > ctx.config.max_edge_star {
        return Ok(SwapOutcome::Rejected {
            reason: RejectReason::StarTooLarge {
                size: star.len(),
                max: ctx.config.max_edge_star,
            },
            report: None,
        });
    }

    let view: &TetMesh = mesh;
    let original_quality = cavity_quality(view, star.tets(), ctx)?;
    let ring = star.ring();
    let mut candidates = Vec::new();
    for (index, triangles) in polygon_triangulations(ring.len()).iter().enumerate() {
        let tets = candidate_tets(star.edge(), ring, triangles);
        let report = assess_candidate(view, index, tets, original_quality, ctx, |tets| {
            if reuses_existing_edge(view, ring, triangles)? {
                return Ok(false);
            }
            conforms(view, star.tets(), tets, &[])
        })?;
        candidates.push(report);
    }

    let selected = select_best(&mut candidates);
    tracing::debug!(
        "[edge_swap] star size={} candidates={} original={original_quality:.4} selected={selected:?}",
        star.len(),
        candidates.len()
    );
    let mut report = SwapReport {
        original_quality,
        candidates,
    };
    let Some(index) = selected else {
        return Ok(SwapOutcome::Rejected {
            reason: rejection_reason(&report.candidates),
            report: Some(report),
        });
    };

    let new_tets = std::mem::take(&mut report.candidates[index].tets);
    let created = commit(mesh, star.tets(), &new_tets, &[], ctx)?;
    report.candidates[index].tets = new_tets;
    Ok(SwapOutcome::Committed {
        new_tets: created,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalModConfig;
    use crate::core::algorithms::local_mod::{CandidateStatus, LocalMeshMod};
    use crate::core::observer::NullObserver;
    use crate::geometry::point::Point;
    use crate::geometry::quality::TetQuality;
    use approx::assert_relative_eq;

    /// Bipyramid: apexes at `(0, 0, ±h)` around a regular `n`-gon of radius 1.
    fn bipyramid(n: usize, h: f64) -> (TetMesh, Vec<VertexKey>) {
        let mut points = vec![Point::new([0.0, 0.0, h]), Point::new([0.0, 0.0, -h])];
        for i in 0..n {
            #[expect(clippy::cast_precision_loss)]
            let t = std::f64::consts::TAU * i as f64 / n as f64;
            points.push(Point::new([t.cos(), t.sin(), 0.0]));
        }
        let tets: Vec<[usize; 4]> = (0..n).map(|i| [0, 1, 2 + i, 2 + (i + 1) % n]).collect();
        TetMesh::from_parts(&points, &tets).unwrap()
    }

    fn axis_tet(mesh: &TetMesh, keys: &[VertexKey]) -> (TetKey, usize) {
        let (key, tet) = mesh.tets().next().unwrap();
        let edge = (0..6)
            .find(|&e| {
                let [x, y] = tet.edge(e);
                (x == keys[0] && y == keys[1]) || (x == keys[1] && y == keys[0])
            })
            .unwrap();
        (key, edge)
    }

    #[test]
    fn test_catalan_counts() {
        let counts: Vec<usize> = (3..=7).map(|n| polygon_triangulations(n).len()).collect();
        assert_eq!(counts, vec![1, 2, 5, 14, 42]);
        for tris in polygon_triangulations(6) {
            assert_eq!(tris.len(), 4);
            assert!(tris.iter().all(|&[i, k, j]| i < k && k < j));
        }
        assert!(polygon_triangulations(2).is_empty());
    }

    #[test]
    fn test_three_star_flips_to_two() {
        let (mut mesh, keys) = bipyramid(3, 2.0);
        let (tet, edge) = axis_tet(&mesh, &keys);
        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Eta, &config, &mut observer);
        let outcome = mesh.try_edge_swap(tet, edge, &mut ctx).unwrap();

        assert!(outcome.is_committed());
        assert_eq!(outcome.new_tets().len(), 2);
        let report = outcome.report().unwrap();
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].status, CandidateStatus::Selected);
        assert!(report.candidates[0].min_quality > report.original_quality);
        assert_eq!(mesh.number_of_tets(), 2);
        assert!(!mesh.has_edge(keys[0], keys[1]).unwrap());
        mesh.validate().unwrap();
        assert_relative_eq!(mesh.total_volume(), 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_four_star_selects_one_of_two_improving_candidates() {
        let (mut mesh, keys) = bipyramid(4, 2.0);
        let volume = mesh.total_volume();
        let (tet, edge) = axis_tet(&mesh, &keys);
        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Eta, &config, &mut observer);
        let outcome = mesh.try_edge_swap(tet, edge, &mut ctx).unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.candidates.len(), 2);
        let selected = report.selected().unwrap();
        let other = &report.candidates[1 - selected.index];
        assert_eq!(other.status, CandidateStatus::NotSelected);
        assert!(selected.min_quality >= other.min_quality);
        assert!(other.min_quality > report.original_quality);
        assert_eq!(outcome.new_tets().len(), 4);
        mesh.validate().unwrap();
        assert_relative_eq!(mesh.total_volume(), volume, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_star_is_left_alone() {
        let (mut mesh, keys) = bipyramid(4, 0.3);
        let generation = mesh.generation();
        let (tet, edge) = axis_tet(&mesh, &keys);
        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Eta, &config, &mut observer);
        let outcome = mesh.try_edge_swap(tet, edge, &mut ctx).unwrap();

        assert!(matches!(
            outcome,
            SwapOutcome::Rejected {
                reason: RejectReason::NoImprovingCandidate,
                ..
            }
        ));
        assert!(
            outcome
                .report()
                .unwrap()
                .candidates
                .iter()
                .all(|c| c.status == CandidateStatus::NotImproving)
        );
        assert_eq!(mesh.generation(), generation);
        assert!(mesh.has_edge(keys[0], keys[1]).unwrap());
    }

    #[test]
    fn test_star_size_limit_and_boundary() {
        let (mut mesh, keys) = bipyramid(5, 2.0);
        let (tet, edge) = axis_tet(&mesh, &keys);
        let config = LocalModConfig::default().with_max_edge_star(4);
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Gamma, &config, &mut observer);
        let outcome = mesh.try_edge_swap(tet, edge, &mut ctx).unwrap();
        assert!(matches!(
            outcome,
            SwapOutcome::Rejected {
                reason: RejectReason::StarTooLarge { size: 5, max: 4 },
                report: None
            }
        ));

        // Ring edges lie on the hull.
        let ring_edge = (0..6)
            .find(|&e| {
                let [x, y] = mesh.tet(tet).unwrap().edge(e);
                x != keys[0] && x != keys[1] && y != keys[0] && y != keys[1]
            })
            .unwrap();
        let outcome = mesh.try_edge_swap(tet, ring_edge, &mut ctx).unwrap();
        assert!(matches!(
            outcome,
            SwapOutcome::Rejected {
                reason: RejectReason::BoundaryEdge,
                ..
            }
        ));
    }
}
