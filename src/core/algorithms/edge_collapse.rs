//! Edge collapse: merges one endpoint of an edge into the other.
//!
//! Collapsing `r` into `k` deletes the tetrahedra around edge `(r, k)` and
//! replaces `r` by `k` in the rest of the ball of `r`. Only interior, unfixed
//! vertices are removed; both directions are proposed when both qualify, each
//! scored against the ball it rewrites, and the best strictly improving one is
//! committed.
//!
//! The link condition keeps the result a manifold: the vertices adjacent to
//! both `r` and `k` must be exactly the ring around the edge.

use crate::core::algorithms::local_mod::{
    CandidateReport, CollapseOutcome, LocalModError, ModContext, RejectReason, SwapReport,
    assess_candidate, boundary_or_fatal, cavity_quality, commit, conforms, rejection_reason,
    select_best,
};
use crate::core::cavity::{CavityError, VertexBall, vertex_ball};
use crate::core::collections::VertexKeyBuffer;
use crate::core::tet_mesh::{MeshError, TetKey, TetMesh, VertexKey};

/// One collapse direction that passed the vertex checks.
struct Direction {
    removed: VertexKey,
    kept: VertexKey,
    ball: VertexBall,
}

/// Checks that `removed` may be deleted and returns its ball.
fn direction(
    mesh: &TetMesh,
    removed: VertexKey,
    kept: VertexKey,
) -> Result<Result<Direction, RejectReason>, LocalModError> {
    let vertex = mesh
        .vertex(removed)
        .ok_or(MeshError::VertexNotFound { key: removed })?;
    if vertex.is_fixed() {
        return Ok(Err(RejectReason::FixedVertex));
    }
    match vertex_ball(mesh, removed) {
        Ok(ball) => Ok(Ok(Direction {
            removed,
            kept,
            ball,
        })),
        Err(err) => boundary_or_fatal(err).map(Err),
    }
}

/// Returns `true` if the common neighbors of `removed` and `kept` are exactly
/// the ring of the edge between them.
fn link_condition(mesh: &TetMesh, d: &Direction) -> Result<bool, LocalModError> {
    let mut ring = VertexKeyBuffer::new();
    for &key in d.ball.tets() {
        let tet = mesh.tet(key).ok_or(MeshError::TetNotFound { key })?;
        if !tet.contains_vertex(d.kept) {
            continue;
        }
        for &v in tet.vertices() {
            if v != d.removed && v != d.kept && !ring.contains(&v) {
                ring.push(v);
            }
        }
    }
    let around_kept = mesh.adjacent_vertices(d.kept)?;
    let common = mesh
        .adjacent_vertices(d.removed)?
        .into_iter()
        .filter(|v| *v != d.kept && around_kept.contains(v))
        .count();
    Ok(common == ring.len() && ring.iter().all(|v| around_kept.contains(v)))
}

/// Ball of `removed` with `removed` renamed to `kept`, minus the edge star.
fn collapsed_tets(mesh: &TetMesh, d: &Direction) -> Result<Vec<[VertexKey; 4]>, MeshError> {
    let mut tets = Vec::with_capacity(d.ball.tets().len());
    for &key in d.ball.tets() {
        let tet = mesh.tet(key).ok_or(MeshError::TetNotFound { key })?;
        if tet.contains_vertex(d.kept) {
            continue;
        }
        tets.push(
            tet.vertices()
                .map(|v| if v == d.removed { d.kept } else { v }),
        );
    }
    Ok(tets)
}

pub(crate) fn try_edge_collapse(
    mesh: &mut TetMesh,
    tet: TetKey,
    local_edge: usize,
    ctx: &mut ModContext<'_>,
) -> Result<CollapseOutcome, LocalModError> {
    if local_edge >= 6 {
        return Err(CavityError::InvalidLocalEdge { edge: local_edge }.into());
    }
    let [u, w] = mesh
        .tet(tet)
        .ok_or(MeshError::TetNotFound { key: tet })?
        .edge(local_edge);

    let mut directions = Vec::with_capacity(2);
    let mut skipped = Vec::with_capacity(2);
    for (removed, kept) in [(u, w), (w, u)] {
        match direction(mesh, removed, kept)? {
            Ok(d) => directions.push(d),
            Err(reason) => skipped.push(reason),
        }
    }
    if directions.is_empty() {
        let reason = if skipped.contains(&RejectReason::FixedVertex) {
            RejectReason::FixedVertex
        } else {
            RejectReason::BoundaryVertex
        };
        tracing::debug!("[edge_collapse] tet={tet:?} edge={local_edge} rejected: {reason:?}");
        return Ok(CollapseOutcome::Rejected {
            reason,
            report: None,
        });
    }

    let view: &TetMesh = mesh;
    let mut candidates: Vec<CandidateReport> = Vec::with_capacity(directions.len());
    for (index, d) in directions.iter().enumerate() {
        let baseline = cavity_quality(view, d.ball.tets(), ctx)?;
        let tets = collapsed_tets(view, d)?;
        let report = assess_candidate(view, index, tets, baseline, ctx, |tets| {
            if !link_condition(view, d)? {
                return Ok(false);
            }
            conforms(view, d.ball.tets(), tets, &[d.removed])
        })?;
        candidates.push(report);
    }

    let original_quality = candidates
        .iter()
        .map(|c| c.baseline)
        .fold(f64::INFINITY, f64::min);
    let selected = select_best(&mut candidates);
    tracing::debug!(
        "[edge_collapse] directions={} original={original_quality:.4} selected={selected:?}",
        candidates.len()
    );
    let report = SwapReport {
        original_quality,
        candidates,
    };
    let Some(index) = selected else {
        return Ok(CollapseOutcome::Rejected {
            reason: rejection_reason(&report.candidates),
            report: Some(report),
        });
    };

    let d = &directions[index];
    let created = commit(
        mesh,
        d.ball.tets(),
        &report.candidates[index].tets,
        &[d.removed],
        ctx,
    )?;
    Ok(CollapseOutcome::Committed {
        removed: d.removed,
        kept: d.kept,
        new_tets: created,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalModConfig;
    use crate::core::algorithms::local_mod::{CandidateStatus, LocalMeshMod};
    use crate::core::observer::{BadTetQueue, NullObserver};
    use crate::geometry::point::Point;
    use crate::geometry::quality::TetQuality;
    use approx::assert_relative_eq;

    fn split_tet() -> (TetMesh, Vec<VertexKey>) {
        let points = [
            Point::new([1.0, 1.0, 1.0]),
            Point::new([1.0, -1.0, -1.0]),
            Point::new([-1.0, 1.0, -1.0]),
            Point::new([-1.0, -1.0, 1.0]),
            Point::new([0.1, 0.2, -0.1]),
        ];
        let tets = [[4, 1, 2, 3], [0, 4, 2, 3], [0, 1, 4, 3], [0, 1, 2, 4]];
        TetMesh::from_parts(&points, &tets).unwrap()
    }

    fn edge_of(mesh: &TetMesh, a: VertexKey, b: VertexKey) -> (TetKey, usize) {
        mesh.tets()
            .find_map(|(key, tet)| {
                (0..6)
                    .find(|&e| {
                        let [x, y] = tet.edge(e);
                        (x == a && y == b) || (x == b && y == a)
                    })
                    .map(|e| (key, e))
            })
            .unwrap()
    }

    #[test]
    fn test_interior_vertex_collapses_onto_corner() {
        let (mut mesh, keys) = split_tet();
        let (tet, edge) = edge_of(&mesh, keys[4], keys[0]);
        let config = LocalModConfig::default();
        let mut queue = BadTetQueue::new(TetQuality::Gamma, 0.5);
        queue.seed(&mesh);
        let mut ctx = ModContext::new(&TetQuality::Gamma, &config, &mut queue);
        let outcome = mesh.try_edge_collapse(tet, edge, &mut ctx).unwrap();

        let CollapseOutcome::Committed {
            removed,
            kept,
            new_tets,
            report,
        } = outcome
        else {
            panic!("expected a collapse, got {outcome:?}");
        };
        assert_eq!((removed, kept), (keys[4], keys[0]));
        assert_eq!(new_tets.len(), 1);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].status, CandidateStatus::Selected);
        assert_relative_eq!(report.candidates[0].min_quality, 1.0, epsilon = 1e-12);

        assert_eq!(mesh.number_of_tets(), 1);
        assert_eq!(mesh.number_of_vertices(), 4);
        assert!(mesh.vertex(keys[4]).is_none());
        mesh.validate().unwrap();
        assert_relative_eq!(mesh.total_volume(), 8.0 / 3.0, epsilon = 1e-12);
        // The regular tetrahedron left behind is not bad.
        assert!(queue.pop_worst(&mesh).is_none());
    }

    #[test]
    fn test_hull_edge_and_fixed_vertex_are_rejected() {
        let (mut mesh, keys) = split_tet();
        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Gamma, &config, &mut observer);

        let (tet, edge) = edge_of(&mesh, keys[0], keys[1]);
        assert!(matches!(
            mesh.try_edge_collapse(tet, edge, &mut ctx).unwrap(),
            CollapseOutcome::Rejected {
                reason: RejectReason::BoundaryVertex,
                report: None
            }
        ));

        mesh.set_vertex_fixed(keys[4], true).unwrap();
        let (tet, edge) = edge_of(&mesh, keys[4], keys[2]);
        assert!(matches!(
            mesh.try_edge_collapse(tet, edge, &mut ctx).unwrap(),
            CollapseOutcome::Rejected {
                reason: RejectReason::FixedVertex,
                ..
            }
        ));
        assert_eq!(mesh.number_of_tets(), 4);
        assert!(mesh.try_edge_collapse(tet, 6, &mut ctx).is_err());
    }
}
