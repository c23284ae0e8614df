//! Face swap: the 2-3 flip.
//!
//! Two tetrahedra `(p, f0, f1, f2)` and `(q, f0, f1, f2)` sharing face
//! `(f0, f1, f2)` span a bipyramid. The only alternative splits it into three
//! tetrahedra around the new edge `(p, q)`; it is valid exactly when the
//! segment `pq` crosses the interior of the shared face.

use crate::core::algorithms::local_mod::{
    LocalModError, ModContext, SwapOutcome, SwapReport, assess_candidate, boundary_or_fatal,
    cavity_quality, commit, conforms, rejection_reason, select_best,
};
use crate::core::cavity::{FacePair, face_pair};
use crate::core::tet_mesh::{TetKey, TetMesh, VertexKey};

/// The three tetrahedra around `(p, q)`, each obtained from `(p, f0, f1, f2)`
/// by replacing one face vertex with `q`.
fn split_around_apexes(pair: &FacePair) -> Vec<[VertexKey; 4]> {
    let [p, q] = pair.apexes();
    let [f0, f1, f2] = pair.face();
    vec![[p, q, f1, f2], [p, f0, q, f2], [p, f0, f1, q]]
}

pub(crate) fn try_face_swap(
    mesh: &mut TetMesh,
    tet: TetKey,
    local_face: usize,
    ctx: &mut ModContext<'_>,
) -> Result<SwapOutcome, LocalModError> {
    let pair = match face_pair(mesh, tet, local_face) {
        Ok(pair) => pair,
        Err(err) => {
            let reason = boundary_or_fatal(err)?;
            tracing::debug!("[face_swap] rejected tet={tet:?} face={local_face}: {reason:?}");
            return Ok(SwapOutcome::Rejected {
                reason,
                report: None,
            });
        }
    };

    let view: &TetMesh = mesh;
    let old = pair.tets();
    let original_quality = cavity_quality(view, &old, ctx)?;
    let [p, q] = pair.apexes();
    let candidate = assess_candidate(
        view,
        0,
        split_around_apexes(&pair),
        original_quality,
        ctx,
        |tets| {
            if view.has_edge(p, q)? {
                return Ok(false);
            }
            conforms(view, &old, tets, &[])
        },
    )?;
    let mut candidates = vec![candidate];
    let selected = select_best(&mut candidates);
    tracing::debug!(
        "[face_swap] original={original_quality:.4} candidate={:.4} status={:?}",
        candidates[0].min_quality,
        candidates[0].status
    );

    let report = SwapReport {
        original_quality,
        candidates,
    };
    if selected.is_none() {
        return Ok(SwapOutcome::Rejected {
            reason: rejection_reason(&report.candidates),
            report: Some(report),
        });
    }
    let created = commit(mesh, &old, &report.candidates[0].tets, &[], ctx)?;
    Ok(SwapOutcome::Committed {
        new_tets: created,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalModConfig;
    use crate::core::algorithms::local_mod::{CandidateStatus, LocalMeshMod, RejectReason};
    use crate::core::observer::{BadTetQueue, NullObserver};
    use crate::geometry::point::Point;
    use crate::geometry::quality::TetQuality;
    use approx::assert_relative_eq;

    /// Two tetrahedra on an equilateral triangle of circumradius 1 in `z = 0`,
    /// with apexes `p` and `q`.
    fn pair_mesh(p: [f64; 3], q: [f64; 3]) -> (TetMesh, Vec<VertexKey>) {
        let h = 3.0_f64.sqrt() / 2.0;
        let points = [
            Point::new(p),
            Point::new(q),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([-0.5, h, 0.0]),
            Point::new([-0.5, -h, 0.0]),
        ];
        TetMesh::from_parts(&points, &[[0, 2, 3, 4], [1, 2, 3, 4]]).unwrap()
    }

    /// Tetrahedron containing `p` and the local index of its shared face.
    fn shared_face(mesh: &TetMesh, p: VertexKey) -> (TetKey, usize) {
        let (key, tet) = mesh
            .tets()
            .find(|(_, t)| t.contains_vertex(p))
            .unwrap();
        (key, tet.index_of(p).unwrap())
    }

    #[test]
    fn test_flat_pair_becomes_three_tets() {
        let (mut mesh, keys) = pair_mesh([0.0, 0.0, 0.3], [0.0, 0.0, -0.3]);
        let volume = mesh.total_volume();
        let (tet, face) = shared_face(&mesh, keys[0]);
        let config = LocalModConfig::default();
        let mut queue = BadTetQueue::new(TetQuality::Eta, 2.0);
        let mut ctx = ModContext::new(&TetQuality::Eta, &config, &mut queue);
        let outcome = mesh.try_face_swap(tet, face, &mut ctx).unwrap();

        assert!(outcome.is_committed());
        assert_eq!(outcome.new_tets().len(), 3);
        assert_eq!(mesh.number_of_tets(), 3);
        assert!(mesh.has_edge(keys[0], keys[1]).unwrap());
        mesh.validate().unwrap();
        assert_relative_eq!(mesh.total_volume(), volume, epsilon = 1e-12);
        // Every new tetrahedron was queued by the observer.
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_tall_pair_is_not_improved() {
        let (mut mesh, keys) = pair_mesh([0.0, 0.0, 2.0], [0.0, 0.0, -2.0]);
        let generation = mesh.generation();
        let (tet, face) = shared_face(&mesh, keys[0]);
        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Eta, &config, &mut observer);
        let outcome = mesh.try_face_swap(tet, face, &mut ctx).unwrap();

        assert!(matches!(
            outcome,
            SwapOutcome::Rejected {
                reason: RejectReason::NoImprovingCandidate,
                ..
            }
        ));
        assert_eq!(mesh.generation(), generation);
        assert_eq!(mesh.number_of_tets(), 2);
    }

    #[test]
    fn test_segment_missing_the_face_is_inverted() {
        let (mut mesh, keys) = pair_mesh([0.0, 0.0, 1.0], [3.0, 0.0, -1.0]);
        let (tet, face) = shared_face(&mesh, keys[0]);
        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Gamma, &config, &mut observer);
        let outcome = mesh.try_face_swap(tet, face, &mut ctx).unwrap();

        let SwapOutcome::Rejected { reason, report } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(reason, RejectReason::NoValidCandidate);
        let report = report.unwrap();
        assert_eq!(report.candidates[0].status, CandidateStatus::Inverted);
        assert!(report.candidates[0].min_quality <= 0.0);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_boundary_face_and_bad_index() {
        let (mut mesh, keys) = pair_mesh([0.0, 0.0, 0.3], [0.0, 0.0, -0.3]);
        let (tet, shared) = shared_face(&mesh, keys[0]);
        let hull_face = (shared + 1) % 4;
        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&TetQuality::Gamma, &config, &mut observer);
        assert!(matches!(
            mesh.try_face_swap(tet, hull_face, &mut ctx).unwrap(),
            SwapOutcome::Rejected {
                reason: RejectReason::BoundaryFace,
                report: None
            }
        ));
        assert!(mesh.try_face_swap(tet, 4, &mut ctx).is_err());
    }
}
