//! Local Topology Modifier: shared protocol of the local mesh operators.
//!
//! Every operator follows the same steps:
//!
//! 1. extract a cavity (edge star, face pair or vertex ball) and score it;
//! 2. propose candidate retriangulations (or a new vertex position);
//! 3. reject candidates with an inverted tetrahedron or a non-conforming
//!    topology, and score the rest by their worst tetrahedron;
//! 4. commit the best candidate that strictly improves on the cavity through
//!    one atomic [`TetMesh::replace_tets`], then notify the [`MeshObserver`],
//!    or leave the mesh untouched and report why.
//!
//! "No improvement" and boundary cavities are ordinary outcomes, returned as
//! `Rejected`. Errors are reserved for broken meshes and invalid input.

use crate::config::{ConfigError, LocalModConfig};
use crate::core::cavity::CavityError;
use crate::core::collections::TetKeyBuffer;
use crate::core::observer::MeshObserver;
use crate::core::tet_mesh::{MeshError, TetKey, TetMesh, VertexKey};
use crate::geometry::point::Point;
use crate::geometry::predicates::{Orientation, orientation, signed_volume_of};
use crate::geometry::quality::{DEGENERACY_TOLERANCE, QualityMeasure};
use thiserror::Error;

use super::{edge_collapse, edge_swap, face_swap, smoothing};

/// Fatal failures of a local operator. The mesh is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum LocalModError {
    /// The cavity around the target is not a valid closed region.
    #[error(transparent)]
    Cavity(#[from] CavityError),
    /// A mesh lookup failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),
    /// A tetrahedron of the input cavity is inverted.
    #[error("Cavity tetrahedron {tet:?} is inverted (signed volume {volume:e})")]
    InvertedCavity {
        /// The inverted tetrahedron.
        tet: TetKey,
        /// Its signed volume.
        volume: f64,
    },
    /// The mesh refused the selected candidate.
    #[error("Committing the selected candidate failed: {source}")]
    Commit {
        /// Rejection from the mesh.
        #[source]
        source: MeshError,
    },
    /// The operator configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why an operator left the mesh unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RejectReason {
    /// Some candidates are valid, none beats the original cavity.
    NoImprovingCandidate,
    /// Every candidate is inverted or non-conforming.
    NoValidCandidate,
    /// The edge star is larger than the configured maximum.
    StarTooLarge {
        /// Number of tetrahedra around the edge.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The edge lies on the mesh boundary.
    BoundaryEdge,
    /// The face lies on the mesh boundary.
    BoundaryFace,
    /// The vertex lies on the mesh boundary.
    BoundaryVertex,
    /// The vertex is pinned.
    FixedVertex,
    /// The proposed move is too short to be worth applying.
    BelowMinRelocation,
}

/// Verdict on one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    /// A tetrahedron is inverted or degenerate.
    Inverted,
    /// The candidate would duplicate an edge, face or tetrahedron outside the cavity.
    Nonconforming,
    /// Valid, but its worst tetrahedron is not better than the cavity's.
    NotImproving,
    /// Improving, but another candidate is better.
    NotSelected,
    /// Committed.
    Selected,
}

impl CandidateStatus {
    /// Returns `true` for the committed candidate.
    #[must_use]
    pub const fn is_selected(self) -> bool {
        matches!(self, Self::Selected)
    }
}

/// One proposed retriangulation and its verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateReport {
    /// Position in the candidate list.
    pub index: usize,
    /// Tetrahedra of the candidate, positively oriented when valid.
    pub tets: Vec<[VertexKey; 4]>,
    /// Worst quality over `tets`.
    pub min_quality: f64,
    /// Quality the candidate had to beat.
    pub baseline: f64,
    /// Verdict.
    pub status: CandidateStatus,
}

/// All candidates considered by a swap or collapse.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapReport {
    /// Worst quality of the original cavity.
    pub original_quality: f64,
    /// Candidates in proposal order.
    pub candidates: Vec<CandidateReport>,
}

impl SwapReport {
    /// The committed candidate, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&CandidateReport> {
        self.candidates.iter().find(|c| c.status.is_selected())
    }
}

/// Result of an edge or face swap.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    /// The cavity was replaced.
    Committed {
        /// Keys of the new tetrahedra.
        new_tets: TetKeyBuffer,
        /// Candidate details.
        report: SwapReport,
    },
    /// The mesh is unchanged.
    Rejected {
        /// Why.
        reason: RejectReason,
        /// Candidate details, when candidates were proposed.
        report: Option<SwapReport>,
    },
}

impl SwapOutcome {
    /// Returns `true` if the mesh changed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// New tetrahedra, empty when rejected.
    #[must_use]
    pub fn new_tets(&self) -> &[TetKey] {
        match self {
            Self::Committed { new_tets, .. } => new_tets,
            Self::Rejected { .. } => &[],
        }
    }

    /// Candidate details.
    #[must_use]
    pub const fn report(&self) -> Option<&SwapReport> {
        match self {
            Self::Committed { report, .. } => Some(report),
            Self::Rejected { report, .. } => report.as_ref(),
        }
    }
}

/// Result of an edge collapse.
#[derive(Debug, Clone, PartialEq)]
pub enum CollapseOutcome {
    /// `removed` was merged into `kept`.
    Committed {
        /// The deleted vertex.
        removed: VertexKey,
        /// The surviving endpoint.
        kept: VertexKey,
        /// Keys of the new tetrahedra.
        new_tets: TetKeyBuffer,
        /// Candidate details.
        report: SwapReport,
    },
    /// The mesh is unchanged.
    Rejected {
        /// Why.
        reason: RejectReason,
        /// Candidate details, when candidates were proposed.
        report: Option<SwapReport>,
    },
}

impl CollapseOutcome {
    /// Returns `true` if the mesh changed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Result of vertex smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothOutcome {
    /// The vertex moved.
    Relocated {
        /// The vertex.
        vertex: VertexKey,
        /// Previous position.
        from: Point,
        /// New position.
        to: Point,
        /// Worst incident quality before the move.
        old_quality: f64,
        /// Worst incident quality after the move.
        new_quality: f64,
    },
    /// The vertex did not move.
    Rejected {
        /// The vertex.
        vertex: VertexKey,
        /// Why.
        reason: RejectReason,
        /// Worst incident quality, when the ball was scored.
        quality: Option<f64>,
    },
}

impl SmoothOutcome {
    /// Returns `true` if the vertex moved.
    #[must_use]
    pub const fn is_relocated(&self) -> bool {
        matches!(self, Self::Relocated { .. })
    }
}

/// Everything an operator needs besides the mesh.
pub struct ModContext<'a> {
    /// Quality measure ranking candidates.
    pub measure: &'a dyn QualityMeasure,
    /// Operator parameters.
    pub config: &'a LocalModConfig,
    /// Receives committed changes.
    pub observer: &'a mut dyn MeshObserver,
}

impl<'a> ModContext<'a> {
    /// Bundles a measure, a configuration and an observer.
    pub fn new(
        measure: &'a dyn QualityMeasure,
        config: &'a LocalModConfig,
        observer: &'a mut dyn MeshObserver,
    ) -> Self {
        Self {
            measure,
            config,
            observer,
        }
    }

    /// Like [`new`](Self::new), but rejects an invalid configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LocalModError::Config`] if `config` fails validation.
    pub fn checked(
        measure: &'a dyn QualityMeasure,
        config: &'a LocalModConfig,
        observer: &'a mut dyn MeshObserver,
    ) -> Result<Self, LocalModError> {
        config.validate()?;
        Ok(Self::new(measure, config, observer))
    }

    /// Relative volume tolerance used for the positive-volume test.
    ///
    /// Never below the mesh's own degeneracy threshold, so a candidate that
    /// passes here is accepted by [`TetMesh::replace_tets`].
    pub(crate) fn volume_tolerance(&self) -> f64 {
        self.config.volume_tolerance.max(DEGENERACY_TOLERANCE)
    }
}

impl std::fmt::Debug for ModContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModContext")
            .field("measure", &self.measure.name())
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

/// Local mesh modification operators.
///
/// # Examples
///
/// ```
/// use tetrefine::config::LocalModConfig;
/// use tetrefine::core::algorithms::local_mod::{LocalMeshMod, ModContext, RejectReason, SwapOutcome};
/// use tetrefine::core::observer::NullObserver;
/// use tetrefine::core::tet_mesh::TetMesh;
/// use tetrefine::geometry::point::Point;
/// use tetrefine::geometry::quality::TetQuality;
///
/// let points = [
///     Point::new([0.0, 0.0, 0.0]),
///     Point::new([1.0, 0.0, 0.0]),
///     Point::new([0.0, 1.0, 0.0]),
///     Point::new([0.0, 0.0, 1.0]),
/// ];
/// let (mut mesh, _) = TetMesh::from_parts(&points, &[[0, 1, 2, 3]]).unwrap();
/// let tet = mesh.tet_keys().next().unwrap();
///
/// let config = LocalModConfig::default();
/// let mut observer = NullObserver;
/// let mut ctx = ModContext::new(&TetQuality::Gamma, &config, &mut observer);
/// let outcome = mesh.try_face_swap(tet, 0, &mut ctx).unwrap();
/// assert!(matches!(
///     outcome,
///     SwapOutcome::Rejected { reason: RejectReason::BoundaryFace, .. }
/// ));
/// ```
pub trait LocalMeshMod {
    /// Retriangulates the star of local edge `local_edge` of `tet`.
    ///
    /// # Errors
    ///
    /// Returns [`LocalModError`] if the star is malformed or the commit fails.
    fn try_edge_swap(
        &mut self,
        tet: TetKey,
        local_edge: usize,
        ctx: &mut ModContext<'_>,
    ) -> Result<SwapOutcome, LocalModError>;

    /// Replaces the two tetrahedra across local face `local_face` of `tet` by three.
    ///
    /// # Errors
    ///
    /// Returns [`LocalModError`] if the pair is malformed or the commit fails.
    fn try_face_swap(
        &mut self,
        tet: TetKey,
        local_face: usize,
        ctx: &mut ModContext<'_>,
    ) -> Result<SwapOutcome, LocalModError>;

    /// Moves `vertex` to improve its incident tetrahedra.
    ///
    /// # Errors
    ///
    /// Returns [`LocalModError`] if the ball is malformed.
    fn try_smooth(
        &mut self,
        vertex: VertexKey,
        ctx: &mut ModContext<'_>,
    ) -> Result<SmoothOutcome, LocalModError>;

    /// Merges one endpoint of local edge `local_edge` of `tet` into the other.
    ///
    /// # Errors
    ///
    /// Returns [`LocalModError`] if a cavity is malformed or the commit fails.
    fn try_edge_collapse(
        &mut self,
        tet: TetKey,
        local_edge: usize,
        ctx: &mut ModContext<'_>,
    ) -> Result<CollapseOutcome, LocalModError>;
}

impl LocalMeshMod for TetMesh {
    fn try_edge_swap(
        &mut self,
        tet: TetKey,
        local_edge: usize,
        ctx: &mut ModContext<'_>,
    ) -> Result<SwapOutcome, LocalModError> {
        edge_swap::try_edge_swap(self, tet, local_edge, ctx)
    }

    fn try_face_swap(
        &mut self,
        tet: TetKey,
        local_face: usize,
        ctx: &mut ModContext<'_>,
    ) -> Result<SwapOutcome, LocalModError> {
        face_swap::try_face_swap(self, tet, local_face, ctx)
    }

    fn try_smooth(
        &mut self,
        vertex: VertexKey,
        ctx: &mut ModContext<'_>,
    ) -> Result<SmoothOutcome, LocalModError> {
        smoothing::try_smooth(self, vertex, ctx)
    }

    fn try_edge_collapse(
        &mut self,
        tet: TetKey,
        local_edge: usize,
        ctx: &mut ModContext<'_>,
    ) -> Result<CollapseOutcome, LocalModError> {
        edge_collapse::try_edge_collapse(self, tet, local_edge, ctx)
    }
}

// =============================================================================
// SHARED STEPS
// =============================================================================

/// Splits cavity errors into boundary rejections and fatal errors.
pub(crate) fn boundary_or_fatal(err: CavityError) -> Result<RejectReason, LocalModError> {
    match err {
        CavityError::BoundaryEdge { .. } => Ok(RejectReason::BoundaryEdge),
        CavityError::BoundaryFace { .. } => Ok(RejectReason::BoundaryFace),
        CavityError::BoundaryVertex { .. } => Ok(RejectReason::BoundaryVertex),
        other => Err(other.into()),
    }
}

/// Worst quality of existing tetrahedra; fails if one is inverted.
pub(crate) fn cavity_quality(
    mesh: &TetMesh,
    tets: &[TetKey],
    ctx: &ModContext<'_>,
) -> Result<f64, LocalModError> {
    let mut worst = f64::INFINITY;
    for &tet in tets {
        let points = mesh.tet_points(tet)?;
        let volume = signed_volume_of(&points);
        if volume <= 0.0 {
            return Err(LocalModError::InvertedCavity { tet, volume });
        }
        worst = worst.min(ctx.measure.quality(&points));
    }
    Ok(worst)
}

/// Scores a candidate: worst quality and whether every tetrahedron is positive.
pub(crate) fn score_tets(
    mesh: &TetMesh,
    tets: &[[VertexKey; 4]],
    ctx: &ModContext<'_>,
) -> Result<(f64, bool), LocalModError> {
    let tolerance = ctx.volume_tolerance();
    let mut worst = f64::INFINITY;
    let mut positive = true;
    for vertices in tets {
        let points = mesh.points_of(vertices)?;
        positive &= orientation(&points, tolerance) == Orientation::POSITIVE;
        worst = worst.min(ctx.measure.quality(&points));
    }
    Ok((worst, positive))
}

/// Builds the report of one candidate. `conforming` is checked only for
/// geometrically valid candidates.
pub(crate) fn assess_candidate(
    mesh: &TetMesh,
    index: usize,
    tets: Vec<[VertexKey; 4]>,
    baseline: f64,
    ctx: &ModContext<'_>,
    conforming: impl FnOnce(&[[VertexKey; 4]]) -> Result<bool, LocalModError>,
) -> Result<CandidateReport, LocalModError> {
    let (min_quality, positive) = score_tets(mesh, &tets, ctx)?;
    let status = if !positive {
        CandidateStatus::Inverted
    } else if !conforming(&tets)? {
        CandidateStatus::Nonconforming
    } else {
        CandidateStatus::NotImproving
    };
    Ok(CandidateReport {
        index,
        tets,
        min_quality,
        baseline,
        status,
    })
}

/// Returns `false` if the mesh would refuse `new` as a replacement of `old`.
pub(crate) fn conforms(
    mesh: &TetMesh,
    old: &[TetKey],
    new: &[[VertexKey; 4]],
    retired: &[VertexKey],
) -> Result<bool, LocalModError> {
    match mesh.check_replacement(old, new, retired) {
        Ok(()) => Ok(true),
        Err(
            err @ (MeshError::VertexNotFound { .. }
            | MeshError::TetNotFound { .. }
            | MeshError::InconsistentAdjacency { .. }),
        ) => Err(err.into()),
        Err(err) => {
            tracing::trace!("[local_mod] candidate refused: {err}");
            Ok(false)
        }
    }
}

/// Marks the best strictly improving candidate as selected, the other
/// improving ones as not selected, and returns its index. Ties go to the
/// earlier candidate.
pub(crate) fn select_best(candidates: &mut [CandidateReport]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in candidates.iter_mut().enumerate() {
        if c.status != CandidateStatus::NotImproving || c.min_quality <= c.baseline {
            continue;
        }
        c.status = CandidateStatus::NotSelected;
        if best.is_none_or(|(_, q)| c.min_quality > q) {
            best = Some((i, c.min_quality));
        }
    }
    let (index, _) = best?;
    candidates[index].status = CandidateStatus::Selected;
    Some(index)
}

/// Reason for rejecting a list of candidates with nothing selected.
pub(crate) fn rejection_reason(candidates: &[CandidateReport]) -> RejectReason {
    if candidates.iter().any(|c| {
        matches!(
            c.status,
            CandidateStatus::NotImproving | CandidateStatus::NotSelected
        )
    }) {
        RejectReason::NoImprovingCandidate
    } else {
        RejectReason::NoValidCandidate
    }
}

/// Applies a replacement and notifies the observer.
pub(crate) fn commit(
    mesh: &mut TetMesh,
    old: &[TetKey],
    new: &[[VertexKey; 4]],
    retired: &[VertexKey],
    ctx: &mut ModContext<'_>,
) -> Result<TetKeyBuffer, LocalModError> {
    let created = mesh
        .replace_tets_retiring(old, new, retired)
        .map_err(|source| LocalModError::Commit { source })?;
    ctx.observer.tets_replaced(mesh, old, &created);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observer::NullObserver;
    use crate::geometry::quality::TetQuality;

    fn candidate(index: usize, min_quality: f64, status: CandidateStatus) -> CandidateReport {
        CandidateReport {
            index,
            tets: Vec::new(),
            min_quality,
            baseline: 0.5,
            status,
        }
    }

    #[test]
    fn test_select_best_prefers_strict_improvement_and_earlier_ties() {
        let mut candidates = vec![
            candidate(0, 0.5, CandidateStatus::NotImproving),
            candidate(1, 0.9, CandidateStatus::Inverted),
            candidate(2, 0.7, CandidateStatus::NotImproving),
            candidate(3, 0.7, CandidateStatus::NotImproving),
            candidate(4, 0.6, CandidateStatus::NotImproving),
        ];
        assert_eq!(select_best(&mut candidates), Some(2));
        let statuses: Vec<_> = candidates.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                CandidateStatus::NotImproving,
                CandidateStatus::Inverted,
                CandidateStatus::Selected,
                CandidateStatus::NotSelected,
                CandidateStatus::NotSelected,
            ]
        );
    }

    #[test]
    fn test_rejection_reason_distinguishes_valid_from_invalid() {
        let mut equal = vec![candidate(0, 0.5, CandidateStatus::NotImproving)];
        assert_eq!(select_best(&mut equal), None);
        assert_eq!(rejection_reason(&equal), RejectReason::NoImprovingCandidate);

        let invalid = vec![
            candidate(0, -1.0, CandidateStatus::Inverted),
            candidate(1, 0.8, CandidateStatus::Nonconforming),
        ];
        assert_eq!(rejection_reason(&invalid), RejectReason::NoValidCandidate);
        assert_eq!(rejection_reason(&[]), RejectReason::NoValidCandidate);
    }

    #[test]
    fn test_checked_context_rejects_bad_config() {
        let config = LocalModConfig::default().with_max_edge_star(2);
        let mut observer = NullObserver;
        let err = ModContext::checked(&TetQuality::Gamma, &config, &mut observer).unwrap_err();
        assert!(matches!(err, LocalModError::Config(_)));

        let config = LocalModConfig::default().with_volume_tolerance(0.0);
        let ctx = ModContext::checked(&TetQuality::Gamma, &config, &mut observer).unwrap();
        assert_eq!(ctx.volume_tolerance(), DEGENERACY_TOLERANCE);
    }
}
