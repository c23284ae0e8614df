//! Vertex smoothing: relocates one interior vertex inside its ball.
//!
//! Two proposals are available. [`SmoothingStrategy::WeightedCentroid`] moves
//! the vertex to the volume-weighted centroid of its incident tetrahedra (the
//! centroid of the ball). [`SmoothingStrategy::Optimize`] runs a compass
//! search along the coordinate axes, maximising the worst incident quality.
//!
//! A move is applied only if every incident tetrahedron stays positive and
//! the worst incident quality does not decrease.

use crate::config::SmoothingStrategy;
use crate::core::algorithms::local_mod::{
    LocalModError, ModContext, RejectReason, SmoothOutcome, boundary_or_fatal, cavity_quality,
};
use crate::core::cavity::vertex_ball;
use crate::core::tet_mesh::{MeshError, TetKey, TetMesh, VertexKey};
use crate::geometry::measures::weighted_centroid;
use crate::geometry::point::Point;
use crate::geometry::predicates::{Orientation, orientation};

/// Initial compass step as a fraction of the mean incident edge length.
const INITIAL_STEP_FRACTION: f64 = 0.1;

const COMPASS_DIRECTIONS: [[f64; 3]; 6] = [
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
];

/// Incident tetrahedra as point arrays, with the slot of the moving vertex.
struct BallGeometry {
    tets: Vec<([Point; 4], usize)>,
}

impl BallGeometry {
    fn gather(mesh: &TetMesh, vertex: VertexKey, keys: &[TetKey]) -> Result<Self, MeshError> {
        let mut tets = Vec::with_capacity(keys.len());
        for &key in keys {
            let tet = mesh.tet(key).ok_or(MeshError::TetNotFound { key })?;
            let slot = tet
                .index_of(vertex)
                .ok_or_else(|| MeshError::InconsistentAdjacency {
                    message: format!("{key:?} is in the ball of {vertex:?} but lacks it"),
                })?;
            tets.push((mesh.points_of(tet.vertices())?, slot));
        }
        Ok(Self { tets })
    }

    /// Worst quality and positivity with the vertex moved to `at`.
    fn score_at(&self, at: Point, ctx: &ModContext<'_>) -> (f64, bool) {
        let tolerance = ctx.volume_tolerance();
        let mut worst = f64::INFINITY;
        let mut positive = true;
        for (points, slot) in &self.tets {
            let mut moved = *points;
            moved[*slot] = at;
            positive &= orientation(&moved, tolerance) == Orientation::POSITIVE;
            worst = worst.min(ctx.measure.quality(&moved));
        }
        (worst, positive)
    }

    fn centroid(&self) -> Option<Point> {
        weighted_centroid(self.tets.iter().map(|(points, _)| points))
    }

    /// Compass search from `start`; returns the best position found.
    fn compass_search(
        &self,
        start: Point,
        start_quality: f64,
        step: f64,
        iterations: usize,
        ctx: &ModContext<'_>,
    ) -> Point {
        let (mut best, mut best_quality, mut step) = (start, start_quality, step);
        for _ in 0..iterations {
            let mut improved = false;
            for direction in COMPASS_DIRECTIONS {
                let trial = best.offset(direction.map(|c| c * step));
                let (quality, positive) = self.score_at(trial, ctx);
                if positive && quality > best_quality {
                    best = trial;
                    best_quality = quality;
                    improved = true;
                }
            }
            if !improved {
                step *= 0.5;
            }
        }
        best
    }
}

/// Mean length of the edges at `vertex`.
fn mean_edge_length(mesh: &TetMesh, vertex: VertexKey, at: Point) -> Result<f64, MeshError> {
    let neighbors = mesh.adjacent_vertices(vertex)?;
    let mut total = 0.0;
    for &n in &neighbors {
        total += mesh
            .point(n)
            .ok_or(MeshError::VertexNotFound { key: n })?
            .distance(&at);
    }
    #[expect(clippy::cast_precision_loss, reason = "vertex degree is small")]
    let count = neighbors.len().max(1) as f64;
    Ok(total / count)
}

fn rejected(
    vertex: VertexKey,
    reason: RejectReason,
    quality: Option<f64>,
) -> Result<SmoothOutcome, LocalModError> {
    tracing::debug!("[smooth] vertex={vertex:?} rejected: {reason:?}");
    Ok(SmoothOutcome::Rejected {
        vertex,
        reason,
        quality,
    })
}

pub(crate) fn try_smooth(
    mesh: &mut TetMesh,
    vertex: VertexKey,
    ctx: &mut ModContext<'_>,
) -> Result<SmoothOutcome, LocalModError> {
    let from = mesh
        .vertex(vertex)
        .ok_or(MeshError::VertexNotFound { key: vertex })?;
    if from.is_fixed() {
        return rejected(vertex, RejectReason::FixedVertex, None);
    }
    let from = from.point();
    let ball = match vertex_ball(mesh, vertex) {
        Ok(ball) => ball,
        Err(err) => return rejected(vertex, boundary_or_fatal(err)?, None),
    };

    let old_quality = cavity_quality(mesh, ball.tets(), ctx)?;
    let geometry = BallGeometry::gather(mesh, vertex, ball.tets())?;
    let mean_length = mean_edge_length(mesh, vertex, from)?;

    let proposal = match ctx.config.smoothing {
        SmoothingStrategy::WeightedCentroid => geometry.centroid(),
        SmoothingStrategy::Optimize => Some(geometry.compass_search(
            from,
            old_quality,
            INITIAL_STEP_FRACTION * mean_length,
            ctx.config.optimize_iterations,
            ctx,
        )),
    };
    let Some(to) = proposal else {
        return rejected(vertex, RejectReason::NoValidCandidate, Some(old_quality));
    };
    if from.distance(&to) < ctx.config.min_relocation * mean_length {
        return rejected(vertex, RejectReason::BelowMinRelocation, Some(old_quality));
    }

    let (new_quality, positive) = geometry.score_at(to, ctx);
    if !positive {
        return rejected(vertex, RejectReason::NoValidCandidate, Some(old_quality));
    }
    if new_quality < old_quality {
        return rejected(vertex, RejectReason::NoImprovingCandidate, Some(old_quality));
    }

    mesh.relocate_vertex(vertex, to)
        .map_err(|source| LocalModError::Commit { source })?;
    ctx.observer.vertex_relocated(mesh, vertex, ball.tets());
    tracing::debug!(
        "[smooth] vertex={vertex:?} moved {:.3e}, quality {old_quality:.4} -> {new_quality:.4}",
        from.distance(&to)
    );
    Ok(SmoothOutcome::Relocated {
        vertex,
        from,
        to,
        old_quality,
        new_quality,
    })
}
