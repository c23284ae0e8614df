//! Cavity extraction for the local operators.
//!
//! A cavity is a transient view of the tetrahedra around an edge (edge star),
//! across a face (face pair) or around a vertex (vertex ball). Extraction walks
//! neighbor links and checks that the region is closed and consistently
//! oriented before any operator looks at candidates.
//!
//! Boundary cavities (an edge or vertex on the mesh boundary, a face with no
//! neighbor) are reported as errors here; the operators turn them into
//! ordinary rejections via [`CavityError::is_boundary`].

use crate::core::collections::{BallBuffer, TetKeyBuffer, VertexKeyBuffer, face_key};
use crate::core::tet_mesh::{MeshError, TetKey, TetMesh, VertexKey};
use crate::geometry::predicates::signed_volume;
use thiserror::Error;

/// Errors from cavity extraction.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CavityError {
    /// Underlying mesh lookup failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),
    /// Local edge index outside `0..6`.
    #[error("Local edge index {edge} out of range")]
    InvalidLocalEdge {
        /// The rejected index.
        edge: usize,
    },
    /// Local face index outside `0..4`.
    #[error("Local face index {face} out of range")]
    InvalidLocalFace {
        /// The rejected index.
        face: usize,
    },
    /// The edge touches the mesh boundary, so its star is open.
    #[error("Edge ({a:?}, {b:?}) lies on the boundary")]
    BoundaryEdge {
        /// First endpoint.
        a: VertexKey,
        /// Second endpoint.
        b: VertexKey,
    },
    /// The face has no tetrahedron on its other side.
    #[error("Face {face} of {tet:?} lies on the boundary")]
    BoundaryFace {
        /// Tetrahedron owning the face.
        tet: TetKey,
        /// Local face index.
        face: usize,
    },
    /// The vertex lies on the boundary, so its ball is open.
    #[error("Vertex {vertex:?} lies on the boundary")]
    BoundaryVertex {
        /// The vertex.
        vertex: VertexKey,
    },
    /// The vertex is not used by any tetrahedron.
    #[error("Vertex {vertex:?} is not part of any tetrahedron")]
    IsolatedVertex {
        /// The vertex.
        vertex: VertexKey,
    },
    /// The tetrahedra around an edge do not form a closed, oriented ring.
    #[error("Edge star around ({a:?}, {b:?}) is inconsistent: {message}")]
    InconsistentStar {
        /// First endpoint.
        a: VertexKey,
        /// Second endpoint.
        b: VertexKey,
        /// What failed.
        message: String,
    },
    /// The two tetrahedra across a face do not agree on the face.
    #[error("Face pair at {tet:?} is inconsistent: {message}")]
    InconsistentFacePair {
        /// Tetrahedron the extraction started from.
        tet: TetKey,
        /// What failed.
        message: String,
    },
}

impl CavityError {
    /// Returns `true` for cavities that are open because they touch the boundary.
    ///
    /// These are expected in normal use and are not consistency failures.
    #[must_use]
    pub const fn is_boundary(&self) -> bool {
        matches!(
            self,
            Self::BoundaryEdge { .. } | Self::BoundaryFace { .. } | Self::BoundaryVertex { .. }
        )
    }
}

// =============================================================================
// EDGE STAR
// =============================================================================

/// The closed ring of tetrahedra around an interior edge `(a, b)`.
///
/// `tets[i]` has vertex set `{a, b, ring[i], ring[i + 1]}` (indices mod `n`)
/// and `signed_volume(a, b, ring[i], ring[i + 1]) > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeStar {
    edge: [VertexKey; 2],
    tets: TetKeyBuffer,
    ring: VertexKeyBuffer,
}

impl EdgeStar {
    /// The edge `[a, b]`.
    #[must_use]
    pub const fn edge(&self) -> [VertexKey; 2] {
        self.edge
    }

    /// Tetrahedra of the star in ring order.
    #[must_use]
    pub fn tets(&self) -> &[TetKey] {
        &self.tets
    }

    /// Ring vertices, oriented so every star tetrahedron is positive.
    #[must_use]
    pub fn ring(&self) -> &[VertexKey] {
        &self.ring
    }

    /// Number of tetrahedra in the star.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tets.len()
    }

    /// Always `false` for an extracted star.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tets.is_empty()
    }
}

/// Extracts the star of local edge `local_edge` of tetrahedron `tet`.
///
/// # Errors
///
/// Returns [`CavityError::BoundaryEdge`] for boundary edges and another
/// [`CavityError`] if the ring is not closed and consistently oriented.
pub fn edge_star(mesh: &TetMesh, tet: TetKey, local_edge: usize) -> Result<EdgeStar, CavityError> {
    if local_edge >= 6 {
        return Err(CavityError::InvalidLocalEdge { edge: local_edge });
    }
    let start = mesh.tet(tet).ok_or(MeshError::TetNotFound { key: tet })?;
    let [a, b] = start.edge(local_edge);
    edge_star_from(mesh, tet, a, b)
}

/// Extracts the star of the edge `(a, b)`, wherever it is in the mesh.
///
/// # Errors
///
/// As [`edge_star`]; additionally [`CavityError::InconsistentStar`] if no
/// tetrahedron has the edge.
pub fn find_edge_star(mesh: &TetMesh, a: VertexKey, b: VertexKey) -> Result<EdgeStar, CavityError> {
    let start = mesh
        .incident_tets(a)?
        .into_iter()
        .find(|&t| mesh.tet(t).is_some_and(|tet| tet.contains_vertex(b)))
        .ok_or_else(|| CavityError::InconsistentStar {
            a,
            b,
            message: "no tetrahedron has this edge".to_string(),
        })?;
    edge_star_from(mesh, start, a, b)
}

fn edge_star_from(
    mesh: &TetMesh,
    start: TetKey,
    a: VertexKey,
    b: VertexKey,
) -> Result<EdgeStar, CavityError> {
    let inconsistent = |message: &str| CavityError::InconsistentStar {
        a,
        b,
        message: message.to_string(),
    };
    let start_tet = mesh.tet(start).ok_or(MeshError::TetNotFound { key: start })?;
    let [c, d] = start_tet
        .opposite_edge(a, b)
        .ok_or_else(|| inconsistent("start tetrahedron lacks the edge"))?;
    let [pa, pb, pc, pd] = mesh.points_of(&[a, b, c, d])?;
    let (first, second) = if signed_volume(&pa, &pb, &pc, &pd) > 0.0 {
        (c, d)
    } else {
        (d, c)
    };

    let mut tets = TetKeyBuffer::new();
    let mut ring = VertexKeyBuffer::new();
    tets.push(start);
    ring.push(first);

    // Walk across the face (a, b, next) until the ring closes at the start.
    let (mut current, mut prev, mut next) = (start, first, second);
    loop {
        let tet = mesh.tet(current).ok_or(MeshError::TetNotFound { key: current })?;
        let across = tet
            .index_of(prev)
            .ok_or_else(|| inconsistent("walk lost the ring vertex"))?;
        let neighbor = tet.neighbor(across).ok_or(CavityError::BoundaryEdge { a, b })?;
        if neighbor == start {
            if next != first {
                return Err(inconsistent("ring closed on the wrong face"));
            }
            break;
        }
        ring.push(next);
        if tets.len() >= mesh.number_of_tets() {
            return Err(inconsistent("walk did not close"));
        }
        let n = mesh.tet(neighbor).ok_or(MeshError::TetNotFound { key: neighbor })?;
        let [x, y] = n
            .opposite_edge(a, b)
            .ok_or_else(|| inconsistent("neighbor lacks the edge"))?;
        let after = if x == next {
            y
        } else if y == next {
            x
        } else {
            return Err(inconsistent("neighbor does not share the ring face"));
        };
        tets.push(neighbor);
        (current, prev, next) = (neighbor, next, after);
    }

    let n = ring.len();
    if n < 3 {
        return Err(inconsistent("fewer than three tetrahedra around an interior edge"));
    }
    for i in 0..n {
        if ring[i + 1..].contains(&ring[i]) {
            return Err(inconsistent("ring visits a vertex twice"));
        }
        let [pr, ps] = [mesh.point(ring[i]), mesh.point(ring[(i + 1) % n])];
        let (Some(pr), Some(ps)) = (pr, ps) else {
            return Err(inconsistent("ring vertex missing"));
        };
        if signed_volume(&pa, &pb, &pr, &ps) <= 0.0 {
            return Err(inconsistent("ring is not consistently oriented"));
        }
    }

    tracing::trace!(?a, ?b, size = n, "extracted edge star");
    Ok(EdgeStar {
        edge: [a, b],
        tets,
        ring,
    })
}

// =============================================================================
// FACE PAIR
// =============================================================================

/// Two tetrahedra sharing an interior face.
///
/// With `face = [f0, f1, f2]` and `apexes = [p, q]`, the original tetrahedra
/// are `{p, f0, f1, f2}` and `{q, f0, f1, f2}`, and
/// `signed_volume(p, f0, f1, f2) > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacePair {
    tets: [TetKey; 2],
    face: [VertexKey; 3],
    apexes: [VertexKey; 2],
}

impl FacePair {
    /// The two tetrahedra; the first contains `apexes[0]`.
    #[must_use]
    pub const fn tets(&self) -> [TetKey; 2] {
        self.tets
    }

    /// The shared face, ordered positively as seen from `apexes[0]`.
    #[must_use]
    pub const fn face(&self) -> [VertexKey; 3] {
        self.face
    }

    /// The two vertices off the shared face.
    #[must_use]
    pub const fn apexes(&self) -> [VertexKey; 2] {
        self.apexes
    }
}

/// Extracts the pair across local face `local_face` of `tet`.
///
/// # Errors
///
/// Returns [`CavityError::BoundaryFace`] for a boundary face and
/// [`CavityError::InconsistentFacePair`] if the neighbor does not share the face.
pub fn face_pair(mesh: &TetMesh, tet: TetKey, local_face: usize) -> Result<FacePair, CavityError> {
    if local_face >= 4 {
        return Err(CavityError::InvalidLocalFace { face: local_face });
    }
    let t = mesh.tet(tet).ok_or(MeshError::TetNotFound { key: tet })?;
    let p = t.vertices()[local_face];
    let mut face = t.face(local_face);
    let other = t.neighbor(local_face).ok_or(CavityError::BoundaryFace {
        tet,
        face: local_face,
    })?;
    let n = mesh.tet(other).ok_or(MeshError::TetNotFound { key: other })?;
    let j = n
        .face_index(&face_key(face))
        .ok_or_else(|| CavityError::InconsistentFacePair {
            tet,
            message: format!("neighbor {other:?} does not contain the shared face"),
        })?;
    let q = n.vertices()[j];
    if q == p {
        return Err(CavityError::InconsistentFacePair {
            tet,
            message: "both tetrahedra have the same apex".to_string(),
        });
    }

    let [pp, p0, p1, p2] = mesh.points_of(&[p, face[0], face[1], face[2]])?;
    if signed_volume(&pp, &p0, &p1, &p2) < 0.0 {
        face.swap(1, 2);
    }
    Ok(FacePair {
        tets: [tet, other],
        face,
        apexes: [p, q],
    })
}

// =============================================================================
// VERTEX BALL
// =============================================================================

/// All tetrahedra incident to an interior vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBall {
    vertex: VertexKey,
    tets: BallBuffer,
}

impl VertexBall {
    /// The center vertex.
    #[must_use]
    pub const fn vertex(&self) -> VertexKey {
        self.vertex
    }

    /// Incident tetrahedra.
    #[must_use]
    pub fn tets(&self) -> &[TetKey] {
        &self.tets
    }
}

/// Extracts the closed ball of tetrahedra around `vertex`.
///
/// # Errors
///
/// Returns [`CavityError::BoundaryVertex`] if any incident face through the
/// vertex has no neighbor, or [`CavityError::IsolatedVertex`] for a free vertex.
pub fn vertex_ball(mesh: &TetMesh, vertex: VertexKey) -> Result<VertexBall, CavityError> {
    let tets = mesh.incident_tets(vertex)?;
    if tets.is_empty() {
        return Err(CavityError::IsolatedVertex { vertex });
    }
    for &key in &tets {
        let tet = mesh.tet(key).ok_or(MeshError::TetNotFound { key })?;
        let local = tet.index_of(vertex).ok_or_else(|| MeshError::InconsistentAdjacency {
            message: format!("{key:?} in the ball of {vertex:?} does not contain it"),
        })?;
        if (0..4).any(|f| f != local && tet.neighbor(f).is_none()) {
            return Err(CavityError::BoundaryVertex { vertex });
        }
    }
    Ok(VertexBall { vertex, tets })
}
