//! Arena-backed tetrahedral mesh.
//!
//! [`TetMesh`] stores vertices and tetrahedra in `slotmap` arenas addressed by
//! stable [`VertexKey`] / [`TetKey`] handles. Keys are versioned: a key of a
//! retired tetrahedron never resolves again, even after its slot is reused.
//!
//! # Invariants
//!
//! Between operator invocations the mesh is a conforming simplicial complex:
//!
//! - every tetrahedron has four distinct vertices and positive orientation;
//! - every face is shared by at most two tetrahedra;
//! - `neighbors[i]` of a tetrahedron is the tetrahedron across face `i`, and
//!   the relation is mutual;
//! - every vertex used by a tetrahedron has an incidence hint pointing to a
//!   tetrahedron that contains it.
//!
//! The only topological mutation is [`TetMesh::replace_tets`], which checks the
//! replacement fully before touching the arena, so a rejected replacement leaves
//! the mesh unchanged. [`TetMesh::validate`] re-checks every invariant.

use crate::core::collections::{
    BallBuffer, FaceKey, FastHashMap, FastHashSet, SmallBuffer, TetKeyBuffer, VertexKeyBuffer,
    face_key, fast_hash_map_with_capacity, fast_hash_set_with_capacity,
};
use crate::core::tetrahedron::Tetrahedron;
use crate::geometry::measures::volume;
use crate::geometry::point::Point;
use crate::geometry::predicates::{Orientation, orientation, signed_volume_of};
use crate::geometry::quality::DEGENERACY_TOLERANCE;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use thiserror::Error;

new_key_type! {
    /// Stable handle of a vertex in a [`TetMesh`].
    pub struct VertexKey;
}

new_key_type! {
    /// Stable handle of a tetrahedron in a [`TetMesh`].
    pub struct TetKey;
}

/// A mesh vertex: a position plus a flag that pins it in place.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshVertex {
    point: Point,
    fixed: bool,
}

impl MeshVertex {
    /// Position of the vertex.
    #[must_use]
    pub const fn point(&self) -> Point {
        self.point
    }

    /// Fixed vertices are never moved or removed by local operators.
    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        self.fixed
    }
}

/// Errors raised by mesh queries and mutations.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum MeshError {
    /// A vertex key does not resolve.
    #[error("Vertex {key:?} not found")]
    VertexNotFound {
        /// The missing key.
        key: VertexKey,
    },
    /// A tetrahedron key does not resolve.
    #[error("Tetrahedron {key:?} not found")]
    TetNotFound {
        /// The missing key.
        key: TetKey,
    },
    /// A vertex position has a NaN or infinite coordinate.
    #[error("Non-finite vertex position {point}")]
    NonFiniteVertex {
        /// The rejected position.
        point: Point,
    },
    /// A tetrahedron repeats a vertex.
    #[error("Tetrahedron {vertices:?} repeats a vertex")]
    DuplicateVertex {
        /// The offending vertex tuple.
        vertices: [VertexKey; 4],
    },
    /// A tetrahedron has non-positive orientation.
    #[error("Tetrahedron {vertices:?} is inverted or degenerate (signed volume {volume:e})")]
    InvertedTetrahedron {
        /// The offending vertex tuple.
        vertices: [VertexKey; 4],
        /// Its signed volume.
        volume: f64,
    },
    /// More than two tetrahedra share a face.
    #[error("Face {face:?} is shared by {count} tetrahedra")]
    NonManifoldFace {
        /// Canonical face key.
        face: FaceKey,
        /// Number of tetrahedra sharing it.
        count: usize,
    },
    /// A replacement does not conform to the cavity it replaces.
    #[error("Non-conforming replacement: {message}")]
    NonConformingReplacement {
        /// What failed.
        message: String,
    },
    /// Neighbor links or incidence hints are inconsistent.
    #[error("Inconsistent adjacency: {message}")]
    InconsistentAdjacency {
        /// What failed.
        message: String,
    },
    /// A tetrahedron index in construction input is out of range.
    #[error("Tetrahedron {tet} references vertex index {index}, but only {count} points were given")]
    VertexIndexOutOfRange {
        /// Position of the tetrahedron in the input.
        tet: usize,
        /// The offending vertex index.
        index: usize,
        /// Number of points.
        count: usize,
    },
}

/// A tetrahedral mesh over slotmap arenas.
///
/// # Examples
///
/// ```
/// use tetrefine::core::tet_mesh::TetMesh;
/// use tetrefine::geometry::point::Point;
///
/// let points = [
///     Point::new([0.0, 0.0, 0.0]),
///     Point::new([1.0, 0.0, 0.0]),
///     Point::new([0.0, 1.0, 0.0]),
///     Point::new([0.0, 0.0, 1.0]),
///     Point::new([1.0, 1.0, 1.0]),
/// ];
/// let (mesh, _keys) = TetMesh::from_parts(&points, &[[0, 1, 2, 3], [1, 2, 3, 4]]).unwrap();
/// assert_eq!(mesh.number_of_tets(), 2);
/// assert!(mesh.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TetMesh {
    vertices: SlotMap<VertexKey, MeshVertex>,
    tets: SlotMap<TetKey, Tetrahedron>,
    incident: SecondaryMap<VertexKey, TetKey>,
    generation: u64,
}

impl TetMesh {
    /// Creates an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from a point list and index tetrahedra, then builds adjacency.
    ///
    /// Negatively oriented tetrahedra are reoriented by swapping their first two
    /// vertices. Returns the mesh and the vertex keys in input order.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError`] for non-finite points, out-of-range indices,
    /// degenerate tetrahedra or non-manifold faces.
    pub fn from_parts(
        points: &[Point],
        tets: &[[usize; 4]],
    ) -> Result<(Self, Vec<VertexKey>), MeshError> {
        let mut mesh = Self::new();
        let keys = points
            .iter()
            .map(|p| mesh.insert_vertex(*p))
            .collect::<Result<Vec<_>, _>>()?;

        for (t, indices) in tets.iter().enumerate() {
            let mut vertices = [VertexKey::default(); 4];
            for (slot, &index) in vertices.iter_mut().zip(indices) {
                *slot = *keys.get(index).ok_or(MeshError::VertexIndexOutOfRange {
                    tet: t,
                    index,
                    count: points.len(),
                })?;
            }
            let pts = mesh.points_of(&vertices)?;
            if signed_volume_of(&pts) < 0.0 {
                vertices.swap(0, 1);
            }
            mesh.insert_tet(vertices)?;
        }
        mesh.build_adjacency()?;
        Ok((mesh, keys))
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Number of vertices, including free ones.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of tetrahedra.
    #[must_use]
    pub fn number_of_tets(&self) -> usize {
        self.tets.len()
    }

    /// Structural generation; bumped by every topological or geometric change.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The vertex `key`, if present.
    #[must_use]
    pub fn vertex(&self, key: VertexKey) -> Option<&MeshVertex> {
        self.vertices.get(key)
    }

    /// Position of vertex `key`, if present.
    #[must_use]
    pub fn point(&self, key: VertexKey) -> Option<Point> {
        self.vertices.get(key).map(MeshVertex::point)
    }

    /// The tetrahedron `key`, if present.
    #[must_use]
    pub fn tet(&self, key: TetKey) -> Option<&Tetrahedron> {
        self.tets.get(key)
    }

    /// Returns `true` if `key` resolves to a live tetrahedron.
    #[must_use]
    pub fn contains_tet(&self, key: TetKey) -> bool {
        self.tets.contains_key(key)
    }

    /// Iterates over all vertices.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexKey, &MeshVertex)> {
        self.vertices.iter()
    }

    /// Iterates over all tetrahedra.
    pub fn tets(&self) -> impl Iterator<Item = (TetKey, &Tetrahedron)> {
        self.tets.iter()
    }

    /// Keys of all tetrahedra.
    pub fn tet_keys(&self) -> impl Iterator<Item = TetKey> + '_ {
        self.tets.keys()
    }

    /// Positions of four vertices.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::VertexNotFound`] if any key does not resolve.
    pub fn points_of(&self, vertices: &[VertexKey; 4]) -> Result<[Point; 4], MeshError> {
        let mut points = [Point::origin(); 4];
        for (slot, &key) in points.iter_mut().zip(vertices) {
            *slot = self.point(key).ok_or(MeshError::VertexNotFound { key })?;
        }
        Ok(points)
    }

    /// Corner positions of tetrahedron `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError`] if the tetrahedron or one of its vertices is missing.
    pub fn tet_points(&self, key: TetKey) -> Result<[Point; 4], MeshError> {
        let tet = self.tets.get(key).ok_or(MeshError::TetNotFound { key })?;
        self.points_of(tet.vertices())
    }

    /// Total volume of all tetrahedra.
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        self.tets
            .keys()
            .filter_map(|k| self.tet_points(k).ok())
            .map(|p| volume(&p))
            .sum()
    }

    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Adds a free vertex.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::NonFiniteVertex`] for NaN or infinite coordinates.
    pub fn insert_vertex(&mut self, point: Point) -> Result<VertexKey, MeshError> {
        if !point.is_finite() {
            return Err(MeshError::NonFiniteVertex { point });
        }
        self.generation += 1;
        Ok(self.vertices.insert(MeshVertex {
            point,
            fixed: false,
        }))
    }

    /// Pins or releases a vertex.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::VertexNotFound`] if `key` does not resolve.
    pub fn set_vertex_fixed(&mut self, key: VertexKey, fixed: bool) -> Result<(), MeshError> {
        let vertex = self
            .vertices
            .get_mut(key)
            .ok_or(MeshError::VertexNotFound { key })?;
        vertex.fixed = fixed;
        Ok(())
    }

    /// Adds a positively oriented tetrahedron without wiring adjacency.
    ///
    /// Call [`build_adjacency`](Self::build_adjacency) once all tetrahedra are in.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError`] for missing or repeated vertices, or a
    /// tetrahedron that is not positively oriented.
    pub fn insert_tet(&mut self, vertices: [VertexKey; 4]) -> Result<TetKey, MeshError> {
        self.check_new_tet(&vertices)?;
        let key = self.tets.insert(Tetrahedron::new(vertices));
        for v in vertices {
            self.incident.insert(v, key);
        }
        self.generation += 1;
        Ok(key)
    }

    /// Rebuilds all neighbor links from shared faces.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::NonManifoldFace`] if a face is shared by more than
    /// two tetrahedra; the mesh is left unchanged in that case.
    pub fn build_adjacency(&mut self) -> Result<(), MeshError> {
        let mut faces: FastHashMap<FaceKey, SmallBuffer<(TetKey, usize), 2>> =
            fast_hash_map_with_capacity(self.tets.len().saturating_mul(4));
        for (key, tet) in &self.tets {
            for f in 0..4 {
                let entry = faces.entry(tet.face_key(f)).or_default();
                if entry.len() >= 2 {
                    return Err(MeshError::NonManifoldFace {
                        face: tet.face_key(f),
                        count: entry.len() + 1,
                    });
                }
                entry.push((key, f));
            }
        }

        for tet in self.tets.values_mut() {
            for f in 0..4 {
                tet.set_neighbor(f, None);
            }
        }
        for shared in faces.values() {
            if let [(t1, f1), (t2, f2)] = shared.as_slice() {
                self.tets[*t1].set_neighbor(*f1, Some(*t2));
                self.tets[*t2].set_neighbor(*f2, Some(*t1));
            }
        }
        self.generation += 1;
        Ok(())
    }

    fn check_new_tet(&self, vertices: &[VertexKey; 4]) -> Result<(), MeshError> {
        for i in 0..4 {
            if vertices[i + 1..].contains(&vertices[i]) {
                return Err(MeshError::DuplicateVertex {
                    vertices: *vertices,
                });
            }
        }
        let points = self.points_of(vertices)?;
        if orientation(&points, DEGENERACY_TOLERANCE) != Orientation::POSITIVE {
            return Err(MeshError::InvertedTetrahedron {
                vertices: *vertices,
                volume: signed_volume_of(&points),
            });
        }
        Ok(())
    }

    // =========================================================================
    // INCIDENCE QUERIES
    // =========================================================================

    /// Tetrahedra incident to `vertex`, found by walking neighbor links from
    /// the vertex's incidence hint. Empty for a free vertex.
    ///
    /// Requires adjacency to be built.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError`] if the vertex is missing or its hint is stale.
    pub fn incident_tets(&self, vertex: VertexKey) -> Result<BallBuffer, MeshError> {
        if !self.vertices.contains_key(vertex) {
            return Err(MeshError::VertexNotFound { key: vertex });
        }
        let mut ball = BallBuffer::new();
        let Some(&start) = self.incident.get(vertex) else {
            return Ok(ball);
        };
        let start_tet = self.tets.get(start).ok_or(MeshError::TetNotFound { key: start })?;
        if !start_tet.contains_vertex(vertex) {
            return Err(MeshError::InconsistentAdjacency {
                message: format!("incidence hint of {vertex:?} points to {start:?}, which does not contain it"),
            });
        }

        let mut seen: FastHashSet<TetKey> = fast_hash_set_with_capacity(32);
        let mut stack: TetKeyBuffer = TetKeyBuffer::new();
        seen.insert(start);
        stack.push(start);
        while let Some(key) = stack.pop() {
            ball.push(key);
            let tet = self.tets.get(key).ok_or(MeshError::TetNotFound { key })?;
            let local = tet.index_of(vertex).ok_or_else(|| MeshError::InconsistentAdjacency {
                message: format!("walk around {vertex:?} reached {key:?}, which does not contain it"),
            })?;
            // Faces containing the vertex are all faces except the one opposite it.
            for f in (0..4).filter(|&f| f != local) {
                if let Some(n) = tet.neighbor(f)
                    && seen.insert(n)
                {
                    stack.push(n);
                }
            }
        }
        Ok(ball)
    }

    /// Vertices sharing an edge with `vertex`.
    ///
    /// # Errors
    ///
    /// Same as [`incident_tets`](Self::incident_tets).
    pub fn adjacent_vertices(&self, vertex: VertexKey) -> Result<VertexKeyBuffer, MeshError> {
        let mut out = VertexKeyBuffer::new();
        for key in self.incident_tets(vertex)? {
            let tet = self.tets.get(key).ok_or(MeshError::TetNotFound { key })?;
            for &v in tet.vertices() {
                if v != vertex && !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    /// Returns `true` if `a` and `b` are joined by an edge of some tetrahedron.
    ///
    /// # Errors
    ///
    /// Same as [`incident_tets`](Self::incident_tets).
    pub fn has_edge(&self, a: VertexKey, b: VertexKey) -> Result<bool, MeshError> {
        Ok(self.adjacent_vertices(a)?.contains(&b))
    }

    /// Returns `true` if some tetrahedron outside `excluded` has the face `face`.
    fn face_exists_outside(
        &self,
        face: &FaceKey,
        excluded: &FastHashSet<TetKey>,
    ) -> Result<bool, MeshError> {
        for key in self.incident_tets(face[0])? {
            if excluded.contains(&key) {
                continue;
            }
            let tet = self.tets.get(key).ok_or(MeshError::TetNotFound { key })?;
            if tet.contains_vertex(face[1]) && tet.contains_vertex(face[2]) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // =========================================================================
    // ATOMIC MUTATION
    // =========================================================================

    /// Replaces the tetrahedra `old` with new tetrahedra on the same vertices.
    ///
    /// See [`replace_tets_retiring`](Self::replace_tets_retiring).
    ///
    /// # Errors
    ///
    /// Same as [`replace_tets_retiring`](Self::replace_tets_retiring).
    pub fn replace_tets(
        &mut self,
        old: &[TetKey],
        new: &[[VertexKey; 4]],
    ) -> Result<TetKeyBuffer, MeshError> {
        self.replace_tets_retiring(old, new, &[])
    }

    /// Replaces the tetrahedra `old` by `new` and deletes the `retired` vertices,
    /// as one step.
    ///
    /// The replacement must tile the same region: the faces on the boundary of
    /// `old` must be exactly the faces on the boundary of `new`, every interior
    /// face of `new` must be shared by exactly two new tetrahedra and must not
    /// exist elsewhere in the mesh, and every new tetrahedron must be positively
    /// oriented. Every vertex of `old` must either appear in `new` or be listed
    /// in `retired`; retired vertices must touch only `old`.
    ///
    /// Neighbor links across the cavity boundary and incidence hints are
    /// updated together with the arena. Returns the keys of the new tetrahedra
    /// in the order of `new`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError`] if any check fails. The mesh is unchanged on error.
    pub fn replace_tets_retiring(
        &mut self,
        old: &[TetKey],
        new: &[[VertexKey; 4]],
        retired: &[VertexKey],
    ) -> Result<TetKeyBuffer, MeshError> {
        let plan = self.plan_replacement(old, new, retired)?;
        Ok(self.commit_replacement(old, new, retired, &plan))
    }

    /// Runs every check of [`replace_tets_retiring`](Self::replace_tets_retiring)
    /// without changing the mesh.
    ///
    /// # Errors
    ///
    /// Returns the [`MeshError`] the replacement would fail with.
    pub fn check_replacement(
        &self,
        old: &[TetKey],
        new: &[[VertexKey; 4]],
        retired: &[VertexKey],
    ) -> Result<(), MeshError> {
        self.plan_replacement(old, new, retired).map(|_| ())
    }

    fn plan_replacement(
        &self,
        old: &[TetKey],
        new: &[[VertexKey; 4]],
        retired: &[VertexKey],
    ) -> Result<ReplacementPlan, MeshError> {
        if old.is_empty() || new.is_empty() {
            return Err(MeshError::NonConformingReplacement {
                message: format!(
                    "cannot replace {} tetrahedra by {}",
                    old.len(),
                    new.len()
                ),
            });
        }
        let old_set: FastHashSet<TetKey> = old.iter().copied().collect();
        if old_set.len() != old.len() {
            return Err(MeshError::NonConformingReplacement {
                message: "old tetrahedra listed twice".to_string(),
            });
        }

        // Boundary faces of the old cavity with their outside neighbor.
        let mut old_faces: FastHashMap<FaceKey, SmallBuffer<(TetKey, usize), 2>> =
            fast_hash_map_with_capacity(old.len() * 4);
        let mut old_vertices: FastHashSet<VertexKey> = fast_hash_set_with_capacity(old.len() + 3);
        for &key in old {
            let tet = self.tets.get(key).ok_or(MeshError::TetNotFound { key })?;
            old_vertices.extend(tet.vertices().iter().copied());
            for f in 0..4 {
                let entry = old_faces.entry(tet.face_key(f)).or_default();
                if entry.len() >= 2 {
                    return Err(MeshError::NonManifoldFace {
                        face: tet.face_key(f),
                        count: entry.len() + 1,
                    });
                }
                entry.push((key, f));
            }
        }
        let mut boundary: FastHashMap<FaceKey, Option<(TetKey, usize)>> =
            fast_hash_map_with_capacity(old_faces.len());
        for (face, users) in &old_faces {
            if let [(key, f)] = users.as_slice() {
                let outside = match self.tets[*key].neighbor(*f) {
                    Some(n) => {
                        let ext = self.tets.get(n).ok_or(MeshError::TetNotFound { key: n })?;
                        let idx = ext.face_index(face).ok_or_else(|| {
                            MeshError::InconsistentAdjacency {
                                message: format!("{n:?} is linked to {key:?} but lacks face {face:?}"),
                            }
                        })?;
                        Some((n, idx))
                    }
                    None => None,
                };
                boundary.insert(*face, outside);
            }
        }

        // New tetrahedra: valid, conforming, no orphaned vertices.
        let retired_set: FastHashSet<VertexKey> = retired.iter().copied().collect();
        let mut new_faces: FastHashMap<FaceKey, usize> = fast_hash_map_with_capacity(new.len() * 4);
        let mut new_vertices: FastHashSet<VertexKey> = fast_hash_set_with_capacity(old_vertices.len());
        for vertices in new {
            self.check_new_tet(vertices)?;
            for &v in vertices {
                if retired_set.contains(&v) {
                    return Err(MeshError::NonConformingReplacement {
                        message: format!("retired vertex {v:?} used by a new tetrahedron"),
                    });
                }
                if new_vertices.insert(v) && !old_vertices.contains(&v) && self.incident.contains_key(v) {
                    return Err(MeshError::NonConformingReplacement {
                        message: format!("vertex {v:?} is outside the cavity"),
                    });
                }
            }
            let tet = Tetrahedron::new(*vertices);
            for f in 0..4 {
                let count = new_faces.entry(tet.face_key(f)).or_insert(0);
                *count += 1;
                if *count > 2 {
                    return Err(MeshError::NonManifoldFace {
                        face: tet.face_key(f),
                        count: *count,
                    });
                }
                if let Some(Some((outside, _))) = boundary.get(&tet.face_key(f))
                    && self.tets[*outside].same_vertex_set(&tet)
                {
                    return Err(MeshError::NonConformingReplacement {
                        message: format!("new tetrahedron {vertices:?} duplicates {outside:?}"),
                    });
                }
            }
        }

        let mut new_boundary = 0;
        for (face, &count) in &new_faces {
            if count == 1 {
                if !boundary.contains_key(face) {
                    return Err(MeshError::NonConformingReplacement {
                        message: format!("face {face:?} is exposed by the replacement"),
                    });
                }
                new_boundary += 1;
            } else if self.face_exists_outside(face, &old_set)? {
                return Err(MeshError::NonConformingReplacement {
                    message: format!("interior face {face:?} already exists outside the cavity"),
                });
            }
        }
        if new_boundary != boundary.len() {
            return Err(MeshError::NonConformingReplacement {
                message: format!(
                    "cavity boundary has {} faces, replacement boundary has {new_boundary}",
                    boundary.len()
                ),
            });
        }

        for &v in &old_vertices {
            if !new_vertices.contains(&v) && !retired_set.contains(&v) {
                return Err(MeshError::NonConformingReplacement {
                    message: format!("vertex {v:?} would be orphaned"),
                });
            }
        }
        for &v in retired {
            if !old_vertices.contains(&v) {
                return Err(MeshError::NonConformingReplacement {
                    message: format!("retired vertex {v:?} is not in the cavity"),
                });
            }
            if self.incident_tets(v)?.iter().any(|t| !old_set.contains(t)) {
                return Err(MeshError::NonConformingReplacement {
                    message: format!("retired vertex {v:?} is used outside the cavity"),
                });
            }
        }

        Ok(ReplacementPlan { boundary })
    }

    fn commit_replacement(
        &mut self,
        old: &[TetKey],
        new: &[[VertexKey; 4]],
        retired: &[VertexKey],
        plan: &ReplacementPlan,
    ) -> TetKeyBuffer {
        for &key in old {
            self.tets.remove(key);
        }
        for &v in retired {
            self.vertices.remove(v);
            self.incident.remove(v);
        }

        let created: TetKeyBuffer = new
            .iter()
            .map(|vertices| self.tets.insert(Tetrahedron::new(*vertices)))
            .collect();

        let mut pending: FastHashMap<FaceKey, (TetKey, usize)> =
            fast_hash_map_with_capacity(new.len() * 2);
        for &key in &created {
            for f in 0..4 {
                let face = self.tets[key].face_key(f);
                if let Some(outside) = plan.boundary.get(&face) {
                    self.tets[key].set_neighbor(f, outside.map(|(n, _)| n));
                    if let Some((n, idx)) = *outside
                        && let Some(ext) = self.tets.get_mut(n)
                    {
                        ext.set_neighbor(idx, Some(key));
                    }
                } else if let Some((other, of)) = pending.remove(&face) {
                    self.tets[key].set_neighbor(f, Some(other));
                    self.tets[other].set_neighbor(of, Some(key));
                } else {
                    pending.insert(face, (key, f));
                }
            }
            for &v in self.tets[key].vertices() {
                self.incident.insert(v, key);
            }
        }

        self.generation += 1;
        created
    }

    /// Moves `vertex` to `point` if no incident tetrahedron becomes inverted.
    ///
    /// Returns the previous position.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvertedTetrahedron`] if the move would invert an
    /// incident tetrahedron, or [`MeshError::NonFiniteVertex`]. The mesh is
    /// unchanged on error.
    pub fn relocate_vertex(&mut self, vertex: VertexKey, point: Point) -> Result<Point, MeshError> {
        if !point.is_finite() {
            return Err(MeshError::NonFiniteVertex { point });
        }
        let previous = self
            .point(vertex)
            .ok_or(MeshError::VertexNotFound { key: vertex })?;
        for key in self.incident_tets(vertex)? {
            let tet = self.tets.get(key).ok_or(MeshError::TetNotFound { key })?;
            let mut points = self.points_of(tet.vertices())?;
            if let Some(i) = tet.index_of(vertex) {
                points[i] = point;
            }
            if orientation(&points, DEGENERACY_TOLERANCE) != Orientation::POSITIVE {
                return Err(MeshError::InvertedTetrahedron {
                    vertices: *tet.vertices(),
                    volume: signed_volume_of(&points),
                });
            }
        }
        if let Some(v) = self.vertices.get_mut(vertex) {
            v.point = point;
        }
        self.generation += 1;
        Ok(previous)
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Checks every structural and orientation invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant as a [`MeshError`].
    pub fn validate(&self) -> Result<(), MeshError> {
        let mut faces: FastHashMap<FaceKey, usize> =
            fast_hash_map_with_capacity(self.tets.len().saturating_mul(4));
        for tet in self.tets.values() {
            self.check_new_tet(tet.vertices())?;
            for f in 0..4 {
                let count = faces.entry(tet.face_key(f)).or_insert(0);
                *count += 1;
                if *count > 2 {
                    return Err(MeshError::NonManifoldFace {
                        face: tet.face_key(f),
                        count: *count,
                    });
                }
            }
        }

        for (key, tet) in &self.tets {
            for f in 0..4 {
                let face = tet.face_key(f);
                match tet.neighbor(f) {
                    Some(n) => {
                        let other = self.tets.get(n).ok_or_else(|| MeshError::InconsistentAdjacency {
                            message: format!("{key:?} links to retired {n:?}"),
                        })?;
                        let back = other.face_index(&face).and_then(|i| other.neighbor(i));
                        if back != Some(key) {
                            return Err(MeshError::InconsistentAdjacency {
                                message: format!("{key:?} -> {n:?} across {face:?} is not mutual"),
                            });
                        }
                    }
                    None if faces.get(&face).copied() == Some(2) => {
                        return Err(MeshError::InconsistentAdjacency {
                            message: format!("shared face {face:?} of {key:?} has no neighbor link"),
                        });
                    }
                    None => {}
                }
            }
            for &v in tet.vertices() {
                let hint = self.incident.get(v).and_then(|&h| self.tets.get(h));
                if !hint.is_some_and(|h| h.contains_vertex(v)) {
                    return Err(MeshError::InconsistentAdjacency {
                        message: format!("vertex {v:?} has a stale incidence hint"),
                    });
                }
            }
        }
        Ok(())
    }
}

struct ReplacementPlan {
    boundary: FastHashMap<FaceKey, Option<(TetKey, usize)>>,
}
