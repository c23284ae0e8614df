//! The tetrahedron record stored in the mesh arena.
//!
//! A [`Tetrahedron`] holds four vertex keys and, once adjacency is built, one
//! optional neighbor per face. Face `i` is the face opposite vertex `i`, and
//! `neighbors[i]` is the tetrahedron across that face (`None` on the boundary).
//!
//! Vertex order carries orientation: every tetrahedron stored in a
//! [`TetMesh`](crate::core::tet_mesh::TetMesh) has positive signed volume.

use crate::core::collections::{FaceKey, face_key};
use crate::core::tet_mesh::{TetKey, VertexKey};
use crate::geometry::measures::TET_EDGES;
use serde::{Deserialize, Serialize};

/// Local vertex indices of the face opposite each vertex.
pub const TET_FACES: [[usize; 3]; 4] = [[1, 2, 3], [0, 2, 3], [0, 1, 3], [0, 1, 2]];

/// A tetrahedron of the mesh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tetrahedron {
    vertices: [VertexKey; 4],
    neighbors: [Option<TetKey>; 4],
}

impl Tetrahedron {
    /// Creates an unconnected tetrahedron.
    #[must_use]
    pub const fn new(vertices: [VertexKey; 4]) -> Self {
        Self {
            vertices,
            neighbors: [None; 4],
        }
    }

    /// The four vertex keys in orientation order.
    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 4] {
        &self.vertices
    }

    /// Neighbor across each face.
    #[must_use]
    pub const fn neighbors(&self) -> &[Option<TetKey>; 4] {
        &self.neighbors
    }

    /// Neighbor across face `face`, `None` on the boundary or for an invalid index.
    #[must_use]
    pub fn neighbor(&self, face: usize) -> Option<TetKey> {
        self.neighbors.get(face).copied().flatten()
    }

    pub(crate) fn set_neighbor(&mut self, face: usize, neighbor: Option<TetKey>) {
        self.neighbors[face] = neighbor;
    }

    /// Local index of `vertex`, if it belongs to this tetrahedron.
    #[must_use]
    pub fn index_of(&self, vertex: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&v| v == vertex)
    }

    /// Returns `true` if `vertex` is one of the four corners.
    #[must_use]
    pub fn contains_vertex(&self, vertex: VertexKey) -> bool {
        self.vertices.contains(&vertex)
    }

    /// Vertices of face `face` (the face opposite vertex `face`) in index order.
    #[must_use]
    pub const fn face(&self, face: usize) -> [VertexKey; 3] {
        let [i, j, k] = TET_FACES[face];
        [self.vertices[i], self.vertices[j], self.vertices[k]]
    }

    /// Canonical key of face `face`.
    #[must_use]
    pub fn face_key(&self, face: usize) -> FaceKey {
        face_key(self.face(face))
    }

    /// Local index of the face whose canonical key is `key`.
    #[must_use]
    pub fn face_index(&self, key: &FaceKey) -> Option<usize> {
        (0..4).find(|&f| self.face_key(f) == *key)
    }

    /// Endpoints of local edge `edge` in [`TET_EDGES`] order.
    #[must_use]
    pub const fn edge(&self, edge: usize) -> [VertexKey; 2] {
        let [i, j] = TET_EDGES[edge];
        [self.vertices[i], self.vertices[j]]
    }

    /// The two vertices not on the edge `(a, b)`, or `None` if the edge is not
    /// an edge of this tetrahedron.
    #[must_use]
    pub fn opposite_edge(&self, a: VertexKey, b: VertexKey) -> Option<[VertexKey; 2]> {
        if a == b || !self.contains_vertex(a) || !self.contains_vertex(b) {
            return None;
        }
        let mut rest = self.vertices.iter().copied().filter(|&v| v != a && v != b);
        Some([rest.next()?, rest.next()?])
    }

    /// Returns `true` if the vertex sets of `self` and `other` coincide.
    #[must_use]
    pub fn same_vertex_set(&self, other: &Self) -> bool {
        let mut a = self.vertices;
        let mut b = other.vertices;
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys() -> [VertexKey; 5] {
        let mut sm: SlotMap<VertexKey, ()> = SlotMap::with_key();
        std::array::from_fn(|_| sm.insert(()))
    }

    #[test]
    fn test_faces_are_opposite_their_vertex() {
        let [a, b, c, d, _] = keys();
        let t = Tetrahedron::new([a, b, c, d]);
        for f in 0..4 {
            assert!(!t.face(f).contains(&t.vertices()[f]));
        }
        assert_eq!(t.face(0), [b, c, d]);
        assert_eq!(t.face_index(&face_key([d, a, b])), Some(2));
    }

    #[test]
    fn test_edges_and_opposite_edge() {
        let [a, b, c, d, e] = keys();
        let t = Tetrahedron::new([a, b, c, d]);
        assert_eq!(t.edge(0), [a, b]);
        assert_eq!(t.edge(5), [c, d]);
        assert_eq!(t.opposite_edge(b, d), Some([a, c]));
        assert_eq!(t.opposite_edge(a, e), None);
        assert_eq!(t.opposite_edge(a, a), None);
    }

    #[test]
    fn test_neighbors_start_empty() {
        let [a, b, c, d, _] = keys();
        let mut t = Tetrahedron::new([a, b, c, d]);
        assert!(t.neighbors().iter().all(Option::is_none));
        assert_eq!(t.neighbor(7), None);
        let mut sm: SlotMap<TetKey, ()> = SlotMap::with_key();
        let n = sm.insert(());
        t.set_neighbor(3, Some(n));
        assert_eq!(t.neighbor(3), Some(n));
    }

    #[test]
    fn test_same_vertex_set_ignores_order() {
        let [a, b, c, d, e] = keys();
        let t = Tetrahedron::new([a, b, c, d]);
        assert!(t.same_vertex_set(&Tetrahedron::new([d, c, a, b])));
        assert!(!t.same_vertex_set(&Tetrahedron::new([a, b, c, e])));
    }
}
