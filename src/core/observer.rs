//! Commit notifications and the bad-tetrahedron work queue.
//!
//! Local operators report every committed change to a [`MeshObserver`] right
//! after the mesh arena is updated, so bookkeeping owned by the refinement
//! driver moves in the same step as the mesh. [`BadTetQueue`] is the stock
//! observer: a min-heap of tetrahedra whose quality is below a threshold.

use crate::core::collections::{FastHashMap, fast_hash_map_with_capacity};
use crate::core::tet_mesh::{TetKey, TetMesh, VertexKey};
use crate::geometry::quality::{QualityMeasure, TetQuality};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Receives committed mesh changes.
pub trait MeshObserver {
    /// `retired` tetrahedra were replaced by `created` ones.
    fn tets_replaced(&mut self, mesh: &TetMesh, retired: &[TetKey], created: &[TetKey]);

    /// `vertex` moved; `affected` are its incident tetrahedra, whose shape changed.
    fn vertex_relocated(&mut self, mesh: &TetMesh, _vertex: VertexKey, affected: &[TetKey]) {
        self.tets_replaced(mesh, &[], affected);
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl MeshObserver for NullObserver {
    fn tets_replaced(&mut self, _mesh: &TetMesh, _retired: &[TetKey], _created: &[TetKey]) {}
}

/// Min-heap of tetrahedra with quality below a threshold, worst first.
///
/// Entries are invalidated lazily: a retired tetrahedron, or one re-scored
/// since it was pushed, is skipped when popped.
///
/// # Examples
///
/// ```
/// use tetrefine::core::observer::BadTetQueue;
/// use tetrefine::core::tet_mesh::TetMesh;
/// use tetrefine::geometry::point::Point;
/// use tetrefine::geometry::quality::TetQuality;
///
/// let points = [
///     Point::new([0.0, 0.0, 0.0]),
///     Point::new([1.0, 0.0, 0.0]),
///     Point::new([0.0, 1.0, 0.0]),
///     Point::new([0.0, 0.0, 0.05]),
/// ];
/// let (mesh, _) = TetMesh::from_parts(&points, &[[0, 1, 2, 3]]).unwrap();
/// let mut queue = BadTetQueue::new(TetQuality::Gamma, 0.3);
/// queue.seed(&mesh);
/// assert_eq!(queue.len(), 1);
/// assert!(queue.pop_worst(&mesh).is_some());
/// assert!(queue.pop_worst(&mesh).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct BadTetQueue<Q = TetQuality> {
    measure: Q,
    threshold: f64,
    heap: BinaryHeap<Reverse<(OrderedFloat<f64>, TetKey)>>,
    scores: FastHashMap<TetKey, f64>,
}

impl<Q: QualityMeasure> BadTetQueue<Q> {
    /// Creates an empty queue for tetrahedra scoring below `threshold`.
    #[must_use]
    pub fn new(measure: Q, threshold: f64) -> Self {
        Self {
            measure,
            threshold,
            heap: BinaryHeap::new(),
            scores: fast_hash_map_with_capacity(64),
        }
    }

    /// Quality threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of tetrahedra currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` if no tetrahedron is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Scores every tetrahedron of `mesh` and queues the bad ones.
    pub fn seed(&mut self, mesh: &TetMesh) {
        for key in mesh.tet_keys() {
            self.push_if_bad(mesh, key);
        }
    }

    /// Scores `key` and queues it if it is below the threshold.
    ///
    /// Returns the score, or `None` if the tetrahedron no longer exists.
    pub fn push_if_bad(&mut self, mesh: &TetMesh, key: TetKey) -> Option<f64> {
        let quality = self.measure.quality(&mesh.tet_points(key).ok()?);
        if quality < self.threshold {
            self.scores.insert(key, quality);
            self.heap.push(Reverse((OrderedFloat(quality), key)));
        } else {
            self.scores.remove(&key);
        }
        Some(quality)
    }

    /// Removes and returns the worst live tetrahedron with its score.
    pub fn pop_worst(&mut self, mesh: &TetMesh) -> Option<(TetKey, f64)> {
        while let Some(Reverse((OrderedFloat(quality), key))) = self.heap.pop() {
            let fresh = self
                .scores
                .get(&key)
                .is_some_and(|q| q.to_bits() == quality.to_bits());
            if fresh && mesh.contains_tet(key) {
                self.scores.remove(&key);
                return Some((key, quality));
            }
        }
        None
    }
}

impl<Q: QualityMeasure> MeshObserver for BadTetQueue<Q> {
    fn tets_replaced(&mut self, mesh: &TetMesh, retired: &[TetKey], created: &[TetKey]) {
        for key in retired {
            self.scores.remove(key);
        }
        for &key in created {
            self.push_if_bad(mesh, key);
        }
        tracing::trace!(
            retired = retired.len(),
            created = created.len(),
            queued = self.scores.len(),
            "bad-tet queue updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point;

    fn two_tets() -> TetMesh {
        let points = [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
            Point::new([1.0, 1.0, 0.02]),
        ];
        TetMesh::from_parts(&points, &[[0, 1, 2, 3], [1, 2, 3, 4]]).unwrap().0
    }

    #[test]
    fn test_queue_orders_worst_first() {
        let mesh = two_tets();
        let mut queue = BadTetQueue::new(TetQuality::Gamma, 1.1);
        queue.seed(&mesh);
        assert_eq!(queue.len(), 2);
        let (_, first) = queue.pop_worst(&mesh).unwrap();
        let (_, second) = queue.pop_worst(&mesh).unwrap();
        assert!(first <= second);
        assert!(queue.pop_worst(&mesh).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retired_tets_are_skipped() {
        let mesh = two_tets();
        let mut queue = BadTetQueue::new(TetQuality::Gamma, 1.1);
        queue.seed(&mesh);
        let keys: Vec<_> = mesh.tet_keys().collect();
        queue.tets_replaced(&mesh, &keys[..1], &[]);
        assert_eq!(queue.len(), 1);
        let (key, _) = queue.pop_worst(&mesh).unwrap();
        assert_eq!(key, keys[1]);
    }

    #[test]
    fn test_rescored_entry_replaces_stale_one() {
        let mesh = two_tets();
        let mut queue = BadTetQueue::new(TetQuality::Gamma, 1.1);
        let key = mesh.tet_keys().next().unwrap();
        queue.push_if_bad(&mesh, key);
        queue.push_if_bad(&mesh, key);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_worst(&mesh).is_some());
        assert!(queue.pop_worst(&mesh).is_none());
    }

    #[test]
    fn test_relocation_rescores_affected_tets() {
        let mesh = two_tets();
        let mut queue = BadTetQueue::new(TetQuality::Gamma, 1.1);
        let keys: Vec<_> = mesh.tet_keys().collect();
        let (moved, _) = mesh.vertices().next().unwrap();
        queue.vertex_relocated(&mesh, moved, &keys);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_null_observer_accepts_everything() {
        let mesh = two_tets();
        let keys: Vec<_> = mesh.tet_keys().collect();
        let mut observer = NullObserver;
        observer.tets_replaced(&mesh, &keys, &[]);
        observer.vertex_relocated(&mesh, VertexKey::default(), &keys);
    }
}
