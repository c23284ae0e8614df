//! Collection aliases used across the crate.
//!
//! Hash maps use `rustc_hash`'s `FxHasher`: keys are slotmap handles and vertex
//! triples, never attacker-controlled, so a fast non-cryptographic hash is fine.
//! Small per-cavity collections use `SmallVec` so typical stars and balls stay
//! on the stack.

use crate::core::tet_mesh::{TetKey, VertexKey};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use smallvec::SmallVec;

// =============================================================================
// HASH COLLECTIONS
// =============================================================================

/// Fast hash map for internal bookkeeping.
///
/// # Examples
///
/// ```rust
/// use tetrefine::core::collections::FastHashMap;
///
/// let mut map: FastHashMap<u64, usize> = FastHashMap::default();
/// map.insert(7, 1);
/// assert_eq!(map.get(&7), Some(&1));
/// ```
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Fast hash set for internal bookkeeping.
pub type FastHashSet<T> = FxHashSet<T>;

/// Creates a [`FastHashMap`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, FxBuildHasher)
}

/// Creates a [`FastHashSet`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, FxBuildHasher)
}

// =============================================================================
// SMALL BUFFERS
// =============================================================================

/// Stack-first vector for small collections.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Inline capacity for cavity-sized tetrahedron lists.
///
/// Edge stars in quality meshes have 4-7 tetrahedra and edge-swap candidates
/// produce at most `2 (N - 2)`, so 16 covers the common case.
pub const CAVITY_BUFFER_SIZE: usize = 16;

/// Inline capacity for vertex balls; interior vertices typically touch 20-30 tetrahedra.
pub const BALL_BUFFER_SIZE: usize = 32;

/// Tetrahedron keys of one cavity.
pub type TetKeyBuffer = SmallBuffer<TetKey, CAVITY_BUFFER_SIZE>;

/// Vertex keys of one cavity ring or link.
pub type VertexKeyBuffer = SmallBuffer<VertexKey, CAVITY_BUFFER_SIZE>;

/// Tetrahedron keys of one vertex ball.
pub type BallBuffer = SmallBuffer<TetKey, BALL_BUFFER_SIZE>;

/// Canonical (sorted) key of a triangular face.
pub type FaceKey = [VertexKey; 3];

/// Returns the canonical key of a face given in any vertex order.
#[must_use]
pub fn face_key(mut face: [VertexKey; 3]) -> FaceKey {
    face.sort_unstable();
    face
}
