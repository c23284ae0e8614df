//! Versioned handle to the active background field index.
//!
//! The handle replaces a process-wide "current background mesh" with an
//! explicitly owned object. Installation builds the new index completely, then
//! swaps it in atomically; readers take an `Arc` snapshot and keep using the
//! index they started with, and the old index is freed when its last snapshot
//! is dropped.

use crate::config::MeshingConfig;
use crate::field::background::{FieldError, ScalarView};
use crate::field::index::SpatialFieldIndex;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// An installed index together with its generation number.
#[derive(Debug)]
pub struct FieldSnapshot {
    generation: u64,
    index: SpatialFieldIndex,
}

impl FieldSnapshot {
    /// Generation under which this index was installed; starts at 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The index.
    #[must_use]
    pub const fn index(&self) -> &SpatialFieldIndex {
        &self.index
    }
}

/// Lock-free holder of the active background field index.
///
/// # Examples
///
/// ```
/// use tetrefine::config::MeshingConfig;
/// use tetrefine::field::background::ScalarView;
/// use tetrefine::field::handle::BackgroundFieldHandle;
/// use tetrefine::geometry::point::Point;
///
/// let handle = BackgroundFieldHandle::new();
/// assert!(handle.snapshot().is_none());
///
/// let view = ScalarView::uniform_box(Point::origin(), Point::new([1.0, 1.0, 1.0]), 0.2).unwrap();
/// let generation = handle.install(view, &MeshingConfig::default()).unwrap();
/// let snapshot = handle.snapshot().unwrap();
/// assert_eq!(snapshot.generation(), generation);
/// assert_eq!(snapshot.index().max_value(), 0.2);
/// ```
#[derive(Debug, Default)]
pub struct BackgroundFieldHandle {
    current: ArcSwapOption<FieldSnapshot>,
    next_generation: AtomicU64,
}

impl BackgroundFieldHandle {
    /// Creates a handle with no field installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index over `view` and makes it the active field.
    ///
    /// The point-in-cell slack is `config.containment_tolerance`. Returns the
    /// new generation. On error the previously installed field stays active.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError`] if the view is malformed or the tolerance is
    /// invalid.
    pub fn install(&self, view: ScalarView, config: &MeshingConfig) -> Result<u64, FieldError> {
        let index = SpatialFieldIndex::build(view, config.containment_tolerance)?;
        Ok(self.install_index(index))
    }

    /// Makes an already built index the active field and returns its generation.
    pub fn install_index(&self, index: SpatialFieldIndex) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cells = index.number_of_cells();
        let max_value = index.max_value();
        self.current
            .store(Some(Arc::new(FieldSnapshot { generation, index })));
        tracing::info!(generation, cells, max_value, "installed background field");
        generation
    }

    /// The active field, if any. The snapshot stays valid across later installs.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<FieldSnapshot>> {
        self.current.load_full()
    }

    /// Generation of the active field, `0` when none is installed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current
            .load()
            .as_ref()
            .map_or(0, |snapshot| snapshot.generation)
    }

    /// Removes the active field and returns it.
    pub fn clear(&self) -> Option<Arc<FieldSnapshot>> {
        let previous = self.current.swap(None);
        if previous.is_some() {
            tracing::info!("cleared background field");
        }
        previous
    }
}
