//! # tetrefine
//!
//! Building blocks for quality-driven refinement of 3D tetrahedral meshes:
//!
//! - a **sizing-field evaluator** that answers "how large should an element
//!   be here?" from a constant, an analytic function, or a background
//!   post-processing field, with a perturbation probe for points that sit on
//!   the boundary of the background mesh;
//! - **local topology modifiers** (edge swap, face swap, vertex smoothing and
//!   edge collapse) that retriangulate a small cavity only when its worst
//!   tetrahedron strictly improves;
//! - **quality measures** (`Gamma`, `Eta`, `Rho`, radius-edge) used to rank
//!   the candidates.
//!
//! # Sizing Fields
//!
//! ```rust
//! use std::sync::Arc;
//! use tetrefine::prelude::*;
//!
//! let handle = Arc::new(BackgroundFieldHandle::new());
//! let view = ScalarView::uniform_box(
//!     Point::new([0.0, 0.0, 0.0]),
//!     Point::new([1.0, 1.0, 1.0]),
//!     0.2,
//! )
//! .unwrap();
//! let config = MeshingConfigBuilder::default()
//!     .scale_factor(2.0)
//!     .build()
//!     .unwrap();
//! handle.install(view, &config).unwrap();
//! let sizing = SizingEvaluator::new(SizingField::Background(handle), config).unwrap();
//!
//! let size = sizing.evaluate(&Point::new([0.5, 0.5, 0.5])).unwrap();
//! assert!((size - 0.4).abs() < 1e-12);
//! ```
//!
//! # Local Modifications
//!
//! ```rust
//! use tetrefine::prelude::*;
//!
//! // A flat pair of tetrahedra across a shared triangle.
//! let h = 3.0_f64.sqrt() / 2.0;
//! let points = [
//!     Point::new([0.0, 0.0, 0.3]),
//!     Point::new([0.0, 0.0, -0.3]),
//!     Point::new([1.0, 0.0, 0.0]),
//!     Point::new([-0.5, h, 0.0]),
//!     Point::new([-0.5, -h, 0.0]),
//! ];
//! let (mut mesh, keys) = TetMesh::from_parts(&points, &[[0, 2, 3, 4], [1, 2, 3, 4]]).unwrap();
//! let (tet, upper) = mesh.tets().find(|(_, t)| t.contains_vertex(keys[0])).unwrap();
//! // The shared face is the one opposite the apex.
//! let face = upper.index_of(keys[0]).unwrap();
//!
//! let config = LocalModConfig::default();
//! let mut observer = NullObserver;
//! let mut ctx = ModContext::new(&TetQuality::Eta, &config, &mut observer);
//! let outcome = mesh.try_face_swap(tet, face, &mut ctx).unwrap();
//!
//! assert!(outcome.is_committed());
//! assert_eq!(mesh.number_of_tets(), 3);
//! mesh.validate().unwrap();
//! ```

#![forbid(unsafe_code)]

/// Mesh storage, cavities, commit notifications and the local operators.
pub mod core {
    /// Local mesh modification operators.
    pub mod algorithms {
        pub mod edge_collapse;
        pub mod edge_swap;
        pub mod face_swap;
        pub mod local_mod;
        pub mod smoothing;
        pub use local_mod::*;
    }
    pub mod cavity;
    /// Hash maps and small buffers keyed by mesh handles.
    pub mod collections;
    pub mod observer;
    pub mod tet_mesh;
    pub mod tetrahedron;
    pub use cavity::*;
    pub use observer::*;
    pub use tet_mesh::*;
    pub use tetrahedron::*;
}

/// Background sizing fields and their evaluation.
pub mod field {
    pub mod background;
    pub mod handle;
    /// Spatial index over the cells of a background field.
    pub mod index;
    pub mod probe;
    pub mod sizing;
    pub use background::*;
    pub use handle::*;
    pub use index::*;
    pub use probe::*;
    pub use sizing::*;
}

/// Points, orientation predicates, tetrahedron measures and quality measures.
pub mod geometry {
    pub mod measures;
    pub mod point;
    pub mod predicates;
    /// Quality measures for tetrahedra.
    pub mod quality;
    pub use measures::*;
    pub use point::*;
    pub use predicates::*;
    pub use quality::*;
}

pub mod config;

/// A prelude module that re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{
        ConfigError, LocalModConfig, MeshingConfig, MeshingConfigBuilder, SmoothingStrategy,
    };
    pub use crate::core::algorithms::local_mod::{
        CandidateReport, CandidateStatus, CollapseOutcome, LocalMeshMod, LocalModError,
        ModContext, RejectReason, SmoothOutcome, SwapOutcome, SwapReport,
    };
    pub use crate::core::{
        cavity::*, observer::*, tet_mesh::*, tetrahedron::*,
    };
    pub use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer, TetKeyBuffer};
    pub use crate::field::{
        background::*, handle::*, index::SpatialFieldIndex, probe::*, sizing::*,
    };
    pub use crate::geometry::{measures::*, point::*, predicates::*, quality::*};
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}
