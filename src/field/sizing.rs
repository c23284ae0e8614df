//! Sizing Field Evaluator: maps a point to a target element length.
//!
//! A [`SizingField`] is a closed set of field kinds. For a background field the
//! evaluator locates the point in the active [`SpatialFieldIndex`], falls back
//! to the [`probe_sequence`] when direct location fails, then to the global
//! maximum of the field. Non-positive results are replaced by
//! `reference_length / 10` with a warning, and the session scale factor is
//! applied last.

use crate::config::{ConfigError, MeshingConfig};
use crate::field::background::FieldError;
use crate::field::handle::BackgroundFieldHandle;
use crate::field::index::SpatialFieldIndex;
use crate::field::probe::probe_sequence;
use crate::geometry::point::Point;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Fraction of the reference length substituted for non-positive sizes.
const FALLBACK_LENGTH_FRACTION: f64 = 0.1;

/// User-supplied size function.
pub type AnalyticFn = Arc<dyn Fn(&Point) -> f64 + Send + Sync>;

/// Contract violations of the evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum SizingError {
    /// The field kind must be resolved before point location is reached.
    #[error("Field kind {kind} cannot be evaluated by point location")]
    UnsupportedFieldKind {
        /// Name of the field kind.
        kind: &'static str,
    },
    /// A background field is configured but the handle holds no index.
    #[error("No background field is installed")]
    NoBackgroundField,
    /// The query point has a NaN or infinite coordinate.
    #[error("Cannot evaluate size at non-finite point {point}")]
    NonFinitePoint {
        /// The query point.
        point: Point,
    },
    /// Invalid session configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The installed field does not match the configuration.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Where the target length is taken from.
#[derive(Clone)]
pub enum SizingField {
    /// The same length everywhere.
    Constant(f64),
    /// A user function of position.
    Analytic(AnalyticFn),
    /// A background mesh carrying a scalar field.
    Background(Arc<BackgroundFieldHandle>),
    /// A size attached to the points of the model. Resolved by the meshing
    /// driver; reaching the evaluator with it is an error.
    PointCloud,
}

impl SizingField {
    /// Wraps a closure as an analytic field.
    pub fn analytic<F>(f: F) -> Self
    where
        F: Fn(&Point) -> f64 + Send + Sync + 'static,
    {
        Self::Analytic(Arc::new(f))
    }

    /// Short name of the field kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Constant(_) => "Constant",
            Self::Analytic(_) => "Analytic",
            Self::Background(_) => "Background",
            Self::PointCloud => "PointCloud",
        }
    }
}

impl fmt::Debug for SizingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(lc) => f.debug_tuple("Constant").field(lc).finish(),
            Self::Analytic(_) => f.write_str("Analytic(..)"),
            Self::Background(handle) => f
                .debug_struct("Background")
                .field("generation", &handle.generation())
                .finish(),
            Self::PointCloud => f.write_str("PointCloud"),
        }
    }
}

/// How a sample value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingSource {
    /// Constant field.
    Constant,
    /// Analytic field.
    Analytic,
    /// The point itself was located in `cell`.
    Direct {
        /// Containing cell.
        cell: usize,
    },
    /// A perturbed point was located in `cell`.
    Probe {
        /// Index into the probe factors.
        step: usize,
        /// Index into the probe directions.
        direction: usize,
        /// Containing cell.
        cell: usize,
    },
    /// Location failed or gave a non-positive value; the field maximum was used.
    GlobalMaximum,
}

/// A recoverable degeneracy absorbed by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingWarning {
    /// The field produced `value <= 0` (or a non-finite value), replaced by
    /// `reference_length / 10`.
    NonPositiveValue {
        /// The rejected value.
        value: f64,
    },
}

/// Result of [`SizingEvaluator::evaluate_detailed`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingSample {
    /// Target length, always `> 0`.
    pub value: f64,
    /// Where the value came from.
    pub source: SizingSource,
    /// Set when the value was substituted.
    pub warning: Option<SizingWarning>,
}

/// Evaluates a [`SizingField`] under a [`MeshingConfig`].
///
/// The evaluator holds no mutable state and can be shared between threads.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tetrefine::config::MeshingConfig;
/// use tetrefine::field::background::ScalarView;
/// use tetrefine::field::handle::BackgroundFieldHandle;
/// use tetrefine::field::sizing::{SizingEvaluator, SizingField};
/// use tetrefine::geometry::point::Point;
///
/// let handle = Arc::new(BackgroundFieldHandle::new());
/// let view = ScalarView::uniform_box(Point::origin(), Point::new([1.0, 1.0, 1.0]), 0.05).unwrap();
/// handle.install(view, &MeshingConfig::default()).unwrap();
///
/// let config = MeshingConfig { scale_factor: 2.0, ..MeshingConfig::default() };
/// let evaluator = SizingEvaluator::new(SizingField::Background(handle), config).unwrap();
/// let lc = evaluator.evaluate(&Point::new([0.5, 0.5, 0.5])).unwrap();
/// assert!((lc - 0.1).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct SizingEvaluator {
    field: SizingField,
    config: MeshingConfig,
}

impl SizingEvaluator {
    /// Creates an evaluator.
    ///
    /// # Errors
    ///
    /// Returns [`SizingError::Config`] if `config` is invalid.
    pub fn new(field: SizingField, config: MeshingConfig) -> Result<Self, SizingError> {
        config.validate()?;
        Ok(Self { field, config })
    }

    /// The evaluated field.
    #[must_use]
    pub const fn field(&self) -> &SizingField {
        &self.field
    }

    /// The session configuration.
    #[must_use]
    pub const fn config(&self) -> &MeshingConfig {
        &self.config
    }

    /// Target length at `p`.
    ///
    /// # Errors
    ///
    /// See [`evaluate_detailed`](Self::evaluate_detailed).
    pub fn evaluate(&self, p: &Point) -> Result<f64, SizingError> {
        self.evaluate_detailed(p).map(|sample| sample.value)
    }

    /// Target length at `p` with its provenance.
    ///
    /// # Errors
    ///
    /// - [`SizingError::UnsupportedFieldKind`] for a point-cloud field.
    /// - [`SizingError::NoBackgroundField`] if the handle is empty.
    /// - [`SizingError::Field`] if the configured time step does not exist.
    /// - [`SizingError::NonFinitePoint`] for a NaN or infinite query.
    pub fn evaluate_detailed(&self, p: &Point) -> Result<SizingSample, SizingError> {
        if !p.is_finite() {
            return Err(SizingError::NonFinitePoint { point: *p });
        }
        let (raw, source) = match &self.field {
            SizingField::Constant(lc) => (*lc, SizingSource::Constant),
            SizingField::Analytic(f) => (f(p), SizingSource::Analytic),
            SizingField::Background(handle) => {
                let snapshot = handle.snapshot().ok_or(SizingError::NoBackgroundField)?;
                self.search_background(snapshot.index(), p)?
            }
            SizingField::PointCloud => {
                return Err(SizingError::UnsupportedFieldKind {
                    kind: self.field.kind(),
                });
            }
        };

        let (value, warning) = if raw > 0.0 && raw.is_finite() {
            (raw, None)
        } else {
            let substituted = self.config.reference_length * FALLBACK_LENGTH_FRACTION;
            tracing::warn!(
                x = p.x(),
                y = p.y(),
                z = p.z(),
                value = raw,
                substituted,
                "non-positive mesh size, using reference length / 10"
            );
            (substituted, Some(SizingWarning::NonPositiveValue { value: raw }))
        };

        Ok(SizingSample {
            value: value * self.config.scale_factor,
            source,
            warning,
        })
    }

    /// Direct lookup, then the probe sequence, then the global maximum.
    fn search_background(
        &self,
        index: &SpatialFieldIndex,
        p: &Point,
    ) -> Result<(f64, SizingSource), SizingError> {
        let step = self.config.time_step;
        index.view().step(step)?;

        let located = index
            .search_scalar(p, step)
            .map(|(value, cell)| (value, SizingSource::Direct { cell }))
            .or_else(|| {
                probe_sequence(self.config.reference_length).find_map(|probe| {
                    let (value, cell) = index.search_scalar(&probe.apply(p), step)?;
                    tracing::debug!(
                        step = probe.step,
                        direction = probe.direction,
                        cell,
                        "located perturbed point"
                    );
                    Some((
                        value,
                        SizingSource::Probe {
                            step: probe.step,
                            direction: probe.direction,
                            cell,
                        },
                    ))
                })
            });

        match located {
            Some((value, source)) if value > 0.0 && value.is_finite() => Ok((value, source)),
            Some((value, _)) => {
                tracing::debug!(value, "located non-positive value, using field maximum");
                Ok((index.max_value(), SizingSource::GlobalMaximum))
            }
            None => {
                tracing::debug!(
                    x = p.x(),
                    y = p.y(),
                    z = p.z(),
                    "point not found in background field, using field maximum"
                );
                Ok((index.max_value(), SizingSource::GlobalMaximum))
            }
        }
    }
}
