//! Session configuration.
//!
//! [`MeshingConfig`] holds the global sizing knobs read by the sizing-field
//! evaluator; [`LocalModConfig`] tunes the local mesh modification operators.
//! Both are plain data with `serde` support so a driver can load them from its
//! own configuration files; the library itself reads no files or environment.

use derive_builder::{Builder, UninitializedFieldError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric parameter is out of its valid range.
    #[error("Invalid {name} = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
        /// Valid range.
        reason: &'static str,
    },
    /// A builder field was left unset.
    #[error("Missing configuration field: {field}")]
    MissingField {
        /// Field name.
        field: String,
    },
}

impl From<UninitializedFieldError> for ConfigError {
    fn from(err: UninitializedFieldError) -> Self {
        Self::MissingField {
            field: err.field_name().to_string(),
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must be finite and > 0",
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must be finite and >= 0",
        })
    }
}

// =============================================================================
// MESHING CONFIG
// =============================================================================

/// Global sizing parameters of a meshing session.
///
/// # Examples
///
/// ```
/// use tetrefine::config::MeshingConfigBuilder;
///
/// let config = MeshingConfigBuilder::default()
///     .reference_length(2.0)
///     .scale_factor(0.5)
///     .build()
///     .unwrap();
/// assert_eq!(config.reference_length, 2.0);
/// assert_eq!(config.time_step, 0);
///
/// assert!(MeshingConfigBuilder::default().scale_factor(0.0).build().is_err());
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
#[serde(default)]
pub struct MeshingConfig {
    /// Characteristic length of the model.
    ///
    /// Scales the perturbation probe offsets and provides the fallback size
    /// `reference_length / 10` for non-positive field values.
    #[builder(default = "1.0")]
    pub reference_length: f64,
    /// Multiplier applied to every evaluated size.
    #[builder(default = "1.0")]
    pub scale_factor: f64,
    /// Field step read from a background field with several steps.
    #[builder(default = "0")]
    pub time_step: usize,
    /// Barycentric tolerance of the point-in-cell test.
    #[builder(default = "1e-10")]
    pub containment_tolerance: f64,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            reference_length: 1.0,
            scale_factor: 1.0,
            time_step: 0,
            containment_tolerance: 1e-10,
        }
    }
}

impl MeshingConfig {
    /// Checks every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("reference_length", self.reference_length)?;
        positive("scale_factor", self.scale_factor)?;
        non_negative("containment_tolerance", self.containment_tolerance)
    }
}

impl MeshingConfigBuilder {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(v) = self.reference_length {
            positive("reference_length", v)?;
        }
        if let Some(v) = self.scale_factor {
            positive("scale_factor", v)?;
        }
        if let Some(v) = self.containment_tolerance {
            non_negative("containment_tolerance", v)?;
        }
        Ok(())
    }
}

// =============================================================================
// LOCAL MODIFICATION CONFIG
// =============================================================================

/// How vertex smoothing proposes a new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SmoothingStrategy {
    /// Volume-weighted centroid of the incident tetrahedra.
    #[default]
    WeightedCentroid,
    /// Compass search maximising the minimum incident quality.
    Optimize,
}

/// Parameters of the local mesh modification operators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalModConfig {
    /// Relative volume threshold for the positive-volume test: a candidate
    /// tetrahedron must satisfy `V > volume_tolerance * L³`, `L` its longest edge.
    pub volume_tolerance: f64,
    /// Largest edge star considered by edge swap. Stars of `N` tetrahedra have
    /// Catalan(`N - 2`) candidates.
    pub max_edge_star: usize,
    /// Smoothing strategy.
    pub smoothing: SmoothingStrategy,
    /// Proposed moves shorter than this fraction of the mean incident edge
    /// length are not applied.
    pub min_relocation: f64,
    /// Step-halving iterations of the optimizing smoother.
    pub optimize_iterations: usize,
}

impl Default for LocalModConfig {
    fn default() -> Self {
        Self {
            volume_tolerance: 1e-12,
            max_edge_star: 7,
            smoothing: SmoothingStrategy::WeightedCentroid,
            min_relocation: 1e-9,
            optimize_iterations: 8,
        }
    }
}

impl LocalModConfig {
    /// Sets the smoothing strategy.
    #[must_use]
    pub const fn with_smoothing(mut self, smoothing: SmoothingStrategy) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Sets the largest edge star considered by edge swap.
    #[must_use]
    pub const fn with_max_edge_star(mut self, max_edge_star: usize) -> Self {
        self.max_edge_star = max_edge_star;
        self
    }

    /// Sets the relative volume tolerance.
    #[must_use]
    pub const fn with_volume_tolerance(mut self, volume_tolerance: f64) -> Self {
        self.volume_tolerance = volume_tolerance;
        self
    }

    /// Checks every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("volume_tolerance", self.volume_tolerance)?;
        non_negative("min_relocation", self.min_relocation)?;
        if self.max_edge_star < 3 {
            #[expect(clippy::cast_precision_loss, reason = "small count, reported only")]
            let value = self.max_edge_star as f64;
            return Err(ConfigError::InvalidParameter {
                name: "max_edge_star",
                value,
                reason: "must be >= 3",
            });
        }
        Ok(())
    }
}
