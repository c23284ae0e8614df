//! The perturbation probe table used when direct point location fails.
//!
//! Probes are tried step by step: for each offset magnitude
//! `eps = reference_length * PROBE_FACTORS[step]` the six axis neighbors come
//! first, then the eight cube corners, in [`PROBE_DIRECTIONS`] order. The
//! first probe that lands inside the background field wins.

use crate::geometry::point::Point;

/// Offset magnitudes as fractions of the reference length, smallest first.
pub const PROBE_FACTORS: [f64; 9] = [0.001, 0.0025, 0.005, 0.0075, 0.01, 0.025, 0.05, 0.075, 0.1];

/// Probe directions in trial order. Corner directions are not normalised: a
/// corner probe moves by `eps` along each axis.
pub const PROBE_DIRECTIONS: [[f64; 3]; 14] = [
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// One entry of the probe sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    /// Index into [`PROBE_FACTORS`].
    pub step: usize,
    /// Index into [`PROBE_DIRECTIONS`].
    pub direction: usize,
    /// Offset added to the query point.
    pub offset: [f64; 3],
}

impl Probe {
    /// The probed point.
    #[must_use]
    pub fn apply(&self, p: &Point) -> Point {
        p.offset(self.offset)
    }
}

/// The full probe sequence for a reference length, in trial order.
///
/// # Examples
///
/// ```
/// use tetrefine::field::probe::probe_sequence;
///
/// let probes: Vec<_> = probe_sequence(2.0).collect();
/// assert_eq!(probes.len(), 9 * 14);
/// assert_eq!(probes[0].offset, [0.002, 0.0, 0.0]);
/// assert_eq!(probes[1].offset, [-0.002, 0.0, 0.0]);
/// assert_eq!(probes[14].step, 1);
/// ```
pub fn probe_sequence(reference_length: f64) -> impl Iterator<Item = Probe> {
    PROBE_FACTORS
        .iter()
        .enumerate()
        .flat_map(move |(step, factor)| {
            let eps = reference_length * factor;
            PROBE_DIRECTIONS
                .iter()
                .enumerate()
                .map(move |(direction, d)| Probe {
                    step,
                    direction,
                    offset: d.map(|c| c * eps),
                })
        })
}
