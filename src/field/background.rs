//! Background field input: a reference mesh carrying scalar values.
//!
//! A [`ScalarView`] is what an external post-processing view hands to the
//! index builder: node positions, cells (linear tetrahedra or trilinear
//! hexahedra) and one or more steps of scalar values, each attached either to
//! the nodes or to the cells.

use crate::geometry::point::Point;
use crate::geometry::predicates::{Orientation, orientation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative volume under which a background tetrahedron is rejected.
const CELL_DEGENERACY_TOLERANCE: f64 = 1e-14;

/// Corner tetrahedra of a hexahedron: each node with its three edge neighbors,
/// ordered so that every one is positive for a right-handed hexahedron.
const HEX_CORNER_TETS: [[usize; 4]; 8] = [
    [0, 1, 3, 4],
    [1, 2, 0, 5],
    [2, 3, 1, 6],
    [3, 0, 2, 7],
    [4, 7, 5, 0],
    [5, 4, 6, 1],
    [6, 5, 7, 2],
    [7, 6, 4, 3],
];

/// Errors for malformed background fields.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum FieldError {
    /// The view has no nodes, cells or steps.
    #[error("Background view is empty: {what}")]
    EmptyView {
        /// Which part is empty.
        what: &'static str,
    },
    /// A node position is not finite.
    #[error("Node {index} has a non-finite position")]
    NonFiniteNode {
        /// Node index.
        index: usize,
    },
    /// A cell references a node that does not exist.
    #[error("Cell {cell} references node {index}, but the view has {nodes} nodes")]
    NodeIndexOutOfRange {
        /// Cell index.
        cell: usize,
        /// Offending node index.
        index: usize,
        /// Number of nodes.
        nodes: usize,
    },
    /// A tetrahedron is flat, or a hexahedron is flat, folded or inverted.
    #[error("Cell {cell} is degenerate")]
    DegenerateCell {
        /// Cell index.
        cell: usize,
    },
    /// A step has the wrong number of values.
    #[error("Step {step} has {found} values, expected {expected}")]
    ValueCountMismatch {
        /// Step index.
        step: usize,
        /// Expected count (nodes or cells).
        expected: usize,
        /// Actual count.
        found: usize,
    },
    /// A step contains NaN or an infinity.
    #[error("Step {step} has a non-finite value at {index}")]
    NonFiniteValue {
        /// Step index.
        step: usize,
        /// Value index.
        index: usize,
    },
    /// The point-in-cell tolerance is negative or not finite.
    #[error("Invalid containment tolerance {value}")]
    InvalidTolerance {
        /// Rejected tolerance.
        value: f64,
    },
    /// The requested step does not exist.
    #[error("Step {step} requested, but the view has {steps} steps")]
    InvalidStep {
        /// Requested step.
        step: usize,
        /// Number of steps.
        steps: usize,
    },
}

/// A cell of the background mesh, by node indices.
///
/// Hexahedron nodes follow the usual ordering: bottom face `0-1-2-3`
/// counter-clockwise seen from above, top face `4-5-6-7`, with node `i + 4`
/// above node `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundCell {
    /// Linear tetrahedron.
    Tetrahedron([usize; 4]),
    /// Trilinear hexahedron.
    Hexahedron([usize; 8]),
}

impl BackgroundCell {
    /// Node indices of the cell.
    #[must_use]
    pub fn nodes(&self) -> &[usize] {
        match self {
            Self::Tetrahedron(n) => n,
            Self::Hexahedron(n) => n,
        }
    }
}

/// Scalar values of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepValues {
    /// One value per node, interpolated inside cells.
    PerNode(Vec<f64>),
    /// One value per cell, constant on the cell.
    PerCell(Vec<f64>),
}

impl StepValues {
    /// The raw values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        match self {
            Self::PerNode(v) | Self::PerCell(v) => v,
        }
    }
}

/// A background mesh with scalar data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarView {
    nodes: Vec<Point>,
    cells: Vec<BackgroundCell>,
    steps: Vec<StepValues>,
}

impl ScalarView {
    /// Assembles and validates a view.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn new(
        nodes: Vec<Point>,
        cells: Vec<BackgroundCell>,
        steps: Vec<StepValues>,
    ) -> Result<Self, FieldError> {
        let view = Self {
            nodes,
            cells,
            steps,
        };
        view.validate()?;
        Ok(view)
    }

    /// A single hexahedron spanning the box `[min, max]` with one constant value.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError`] if the box or the value is not finite.
    pub fn uniform_box(min: Point, max: Point, value: f64) -> Result<Self, FieldError> {
        let [x0, y0, z0] = min.coords();
        let [x1, y1, z1] = max.coords();
        let nodes = vec![
            Point::new([x0, y0, z0]),
            Point::new([x1, y0, z0]),
            Point::new([x1, y1, z0]),
            Point::new([x0, y1, z0]),
            Point::new([x0, y0, z1]),
            Point::new([x1, y0, z1]),
            Point::new([x1, y1, z1]),
            Point::new([x0, y1, z1]),
        ];
        Self::new(
            nodes,
            vec![BackgroundCell::Hexahedron([0, 1, 2, 3, 4, 5, 6, 7])],
            vec![StepValues::PerCell(vec![value])],
        )
    }

    /// Node positions.
    #[must_use]
    pub fn nodes(&self) -> &[Point] {
        &self.nodes
    }

    /// Cells.
    #[must_use]
    pub fn cells(&self) -> &[BackgroundCell] {
        &self.cells
    }

    /// Value steps.
    #[must_use]
    pub fn steps(&self) -> &[StepValues] {
        &self.steps
    }

    /// Values of step `step`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::InvalidStep`] if the step does not exist.
    pub fn step(&self, step: usize) -> Result<&StepValues, FieldError> {
        self.steps.get(step).ok_or(FieldError::InvalidStep {
            step,
            steps: self.steps.len(),
        })
    }

    /// Largest value over all steps.
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.steps
            .iter()
            .flat_map(StepValues::values)
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Positions of the nodes of `cell`; indices must be valid.
    pub(crate) fn cell_points<'a>(&'a self, cell: &'a BackgroundCell) -> impl Iterator<Item = Point> + 'a {
        cell.nodes().iter().map(|&i| self.nodes[i])
    }

    /// Checks the view for structural consistency.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a [`FieldError`].
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.nodes.is_empty() {
            return Err(FieldError::EmptyView { what: "nodes" });
        }
        if self.cells.is_empty() {
            return Err(FieldError::EmptyView { what: "cells" });
        }
        if self.steps.is_empty() {
            return Err(FieldError::EmptyView { what: "steps" });
        }
        if let Some(index) = self.nodes.iter().position(|p| !p.is_finite()) {
            return Err(FieldError::NonFiniteNode { index });
        }

        for (c, cell) in self.cells.iter().enumerate() {
            if let Some(&index) = cell.nodes().iter().find(|&&i| i >= self.nodes.len()) {
                return Err(FieldError::NodeIndexOutOfRange {
                    cell: c,
                    index,
                    nodes: self.nodes.len(),
                });
            }
            let degenerate = match cell {
                BackgroundCell::Tetrahedron(n) => {
                    let points = n.map(|i| self.nodes[i]);
                    orientation(&points, CELL_DEGENERACY_TOLERANCE) == Orientation::DEGENERATE
                }
                BackgroundCell::Hexahedron(n) => HEX_CORNER_TETS.iter().any(|corner| {
                    let points = corner.map(|i| self.nodes[n[i]]);
                    orientation(&points, CELL_DEGENERACY_TOLERANCE) != Orientation::POSITIVE
                }),
            };
            if degenerate {
                return Err(FieldError::DegenerateCell { cell: c });
            }
        }

        for (s, step) in self.steps.iter().enumerate() {
            let expected = match step {
                StepValues::PerNode(_) => self.nodes.len(),
                StepValues::PerCell(_) => self.cells.len(),
            };
            let values = step.values();
            if values.len() != expected {
                return Err(FieldError::ValueCountMismatch {
                    step: s,
                    expected,
                    found: values.len(),
                });
            }
            if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                return Err(FieldError::NonFiniteValue { step: s, index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tet_nodes() -> Vec<Point> {
        vec![
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn test_uniform_box_is_valid() {
        let view =
            ScalarView::uniform_box(Point::origin(), Point::new([1.0, 1.0, 1.0]), 0.05).unwrap();
        assert_eq!(view.cells().len(), 1);
        assert_eq!(view.nodes().len(), 8);
        assert!((view.max_value() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_max_value_spans_all_steps() {
        let view = ScalarView::new(
            unit_tet_nodes(),
            vec![BackgroundCell::Tetrahedron([0, 1, 2, 3])],
            vec![
                StepValues::PerNode(vec![0.1, 0.2, 0.3, 0.4]),
                StepValues::PerCell(vec![0.9]),
            ],
        )
        .unwrap();
        assert!((view.max_value() - 0.9).abs() < f64::EPSILON);
        assert!(matches!(
            view.step(2),
            Err(FieldError::InvalidStep { step: 2, steps: 2 })
        ));
    }

    #[test]
    fn test_validation_errors() {
        let tet = vec![BackgroundCell::Tetrahedron([0, 1, 2, 3])];
        assert!(matches!(
            ScalarView::new(unit_tet_nodes(), tet.clone(), vec![]),
            Err(FieldError::EmptyView { what: "steps" })
        ));
        assert!(matches!(
            ScalarView::new(
                unit_tet_nodes(),
                vec![BackgroundCell::Tetrahedron([0, 1, 2, 7])],
                vec![StepValues::PerCell(vec![1.0])]
            ),
            Err(FieldError::NodeIndexOutOfRange { index: 7, .. })
        ));
        assert!(matches!(
            ScalarView::new(
                unit_tet_nodes(),
                tet.clone(),
                vec![StepValues::PerNode(vec![1.0])]
            ),
            Err(FieldError::ValueCountMismatch {
                expected: 4,
                found: 1,
                ..
            })
        ));
        assert!(matches!(
            ScalarView::new(
                unit_tet_nodes(),
                tet,
                vec![StepValues::PerCell(vec![f64::NAN])]
            ),
            Err(FieldError::NonFiniteValue { step: 0, index: 0 })
        ));

        let mut flat = unit_tet_nodes();
        flat[3] = Point::new([0.5, 0.5, 0.0]);
        assert!(matches!(
            ScalarView::new(
                flat,
                vec![BackgroundCell::Tetrahedron([0, 1, 2, 3])],
                vec![StepValues::PerCell(vec![1.0])]
            ),
            Err(FieldError::DegenerateCell { cell: 0 })
        ));
    }

    #[test]
    fn test_folded_or_inverted_hexahedra_are_rejected() {
        let unit = ScalarView::uniform_box(Point::origin(), Point::new([1.0, 1.0, 1.0]), 1.0)
            .unwrap();
        let cube = unit.nodes().to_vec();
        let values = || vec![StepValues::PerCell(vec![1.0])];

        // Top and bottom faces swapped: a mirror image of the cube.
        assert!(matches!(
            ScalarView::new(
                cube.clone(),
                vec![BackgroundCell::Hexahedron([4, 5, 6, 7, 0, 1, 2, 3])],
                values()
            ),
            Err(FieldError::DegenerateCell { cell: 0 })
        ));

        // Top face pushed through the bottom one at a single corner.
        let mut folded = cube.clone();
        folded[6] = Point::new([1.0, 1.0, -0.5]);
        assert!(matches!(
            ScalarView::new(
                folded,
                vec![BackgroundCell::Hexahedron([0, 1, 2, 3, 4, 5, 6, 7])],
                values()
            ),
            Err(FieldError::DegenerateCell { cell: 0 })
        ));

        // Squashed flat.
        let flat = cube.iter().map(|p| Point::new([p.x(), p.y(), 0.0])).collect();
        assert!(matches!(
            ScalarView::new(
                flat,
                vec![BackgroundCell::Hexahedron([0, 1, 2, 3, 4, 5, 6, 7])],
                values()
            ),
            Err(FieldError::DegenerateCell { cell: 0 })
        ));
    }
}
