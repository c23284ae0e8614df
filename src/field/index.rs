//! Spatial Field Index: point location and interpolation over a background field.
//!
//! Cells are binned into a uniform grid over the (slightly padded) bounding box
//! of the view; a query tests only the cells of its bin. Tetrahedra are located
//! with barycentric coordinates, hexahedra by Newton inversion of the trilinear
//! map. The index is immutable after [`SpatialFieldIndex::build`] and can be
//! shared freely between threads.

use crate::field::background::{BackgroundCell, FieldError, ScalarView, StepValues};
use crate::geometry::point::Point;
use crate::geometry::predicates::{barycentric, barycentric_inside};
use nalgebra::{Matrix3, Vector3};

/// Target number of grid bins along the longest axis, per cube root of cell count.
const BINS_PER_CBRT_CELL: f64 = 2.0;
const MAX_BINS_PER_AXIS: usize = 64;
const NEWTON_MAX_ITERATIONS: usize = 25;

/// Local coordinates of a located point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalCoords {
    /// Barycentric coordinates in a tetrahedron.
    Barycentric([f64; 4]),
    /// Reference coordinates `(u, v, w)` in `[0, 1]^3` of a hexahedron.
    Trilinear([f64; 3]),
}

/// A successful point location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Index of the containing cell in the view.
    pub cell: usize,
    /// Coordinates of the point inside that cell.
    pub coords: LocalCoords,
}

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Lower corner.
    pub min: [f64; 3],
    /// Upper corner.
    pub max: [f64; 3],
}

impl Aabb {
    fn of_points(points: impl IntoIterator<Item = Point>) -> Self {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for p in points {
            for (axis, c) in p.coords().into_iter().enumerate() {
                min[axis] = min[axis].min(c);
                max[axis] = max[axis].max(c);
            }
        }
        Self { min, max }
    }

    fn padded(&self, pad: f64) -> Self {
        Self {
            min: self.min.map(|c| c - pad),
            max: self.max.map(|c| c + pad),
        }
    }

    /// Returns `true` if `p` lies inside the closed box.
    #[must_use]
    pub fn contains(&self, p: &Point) -> bool {
        p.coords()
            .iter()
            .enumerate()
            .all(|(axis, &c)| c >= self.min[axis] && c <= self.max[axis])
    }

    fn extent(&self) -> [f64; 3] {
        [0, 1, 2].map(|axis| self.max[axis] - self.min[axis])
    }

    fn diagonal(&self) -> f64 {
        self.extent().iter().map(|e| e * e).sum::<f64>().sqrt()
    }

    fn corners(&self) -> [Point; 2] {
        [Point::new(self.min), Point::new(self.max)]
    }
}

/// Uniform bin grid mapping bins to the cells whose boxes overlap them.
#[derive(Debug, Clone)]
struct BinGrid {
    bounds: Aabb,
    dims: [usize; 3],
    bin_size: [f64; 3],
    bins: Vec<Vec<usize>>,
}

impl BinGrid {
    fn build(bounds: Aabb, cell_boxes: &[Aabb]) -> Self {
        let extent = bounds.extent();
        let longest = extent.iter().copied().fold(f64::MIN_POSITIVE, f64::max);
        #[expect(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "bin counts are small positive integers"
        )]
        let dims = {
            let target = ((cell_boxes.len() as f64).cbrt() * BINS_PER_CBRT_CELL)
                .ceil()
                .clamp(1.0, MAX_BINS_PER_AXIS as f64);
            let size = longest / target;
            extent.map(|e| ((e / size).ceil() as usize).clamp(1, MAX_BINS_PER_AXIS))
        };
        #[expect(clippy::cast_precision_loss, reason = "bin counts are small")]
        let bin_size = [0, 1, 2].map(|axis| (extent[axis] / dims[axis] as f64).max(f64::MIN_POSITIVE));

        let mut grid = Self {
            bounds,
            dims,
            bin_size,
            bins: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        };
        for (cell, aabb) in cell_boxes.iter().enumerate() {
            let lo = grid.bin_coords(&aabb.min);
            let hi = grid.bin_coords(&aabb.max);
            for iz in lo[2]..=hi[2] {
                for iy in lo[1]..=hi[1] {
                    for ix in lo[0]..=hi[0] {
                        let flat = grid.flat_index([ix, iy, iz]);
                        grid.bins[flat].push(cell);
                    }
                }
            }
        }
        grid
    }

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "clamped to the grid before the cast"
    )]
    fn bin_coords(&self, coords: &[f64; 3]) -> [usize; 3] {
        [0, 1, 2].map(|axis| {
            let t = ((coords[axis] - self.bounds.min[axis]) / self.bin_size[axis]).floor();
            let last = self.dims[axis] - 1;
            if t <= 0.0 {
                0
            } else {
                (t as usize).min(last)
            }
        })
    }

    const fn flat_index(&self, [ix, iy, iz]: [usize; 3]) -> usize {
        (iz * self.dims[1] + iy) * self.dims[0] + ix
    }

    fn candidates(&self, p: &Point) -> &[usize] {
        if !self.bounds.contains(p) {
            return &[];
        }
        &self.bins[self.flat_index(self.bin_coords(&p.coords()))]
    }
}

/// Point-location index over a [`ScalarView`].
///
/// # Examples
///
/// ```
/// use tetrefine::field::background::ScalarView;
/// use tetrefine::field::index::SpatialFieldIndex;
/// use tetrefine::geometry::point::Point;
///
/// let view = ScalarView::uniform_box(Point::origin(), Point::new([1.0, 1.0, 1.0]), 0.05).unwrap();
/// let index = SpatialFieldIndex::build(view, 1e-10).unwrap();
/// assert_eq!(index.search_scalar(&Point::new([0.5, 0.5, 0.5]), 0), Some((0.05, 0)));
/// assert_eq!(index.search_scalar(&Point::new([1.5, 0.5, 0.5]), 0), None);
/// ```
#[derive(Debug, Clone)]
pub struct SpatialFieldIndex {
    view: ScalarView,
    cell_boxes: Vec<Aabb>,
    grid: BinGrid,
    max_value: f64,
    tolerance: f64,
}

impl SpatialFieldIndex {
    /// Validates `view` and builds the index.
    ///
    /// `tolerance` is the barycentric (or reference-coordinate) slack of the
    /// point-in-cell test, usually
    /// [`MeshingConfig::containment_tolerance`](crate::config::MeshingConfig::containment_tolerance).
    /// Cell boxes are widened by the same fraction of their diagonal so that
    /// points within the slack reach the cell test.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::InvalidTolerance`] for a negative or non-finite
    /// tolerance, or the validation error of a malformed view.
    pub fn build(view: ScalarView, tolerance: f64) -> Result<Self, FieldError> {
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(FieldError::InvalidTolerance { value: tolerance });
        }
        view.validate()?;
        let domain = Aabb::of_points(view.nodes().iter().copied());
        let longest = domain.extent().iter().copied().fold(0.0_f64, f64::max);
        let pad = (longest * 1e-9).max(f64::MIN_POSITIVE);
        let cell_boxes: Vec<Aabb> = view
            .cells()
            .iter()
            .map(|c| {
                let aabb = Aabb::of_points(view.cell_points(c));
                aabb.padded(pad + tolerance * aabb.diagonal())
            })
            .collect();
        let bounds = Aabb::of_points(cell_boxes.iter().flat_map(Aabb::corners));
        let grid = BinGrid::build(bounds, &cell_boxes);
        let max_value = view.max_value();

        tracing::debug!(
            cells = view.cells().len(),
            bins = grid.bins.len(),
            max_value,
            "built spatial field index"
        );
        Ok(Self {
            view,
            cell_boxes,
            grid,
            max_value,
            tolerance,
        })
    }

    /// The indexed view.
    #[must_use]
    pub const fn view(&self) -> &ScalarView {
        &self.view
    }

    /// Number of indexed cells.
    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.view.cells().len()
    }

    /// Largest value of the field over all steps, recorded at construction.
    #[must_use]
    pub const fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Slack of the point-in-cell test.
    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Bounding box of the indexed domain.
    #[must_use]
    pub const fn bounds(&self) -> Aabb {
        self.grid.bounds
    }

    /// Finds a cell containing `p`.
    ///
    /// When `p` lies on a shared face, the cell listed first in the view wins.
    #[must_use]
    pub fn locate(&self, p: &Point) -> Option<Location> {
        self.grid.candidates(p).iter().find_map(|&cell| {
            if !self.cell_boxes[cell].contains(p) {
                return None;
            }
            let coords = self.local_coords(&self.view.cells()[cell], p)?;
            Some(Location { cell, coords })
        })
    }

    /// Interpolated value of step `step` at `p`, with the containing cell.
    ///
    /// Returns `None` when `p` is outside every cell or the step does not exist.
    #[must_use]
    pub fn search_scalar(&self, p: &Point, step: usize) -> Option<(f64, usize)> {
        let values = self.view.step(step).ok()?;
        let location = self.locate(p)?;
        Some((self.interpolate(values, &location), location.cell))
    }

    fn local_coords(&self, cell: &BackgroundCell, p: &Point) -> Option<LocalCoords> {
        match cell {
            BackgroundCell::Tetrahedron(n) => {
                let points = n.map(|i| self.view.nodes()[i]);
                let lambda = barycentric(&points, p)?;
                barycentric_inside(&lambda, self.tolerance).then_some(LocalCoords::Barycentric(lambda))
            }
            BackgroundCell::Hexahedron(n) => {
                let points = n.map(|i| self.view.nodes()[i]);
                let uvw = invert_trilinear(&points, p)?;
                uvw.iter()
                    .all(|&t| t >= -self.tolerance && t <= 1.0 + self.tolerance)
                    .then_some(LocalCoords::Trilinear(uvw))
            }
        }
    }

    fn interpolate(&self, values: &StepValues, location: &Location) -> f64 {
        let nodal = match values {
            StepValues::PerCell(v) => return v[location.cell],
            StepValues::PerNode(v) => v,
        };
        let nodes = self.view.cells()[location.cell].nodes();
        let weighted = |weights: &[f64]| -> f64 {
            nodes
                .iter()
                .zip(weights)
                .map(|(&node, w)| w * nodal[node])
                .sum()
        };
        match location.coords {
            LocalCoords::Barycentric(lambda) => weighted(&lambda),
            LocalCoords::Trilinear(uvw) => weighted(&trilinear_shape(uvw)),
        }
    }
}

/// Reference corners of the unit hexahedron in node order.
const HEX_CORNERS: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

fn trilinear_shape([u, v, w]: [f64; 3]) -> [f64; 8] {
    HEX_CORNERS.map(|[cu, cv, cw]| {
        let fu = if cu > 0.5 { u } else { 1.0 - u };
        let fv = if cv > 0.5 { v } else { 1.0 - v };
        let fw = if cw > 0.5 { w } else { 1.0 - w };
        fu * fv * fw
    })
}

/// Derivatives of the shape functions with respect to `(u, v, w)`.
fn trilinear_gradients([u, v, w]: [f64; 3]) -> [[f64; 3]; 8] {
    HEX_CORNERS.map(|[cu, cv, cw]| {
        let (fu, du) = if cu > 0.5 { (u, 1.0) } else { (1.0 - u, -1.0) };
        let (fv, dv) = if cv > 0.5 { (v, 1.0) } else { (1.0 - v, -1.0) };
        let (fw, dw) = if cw > 0.5 { (w, 1.0) } else { (1.0 - w, -1.0) };
        [du * fv * fw, fu * dv * fw, fu * fv * dw]
    })
}

/// Newton inversion of the trilinear map; `None` if it does not converge.
fn invert_trilinear(points: &[Point; 8], p: &Point) -> Option<[f64; 3]> {
    let target = p.to_vector();
    let scale = points
        .iter()
        .map(|q| q.distance(&points[0]))
        .fold(0.0_f64, f64::max);
    let mut uvw = Vector3::new(0.5, 0.5, 0.5);
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let at = [uvw.x, uvw.y, uvw.z];
        let shape = trilinear_shape(at);
        let grads = trilinear_gradients(at);
        let mut x = Vector3::zeros();
        let mut jacobian = Matrix3::zeros();
        for (i, q) in points.iter().enumerate() {
            let qv = q.to_vector();
            x += qv * shape[i];
            jacobian += qv * Vector3::from(grads[i]).transpose();
        }
        let residual = target - x;
        if residual.norm() <= 1e-13 * scale {
            return Some(at);
        }
        let step = jacobian.lu().solve(&residual)?;
        uvw += step;
        if !uvw.iter().all(|c| c.is_finite()) {
            return None;
        }
    }
    None
}
