//! Property-based tests for the local mesh modification operators.
//!
//! Each operator either commits a change that keeps the mesh valid, keeps its
//! volume and does not lower the worst quality of the touched region, or
//! leaves the mesh untouched.

#![forbid(unsafe_code)]

use proptest::prelude::*;
use tetrefine::prelude::*;

// =============================================================================
// FIXTURES
// =============================================================================

/// Two tetrahedra on an equilateral triangle in `z = 0`, apexes above and below.
fn face_pair(p: [f64; 3], q: [f64; 3]) -> (TetMesh, Vec<VertexKey>) {
    let h = 3.0_f64.sqrt() / 2.0;
    let points = [
        Point::new(p),
        Point::new(q),
        Point::new([1.0, 0.0, 0.0]),
        Point::new([-0.5, h, 0.0]),
        Point::new([-0.5, -h, 0.0]),
    ];
    TetMesh::from_parts(&points, &[[0, 2, 3, 4], [1, 2, 3, 4]]).unwrap()
}

/// Star of `n` tetrahedra around the edge between two apexes, over a jittered
/// ring of radius 1 in `z = 0`.
fn edge_star_mesh(top: [f64; 3], bottom: [f64; 3], jitter: &[f64]) -> (TetMesh, Vec<VertexKey>) {
    let n = jitter.len();
    #[expect(clippy::cast_precision_loss)]
    let sector = std::f64::consts::TAU / n as f64;
    let mut points = vec![Point::new(top), Point::new(bottom)];
    for (i, j) in jitter.iter().enumerate() {
        #[expect(clippy::cast_precision_loss)]
        let t = sector * (i as f64 + j);
        points.push(Point::new([t.cos(), t.sin(), 0.0]));
    }
    let tets: Vec<[usize; 4]> = (0..n).map(|i| [0, 1, 2 + i, 2 + (i + 1) % n]).collect();
    TetMesh::from_parts(&points, &tets).unwrap()
}

fn apex(sign: f64) -> impl Strategy<Value = [f64; 3]> {
    (-0.3..0.3_f64, -0.3..0.3_f64, 0.05..2.0_f64).prop_map(move |(x, y, z)| [x, y, sign * z])
}

fn local_edge(mesh: &TetMesh, a: VertexKey, b: VertexKey) -> (TetKey, usize) {
    mesh.tets()
        .find_map(|(key, tet)| {
            (0..6)
                .find(|&e| {
                    let [x, y] = tet.edge(e);
                    (x == a && y == b) || (x == b && y == a)
                })
                .map(|e| (key, e))
        })
        .unwrap()
}

fn worst(mesh: &TetMesh, measure: TetQuality) -> f64 {
    mesh.tet_keys()
        .map(|key| tet_quality(mesh, key, &measure).unwrap())
        .fold(f64::INFINITY, f64::min)
}

fn measure() -> impl Strategy<Value = TetQuality> {
    prop::sample::select(vec![TetQuality::Gamma, TetQuality::Eta])
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    /// Property: a face swap commits an improvement or changes nothing.
    #[test]
    fn prop_face_swap_improves_or_leaves_mesh(
        p in apex(1.0),
        q in apex(-1.0),
        m in measure(),
    ) {
        let (mut mesh, keys) = face_pair(p, q);
        let volume = mesh.total_volume();
        let before = worst(&mesh, m);
        let generation = mesh.generation();
        let (tet, upper) = mesh.tets().find(|(_, t)| t.contains_vertex(keys[0])).unwrap();
        let face = upper.index_of(keys[0]).unwrap();

        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&m, &config, &mut observer);
        let outcome = mesh.try_face_swap(tet, face, &mut ctx).unwrap();

        mesh.validate().unwrap();
        prop_assert!((mesh.total_volume() - volume).abs() <= 1e-9 * volume);
        if outcome.is_committed() {
            prop_assert_eq!(mesh.number_of_tets(), 3);
            prop_assert!(worst(&mesh, m) > before);
        } else {
            prop_assert_eq!(mesh.generation(), generation);
            prop_assert_eq!(mesh.number_of_tets(), 2);
        }
    }

    /// Property: an edge swap commits an improvement or changes nothing.
    #[test]
    fn prop_edge_swap_improves_or_leaves_mesh(
        top in apex(1.0),
        bottom in apex(-1.0),
        jitter in prop::collection::vec(-0.2..0.2_f64, 3..=6),
        m in measure(),
    ) {
        let (mut mesh, keys) = edge_star_mesh(top, bottom, &jitter);
        let volume = mesh.total_volume();
        let before = worst(&mesh, m);
        let generation = mesh.generation();
        let (tet, edge) = local_edge(&mesh, keys[0], keys[1]);

        let config = LocalModConfig::default();
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&m, &config, &mut observer);
        let outcome = mesh.try_edge_swap(tet, edge, &mut ctx).unwrap();

        mesh.validate().unwrap();
        prop_assert!((mesh.total_volume() - volume).abs() <= 1e-9 * volume);
        if outcome.is_committed() {
            let n = jitter.len();
            prop_assert_eq!(mesh.number_of_tets(), 2 * (n - 2));
            prop_assert!(!mesh.has_edge(keys[0], keys[1]).unwrap());
            prop_assert!(worst(&mesh, m) > before);
        } else {
            prop_assert_eq!(mesh.generation(), generation);
            prop_assert!(mesh.has_edge(keys[0], keys[1]).unwrap());
        }
    }

    /// Property: smoothing never lowers the worst quality and never inverts.
    #[test]
    fn prop_smoothing_never_lowers_worst_quality(
        top in apex(1.0),
        bottom in apex(-1.0),
        jitter in prop::collection::vec(-0.2..0.2_f64, 4..=6),
        center in prop::array::uniform3(-0.25..0.25_f64),
        optimize in any::<bool>(),
        m in measure(),
    ) {
        // Split the axis edge at an interior point to get an interior vertex.
        let (mesh, keys) = edge_star_mesh(top, bottom, &jitter);
        let n = jitter.len();
        let mut points: Vec<Point> = keys.iter().map(|&k| mesh.point(k).unwrap()).collect();
        let mid = points[0].to_vector().lerp(&points[1].to_vector(), 0.5);
        points.push(Point::from_vector(&mid).offset(center.map(|c| c * 0.1)));
        let split = n + 2;
        let tets: Vec<[usize; 4]> = (0..n)
            .flat_map(|i| {
                let (r0, r1) = (2 + i, 2 + (i + 1) % n);
                [[0, split, r0, r1], [split, 1, r0, r1]]
            })
            .collect();
        let (mut mesh, keys) = TetMesh::from_parts(&points, &tets).unwrap();
        let before = worst(&mesh, m);
        let volume = mesh.total_volume();

        let strategy = if optimize {
            SmoothingStrategy::Optimize
        } else {
            SmoothingStrategy::WeightedCentroid
        };
        let config = LocalModConfig::default().with_smoothing(strategy);
        let mut observer = NullObserver;
        let mut ctx = ModContext::new(&m, &config, &mut observer);
        let outcome = mesh.try_smooth(keys[split], &mut ctx).unwrap();

        mesh.validate().unwrap();
        prop_assert!((mesh.total_volume() - volume).abs() <= 1e-9 * volume);
        prop_assert!(worst(&mesh, m) >= before);
        if let SmoothOutcome::Relocated { old_quality, new_quality, .. } = outcome {
            prop_assert!(new_quality >= old_quality);
        }
    }
}
