//! Invariants of the CPU reference pipeline

use approx::assert_relative_eq;
use glam::Vec2;
use gravity_physics::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_disk(n: usize, radius: f32, seed: u64) -> BodySeed {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bodies = BodySeed::with_capacity(n);
    for _ in 0..n {
        let r = radius * rng.random::<f32>().sqrt();
        let angle = rng.random::<f32>() * std::f32::consts::TAU;
        let velocity = Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
        bodies.push(rng.random_range(0.5..2.0), Vec2::from_angle(angle) * r, velocity);
    }
    bodies
}

fn step_params(window: QuantizationWindow, theta: f32, epsilon: f32) -> StepParams {
    StepParams {
        forces: ForceParams {
            grav_constant: 1.0,
            theta,
            epsilon,
        },
        delta_time: 1.0e-3,
        window,
    }
}

#[test]
fn test_sort_gives_sorted_permutation() {
    for n in [1usize, 2, 3, 64, 1000] {
        let bodies = random_disk(n, 10.0, n as u64);
        let window = QuantizationWindow::fit(&bodies.positions).unwrap();
        let mut sim = ReferenceSimulation::new(&bodies).unwrap();
        sim.build_tree(&window);

        let keys = morton_codes(&window, &bodies.positions);
        assert!(is_permutation(sim.body_indices()), "n = {n}");
        for (rank, &body) in sim.body_indices().iter().enumerate() {
            assert_eq!(sim.sorted_keys()[rank], keys[body as usize]);
        }
        assert!(sim.sorted_keys().windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn test_tree_shape_for_many_sizes() {
    for n in [1usize, 2, 3, 5, 17, 256, 999] {
        let bodies = random_disk(n, 3.0, 100 + n as u64);
        let window = QuantizationWindow::fit(&bodies.positions).unwrap();
        let mut sim = ReferenceSimulation::new(&bodies).unwrap();
        let combined = sim.build_tree(&window);

        assert_eq!(check_topology(sim.nodes(), n), Ok(()), "n = {n}");
        assert_eq!(combined, n - 1);
    }
}

#[test]
fn test_duplicate_positions_are_ordered_by_body_index() {
    // Eight bodies in two coincident clusters of four
    let mut bodies = BodySeed::default();
    for i in 0..8 {
        let position = if i % 2 == 0 { Vec2::new(1.0, 1.0) } else { Vec2::new(-1.0, -1.0) };
        bodies.push(1.0, position, Vec2::ZERO);
    }
    let window = QuantizationWindow::new(Vec2::ZERO, Vec2::splat(2.0)).unwrap();
    let mut sim = ReferenceSimulation::new(&bodies).unwrap();
    sim.build_tree(&window);

    assert_eq!(sim.body_indices(), &[1, 3, 5, 7, 0, 2, 4, 6]);
    assert_eq!(check_topology(sim.nodes(), 8), Ok(()));

    let root = &sim.nodes()[0];
    assert_relative_eq!(root.total_mass, 8.0);
    assert_relative_eq!(root.center_of_mass[0], 0.0);
    assert_relative_eq!(root.center_of_mass[1], 0.0);
}

#[test]
fn test_root_aggregate_matches_system() {
    let bodies = random_disk(777, 20.0, 9);
    let window = QuantizationWindow::fit(&bodies.positions).unwrap();
    let mut sim = ReferenceSimulation::new(&bodies).unwrap();
    sim.build_tree(&window);

    let total = bodies.total_mass();
    let center = bodies
        .positions
        .iter()
        .zip(&bodies.masses)
        .fold(Vec2::ZERO, |acc, (&p, &m)| acc + p * m)
        / total;

    let root = &sim.nodes()[0];
    assert_relative_eq!(root.total_mass, total, max_relative = 1e-5);
    assert_relative_eq!(root.center_of_mass[0], center.x, epsilon = 1e-3);
    assert_relative_eq!(root.center_of_mass[1], center.y, epsilon = 1e-3);
}

#[test]
fn test_theta_zero_matches_direct_summation() {
    let bodies = random_disk(50, 5.0, 50);
    let window = QuantizationWindow::fit(&bodies.positions).unwrap();
    let params = ForceParams {
        grav_constant: 1.0,
        theta: 0.0,
        epsilon: 0.05,
    };
    let mut sim = ReferenceSimulation::new(&bodies).unwrap();
    sim.build_tree(&window);

    let tree = tree_accelerations(sim.nodes(), sim.body_indices(), &bodies.positions, &params);
    let direct = direct_accelerations(&bodies.masses, &bodies.positions, &params);

    let scale = direct.iter().map(|a| a.length()).fold(0.0f32, f32::max);
    for (t, d) in tree.iter().zip(&direct) {
        assert!((*t - *d).length() <= 1e-4 * scale, "tree {t} vs direct {d}");
    }
}

#[test]
fn test_moderate_theta_stays_close_to_direct() {
    let bodies = random_disk(500, 5.0, 500);
    let window = QuantizationWindow::fit(&bodies.positions).unwrap();
    let params = ForceParams {
        grav_constant: 1.0,
        theta: 0.5,
        epsilon: window.mean_spacing(500),
    };
    let mut sim = ReferenceSimulation::new(&bodies).unwrap();
    sim.build_tree(&window);

    let tree = tree_accelerations(sim.nodes(), sim.body_indices(), &bodies.positions, &params);
    let direct = direct_accelerations(&bodies.masses, &bodies.positions, &params);

    let error: f32 = tree.iter().zip(&direct).map(|(t, d)| (*t - *d).length()).sum();
    let magnitude: f32 = direct.iter().map(|d| d.length()).sum();
    assert!(error / magnitude < 0.05, "mean relative error {}", error / magnitude);
}

#[test]
fn test_two_body_symmetry() {
    let mut bodies = BodySeed::default();
    bodies.push(1.0, Vec2::new(-1.0, 0.0), Vec2::new(0.0, -0.5));
    bodies.push(1.0, Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.5));
    let window = QuantizationWindow::new(Vec2::ZERO, Vec2::splat(4.0)).unwrap();
    let params = step_params(window, 0.6, 0.01);

    let mut sim = ReferenceSimulation::new(&bodies).unwrap();
    for _ in 0..500 {
        sim.substep(&params);
        let (a, b) = (sim.positions()[0], sim.positions()[1]);
        assert_relative_eq!(a.x, -b.x, epsilon = 1e-6);
        assert_relative_eq!(a.y, -b.y, epsilon = 1e-6);
    }
    // The pair has actually moved
    assert!(sim.positions()[0] != Vec2::new(-1.0, 0.0));
}

#[test]
fn test_momentum_is_nearly_conserved() {
    let bodies = random_disk(200, 5.0, 200);
    let window = QuantizationWindow::fit(&bodies.positions).unwrap();
    let params = step_params(window, 0.3, window.mean_spacing(200));

    let mut sim = ReferenceSimulation::new(&bodies).unwrap();
    let start = sim.total_momentum();
    let scale: f32 = bodies
        .masses
        .iter()
        .zip(&bodies.velocities)
        .map(|(m, v)| m * v.length())
        .sum();

    sim.advance(&params, 100);
    let drift = (sim.total_momentum() - start).length();
    assert!(drift < 5e-3 * scale, "momentum drifted by {drift}");
}

#[test]
fn test_single_body_coasts() {
    let mut bodies = BodySeed::default();
    bodies.push(3.0, Vec2::ZERO, Vec2::new(1.0, 0.0));
    let window = QuantizationWindow::new(Vec2::ZERO, Vec2::ONE).unwrap();
    let mut sim = ReferenceSimulation::new(&bodies).unwrap();
    sim.advance(&step_params(window, 0.6, 0.1), 10);
    assert_eq!(sim.accelerations()[0], Vec2::ZERO);
    assert_relative_eq!(sim.positions()[0].x, 0.01, epsilon = 1e-6);
}

#[test]
fn test_negative_mass_keeps_weighted_centroid() {
    // A strongly repulsive body at the origin, a small cluster near x = 10 and
    // a light tracer far to the left
    let mut rng = StdRng::seed_from_u64(77);
    let mut masses = vec![-1.0e5];
    let mut positions = vec![Vec2::ZERO];
    for _ in 0..20 {
        masses.push(1.0);
        positions.push(Vec2::new(10.0, 0.0) + Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)));
    }
    masses.push(1.0);
    positions.push(Vec2::new(-50.0, 0.0));
    let tracer = positions.len() - 1;

    let window = QuantizationWindow::fit(&positions).unwrap();
    let mut keys = morton_codes(&window, &positions);
    let mut indices: Vec<u32> = (0..positions.len() as u32).collect();
    sort_pairs(&mut keys, &mut indices);
    let mut nodes = build_topology(&keys, &indices);
    assert_eq!(fill_aggregates(&mut nodes, &indices, &masses, &positions), positions.len() - 1);

    let total: f32 = masses.iter().sum();
    let weighted = positions.iter().zip(&masses).fold(Vec2::ZERO, |acc, (&p, &m)| acc + p * m) / total;
    let root = &nodes[0];
    assert_relative_eq!(root.total_mass, total, max_relative = 1e-6);
    assert_relative_eq!(root.center_of_mass().x, weighted.x, epsilon = 1e-4);
    assert_relative_eq!(root.center_of_mass().y, weighted.y, epsilon = 1e-4);

    let params = step_params(window, 0.6, 0.05).forces;
    let tree = tree_accelerations(&nodes, &indices, &positions, &params);
    let direct = direct_accelerations(&masses, &positions, &params);
    assert!(direct[tracer].x < -39.0);
    assert_relative_eq!(tree[tracer].x, direct[tracer].x, max_relative = 1e-3);
    assert_relative_eq!(tree[tracer].y, direct[tracer].y, epsilon = 1e-3);
}
