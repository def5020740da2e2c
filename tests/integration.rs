//! End-to-end scenarios that exercise the whole public surface together:
//! brute force vs. tree, at multiple opening angles and thread counts.
//! Per-module unit tests cover individual build/traversal invariants; this
//! file is for the ones that only show up once the whole pipeline runs.

use barnes_hut_grav::{node::Cube, tree::Tree, BhConfig, BodyModel};
use lin_alg::f64::Vec3;
use rand::prelude::*;

struct Body {
    posit: Vec3,
    mass: f64,
}

impl BodyModel for Body {
    fn posit(&self) -> Vec3 {
        self.posit
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

fn uniform_cloud(n: usize, half_width: f64, seed: u64) -> Vec<Body> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Body {
            posit: Vec3::new(
                rng.random_range(-half_width..half_width),
                rng.random_range(-half_width..half_width),
                rng.random_range(-half_width..half_width),
            ),
            mass: rng.random_range(0.5..1.5),
        })
        .collect()
}

fn max_relative_error(a: &[Vec3], b: &[Vec3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let scale = x.magnitude().max(y.magnitude()).max(1e-12);
            (*x - *y).magnitude() / scale
        })
        .fold(0., f64::max)
}

/// Invariant 7: as θ shrinks toward 0, the tree result converges to the
/// brute-force result, and at the default θ = 0.5 it already stays within
/// 5% per-body relative error for a few hundred uniformly scattered bodies.
#[test]
fn theta_convergence_bounds_relative_error() {
    let bodies = uniform_cloud(200, 5.0, 1);
    let root = Cube::from_bodies(&bodies, 0.5).unwrap();

    let exact = barnes_hut_grav::brute_force::accelerations(&bodies, 1.0, 1e-6);

    let loose_config = BhConfig {
        θ: 0.5,
        ..Default::default()
    };
    let loose_tree = Tree::build_parallel(&bodies, root.clone(), &loose_config);
    let loose = loose_tree.accelerations_parallel(&bodies, 1.0, 1e-6, &loose_config);
    assert!(max_relative_error(&exact, &loose) < 0.05);

    let tight_config = BhConfig {
        θ: 0.05,
        ..Default::default()
    };
    let tight_tree = Tree::build_parallel(&bodies, root, &tight_config);
    let tight = tight_tree.accelerations_parallel(&bodies, 1.0, 1e-6, &tight_config);
    assert!(max_relative_error(&exact, &tight) < max_relative_error(&exact, &loose));
    assert!(max_relative_error(&exact, &tight) < 0.01);
}

/// Invariant 8: with a fixed thread count and fixed partition policy,
/// the output is bitwise reproducible across repeated runs on the same
/// input -- rebuilding the tree and re-running the traversal twice in the
/// same pinned pool must not introduce any scheduling-order nondeterminism.
#[test]
fn result_is_bitwise_reproducible_at_fixed_thread_count() {
    let bodies = uniform_cloud(300, 5.0, 2);
    let root = Cube::from_bodies(&bodies, 0.5).unwrap();
    let config = BhConfig {
        θ: 0.3,
        ..Default::default()
    };

    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let run = |pool: &rayon::ThreadPool| {
        pool.install(|| {
            let tree = Tree::build_parallel(&bodies, root.clone(), &config);
            tree.accelerations_parallel(&bodies, 1.0, 1e-6, &config)
        })
    };

    let first = run(&pool);
    let second = run(&pool);

    for i in 0..bodies.len() {
        assert_eq!(first[i].x.to_bits(), second[i].x.to_bits());
        assert_eq!(first[i].y.to_bits(), second[i].y.to_bits());
        assert_eq!(first[i].z.to_bits(), second[i].z.to_bits());
    }
}

/// Invariant 9: the tree's topology (leaf membership) doesn't depend on
/// thread count, only on input order and configuration.
#[test]
fn tree_topology_is_stable_across_thread_counts() {
    let bodies = uniform_cloud(150, 4.0, 3);
    let root = Cube::from_bodies(&bodies, 0.5).unwrap();
    let config = BhConfig::default();

    let mut leaf_sets = Vec::new();
    for &threads in &[1usize, 2, 4, 8] {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        let tree = pool.install(|| Tree::build_parallel(&bodies, root.clone(), &config));
        let mut leaves: Vec<Vec<usize>> = tree
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| {
                let mut ids = n.residents().to_vec();
                ids.sort_unstable();
                ids
            })
            .collect();
        leaves.sort();
        leaf_sets.push(leaves);
    }

    for set in &leaf_sets[1..] {
        assert_eq!(&leaf_sets[0], set);
    }
}

/// S4: a thousand-body uniform cloud, default-ish θ, stays within 1% max
/// relative difference against the brute-force baseline.
#[test]
fn thousand_body_tree_matches_brute_force_within_one_percent() {
    let bodies = uniform_cloud(1000, 10.0, 4);
    let root = Cube::from_bodies(&bodies, 0.5).unwrap();
    let config = BhConfig {
        θ: 0.2,
        ..Default::default()
    };

    let exact = barnes_hut_grav::brute_force::accelerations(&bodies, 1.0, 1e-6);
    let tree = Tree::build_parallel(&bodies, root, &config);
    let approx = tree.accelerations_parallel(&bodies, 1.0, 1e-6, &config);

    assert!(max_relative_error(&exact, &approx) < 0.01);
}

/// S5: the same thousand-body input, run at four different thread counts,
/// agrees to within 1e-10 absolute -- the tree-build and traversal split
/// work across threads without changing the arithmetic each body sees.
#[test]
fn thousand_body_result_agrees_across_thread_counts() {
    let bodies = uniform_cloud(1000, 10.0, 5);
    let root = Cube::from_bodies(&bodies, 0.5).unwrap();
    let config = BhConfig {
        θ: 0.2,
        ..Default::default()
    };

    let mut runs = Vec::new();
    for &threads in &[1usize, 2, 4, 8] {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        let accs = pool.install(|| {
            let tree = Tree::build_parallel(&bodies, root.clone(), &config);
            tree.accelerations_parallel(&bodies, 1.0, 1e-6, &config)
        });
        runs.push(accs);
    }

    for run in &runs[1..] {
        for i in 0..bodies.len() {
            assert!((runs[0][i] - run[i]).magnitude() < 1e-10);
        }
    }
}
