//! Gravitational acceleration for a set of point masses in three
//! dimensions, by an exact O(N²) pairwise kernel or an approximate
//! O(N log N) [Barnes–Hut](https://en.wikipedia.org/wiki/Barnes%E2%80%93Hut_simulation)
//! octree kernel.
//!
//! The octree subdivides space into cubical cells, aggregating the mass
//! and center of mass of every subtree as it's built, then evaluates the
//! force on each target by descending from the root and substituting a
//! node's aggregate for its descendants whenever the opening angle θ
//! permits it. See the `tree` and `traversal` modules for the build and
//! evaluation passes respectively.
//!
//! This crate does not do time integration, periodic boundaries, tree
//! reuse between invocations, adaptive softening, quadrupole corrections,
//! or GPU offload -- it computes one set of accelerations per call.

#![allow(non_ascii_idents)]
#![allow(mixed_script_confusables)]

pub mod brute_force;
pub mod force;
pub mod node;
pub mod traversal;
pub mod tree;

#[cfg(feature = "encode")]
use bincode::{Decode, Encode};
use lin_alg::f64::Vec3;

pub use node::{Cube, Node};
pub use tree::Tree;

/// Allows arbitrary caller body (or particle) types to be used with this
/// crate. Substitute `charge` for `mass`, or similar, in application code
/// that isn't modeling gravity.
pub trait BodyModel {
    fn posit(&self) -> Vec3;
    fn mass(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "encode", derive(Encode, Decode))]
pub struct BhConfig {
    /// Opening angle. How aggressively to group distant nodes: 0 means no
    /// grouping (best accuracy, worst performance -- effectively brute
    /// force); higher values trade accuracy for speed. Typical range
    /// 0.3-1.0.
    pub θ: f64,
    /// Maximum resident particles a leaf holds before it splits.
    pub leaf_size: usize,
    /// Safety valve on tree depth, to bound recursion for particles with
    /// close or identical positions.
    pub max_depth: usize,
}

impl Default for BhConfig {
    fn default() -> Self {
        Self {
            θ: 0.5,
            leaf_size: 8,
            max_depth: 15,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BhError {
    #[error("G must be positive, got {0}")]
    InvalidG(f64),
    #[error("θ must be positive, got {0}")]
    InvalidTheta(f64),
    #[error("ε must be non-negative, got {0}")]
    InvalidEpsilon(f64),
    #[error("position or mass at particle index {0} is NaN or infinite")]
    NonFinite(usize),
    #[error("particle index {0} lies outside the supplied root cube")]
    OutOfBounds(usize),
}

fn validate_g(g: f64) -> Result<(), BhError> {
    if g > 0. && g.is_finite() {
        Ok(())
    } else {
        Err(BhError::InvalidG(g))
    }
}

fn validate_eps(eps: f64) -> Result<(), BhError> {
    if eps >= 0. && eps.is_finite() {
        Ok(())
    } else {
        Err(BhError::InvalidEpsilon(eps))
    }
}

fn validate_theta(θ: f64) -> Result<(), BhError> {
    if θ > 0. && θ.is_finite() {
        Ok(())
    } else {
        Err(BhError::InvalidTheta(θ))
    }
}

fn check_finite<T: BodyModel>(bodies: &[T]) -> Result<(), BhError> {
    for (i, body) in bodies.iter().enumerate() {
        let p = body.posit();
        if !p.x.is_finite() || !p.y.is_finite() || !p.z.is_finite() || !body.mass().is_finite() {
            return Err(BhError::NonFinite(i));
        }
    }
    Ok(())
}

#[cfg(feature = "debug-geometry-checks")]
fn check_bounds<T: BodyModel>(bodies: &[T], root: &Cube) -> Result<(), BhError> {
    for (i, body) in bodies.iter().enumerate() {
        if !root.contains(body.posit()) {
            return Err(BhError::OutOfBounds(i));
        }
    }
    Ok(())
}

struct FlatBody {
    posit: Vec3,
    mass: f64,
}

impl BodyModel for FlatBody {
    fn posit(&self) -> Vec3 {
        self.posit
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

/// The flat-array interface: given flat, triplet-packed position and
/// mass arrays, returns a flat acceleration array in the same order,
/// using the Barnes-Hut kernel with opening angle `theta`.
///
/// `root_center`/`root_width` must describe a cube strictly containing
/// every position; this is only checked when the `debug-geometry-checks`
/// feature is enabled, since verifying it unconditionally would cost an
/// extra O(N) pass callers who already bound their own particles
/// shouldn't have to pay for.
///
/// # Panics
///
/// Panics if `positions.len() != 3 * n` or `masses.len() != n` -- a
/// mismatched array length is a caller bug, not a data-validation
/// concern.
pub fn compute_accelerations(
    n: usize,
    positions: &[f64],
    masses: &[f64],
    g: f64,
    eps: f64,
    theta: f64,
    root_center: [f64; 3],
    root_width: f64,
) -> Result<Vec<f64>, BhError> {
    assert_eq!(positions.len(), 3 * n, "positions must hold exactly 3n entries");
    assert_eq!(masses.len(), n, "masses must hold exactly n entries");

    validate_g(g)?;
    validate_theta(theta)?;
    validate_eps(eps)?;

    if n == 0 {
        return Ok(Vec::new());
    }

    let bodies: Vec<FlatBody> = (0..n)
        .map(|i| FlatBody {
            posit: Vec3::new(positions[3 * i], positions[3 * i + 1], positions[3 * i + 2]),
            mass: masses[i],
        })
        .collect();

    check_finite(&bodies)?;

    let root = Cube::new(Vec3::new(root_center[0], root_center[1], root_center[2]), root_width);

    #[cfg(feature = "debug-geometry-checks")]
    check_bounds(&bodies, &root)?;

    let config = BhConfig {
        θ: theta,
        ..Default::default()
    };

    let tree = Tree::build_parallel(&bodies, root, &config);
    let accs = tree.accelerations_parallel(&bodies, g, eps, &config);

    let mut out = vec![0.; 3 * n];
    for (i, a) in accs.iter().enumerate() {
        out[3 * i] = a.x;
        out[3 * i + 1] = a.y;
        out[3 * i + 2] = a.z;
    }
    Ok(out)
}

/// Flat-array brute-force counterpart to [`compute_accelerations`]: the
/// same contract minus θ, root center, and root width.
pub fn compute_accelerations_bf(n: usize, positions: &[f64], masses: &[f64], g: f64, eps: f64) -> Result<Vec<f64>, BhError> {
    assert_eq!(positions.len(), 3 * n, "positions must hold exactly 3n entries");
    assert_eq!(masses.len(), n, "masses must hold exactly n entries");

    validate_g(g)?;
    validate_eps(eps)?;

    if n == 0 {
        return Ok(Vec::new());
    }

    let bodies: Vec<FlatBody> = (0..n)
        .map(|i| FlatBody {
            posit: Vec3::new(positions[3 * i], positions[3 * i + 1], positions[3 * i + 2]),
            mass: masses[i],
        })
        .collect();

    check_finite(&bodies)?;

    let accs = brute_force::accelerations(&bodies, g, eps);

    let mut out = vec![0.; 3 * n];
    for (i, a) in accs.iter().enumerate() {
        out[3 * i] = a.x;
        out[3 * i + 1] = a.y;
        out[3 * i + 2] = a.z;
    }
    Ok(out)
}

/// Ergonomic generic entry point for callers with their own `BodyModel`
/// type: builds the tree in parallel and runs the default (batched,
/// target-partitioned) parallel traversal.
pub fn compute_accelerations_bodies<T: BodyModel + Sync>(
    bodies: &[T],
    g: f64,
    eps: f64,
    theta: f64,
    root: Cube,
) -> Result<Vec<Vec3>, BhError> {
    validate_g(g)?;
    validate_theta(theta)?;
    validate_eps(eps)?;

    if bodies.is_empty() {
        return Ok(Vec::new());
    }

    check_finite(bodies)?;

    #[cfg(feature = "debug-geometry-checks")]
    check_bounds(bodies, &root)?;

    let config = BhConfig {
        θ: theta,
        ..Default::default()
    };

    let tree = Tree::build_parallel(bodies, root, &config);
    Ok(tree.accelerations_parallel(bodies, g, eps, &config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonpositive_g() {
        let err = compute_accelerations(1, &[0., 0., 0.], &[1.], 0., 0., 0.5, [0., 0., 0.], 10.).unwrap_err();
        assert_eq!(err, BhError::InvalidG(0.));
    }

    #[test]
    fn rejects_nonpositive_theta() {
        let err = compute_accelerations(1, &[0., 0., 0.], &[1.], 1., 0., 0., [0., 0., 0.], 10.).unwrap_err();
        assert_eq!(err, BhError::InvalidTheta(0.));
    }

    #[test]
    fn rejects_negative_epsilon() {
        let err = compute_accelerations(1, &[0., 0., 0.], &[1.], 1., -1., 0.5, [0., 0., 0.], 10.).unwrap_err();
        assert_eq!(err, BhError::InvalidEpsilon(-1.));
    }

    #[test]
    fn rejects_non_finite_position() {
        let err = compute_accelerations(1, &[f64::NAN, 0., 0.], &[1.], 1., 0., 0.5, [0., 0., 0.], 10.).unwrap_err();
        assert_eq!(err, BhError::NonFinite(0));
    }

    #[test]
    fn empty_input_returns_empty_output() {
        let out = compute_accelerations(0, &[], &[], 1., 0., 0.5, [0., 0., 0.], 10.).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn two_body_matches_expected_acceleration() {
        let positions = [0., 0., 0., 1., 0., 0.];
        let masses = [1., 1.];
        let out = compute_accelerations(2, &positions, &masses, 1., 0., 0.5, [0.5, 0., 0.], 8.).unwrap();

        assert!((out[0] - 1.0).abs() < 1e-9);
        assert!((out[3] - -1.0).abs() < 1e-9);
    }

    #[test]
    fn self_interaction_is_zero() {
        let out = compute_accelerations(1, &[3., -2., 7.], &[5.], 1., 0., 0.5, [3., -2., 7.], 8.).unwrap();
        assert_eq!(out, vec![0., 0., 0.]);
    }

    #[test]
    fn brute_force_entry_point_matches_tree_for_two_bodies() {
        let positions = [0., 0., 0., 1., 0., 0.];
        let masses = [1., 1.];
        let bf = compute_accelerations_bf(2, &positions, &masses, 1., 0.).unwrap();
        let tree = compute_accelerations(2, &positions, &masses, 1., 0., 0.1, [0.5, 0., 0.], 8.).unwrap();

        for i in 0..6 {
            assert!((bf[i] - tree[i]).abs() < 1e-9);
        }
    }
}
