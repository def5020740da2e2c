//! Softened inverse-square force primitives shared by the brute-force kernel
//! and the tree traversal.

use lin_alg::f64::Vec3;

/// Componentwise `to - from`, plus the squared length of that difference.
///
/// Computing the square here lets callers apply the multipole-acceptance
/// test (`node.width² < θ²·d²`) without paying for a square root on the
/// common early-accept path.
#[inline]
pub fn dir_and_d2(from: Vec3, to: Vec3) -> (Vec3, f64) {
    let diff = to - from;
    let d2 = diff.magnitude_squared();
    (diff, d2)
}

/// `G · mass / (d² · d + ε)`, where `d = √d2`.
///
/// The softening `eps` is added to the cubed distance, not to `d2` before
/// the square root; this matches the original kernel's convention and
/// bounds the force at short range for `eps > 0`.
#[inline]
pub fn force_coeff(g: f64, mass: f64, d2: f64, eps: f64) -> f64 {
    let d = d2.sqrt();
    g * mass / (d2 * d + eps)
}
