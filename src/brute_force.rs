//! The exact O(N²) pairwise kernel: used standalone as a baseline, and as
//! the base case when a parallel tree traversal's candidate list has
//! shrunk to `LEAF_SIZE` particles or fewer.

use lin_alg::f64::Vec3;

use crate::BodyModel;

/// Acceleration on every body in `bodies`, from every other body in
/// `bodies`, under a softened inverse-square law.
///
/// Self-interaction is excluded structurally (the inner loop starts at
/// `i + 1`); Newton's third law lets each pair update both accumulators in
/// one pass. For coincident positions (`d == 0`) the `eps` term in the
/// denominator keeps the result finite rather than producing `NaN`.
pub fn accelerations<T: BodyModel>(bodies: &[T], g: f64, eps: f64) -> Vec<Vec3> {
    let n = bodies.len();
    let mut accs = vec![Vec3::new_zero(); n];

    for i in 0..n {
        let pi = bodies[i].posit();
        let mi = bodies[i].mass();
        let k2 = mi * g;
        for j in (i + 1)..n {
            let pj = bodies[j].posit();
            let mj = bodies[j].mass();
            let k1 = mj * g;

            let diff = pj - pi;
            let d2 = diff.magnitude_squared();
            let d = d2.sqrt();
            let f = 1.0 / (d2 * d + eps);

            accs[i] += diff * (f * k1);
            accs[j] -= diff * (f * k2);
        }
    }

    accs
}

/// Acceleration on `target` due to `source` alone. Returns zero if the two
/// refer to the same position (guards self-interaction when a leaf's
/// resident list is iterated against itself).
pub fn accel_from_one(target: Vec3, source: Vec3, source_mass: f64, g: f64, eps: f64) -> Vec3 {
    let diff = source - target;
    let d2 = diff.magnitude_squared();
    if d2 == 0.0 {
        return Vec3::new_zero();
    }
    let d = d2.sqrt();
    let f = 1.0 / (d2 * d + eps);
    diff * (f * source_mass * g)
}
