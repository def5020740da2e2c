//! Force evaluation: per-particle descent and the batched, candidate-list
//! descent that amortizes node visits across many targets at once, plus
//! the two parallel strategies built on top of them.

use lin_alg::f64::Vec3;
use rayon::prelude::*;

use crate::{
    brute_force::accel_from_one,
    force::{dir_and_d2, force_coeff},
    node::NodeState,
    tree::Tree,
    BhConfig, BodyModel,
};

impl Tree {
    /// Acceleration on a single target due to every body in this tree,
    /// found by descending from the root and applying the
    /// multipole-acceptance criterion at each internal node.
    ///
    /// Leaves are evaluated pairwise against their actual residents (via
    /// `accel_from_one`, which already guards `d == 0` per pair), so
    /// self-interaction and any other coincident-position pair contributes
    /// nothing without having to compare the target against the leaf's
    /// aggregate center of mass. For an internal node, a target that
    /// coincides with the node's center of mass (`d == 0`) contributes
    /// nothing from that node -- a numerical guard against the MAC test's
    /// division by `d`.
    pub fn accel_on_target<T: BodyModel>(&self, bodies: &[T], target: Vec3, g: f64, eps: f64, config: &BhConfig) -> Vec3 {
        descend_single(self, 0, bodies, target, g, eps, config)
    }

    /// Batched descent over every body in `bodies`, evaluated against
    /// itself (the common N-body case: sources and targets are the same
    /// particle set).
    pub fn accelerations_batched<T: BodyModel>(&self, bodies: &[T], g: f64, eps: f64, config: &BhConfig) -> Vec<Vec3> {
        let n = bodies.len();
        let mut accs = vec![Vec3::new_zero(); n];
        let candidates: Vec<usize> = (0..n).collect();
        descend_batch(self, 0, bodies, &candidates, 0, &mut accs, g, eps, config);
        accs
    }

    /// Target-partitioned parallel traversal (the default): split the N
    /// targets into contiguous chunks, one per worker, each running the
    /// batched descent from the root over its own chunk. Every target
    /// owns its own output slot, so chunks never alias each other's
    /// writes.
    pub fn accelerations_parallel<T: BodyModel + Sync>(&self, bodies: &[T], g: f64, eps: f64, config: &BhConfig) -> Vec<Vec3> {
        let n = bodies.len();
        let mut accs = vec![Vec3::new_zero(); n];
        if n == 0 {
            return accs;
        }

        let thread_count = rayon::current_num_threads().max(1);
        let chunk_size = n.div_ceil(thread_count).max(1);

        accs.par_chunks_mut(chunk_size).enumerate().for_each(|(chunk_idx, chunk)| {
            let start = chunk_idx * chunk_size;
            let candidates: Vec<usize> = (start..start + chunk.len()).collect();
            descend_batch(self, 0, bodies, &candidates, start, chunk, g, eps, config);
        });

        accs
    }

    /// Particle-slice dispatch: split the input array into contiguous
    /// slices, one per worker, each running the serial per-target descent
    /// over its own slice. Slower than the batched strategy in practice
    /// (no node-visit sharing across targets), but useful when targets
    /// need per-particle early-outs the batched form can't express.
    pub fn accelerations_parallel_by_slice<T: BodyModel + Sync>(
        &self,
        bodies: &[T],
        g: f64,
        eps: f64,
        config: &BhConfig,
    ) -> Vec<Vec3> {
        let n = bodies.len();
        let mut accs = vec![Vec3::new_zero(); n];
        if n == 0 {
            return accs;
        }

        let thread_count = rayon::current_num_threads().max(1);
        let chunk_size = n.div_ceil(thread_count).max(1);

        accs.par_chunks_mut(chunk_size).enumerate().for_each(|(chunk_idx, chunk)| {
            let start = chunk_idx * chunk_size;
            for (local_i, acc) in chunk.iter_mut().enumerate() {
                let tid = start + local_i;
                *acc = descend_single(self, 0, bodies, bodies[tid].posit(), g, eps, config);
            }
        });

        accs
    }
}

fn descend_single<T: BodyModel>(tree: &Tree, node_id: usize, bodies: &[T], target: Vec3, g: f64, eps: f64, config: &BhConfig) -> Vec3 {
    let node = &tree.nodes[node_id];

    if node.is_leaf() {
        let mut acc = Vec3::new_zero();
        for &rid in node.residents() {
            acc += accel_from_one(target, bodies[rid].posit(), bodies[rid].mass(), g, eps);
        }
        return acc;
    }

    let (diff, d2) = dir_and_d2(target, node.center_of_mass);
    if d2 == 0. {
        return Vec3::new_zero();
    }

    let w = node.bounding_box.width;
    if w * w < config.θ * config.θ * d2 {
        let f = force_coeff(g, node.mass, d2, eps);
        return diff * f;
    }

    let mut acc = Vec3::new_zero();
    for child_id in node.children() {
        acc += descend_single(tree, child_id, bodies, target, g, eps, config);
    }
    acc
}

/// Descend carrying a list of candidate target indices (global indices
/// into `bodies`; `offset` is subtracted to translate into `accs`, which
/// may be a sub-slice of the full output array).
///
/// At an internal node the candidate list is partitioned in place: MAC-
/// satisfied targets accumulate directly from `(node.mass,
/// node.center_of_mass)`, and MAC-failing targets are passed down to every
/// present child. At a leaf, every surviving candidate accumulates a
/// direct pairwise contribution from every resident.
fn descend_batch<T: BodyModel>(
    tree: &Tree,
    node_id: usize,
    bodies: &[T],
    candidates: &[usize],
    offset: usize,
    accs: &mut [Vec3],
    g: f64,
    eps: f64,
    config: &BhConfig,
) {
    if candidates.is_empty() {
        return;
    }

    let node = &tree.nodes[node_id];

    if node.is_leaf() {
        for &tid in candidates {
            let target = bodies[tid].posit();
            let mut acc = Vec3::new_zero();
            for &rid in node.residents() {
                acc += accel_from_one(target, bodies[rid].posit(), bodies[rid].mass(), g, eps);
            }
            accs[tid - offset] += acc;
        }
        return;
    }

    let theta2 = config.θ * config.θ;
    let w2 = node.bounding_box.width * node.bounding_box.width;
    let mut remaining = Vec::with_capacity(candidates.len());

    for &tid in candidates {
        let target = bodies[tid].posit();
        let (diff, d2) = dir_and_d2(target, node.center_of_mass);
        if d2 == 0. {
            continue;
        }
        if w2 < theta2 * d2 {
            let f = force_coeff(g, node.mass, d2, eps);
            accs[tid - offset] += diff * f;
        } else {
            remaining.push(tid);
        }
    }

    for child_id in node.children() {
        descend_batch(tree, child_id, bodies, &remaining, offset, accs, g, eps, config);
    }
}
