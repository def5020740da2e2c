//! The octree itself: a single growable arena of [`Node`]s, built either
//! serially or with a particle-partitioned parallel build.

use std::array;

use lin_alg::f64::Vec3;
use rayon::prelude::*;

use crate::{
    node::{Cube, Node, NodeState},
    BhConfig, BodyModel,
};

#[derive(Debug)]
/// Order matters; nodes are indexed by the `usize`s stored in
/// [`NodeState::Internal`].
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// An empty tree: a single leaf root covering `root`.
    pub fn new(root: Cube) -> Self {
        Self {
            nodes: vec![Node::new_leaf(0, root)],
        }
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Total number of nodes in the arena.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf nodes, found by a single walk of the arena. Kept as
    /// a walk rather than a counter maintained during build, since a
    /// shared mutable counter would need synchronization during the
    /// parallel build for no real benefit (this isn't called per-insert).
    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Serial build: insert every particle into the root, in input order.
    pub fn build<T: BodyModel>(bodies: &[T], root: Cube, config: &BhConfig) -> Self {
        let mut tree = Self::new(root);
        for i in 0..bodies.len() {
            tree.insert(0, i, bodies, config, 0);
        }
        tree
    }

    /// Particle-partitioned parallel build: classify every particle
    /// by its root-child octant, bucket those octants across up to 8
    /// thread bins, build one independent subtree per bin in parallel,
    /// then merge the subtrees under the root and reduce their (mass,
    /// center-of-mass) into the root's.
    ///
    /// Falls back to the serial build when there aren't enough particles
    /// to make partitioning worthwhile.
    pub fn build_parallel<T: BodyModel + Sync>(bodies: &[T], root: Cube, config: &BhConfig) -> Self {
        let n = bodies.len();
        if n <= config.leaf_size {
            return Self::build(bodies, root, config);
        }

        let mut worklists: [Vec<usize>; 8] = array::from_fn(|_| Vec::new());
        for i in 0..n {
            let cid = root.child_index(bodies[i].posit());
            worklists[cid].push(i);
        }

        let thread_count = rayon::current_num_threads().clamp(1, 8);

        let mut bins: Vec<Vec<usize>> = vec![Vec::new(); thread_count];
        for cid in 0..8 {
            if !worklists[cid].is_empty() {
                bins[cid % thread_count].push(cid);
            }
        }

        // Each bin is built by one parallel task; a bin may own more than
        // one octant when thread_count < 8, but every octant still gets
        // its own independent local arena -- no two tasks ever write into
        // the same Vec<Node>.
        let built: Vec<Vec<(usize, Tree)>> = bins
            .into_par_iter()
            .map(|octants| {
                octants
                    .into_iter()
                    .map(|cid| {
                        let cube = root.make_child(cid);
                        let sub = Self::build_subset(bodies, cube, config, &worklists[cid]);
                        (cid, sub)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut tree = Self::new(root);
        tree.nodes[0].state = NodeState::Internal([None; 8]);

        let mut root_mass = 0.;
        let mut root_com = Vec3::new_zero();

        for group in built {
            for (cid, sub) in group {
                let sub_mass = sub.nodes[0].mass;
                let sub_com = sub.nodes[0].center_of_mass;
                let new_idx = tree.append_subtree(sub);
                if let NodeState::Internal(children) = &mut tree.nodes[0].state {
                    children[cid] = Some(new_idx);
                }
                root_mass += sub_mass;
                root_com += sub_com * sub_mass;
            }
        }
        if root_mass > 0. {
            root_com /= root_mass;
        }
        tree.nodes[0].mass = root_mass;
        tree.nodes[0].center_of_mass = root_com;

        tree
    }

    fn build_subset<T: BodyModel>(bodies: &[T], root: Cube, config: &BhConfig, ids: &[usize]) -> Tree {
        let mut tree = Self::new(root);
        for &id in ids {
            tree.insert(0, id, bodies, config, 0);
        }
        tree
    }

    /// Append another tree's nodes into this one's arena, remapping every
    /// `id` and internal child index by the offset at which they land.
    /// Returns the new index of `sub`'s former root.
    fn append_subtree(&mut self, mut sub: Tree) -> usize {
        let offset = self.nodes.len();
        for node in &mut sub.nodes {
            node.id += offset;
            if let NodeState::Internal(children) = &mut node.state {
                for c in children.iter_mut() {
                    if let Some(idx) = c {
                        *idx += offset;
                    }
                }
            }
        }
        self.nodes.append(&mut sub.nodes);
        offset
    }

    /// Insert particle `body_id` (an index into `bodies`) into the subtree
    /// rooted at `node_id`, per the leaf/overflow/internal state machine:
    ///
    /// - a leaf under capacity appends the particle and folds its mass and
    ///   position into the node's aggregate with the same (k1, k2)
    ///   weighted update an internal node uses, so a leaf's `center_of_mass`
    ///   is always the mass-weighted centroid of its current residents, not
    ///   just its mass;
    /// - a leaf at capacity redistributes its residents into children, then
    ///   falls through to the internal case for the particle that triggered
    ///   the split;
    /// - an internal node folds the new mass/position into its aggregate
    ///   with the (k1, k2) weighted update, then recurses into the
    ///   particle's child octant, allocating it if absent.
    ///
    /// `max_depth` is a safety valve against runaway recursion on
    /// coincident or near-coincident positions: past it, a node simply
    /// keeps accepting residents without ever splitting again.
    fn insert<T: BodyModel>(&mut self, node_id: usize, body_id: usize, bodies: &[T], config: &BhConfig, depth: usize) {
        let p = bodies[body_id].posit();
        let m = bodies[body_id].mass();

        let at_depth_cap = depth >= config.max_depth;

        let needs_split = !at_depth_cap
            && matches!(&self.nodes[node_id].state, NodeState::Leaf(ids) if ids.len() >= config.leaf_size);

        if needs_split {
            self.split_leaf(node_id, bodies, config, depth);
        }

        self.fold_mass(node_id, m, p);

        match &self.nodes[node_id].state {
            NodeState::Leaf(_) => {
                if let NodeState::Leaf(ids) = &mut self.nodes[node_id].state {
                    ids.push(body_id);
                }
            }
            NodeState::Internal(_) => {
                let cid = self.nodes[node_id].bounding_box.child_index(p);
                let child_id = self.child_or_create(node_id, cid);
                self.insert(child_id, body_id, bodies, config, depth + 1);
            }
        }
    }

    /// Redistribute a full leaf's residents into freshly-created children
    /// and flip the node to `Internal`. The node's `mass`/`center_of_mass`
    /// are already correct going in -- `insert`'s leaf branch keeps them
    /// folded in incrementally -- so redistribution only needs to move the
    /// residents themselves, not recompute the aggregate.
    fn split_leaf<T: BodyModel>(&mut self, node_id: usize, bodies: &[T], config: &BhConfig, depth: usize) {
        let resident_ids = match &mut self.nodes[node_id].state {
            NodeState::Leaf(ids) => std::mem::take(ids),
            NodeState::Internal(_) => return,
        };

        self.nodes[node_id].state = NodeState::Internal([None; 8]);

        for &rid in &resident_ids {
            let rp = bodies[rid].posit();
            let cid = self.nodes[node_id].bounding_box.child_index(rp);
            let child_id = self.child_or_create(node_id, cid);
            self.insert(child_id, rid, bodies, config, depth + 1);
        }
    }

    /// Incremental mass-weighted center-of-mass update: fold a new point
    /// mass `(m, p)` into `node_id`'s aggregate.
    fn fold_mass(&mut self, node_id: usize, m: f64, p: Vec3) {
        let node = &mut self.nodes[node_id];
        let new_mass = node.mass + m;
        if new_mass > 0. {
            let k1 = m / new_mass;
            let k2 = node.mass / new_mass;
            node.center_of_mass = node.center_of_mass * k2 + p * k1;
        }
        node.mass = new_mass;
    }

    /// The child index `cid` of `node_id`, creating it (as an empty leaf)
    /// if it doesn't exist yet.
    fn child_or_create(&mut self, node_id: usize, cid: usize) -> usize {
        let existing = match &self.nodes[node_id].state {
            NodeState::Internal(children) => children[cid],
            NodeState::Leaf(_) => None,
        };
        if let Some(id) = existing {
            return id;
        }

        let child_cube = self.nodes[node_id].bounding_box.make_child(cid);
        let new_id = self.nodes.len();
        self.nodes.push(Node::new_leaf(new_id, child_cube));
        if let NodeState::Internal(children) = &mut self.nodes[node_id].state {
            children[cid] = Some(new_id);
        }
        new_id
    }
}
