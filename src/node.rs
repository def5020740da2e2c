//! The cubical cell (`Cube`) and the tree node (`Node`) it backs.
//!
//! Nodes are arena-indexed: a `Node` never owns its children directly,
//! it holds `usize` indices into `Tree::nodes`. This removes any need for
//! `Rc`/`RefCell` or unsafe self-referential structures, and makes the
//! finished tree trivially `Sync` for read-only parallel traversal.

use std::{fmt, fmt::Formatter};

#[cfg(feature = "encode")]
use bincode::{Decode, Encode};
use lin_alg::f64::Vec3;

/// Sign pattern for each of the 8 child octants, ordered to match the
/// `(x ≥ cx) << 2 | (y ≥ cy) << 1 | (z ≥ cz)` child-index convention.
pub(crate) const CHILD_SIGNS: [[f64; 3]; 8] = [
    [-1., -1., -1.],
    [-1., -1., 1.],
    [-1., 1., -1.],
    [-1., 1., 1.],
    [1., -1., -1.],
    [1., -1., 1.],
    [1., 1., -1.],
    [1., 1., 1.],
];

#[derive(Clone, Debug)]
#[cfg_attr(feature = "encode", derive(Encode, Decode))]
/// A cubical bounding box: length == width == depth.
pub struct Cube {
    pub center: Vec3,
    pub width: f64,
}

impl Cube {
    pub fn new(center: Vec3, width: f64) -> Self {
        Self { center, width }
    }

    /// Construct minimum limits that encompass all bodies, padded by `pad`
    /// on each axis and coerced to a cube. Convenience for callers that
    /// don't already track a root cube of their own; the builder itself
    /// never calls this — the root is always supplied by the caller.
    pub fn from_bodies<T: crate::BodyModel>(bodies: &[T], pad: f64) -> Option<Self> {
        if bodies.is_empty() {
            return None;
        }

        let mut x_min = f64::MAX;
        let mut x_max = f64::MIN;
        let mut y_min = f64::MAX;
        let mut y_max = f64::MIN;
        let mut z_min = f64::MAX;
        let mut z_max = f64::MIN;

        for body in bodies {
            let p = body.posit();
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
            z_min = z_min.min(p.z);
            z_max = z_max.max(p.z);
        }

        x_min -= pad;
        x_max += pad;
        y_min -= pad;
        y_max += pad;
        z_min -= pad;
        z_max += pad;

        let width = (x_max - x_min).max(y_max - y_min).max(z_max - z_min);
        let center = Vec3::new(
            (x_max + x_min) / 2.,
            (y_max + y_min) / 2.,
            (z_max + z_min) / 2.,
        );

        Some(Self::new(center, width))
    }

    /// Child index for a point `p`, per the `≥` boundary convention: a
    /// point exactly on a dividing plane belongs to the "upper" child on
    /// that axis.
    #[inline]
    pub(crate) fn child_index(&self, p: Vec3) -> usize {
        let mut idx = 0;
        if p.x >= self.center.x {
            idx |= 0b100;
        }
        if p.y >= self.center.y {
            idx |= 0b010;
        }
        if p.z >= self.center.z {
            idx |= 0b001;
        }
        idx
    }

    /// The cube for child octant `i`: half this cube's width, center offset
    /// by a quarter-width on each axis per `CHILD_SIGNS[i]`.
    pub(crate) fn make_child(&self, i: usize) -> Self {
        let q = self.width / 4.;
        let s = CHILD_SIGNS[i];
        let center = Vec3::new(
            self.center.x + q * s[0],
            self.center.y + q * s[1],
            self.center.z + q * s[2],
        );
        Self::new(center, self.width / 2.)
    }

    /// Whether `p` lies within this cube, using the same `≥` convention as
    /// `child_index` for the lower bound, and `<` for the upper bound.
    pub fn contains(&self, p: Vec3) -> bool {
        let h = self.width / 2.;
        p.x >= self.center.x - h
            && p.x < self.center.x + h
            && p.y >= self.center.y - h
            && p.y < self.center.y + h
            && p.z >= self.center.z - h
            && p.z < self.center.z + h
    }
}

/// A node's state: a leaf holds up to `LEAF_SIZE` resident particle
/// indices directly; an internal node holds up to 8 child slots and no
/// residents. The two are mutually exclusive by construction, which this
/// tagged representation makes explicit instead of relying on a sentinel
/// occupancy counter.
#[derive(Debug)]
pub(crate) enum NodeState {
    Leaf(Vec<usize>),
    Internal([Option<usize>; 8]),
}

#[derive(Debug)]
/// A single octree cell. `id` doubles as this node's index into
/// `Tree::nodes` once the tree is built.
pub struct Node {
    pub id: usize,
    pub bounding_box: Cube,
    /// Aggregate mass of every particle in this node's subtree.
    pub mass: f64,
    /// Mass-weighted center of mass of this node's subtree.
    pub center_of_mass: Vec3,
    pub(crate) state: NodeState,
}

impl Node {
    pub(crate) fn new_leaf(id: usize, bounding_box: Cube) -> Self {
        Self {
            id,
            bounding_box,
            mass: 0.,
            center_of_mass: Vec3::new_zero(),
            state: NodeState::Leaf(Vec::new()),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.state, NodeState::Leaf(_))
    }

    /// Present child node indices, in fixed octant order (0..8). Empty for
    /// a leaf.
    pub fn children(&self) -> impl Iterator<Item = usize> + '_ {
        let children: &[Option<usize>] = match &self.state {
            NodeState::Internal(c) => c.as_slice(),
            NodeState::Leaf(_) => &[],
        };
        children.iter().filter_map(|c| *c)
    }

    /// Resident particle indices, empty for an internal node.
    pub fn residents(&self) -> &[usize] {
        match &self.state {
            NodeState::Leaf(ids) => ids,
            NodeState::Internal(_) => &[],
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node {{ id: {}, width: {:.3}, leaf: {} }}",
            self.id,
            self.bounding_box.width,
            self.is_leaf()
        )
    }
}
