//! Tree records and breadth-first index arithmetic.
//!
//! A randomized decision tree is stored as a flat array of [`Node`]s in
//! breadth-first order (root at index 0, children of `id` at `2*id + 1` and
//! `2*id + 2`) plus a flat table of leaf label distributions. A node's
//! `label_pr_idx` encodes its role: `0` for interior nodes, a one-based
//! index into the leaf table for leaves, and [`Node::UNFINISHED`] for nodes
//! a checkpointed run has not reached yet.

use serde::{Deserialize, Serialize};

/// The two feature offsets of a node, packed as `(ux, uy, vx, vy)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UvPair(pub [f32; 4]);

impl UvPair {
    /// The `u` offset `(ux, uy)`.
    #[inline]
    pub fn u(&self) -> [f32; 2] {
        [self.0[0], self.0[1]]
    }

    /// The `v` offset `(vx, vy)`.
    #[inline]
    pub fn v(&self) -> [f32; 2] {
        [self.0[2], self.0[3]]
    }
}

/// One tree node: the feature parameters and the leaf-table tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    /// Feature offsets tested at this node (zeroed for leaves).
    pub uv: UvPair,
    /// Threshold the feature value is compared against (zeroed for leaves).
    pub t: f32,
    /// `0` = interior, `UNFINISHED` = not trained yet, otherwise a one-based
    /// index into the leaf probability table.
    pub label_pr_idx: u32,
}

impl Node {
    /// Sentinel marking a node that training has not decided yet. Appears in
    /// checkpoints, and in slots unreachable from the root of finished trees.
    pub const UNFINISHED: u32 = u32::MAX;

    /// A fresh untrained node.
    pub fn unfinished() -> Self {
        Self {
            uv: UvPair::default(),
            t: 0.0,
            label_pr_idx: Self::UNFINISHED,
        }
    }

    #[inline]
    pub fn is_interior(&self) -> bool {
        self.label_pr_idx == 0
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.label_pr_idx != 0 && self.label_pr_idx != Self::UNFINISHED
    }

    #[inline]
    pub fn is_unfinished(&self) -> bool {
        self.label_pr_idx == Self::UNFINISHED
    }
}

/// Index of the left child of `id` in breadth-first order.
#[inline]
pub fn left_child(id: u32) -> u32 {
    2 * id + 1
}

/// Index of the right child of `id` in breadth-first order.
#[inline]
pub fn right_child(id: u32) -> u32 {
    2 * id + 2
}

/// Number of slots in a complete binary tree of the given depth.
#[inline]
pub fn node_count(depth: u8) -> usize {
    (1usize << depth) - 1
}

/// A trained (or partially trained) randomized decision tree.
///
/// `nodes` always holds `2^depth - 1` slots; `label_prs` is `n_leaves *
/// n_labels` floats, each row a probability distribution (or all zeros for a
/// leaf no pixel reached).
#[derive(Debug, Clone, PartialEq)]
pub struct RdTree {
    /// Maximum depth the tree was trained to.
    pub depth: u8,
    /// Number of label classes.
    pub n_labels: u8,
    /// Vertical field of view of the training camera, radians.
    pub fov: f32,
    /// Breadth-first node array, `2^depth - 1` entries.
    pub nodes: Vec<Node>,
    /// Flat leaf probability table, row per leaf.
    pub label_prs: Vec<f32>,
}

impl RdTree {
    /// Number of rows in the leaf probability table.
    pub fn n_leaves(&self) -> usize {
        if self.n_labels == 0 {
            0
        } else {
            self.label_prs.len() / self.n_labels as usize
        }
    }

    /// Leaf distribution for a one-based `label_pr_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is zero, the unfinished sentinel, or out of range.
    pub fn leaf_distribution(&self, idx: u32) -> &[f32] {
        assert!(idx != 0 && idx != Node::UNFINISHED, "not a leaf index: {idx}");
        let n = self.n_labels as usize;
        let start = (idx as usize - 1) * n;
        &self.label_prs[start..start + n]
    }

    /// True once no reachable node carries the unfinished sentinel.
    pub fn is_complete(&self) -> bool {
        let mut stack = vec![0u32];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.is_unfinished() {
                return false;
            }
            if node.is_interior() {
                stack.push(left_child(id));
                stack.push(right_child(id));
            }
        }
        true
    }
}
