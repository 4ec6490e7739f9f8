//! Rebuilding trainer state from a checkpointed tree.
//!
//! An interrupted run serializes its partial tree with unfinished nodes
//! still carrying the sentinel. Resuming walks the saved tree in the same
//! breadth-first order training used, re-deriving every node's pixel set by
//! partitioning from a regenerated root sample. Leaves encountered during
//! the walk re-enter the in-memory leaf table in their original order, so
//! the one-based indices stored in finished nodes stay valid.

use std::collections::VecDeque;

use crate::error::DataError;
use crate::tree::{left_child, node_count, right_child, Node, RdTree};

use super::context::{NodeTrainData, TrainContext};
use super::partition::collect_pixels;

/// Trainer state reconstructed from a checkpoint.
#[derive(Debug)]
pub(crate) struct Restored {
    pub frontier: VecDeque<NodeTrainData>,
    pub nodes: Vec<Node>,
    pub leaf_prs: Vec<f32>,
}

/// Validate a checkpoint against the training context and rebuild the
/// frontier queue, node array, and leaf table.
pub(crate) fn restore(ctx: &TrainContext, checkpoint: &RdTree) -> Result<Restored, DataError> {
    if checkpoint.n_labels != ctx.n_labels {
        return Err(DataError::LabelCountMismatch {
            checkpoint: checkpoint.n_labels,
            expected: ctx.n_labels,
        });
    }
    if (checkpoint.fov - ctx.fov).abs() > 1e-6 {
        return Err(DataError::FovMismatch {
            checkpoint: checkpoint.fov,
            expected: ctx.fov,
        });
    }
    if checkpoint.depth > ctx.max_depth {
        return Err(DataError::DepthBelowCheckpoint {
            requested: ctx.max_depth,
            checkpoint: checkpoint.depth,
        });
    }

    let deepening = ctx.max_depth > checkpoint.depth;

    // Saved nodes land over an all-sentinel array so a deeper request
    // leaves the extension slots unfinished, exactly as a fresh run would.
    let mut nodes = vec![Node::unfinished(); node_count(ctx.max_depth)];
    nodes[..checkpoint.nodes.len()].copy_from_slice(&checkpoint.nodes);

    let mut frontier = VecDeque::new();
    let mut leaf_prs = Vec::new();

    // The walk queue mirrors the original training order: breadth-first,
    // left child before right. The root's pixels come from the same seeded
    // stream a fresh run draws from.
    let mut walk = VecDeque::from([NodeTrainData {
        id: 0,
        depth: 0,
        pixels: ctx.sample_root_pixels(),
    }]);

    while let Some(data) = walk.pop_front() {
        let node = nodes[data.id as usize];

        // Unfinished nodes resume training, as does the entire final depth
        // of the saved tree when a deeper tree is now requested.
        let retrain = node.is_unfinished()
            || (data.depth == checkpoint.depth as u32 - 1 && deepening);

        if retrain {
            frontier.push_back(data);
            continue;
        }

        if node.is_leaf() {
            // Leaves re-enter the table in walk order, which matches the
            // order training created them in, keeping stored indices
            // stable.
            leaf_prs.extend_from_slice(checkpoint.leaf_distribution(node.label_pr_idx));
            continue;
        }

        // Interior node: partition the pixels and keep walking.
        let (l_pixels, r_pixels) = collect_pixels(ctx, &data.pixels, node.uv, node.t, [0, 0]);
        walk.push_back(NodeTrainData {
            id: left_child(data.id),
            depth: data.depth + 1,
            pixels: l_pixels,
        });
        walk.push_back(NodeTrainData {
            id: right_child(data.id),
            depth: data.depth + 1,
            pixels: r_pixels,
        });
    }

    if frontier.is_empty() {
        return Err(DataError::AlreadyComplete);
    }

    Ok(Restored {
        frontier,
        nodes,
        leaf_prs,
    })
}
