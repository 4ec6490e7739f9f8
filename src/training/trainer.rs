//! Breadth-first tree training coordinator.
//!
//! [`TreeTrainer`] drives a FIFO frontier of nodes. For each node it
//! publishes the node to the worker pool, waits for the gain search to
//! finish, reduces the per-worker bests to a single winning
//! `(offset, threshold)` candidate, and either splits the node (partitioning
//! its pixels into two new frontier entries) or freezes it into a leaf with
//! the node's normalized label distribution.
//!
//! Interruption never loses work: the loop finishes the node in flight,
//! stops, and returns the partially built tree with unfinished nodes still
//! carrying their sentinel so a later run can resume from the checkpoint.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread;

use crate::data::TrainData;
use crate::error::{DataError, Error};
use crate::tree::{left_child, node_count, right_child, Node, RdTree};

use super::checkpoint;
use super::context::{NodeTrainData, TrainContext, TrainOptions};
use super::histogram::normalize_histogram;
use super::logger::{TrainingLogger, Verbosity};
use super::partition::collect_pixels;
use super::worker::{GainSearchWorker, Rendezvous};
use super::CancelToken;

/// The result of a training run.
#[derive(Debug)]
pub struct TrainOutcome {
    /// The trained tree; partially built (sentinel nodes present) when the
    /// run was interrupted.
    pub tree: RdTree,
    /// Whether the run stopped on a cancellation request.
    pub interrupted: bool,
}

/// Coordinator for training one randomized decision tree.
pub struct TreeTrainer {
    ctx: TrainContext,
    n_threads: usize,
    check_degenerate_right: bool,
    logger: TrainingLogger,
}

impl TreeTrainer {
    /// Build the trainer: take ownership of the corpus and generate the
    /// candidate tables.
    ///
    /// # Panics
    ///
    /// Panics on structurally impossible parameters (zero labels or
    /// images, an empty candidate table, a depth outside `1..=30`).
    pub fn new(data: TrainData, opts: TrainOptions) -> Self {
        assert!(data.n_labels >= 1, "corpus declares no labels");
        assert!(data.n_images >= 1, "corpus holds no images");
        assert!(opts.n_uv >= 1, "need at least one uv candidate");
        assert!(opts.n_thresholds >= 1, "need at least one threshold");
        assert!(
            (1..=30).contains(&opts.max_depth),
            "max_depth must be in 1..=30"
        );

        let n_threads = if opts.n_threads > 0 {
            opts.n_threads
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        };

        let logger = TrainingLogger::new(opts.verbosity);
        let check_degenerate_right = opts.check_degenerate_right;
        Self {
            ctx: TrainContext::new(data, &opts),
            n_threads,
            check_degenerate_right,
            logger,
        }
    }

    /// The shared read-only training context.
    pub fn context(&self) -> &TrainContext {
        &self.ctx
    }

    /// Train a tree from scratch.
    pub fn train(&mut self, cancel: &CancelToken) -> Result<TrainOutcome, Error> {
        let root = NodeTrainData {
            id: 0,
            depth: 0,
            pixels: self.ctx.sample_root_pixels(),
        };
        let frontier = VecDeque::from([root]);
        let nodes = vec![Node::unfinished(); node_count(self.ctx.max_depth)];
        self.run(frontier, nodes, Vec::new(), cancel)
    }

    /// Resume training from a checkpointed tree.
    ///
    /// The checkpoint must match the corpus (`n_labels`, `fov`) and must
    /// not be deeper than the requested depth. Returns
    /// [`DataError::AlreadyComplete`] if nothing is left to train.
    pub fn resume(&mut self, checkpoint: &RdTree, cancel: &CancelToken) -> Result<TrainOutcome, Error> {
        let restored = checkpoint::restore(&self.ctx, checkpoint)?;
        self.run(restored.frontier, restored.nodes, restored.leaf_prs, cancel)
    }

    fn run(
        &mut self,
        mut frontier: VecDeque<NodeTrainData>,
        mut nodes: Vec<Node>,
        mut leaf_prs: Vec<f32>,
        cancel: &CancelToken,
    ) -> Result<TrainOutcome, Error> {
        let ctx = &self.ctx;
        let logger = &mut self.logger;
        let n_threads = self.n_threads;
        let n_labels = ctx.n_labels as usize;
        let check_degenerate_right = self.check_degenerate_right;

        let shared = Rendezvous::new(n_threads, n_labels);
        let mut interrupted = false;

        logger.info(&format!("Initialising {n_threads} threads..."));

        thread::scope(|scope| -> Result<(), Error> {
            // Workers hold at a start gate until every spawn has succeeded,
            // so a failed spawn can still unwind without anyone parked at a
            // barrier that will never trip.
            let mut starters = Vec::with_capacity(n_threads);
            for i in 0..n_threads {
                let (tx, rx) = mpsc::channel::<()>();
                let worker = GainSearchWorker::new(
                    ctx,
                    &shared,
                    cancel,
                    i,
                    n_threads,
                    check_degenerate_right,
                );
                let spawn = thread::Builder::new()
                    .name(format!("gain-worker-{i}"))
                    .spawn_scoped(scope, move || {
                        if rx.recv().is_ok() {
                            worker.run();
                        }
                    });
                match spawn {
                    Ok(_) => starters.push(tx),
                    Err(e) => {
                        // Dropping the starters makes the spawned workers
                        // return before their first barrier wait.
                        return Err(Error::Resource(format!("error creating thread: {e}")));
                    }
                }
            }
            for tx in &starters {
                let _ = tx.send(());
            }

            logger.info("Beginning training...");

            let mut data_error: Option<DataError> = None;
            let mut last_depth = u32::MAX;

            'nodes: while let Some(node) = frontier.pop_front() {
                if node.depth != last_depth {
                    last_depth = node.depth;
                    logger.progress(&format!(
                        "Training depth {} ({} nodes)",
                        node.depth + 1,
                        frontier.len() + 1,
                    ));
                }

                // Publish, release the workers, wait for the gain search.
                shared.publish(Some(&node));
                shared.ready.wait();
                shared.finished.wait();

                if cancel.is_cancelled() {
                    interrupted = true;
                    break;
                }

                // Reduce the per-worker bests: strictly greater gain wins,
                // ascending worker index, so ties go to the earliest worker.
                let mut best_gain = 0.0f32;
                let mut best_uv = 0u32;
                let mut best_t = 0u32;
                let mut n_lr = [0u32; 2];
                for i in 0..n_threads {
                    // SAFETY: the coordinator reads slots only between
                    // `finished` and the next `ready`.
                    let slot = unsafe { shared.slot(i) };
                    if let Some(err) = &slot.error {
                        data_error = Some(err.clone());
                        break 'nodes;
                    }
                    if slot.gain > best_gain {
                        best_gain = slot.gain;
                        best_uv = slot.uv;
                        best_t = slot.t;
                        n_lr = slot.n_lr;
                    }
                }

                let id = node.id as usize;
                if best_gain > 0.0 && node.depth + 1 < ctx.max_depth as u32 {
                    let uv = ctx.uvs[best_uv as usize];
                    let t = ctx.ts[best_t as usize];
                    nodes[id] = Node {
                        uv,
                        t,
                        label_pr_idx: 0,
                    };

                    if logger.verbosity() >= Verbosity::Debug {
                        logger.debug(&format!(
                            "  Node ({})\n    Gain: {}\n    U: ({}, {})\n    V: ({}, {})\n    T: {}",
                            node.id, best_gain, uv.0[0], uv.0[1], uv.0[2], uv.0[3], t,
                        ));
                    }

                    let (l_pixels, r_pixels) = collect_pixels(ctx, &node.pixels, uv, t, n_lr);
                    debug_assert_eq!(l_pixels.len() as u32, n_lr[0]);
                    debug_assert_eq!(r_pixels.len() as u32, n_lr[1]);

                    frontier.push_back(NodeTrainData {
                        id: left_child(node.id),
                        depth: node.depth + 1,
                        pixels: l_pixels,
                    });
                    frontier.push_back(NodeTrainData {
                        id: right_child(node.id),
                        depth: node.depth + 1,
                        pixels: r_pixels,
                    });
                } else {
                    // Leaf: normalize the published root counts. Every
                    // worker accumulates the same root histogram, so worker
                    // 0's copy is authoritative even when its stripe is
                    // empty.
                    //
                    // SAFETY: coordinator read between the barriers.
                    let slot = unsafe { shared.slot(0) };
                    let mut distribution = vec![0f32; n_labels];
                    normalize_histogram(&slot.root_histogram, &mut distribution);

                    if logger.verbosity() >= Verbosity::Debug {
                        let mut lines = format!("  Leaf node ({})", node.id);
                        for (label, &p) in distribution.iter().enumerate() {
                            if p > 0.0 {
                                lines.push_str(&format!("\n    {label:02} - {p}"));
                            }
                        }
                        logger.debug(&lines);
                    }

                    leaf_prs.extend_from_slice(&distribution);
                    nodes[id].label_pr_idx = (leaf_prs.len() / n_labels) as u32;
                }

                // The node's pixel buffer is dropped here, as soon as the
                // children own their partitions.
            }

            // Shutdown: a null node wakes the workers one last time so
            // they observe the sentinel and exit.
            shared.publish(None);
            shared.ready.wait();

            if let Some(err) = data_error {
                return Err(err.into());
            }
            Ok(())
        })?;

        Ok(TrainOutcome {
            tree: RdTree {
                depth: self.ctx.max_depth,
                n_labels: self.ctx.n_labels,
                fov: self.ctx.fov,
                nodes,
                label_prs: leaf_prs,
            },
            interrupted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{constant_label_scene, two_class_scene};
    use crate::training::Verbosity;

    fn quick_options(max_depth: u8) -> TrainOptions {
        TrainOptions::builder()
            .n_pixels(16u32)
            .n_uv(16u32)
            .n_thresholds(4u32)
            .uv_range(8.0f32)
            .t_range(1.0f32)
            .max_depth(max_depth)
            .n_threads(2usize)
            .verbosity(Verbosity::Silent)
            .build()
            .unwrap()
    }

    #[test]
    fn single_label_scene_trains_to_a_root_leaf() {
        let mut trainer = TreeTrainer::new(constant_label_scene(2, 8, 8, 3), quick_options(3));
        let outcome = trainer.train(&CancelToken::new()).unwrap();
        assert!(!outcome.interrupted);

        let tree = outcome.tree;
        let root = &tree.nodes[0];
        assert!(root.is_leaf());
        assert_eq!(tree.leaf_distribution(root.label_pr_idx), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn leaf_distributions_are_probability_measures() {
        let mut trainer = TreeTrainer::new(two_class_scene(4, 8, 8), quick_options(4));
        let tree = trainer.train(&CancelToken::new()).unwrap().tree;

        assert!(tree.n_leaves() > 0);
        for idx in 1..=tree.n_leaves() as u32 {
            let distribution = tree.leaf_distribution(idx);
            let sum: f32 = distribution.iter().sum();
            assert!(distribution.iter().all(|&p| p >= 0.0));
            assert!(sum == 0.0 || (sum - 1.0).abs() < 1e-5, "leaf {idx} sums to {sum}");
        }
    }

    #[test]
    fn trained_tree_is_complete() {
        let mut trainer = TreeTrainer::new(two_class_scene(4, 8, 8), quick_options(3));
        let tree = trainer.train(&CancelToken::new()).unwrap().tree;
        assert!(tree.is_complete());
    }

    #[test]
    fn training_is_deterministic_across_thread_counts() {
        let data = two_class_scene(4, 8, 8);

        let mut opts = quick_options(4);
        opts.n_threads = 1;
        let tree_single = TreeTrainer::new(data.clone(), opts)
            .train(&CancelToken::new())
            .unwrap()
            .tree;

        let mut opts = quick_options(4);
        opts.n_threads = 4;
        let tree_multi = TreeTrainer::new(data, opts)
            .train(&CancelToken::new())
            .unwrap()
            .tree;

        assert_eq!(tree_single, tree_multi);
    }

    #[test]
    fn invalid_label_aborts_training() {
        let mut data = two_class_scene(2, 8, 8);
        // Poison every pixel of the first image so the sampled root set is
        // guaranteed to hit one.
        data.label_images[..64].fill(200);

        let mut trainer = TreeTrainer::new(data, quick_options(3));
        let err = trainer.train(&CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Data(DataError::InvalidLabel { label: 200, .. })
        ));
    }

    #[test]
    fn pre_cancelled_run_checkpoints_immediately() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut trainer = TreeTrainer::new(two_class_scene(2, 8, 8), quick_options(3));
        let outcome = trainer.train(&cancel).unwrap();
        assert!(outcome.interrupted);
        assert!(outcome.tree.nodes[0].is_unfinished());
    }
}
