//! Gain-search workers and the coordinator/worker rendezvous.
//!
//! Training runs one coordinator thread plus `N` workers. Each worker is
//! bound to a fixed stripe of the offset table and keeps its histogram
//! scratch alive for the lifetime of the thread. Per frontier node the
//! worker accumulates histograms over its stripe, scans every
//! `(offset, threshold)` candidate for the best information gain, and
//! publishes the result into its own slot.
//!
//! # Synchronization
//!
//! Exactly two barriers, both of party count `N + 1`:
//!
//! - `ready`: the coordinator publishes the current node (or null for
//!   shutdown) and arrives; all workers wake together.
//! - `finished`: workers arrive as they complete; the coordinator reads
//!   the slots only after it clears.
//!
//! There are no locks. The node pointer and the result slots are plain
//! memory whose accesses are ordered entirely by the two barriers: the
//! coordinator touches them only between `finished` and the next `ready`,
//! worker `i` touches only its own slot and only between `ready` and
//! `finished`. [`SlotCell`] encapsulates that invariant.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Barrier;

use std::cell::UnsafeCell;

use crate::error::DataError;

use super::context::{NodeTrainData, TrainContext};
use super::histogram::{accumulate_histograms, normalize_histogram, shannon_entropy, split_gain};
use super::CancelToken;

/// One worker's per-node output, read by the coordinator after `finished`.
#[derive(Debug)]
pub(crate) struct WorkerBest {
    /// Best information gain seen in the stripe (0 when no valid split).
    pub gain: f32,
    /// Offset-table index of the best candidate.
    pub uv: u32,
    /// Threshold-table index of the best candidate.
    pub t: u32,
    /// Left/right pixel counts of the best candidate.
    pub n_lr: [u32; 2],
    /// Root label counts over all of the node's pixels. Every worker
    /// accumulates the identical histogram; the coordinator normalizes
    /// these counts itself when emitting a leaf.
    pub root_histogram: Vec<u32>,
    /// Fatal data error found while accumulating, if any.
    pub error: Option<DataError>,
}

impl WorkerBest {
    fn new(n_labels: usize) -> Self {
        Self {
            gain: 0.0,
            uv: 0,
            t: 0,
            n_lr: [0, 0],
            root_histogram: vec![0; n_labels],
            error: None,
        }
    }
}

/// Result slot owned by one worker between the barriers.
struct SlotCell(UnsafeCell<WorkerBest>);

// SAFETY: slot i is written only by worker i between `ready` and
// `finished`, and read only by the coordinator between `finished` and the
// next `ready`. The barrier waits provide the happens-before edges.
unsafe impl Sync for SlotCell {}

/// Shared rendezvous state for one training run.
pub(crate) struct Rendezvous {
    pub ready: Barrier,
    pub finished: Barrier,
    current: AtomicPtr<NodeTrainData>,
    slots: Box<[SlotCell]>,
}

impl Rendezvous {
    pub fn new(n_threads: usize, n_labels: usize) -> Self {
        let slots = (0..n_threads)
            .map(|_| SlotCell(UnsafeCell::new(WorkerBest::new(n_labels))))
            .collect();
        Self {
            ready: Barrier::new(n_threads + 1),
            finished: Barrier::new(n_threads + 1),
            current: AtomicPtr::new(ptr::null_mut()),
            slots,
        }
    }

    /// Publish the node the workers should process next, or `None` to make
    /// them exit. Must happen before the coordinator arrives at `ready`.
    pub fn publish(&self, node: Option<&NodeTrainData>) {
        let ptr = node
            .map(|n| n as *const NodeTrainData as *mut NodeTrainData)
            .unwrap_or(ptr::null_mut());
        self.current.store(ptr, Ordering::Release);
    }

    /// Read the published node.
    ///
    /// # Safety
    ///
    /// Must only be called by a worker between waking from `ready` and
    /// arriving at `finished`; the coordinator keeps the node alive for
    /// that whole window.
    unsafe fn current(&self) -> Option<&NodeTrainData> {
        let ptr = self.current.load(Ordering::Acquire);
        // SAFETY: see above; the pointer is either null or valid.
        unsafe { ptr.as_ref() }
    }

    /// Exclusive access to worker `index`'s slot.
    ///
    /// # Safety
    ///
    /// Must only be called by worker `index` between `ready` and
    /// `finished`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, index: usize) -> &mut WorkerBest {
        unsafe { &mut *self.slots[index].0.get() }
    }

    /// Read worker `index`'s slot.
    ///
    /// # Safety
    ///
    /// Must only be called by the coordinator between `finished` and the
    /// next `ready`.
    pub unsafe fn slot(&self, index: usize) -> &WorkerBest {
        unsafe { &*self.slots[index].0.get() }
    }
}

/// The offset-table stripe `[start, end)` assigned to worker `index`.
///
/// The table divides evenly across workers; the last worker absorbs the
/// remainder. With fewer offsets than workers the early stripes are empty.
pub(crate) fn stripe(n_uv: u32, n_threads: usize, index: usize) -> (u32, u32) {
    let n_c = n_uv / n_threads as u32;
    let start = index as u32 * n_c;
    let end = if index == n_threads - 1 {
        n_uv
    } else {
        start + n_c
    };
    (start, end)
}

/// One gain-search worker, bound to its stripe for the whole run.
pub(crate) struct GainSearchWorker<'a> {
    ctx: &'a TrainContext,
    shared: &'a Rendezvous,
    cancel: &'a CancelToken,
    index: usize,
    c_start: u32,
    c_end: u32,
    check_degenerate_right: bool,
}

impl<'a> GainSearchWorker<'a> {
    pub fn new(
        ctx: &'a TrainContext,
        shared: &'a Rendezvous,
        cancel: &'a CancelToken,
        index: usize,
        n_threads: usize,
        check_degenerate_right: bool,
    ) -> Self {
        let (c_start, c_end) = stripe(ctx.uvs.len() as u32, n_threads, index);
        Self {
            ctx,
            shared,
            cancel,
            index,
            c_start,
            c_end,
            check_degenerate_right,
        }
    }

    /// The per-node work loop. Returns when the coordinator publishes a
    /// null node.
    pub fn run(self) {
        let ctx = self.ctx;
        let n_labels = ctx.n_labels as usize;
        let n_t = ctx.ts.len();
        let n_c = (self.c_end - self.c_start) as usize;

        // Scratch lives for the thread lifetime; nothing is allocated per
        // node.
        let mut root_histogram = vec![0u32; n_labels];
        let mut lr_histograms = vec![0u32; n_c * n_t * 2 * n_labels];
        let mut root_nhistogram = vec![0f32; n_labels];
        let mut nhistogram = vec![0f32; n_labels];
        let mut samples = vec![0f32; n_c];

        loop {
            self.shared.ready.wait();

            // SAFETY: between `ready` and `finished` the coordinator keeps
            // the published node alive and untouched.
            let Some(node) = (unsafe { self.shared.current() }) else {
                break;
            };

            root_histogram.fill(0);
            lr_histograms.fill(0);

            let result = accumulate_histograms(
                ctx,
                node,
                self.c_start,
                self.c_end,
                &mut root_histogram,
                &mut lr_histograms,
                &mut samples,
                self.cancel,
            );

            let (root_n_pixels, root_n_labels) =
                normalize_histogram(&root_histogram, &mut root_nhistogram);

            // SAFETY: this is worker `self.index`, between the barriers.
            let best = unsafe { self.shared.slot_mut(self.index) };
            best.gain = 0.0;
            best.uv = 0;
            best.t = 0;
            best.n_lr = [0, 0];
            best.root_histogram.copy_from_slice(&root_histogram);
            best.error = result.err();

            // A single-label node or one on the final depth cannot split;
            // leave the gain at zero.
            let searchable = best.error.is_none()
                && root_n_labels > 1
                && node.depth < ctx.max_depth as u32 - 1;

            if searchable {
                let entropy = shannon_entropy(&root_nhistogram);

                let mut lr_base = 0;
                'search: for c in self.c_start..self.c_end {
                    for t in 0..n_t {
                        if self.cancel.is_cancelled() {
                            break 'search;
                        }

                        let l_histogram = &lr_histograms[lr_base..lr_base + n_labels];
                        let (l_n_pixels, _) = normalize_histogram(l_histogram, &mut nhistogram);
                        if l_n_pixels == 0 || l_n_pixels == root_n_pixels {
                            lr_base += 2 * n_labels;
                            continue;
                        }
                        let l_entropy = shannon_entropy(&nhistogram);

                        let r_histogram =
                            &lr_histograms[lr_base + n_labels..lr_base + 2 * n_labels];
                        let (r_n_pixels, _) = normalize_histogram(r_histogram, &mut nhistogram);
                        if self.check_degenerate_right
                            && (r_n_pixels == 0 || r_n_pixels == root_n_pixels)
                        {
                            lr_base += 2 * n_labels;
                            continue;
                        }
                        let r_entropy = shannon_entropy(&nhistogram);

                        let gain = split_gain(
                            entropy,
                            root_n_pixels,
                            l_entropy,
                            l_n_pixels,
                            r_entropy,
                            r_n_pixels,
                        );

                        if gain > best.gain {
                            best.gain = gain;
                            best.uv = c;
                            best.t = t as u32;
                            best.n_lr = [l_n_pixels, r_n_pixels];
                        }

                        lr_base += 2 * n_labels;
                    }
                }
            }

            self.shared.finished.wait();
        }
    }
}
