//! The tree training engine.
//!
//! Training is a breadth-first loop over frontier nodes. For each node a
//! pool of workers searches a shared table of random `(u,v)` offset pairs
//! and thresholds for the split with the best information gain; the
//! coordinator reduces the per-worker bests, partitions the node's pixels,
//! and either enqueues two children or freezes a leaf distribution.
//!
//! - [`TrainOptions`] / [`TrainOptionsBuilder`]: run parameters
//! - [`TreeTrainer`]: the coordinator; [`TreeTrainer::train`] and
//!   [`TreeTrainer::resume`]
//! - [`CancelToken`]: cooperative interruption with checkpointable state
//! - [`TrainingLogger`], [`Verbosity`]: progress output

mod cancel;
mod checkpoint;
mod context;
mod histogram;
mod logger;
mod partition;
mod trainer;
mod worker;

pub use cancel::CancelToken;
pub use context::{
    pixels_per_meter, NodeTrainData, PixelRef, TrainContext, TrainOptions, TrainOptionsBuilder,
};
pub use histogram::{normalize_histogram, shannon_entropy, split_gain};
pub use logger::{TrainingLogger, Verbosity};
pub use trainer::{TrainOutcome, TreeTrainer};
