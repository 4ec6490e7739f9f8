//! depthtree: randomized decision trees for per-pixel body-part
//! classification from depth images.
//!
//! This crate trains binary trees whose interior nodes test a
//! depth-difference feature (two offsets scaled by inverse depth) against a
//! threshold, and whose leaves hold label probability distributions. It
//! covers the full training pipeline: parallel breadth-first construction
//! with an information-gain search over random candidate features,
//! checkpoint/resume for interrupted runs, the packed `.rdt` file format,
//! and per-pixel inference over single trees or forests.
//!
//! # Example
//!
//! ```no_run
//! use depthtree::{CancelToken, GatherOptions, TrainData, TrainOptions, TreeTrainer};
//! use std::path::Path;
//!
//! let data = TrainData::gather(
//!     Path::new("dataset"),
//!     "index",
//!     &GatherOptions::default(),
//! )?;
//!
//! let opts = TrainOptions::builder()
//!     .max_depth(12u8)
//!     .seed(42u64)
//!     .build()
//!     .unwrap();
//!
//! let mut trainer = TreeTrainer::new(data, opts);
//! let outcome = trainer.train(&CancelToken::new())?;
//! depthtree::io::save_tree(&outcome.tree, Path::new("out.rdt"))?;
//! # Ok::<(), depthtree::Error>(())
//! ```

pub mod data;
pub mod error;
pub mod feature;
pub mod inference;
pub mod io;
pub mod testing;
pub mod training;
pub mod tree;

pub use data::{GatherOptions, TrainData};
pub use error::{DataError, Error};
pub use feature::{sample_uv, Depth, BACKGROUND_DEPTH};
pub use inference::infer_labels;
pub use training::{
    CancelToken, TrainOptions, TrainOptionsBuilder, TrainOutcome, TreeTrainer, Verbosity,
};
pub use tree::{Node, RdTree, UvPair};
