//! Crate-wide error taxonomy.
//!
//! Module-specific failures (dataset loading, tree file parsing) carry their
//! own error enums next to the code that raises them; this module defines the
//! training-data errors and the top-level [`Error`] the binary reports.

use thiserror::Error;

/// Errors caused by inconsistent or corrupt training input.
///
/// All of these are fatal: training on bad data would silently bias the
/// tree, so the coordinator aborts instead of skipping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// A label image contains a value outside `0..n_labels`.
    #[error("label '{label}' is bigger than expected (max {max})")]
    InvalidLabel { label: u8, max: u8 },

    /// A checkpoint was trained against a different label set.
    #[error("checkpoint has {checkpoint} labels, expected {expected}")]
    LabelCountMismatch { checkpoint: u8, expected: u8 },

    /// A checkpoint was trained with a different camera field of view.
    #[error("checkpoint has FOV {checkpoint:.2}, expected {expected:.2}")]
    FovMismatch { checkpoint: f32, expected: f32 },

    /// Resuming with a shallower maximum depth than the checkpoint's.
    #[error("can't train with a lower depth than checkpoint ({requested} < {checkpoint})")]
    DepthBelowCheckpoint { requested: u8, checkpoint: u8 },

    /// A resumed checkpoint has no unfinished nodes left to train.
    #[error("tree already fully trained")]
    AlreadyComplete,
}

/// Top-level error for training runs and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Dataset(#[from] crate::data::DatasetError),

    #[error(transparent)]
    TreeRead(#[from] crate::io::ReadError),

    #[error(transparent)]
    TreeWrite(#[from] crate::io::WriteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker thread creation failed.
    #[error("resource error: {0}")]
    Resource(String),
}
