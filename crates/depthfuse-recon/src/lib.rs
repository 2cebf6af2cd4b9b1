#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::ReconError;

/// Loading and validation of per-batch depth artifacts.
pub mod batch;

/// Reconstruction parameters.
pub mod config;

/// Per-batch frame fusion.
pub mod merge;

/// Final cloud assembly and serialization.
pub mod output;

/// End-to-end reconstruction over a sequence of batches.
pub mod pipeline;

/// Camera pose interpretation.
pub mod pose;

/// Cross-batch alignment.
pub mod stitch;

pub use batch::{BatchError, FrameBatch};
pub use config::{ExecutionStrategy, ReconstructionConfig};
pub use merge::{merge_batch, FrameSelection, MergedBatch};
pub use pipeline::{BatchReport, BatchStatus, Reconstruction, Reconstructor, RunSummary};
pub use stitch::{BatchStitcher, LastPoseChainStitcher, StitchState};
