use std::path::PathBuf;

use depthfuse_3d::{io::ply::PlyError, voxel_grid::VoxelGridError};
use depthfuse_linalg::LinalgError;

use crate::batch::BatchError;

/// Errors that stop a reconstruction run.
///
/// Per-file and per-frame problems are not reported here: they are logged, recorded in the
/// [`crate::RunSummary`], and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("Failed to read config file {path}. {source}")]
    ConfigFile {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse config. {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A batch could not be loaded.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The voxel grid could not be built.
    #[error(transparent)]
    VoxelGrid(#[from] VoxelGridError),

    /// The accumulated batch-to-global transform stopped being invertible.
    #[error("Global accumulator is degenerate after batch {batch}. {source}")]
    DegenerateAccumulator {
        /// Index of the batch whose motion was just composed.
        batch: usize,
        /// Inversion failure.
        #[source]
        source: LinalgError,
    },

    /// The output point cloud could not be written.
    #[error("Failed to write output. {0}")]
    Ply(#[from] PlyError),
}
