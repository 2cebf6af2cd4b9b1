use std::fmt;
use std::path::Path;
use std::time::Instant;

use depthfuse_3d::{io::ply::PlyEncoding, pointcloud::PointCloud, voxel_grid::VoxelGrid};
use depthfuse_linalg::RigidTransform;

use crate::{
    batch::{BatchError, FrameBatch},
    merge::merge_batch,
    output::{merge_clouds, write_output},
    stitch::{BatchStitcher, LastPoseChainStitcher, StitchState},
    ReconError, ReconstructionConfig,
};

/// What happened to one input of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    /// The batch contributed points to the output.
    Merged {
        /// Number of selected frames that contributed.
        frames_used: usize,
        /// Number of selected frames skipped for a singular pose or bad intrinsics.
        frames_skipped: usize,
        /// Number of points after per-batch downsampling.
        points: usize,
    },
    /// The batch was loaded but no point survived filtering.
    Empty,
    /// The input could not be loaded and was skipped.
    Skipped {
        /// Why the input was skipped.
        reason: String,
    },
}

/// The status of one input, labelled by its source.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// The input path, or the label given to an in-memory batch.
    pub source: String,
    /// What happened to it.
    pub status: BatchStatus,
}

/// Per-input outcome of a run, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// One report per input.
    pub reports: Vec<BatchReport>,
}

impl RunSummary {
    /// Number of inputs that contributed points.
    pub fn num_merged(&self) -> usize {
        self.count(|s| matches!(s, BatchStatus::Merged { .. }))
    }

    /// Number of inputs loaded without producing any point.
    pub fn num_empty(&self) -> usize {
        self.count(|s| matches!(s, BatchStatus::Empty))
    }

    /// Number of inputs that could not be loaded.
    pub fn num_skipped(&self) -> usize {
        self.count(|s| matches!(s, BatchStatus::Skipped { .. }))
    }

    /// Total number of frames that contributed across all inputs.
    pub fn frames_used(&self) -> usize {
        self.reports
            .iter()
            .map(|r| match r.status {
                BatchStatus::Merged { frames_used, .. } => frames_used,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&BatchStatus) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.status)).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inputs: {} merged, {} empty, {} skipped, {} frames used",
            self.reports.len(),
            self.num_merged(),
            self.num_empty(),
            self.num_skipped(),
            self.frames_used()
        )
    }
}

/// The result of a reconstruction run.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// The stitched and downsampled cloud in the frame of the first batch.
    pub cloud: PointCloud,
    /// The accumulator after the last batch.
    pub accumulator: RigidTransform,
    /// Per-input outcome.
    pub summary: RunSummary,
}

impl Reconstruction {
    /// Write the final cloud as a PLY file.
    pub fn write_output(
        &self,
        path: impl AsRef<Path>,
        encoding: PlyEncoding,
    ) -> Result<(), ReconError> {
        write_output(path, &self.cloud, encoding)
    }
}

/// Turns a sequence of batch artifacts into a single stitched point cloud.
///
/// Batches are processed one at a time in input order: load, merge, stitch, then release the
/// batch before the next one is loaded.
///
/// Example:
///
/// ```no_run
/// use depthfuse_3d::io::ply::PlyEncoding;
/// use depthfuse_recon::{Reconstructor, ReconstructionConfig};
///
/// let reconstructor = Reconstructor::new(ReconstructionConfig::default()).unwrap();
/// let result = reconstructor.run(&["batch_000.npz", "batch_001.npz"]).unwrap();
/// result.write_output("output.ply", PlyEncoding::BinaryLittleEndian).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Reconstructor<S = LastPoseChainStitcher> {
    config: ReconstructionConfig,
    grid: VoxelGrid,
    stitcher: S,
}

impl Reconstructor<LastPoseChainStitcher> {
    /// Create a reconstructor chaining batches through their last pose.
    ///
    /// # Errors
    ///
    /// Returns [`ReconError::InvalidConfig`] if the config does not validate.
    pub fn new(config: ReconstructionConfig) -> Result<Self, ReconError> {
        Self::with_stitcher(config, LastPoseChainStitcher)
    }
}

impl<S: BatchStitcher> Reconstructor<S> {
    /// Create a reconstructor with a custom stitching strategy.
    pub fn with_stitcher(config: ReconstructionConfig, stitcher: S) -> Result<Self, ReconError> {
        config.validate()?;
        let grid = config.voxel_grid()?;
        Ok(Self {
            config,
            grid,
            stitcher,
        })
    }

    /// The run configuration.
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Reconstruct from `.npz` batch files, in the given order.
    ///
    /// Files that are missing or malformed are logged and skipped.
    pub fn run<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<Reconstruction, ReconError> {
        let total = inputs.len();
        let sources = inputs.iter().enumerate().map(|(i, path)| {
            let path = path.as_ref();
            log::info!("Processing batch {}/{}: {}", i + 1, total, path.display());
            (path.display().to_string(), FrameBatch::from_npz(path))
        });
        self.run_batches(sources)
    }

    /// Reconstruct from already loaded batches, each labelled for the summary.
    ///
    /// Items are consumed lazily, so at most one batch is held at a time.
    pub fn run_batches<I>(&self, sources: I) -> Result<Reconstruction, ReconError>
    where
        I: IntoIterator<Item = (String, Result<FrameBatch, BatchError>)>,
    {
        let start = Instant::now();
        let mut state = StitchState::new();
        let mut clouds = Vec::new();
        let mut summary = RunSummary::default();

        for (source, loaded) in sources {
            let batch = match loaded {
                Ok(batch) => batch,
                Err(err) => {
                    log::warn!("Skipping {source}: {err}");
                    summary.reports.push(BatchReport {
                        source,
                        status: BatchStatus::Skipped {
                            reason: err.to_string(),
                        },
                    });
                    continue;
                }
            };

            let merged = merge_batch(&batch, &self.config)?;
            drop(batch);

            let (frames_used, frames_skipped) = (merged.frames_used, merged.frames_skipped);
            let (next, cloud) = state.advance(&self.stitcher, merged)?;
            state = next;

            let status = if cloud.is_empty() {
                log::warn!("No points survived filtering in {source}");
                BatchStatus::Empty
            } else {
                log::info!(
                    "{source}: {} points from {frames_used} frames ({frames_skipped} skipped)",
                    cloud.len()
                );
                BatchStatus::Merged {
                    frames_used,
                    frames_skipped,
                    points: cloud.len(),
                }
            };
            summary.reports.push(BatchReport { source, status });
            clouds.push(cloud);
        }

        let cloud = merge_clouds(clouds, &self.grid);
        log::info!("{summary}");
        log::debug!("Reconstruction took {:?}", start.elapsed());

        Ok(Reconstruction {
            cloud,
            accumulator: *state.accumulator(),
            summary,
        })
    }
}
