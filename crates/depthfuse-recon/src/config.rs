use std::path::Path;

use depthfuse_3d::{
    depth::{BackprojectParams, ConfidenceFilter},
    voxel_grid::{VoxelGrid, VoxelReduction},
};
use serde::{Deserialize, Serialize};

use crate::{merge::FrameSelection, ReconError};

/// Controls how the frames of a batch are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool, one task per frame.
    #[default]
    Parallel,

    /// Run sequentially on the current thread.
    ///
    /// Produces the same cloud as [`ExecutionStrategy::Parallel`].
    Serial,
}

/// Parameters of a reconstruction run.
///
/// Every field has a default, so a JSON config only needs to name the values it changes:
///
/// ```
/// use depthfuse_recon::ReconstructionConfig;
///
/// let config: ReconstructionConfig = serde_json::from_str(r#"{ "stride": 2 }"#).unwrap();
/// assert_eq!(config.stride, 2);
/// assert_eq!(config.voxel_size, 0.05);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconstructionConfig {
    /// Edge length of the voxel grid, in world units.
    pub voxel_size: f64,
    /// Pixel subsampling factor used during backprojection.
    pub stride: usize,
    /// Depth truncation: points with a larger scaled depth are discarded.
    pub max_depth: f64,
    /// Raw depth values are divided by this factor.
    pub depth_scale: f64,
    /// Use every `frame_step`-th frame of a batch.
    pub frame_step: usize,
    /// Index of the first frame used in each batch.
    pub frame_offset: usize,
    /// Confidence gating policy, disabled by default.
    pub confidence: ConfidenceFilter,
    /// How each voxel cell is reduced to a single point.
    pub voxel_reduction: VoxelReduction,
    /// Per-frame execution strategy.
    pub execution: ExecutionStrategy,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.05,
            stride: 4,
            max_depth: 20.0,
            depth_scale: 1.0,
            frame_step: 1,
            frame_offset: 0,
            confidence: ConfidenceFilter::Disabled,
            voxel_reduction: VoxelReduction::Centroid,
            execution: ExecutionStrategy::Parallel,
        }
    }
}

impl ReconstructionConfig {
    /// Load a config from a JSON file. Missing fields take their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ReconError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ReconError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every parameter is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ReconError::InvalidConfig`] when `voxel_size`, `max_depth` or `depth_scale`
    /// is not a positive finite number, or when `stride` or `frame_step` is zero.
    pub fn validate(&self) -> Result<(), ReconError> {
        let positive = [
            ("voxel_size", self.voxel_size),
            ("max_depth", self.max_depth),
            ("depth_scale", self.depth_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ReconError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.stride == 0 {
            return Err(ReconError::InvalidConfig("stride must be >= 1".to_string()));
        }
        if self.frame_step == 0 {
            return Err(ReconError::InvalidConfig(
                "frame_step must be >= 1".to_string(),
            ));
        }
        if let ConfidenceFilter::MinConfidence(t) | ConfidenceFilter::MaxUncertainty(t) =
            self.confidence
        {
            if t.is_nan() {
                return Err(ReconError::InvalidConfig(
                    "confidence threshold must not be NaN".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Backprojection parameters derived from this config.
    pub fn backproject_params(&self) -> BackprojectParams {
        BackprojectParams {
            stride: self.stride,
            depth_scale: self.depth_scale,
            depth_trunc: self.max_depth,
            confidence: self.confidence,
        }
    }

    /// The frame selection derived from this config.
    pub fn frame_selection(&self) -> Result<FrameSelection, ReconError> {
        FrameSelection::new(self.frame_step, self.frame_offset)
    }

    /// The voxel grid used for both per-batch and final downsampling.
    pub fn voxel_grid(&self) -> Result<VoxelGrid, ReconError> {
        Ok(VoxelGrid::new(self.voxel_size)?.with_reduction(self.voxel_reduction))
    }
}
