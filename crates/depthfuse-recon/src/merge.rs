use std::time::Instant;

use depthfuse_3d::{
    camera::PinholeCamera,
    depth::{backproject_depth, BackprojectParams, DepthError},
    pointcloud::PointCloud,
};
use depthfuse_linalg::{LinalgError, RigidTransform};
use rayon::prelude::*;

use crate::{
    batch::FrameBatch, config::ExecutionStrategy, pose::camera_to_world, ReconError,
    ReconstructionConfig,
};

/// Selects the frames `offset, offset + step, offset + 2 * step, ...` of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSelection {
    step: usize,
    offset: usize,
}

impl Default for FrameSelection {
    fn default() -> Self {
        Self { step: 1, offset: 0 }
    }
}

impl FrameSelection {
    /// Create a new frame selection.
    ///
    /// # Errors
    ///
    /// Returns [`ReconError::InvalidConfig`] if `step` is zero.
    pub fn new(step: usize, offset: usize) -> Result<Self, ReconError> {
        if step == 0 {
            return Err(ReconError::InvalidConfig(
                "frame_step must be >= 1".to_string(),
            ));
        }
        Ok(Self { step, offset })
    }

    /// The selection step.
    pub fn step(&self) -> usize {
        self.step
    }

    /// The index of the first selected frame.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The selected frame indices of a batch with `num_frames` frames, ascending.
    pub fn indices(&self, num_frames: usize) -> impl Iterator<Item = usize> {
        (self.offset..num_frames).step_by(self.step)
    }
}

/// The fused cloud of one batch, expressed in the batch-local world frame.
#[derive(Debug, Clone)]
pub struct MergedBatch {
    /// Voxel-downsampled union of the per-frame clouds.
    pub cloud: PointCloud,
    /// Camera-to-world pose of the last selected frame, or the identity if that frame's
    /// extrinsic is singular or no frame was selected.
    pub last_camera_to_world: RigidTransform,
    /// Number of selected frames that contributed.
    pub frames_used: usize,
    /// Number of selected frames that contributed no points because their extrinsic, intrinsic
    /// or depth map was unusable.
    pub frames_skipped: usize,
}

impl MergedBatch {
    /// A batch without any usable frame.
    pub fn empty() -> Self {
        Self {
            cloud: PointCloud::default(),
            last_camera_to_world: RigidTransform::IDENTITY,
            frames_used: 0,
            frames_skipped: 0,
        }
    }
}

struct FrameOutcome {
    camera_to_world: RigidTransform,
    cloud: Result<PointCloud, DepthError>,
}

/// Resolve the pose of frame `index`, then backproject it into the batch-local world frame.
///
/// A degenerate intrinsic or depth map only loses the points: the pose is still reported.
fn process_frame(
    batch: &FrameBatch,
    index: usize,
    params: &BackprojectParams,
) -> Result<FrameOutcome, LinalgError> {
    let camera_to_world = camera_to_world(&batch.extrinsic(index))?;
    let cloud = backproject_frame(batch, index, params).map(|mut cloud| {
        cloud.transform_mut(&camera_to_world);
        cloud
    });
    Ok(FrameOutcome {
        camera_to_world,
        cloud,
    })
}

fn backproject_frame(
    batch: &FrameBatch,
    index: usize,
    params: &BackprojectParams,
) -> Result<PointCloud, DepthError> {
    let camera = PinholeCamera::from_matrix(&batch.intrinsic(index))?;
    let depth = batch.depth(index)?;
    let confidence = batch.confidence(index).transpose()?;
    backproject_depth(&depth, confidence.as_ref(), &camera, params)
}

/// Fuse the selected frames of a batch into one downsampled cloud.
///
/// Frames whose extrinsic is singular, or whose intrinsic has a degenerate focal length, are
/// logged and counted as skipped. A degenerate intrinsic drops the points of the frame but
/// not its pose. The per-frame clouds are concatenated in ascending frame index before
/// downsampling, so the result does not depend on `config.execution`.
///
/// # Errors
///
/// Returns [`ReconError::InvalidConfig`] if `config` does not validate.
///
/// # Arguments
///
/// * `batch` - The loaded batch.
/// * `config` - Stride, truncation, frame selection, voxel size and execution strategy.
///
/// # Returns
///
/// The merged cloud together with the camera-to-world pose of the last selected frame, or the
/// identity if that pose is singular.
pub fn merge_batch(
    batch: &FrameBatch,
    config: &ReconstructionConfig,
) -> Result<MergedBatch, ReconError> {
    config.validate()?;
    let selection = config.frame_selection()?;
    let grid = config.voxel_grid()?;
    let params = config.backproject_params();

    if params.confidence.is_enabled() && !batch.has_confidence() {
        log::warn!("Confidence filter requested but the batch has no confidence maps");
    }

    let indices: Vec<usize> = selection.indices(batch.num_frames()).collect();
    let start = Instant::now();

    let frames: Vec<Result<FrameOutcome, LinalgError>> = match config.execution {
        ExecutionStrategy::Parallel => indices
            .par_iter()
            .map(|&i| process_frame(batch, i, &params))
            .collect(),
        ExecutionStrategy::Serial => indices
            .iter()
            .map(|&i| process_frame(batch, i, &params))
            .collect(),
    };

    let mut merged = MergedBatch::empty();
    let mut cloud = PointCloud::default();

    for (index, frame) in indices.iter().zip(frames) {
        match frame {
            Ok(FrameOutcome {
                camera_to_world,
                cloud: Ok(points),
            }) => {
                log::debug!("Frame {index}: {} points", points.len());
                cloud.merge(points);
                merged.last_camera_to_world = camera_to_world;
                merged.frames_used += 1;
            }
            Ok(FrameOutcome {
                camera_to_world,
                cloud: Err(err),
            }) => {
                log::warn!("Skipping the points of frame {index}: {err}");
                merged.last_camera_to_world = camera_to_world;
                merged.frames_skipped += 1;
            }
            Err(err) => {
                log::warn!("Skipping frame {index}: singular extrinsic. {err}");
                merged.last_camera_to_world = RigidTransform::IDENTITY;
                merged.frames_skipped += 1;
                if indices.last() == Some(index) {
                    log::warn!("Last frame {index} has no pose, the batch contributes no motion");
                }
            }
        }
    }

    let num_raw = cloud.len();
    merged.cloud = grid.downsample(&cloud);
    log::debug!(
        "Merged {} frames: {} points, {} after downsampling ({:?})",
        merged.frames_used,
        num_raw,
        merged.cloud.len(),
        start.elapsed()
    );

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array, Array3};

    fn translation_w2c(tx: f64) -> [[f64; 4]; 3] {
        [[1.0, 0.0, 0.0, tx], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]
    }

    const INTRINSIC: [[f64; 3]; 3] = [[10.0, 0.0, 2.0], [0.0, 10.0, 2.0], [0.0, 0.0, 1.0]];

    fn make_batch(depth: Array3<f32>, extrinsics: &[[[f64; 4]; 3]]) -> FrameBatch {
        let extrinsics = Array::from_shape_fn((extrinsics.len(), 3, 4), |(f, r, c)| {
            extrinsics[f][r][c]
        });
        FrameBatch::from_parts(
            depth.into_dyn(),
            None,
            extrinsics.into_dyn(),
            arr2(&INTRINSIC).into_dyn(),
        )
        .unwrap()
    }

    fn make_batch_with_intrinsics(
        depth: Array3<f32>,
        extrinsics: &[[[f64; 4]; 3]],
        intrinsics: &[[[f64; 3]; 3]],
    ) -> FrameBatch {
        let extrinsics = Array::from_shape_fn((extrinsics.len(), 3, 4), |(f, r, c)| {
            extrinsics[f][r][c]
        });
        let intrinsics = Array::from_shape_fn((intrinsics.len(), 3, 3), |(f, r, c)| {
            intrinsics[f][r][c]
        });
        FrameBatch::from_parts(
            depth.into_dyn(),
            None,
            extrinsics.into_dyn(),
            intrinsics.into_dyn(),
        )
        .unwrap()
    }

    #[test]
    fn test_frame_selection() -> Result<(), ReconError> {
        let even = FrameSelection::new(2, 0)?;
        assert_eq!(even.indices(4).collect::<Vec<_>>(), vec![0, 2]);
        let odd = FrameSelection::new(2, 1)?;
        assert_eq!(odd.indices(4).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(FrameSelection::new(1, 5)?.indices(3).count(), 0);
        assert_eq!(FrameSelection::default().indices(3).count(), 3);
        assert!(FrameSelection::new(0, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_merge_single_frame() -> Result<(), ReconError> {
        let batch = make_batch(Array3::from_elem((1, 5, 5), 1.0), &[translation_w2c(0.0)]);
        let config = ReconstructionConfig {
            stride: 1,
            voxel_size: 1e-3,
            ..Default::default()
        };
        let merged = merge_batch(&batch, &config)?;
        assert_eq!(merged.frames_used, 1);
        assert_eq!(merged.frames_skipped, 0);
        assert_eq!(merged.cloud.len(), 25);
        assert!(merged.last_camera_to_world.is_identity(1e-12));
        Ok(())
    }

    #[test]
    fn test_points_are_moved_to_world() -> Result<(), ReconError> {
        // world-to-camera shifts x by -3, so the camera sits at x = 3
        let batch = make_batch(Array3::from_elem((1, 5, 5), 2.0), &[translation_w2c(-3.0)]);
        let config = ReconstructionConfig {
            stride: 1,
            voxel_size: 1e-3,
            ..Default::default()
        };
        let merged = merge_batch(&batch, &config)?;
        let centroid = merged.cloud.centroid().unwrap();
        assert_relative_eq!(centroid[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(centroid[2], 2.0, epsilon = 1e-9);
        assert_relative_eq!(merged.last_camera_to_world.translation()[0], 3.0);
        Ok(())
    }

    #[test]
    fn test_singular_frame_is_skipped() -> Result<(), ReconError> {
        let singular = [[0.0; 4]; 3];
        let batch = make_batch(
            Array3::from_elem((3, 4, 4), 1.0),
            &[translation_w2c(-1.0), singular, translation_w2c(-2.0)],
        );
        let merged = merge_batch(&batch, &ReconstructionConfig::default())?;
        assert_eq!(merged.frames_used, 2);
        assert_eq!(merged.frames_skipped, 1);
        assert_relative_eq!(merged.last_camera_to_world.translation()[0], 2.0);
        Ok(())
    }

    #[test]
    fn test_singular_last_frame_gives_identity() -> Result<(), ReconError> {
        let singular = [[0.0; 4]; 3];
        let batch = make_batch(
            Array3::from_elem((3, 4, 4), 1.0),
            &[translation_w2c(-1.0), translation_w2c(-2.0), singular],
        );
        let merged = merge_batch(&batch, &ReconstructionConfig::default())?;
        assert_eq!(merged.frames_used, 2);
        assert_eq!(merged.frames_skipped, 1);
        // no earlier frame stands in for the last one
        assert!(merged.last_camera_to_world.is_identity(0.0));
        assert!(!merged.cloud.is_empty());
        Ok(())
    }

    #[test]
    fn test_bad_intrinsic_keeps_pose() -> Result<(), ReconError> {
        let degenerate = [[0.0, 0.0, 2.0], [0.0, 0.0, 2.0], [0.0, 0.0, 1.0]];
        let batch = make_batch_with_intrinsics(
            Array3::from_elem((2, 4, 4), 1.0),
            &[translation_w2c(-1.0), translation_w2c(-2.0)],
            &[INTRINSIC, degenerate],
        );
        let config = ReconstructionConfig {
            stride: 1,
            voxel_size: 1e-3,
            ..Default::default()
        };
        let merged = merge_batch(&batch, &config)?;
        assert_eq!(merged.frames_used, 1);
        assert_eq!(merged.frames_skipped, 1);
        assert_eq!(merged.cloud.len(), 16);
        assert_relative_eq!(merged.last_camera_to_world.translation()[0], 2.0);
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let batch = make_batch(Array3::from_elem((1, 4, 4), 1.0), &[translation_w2c(0.0)]);
        let config = ReconstructionConfig {
            stride: 0,
            ..Default::default()
        };
        assert!(matches!(
            merge_batch(&batch, &config),
            Err(ReconError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_all_frames_unusable() -> Result<(), ReconError> {
        let batch = make_batch(Array3::from_elem((2, 4, 4), 1.0), &[[[0.0; 4]; 3]; 2]);
        let merged = merge_batch(&batch, &ReconstructionConfig::default())?;
        assert!(merged.cloud.is_empty());
        assert_eq!(merged.frames_skipped, 2);
        assert!(merged.last_camera_to_world.is_identity(0.0));
        Ok(())
    }

    #[test]
    fn test_truncated_batch_is_empty_but_keeps_pose() -> Result<(), ReconError> {
        let batch = make_batch(Array3::from_elem((1, 4, 4), 50.0), &[translation_w2c(-1.0)]);
        let merged = merge_batch(&batch, &ReconstructionConfig::default())?;
        assert!(merged.cloud.is_empty());
        assert_eq!(merged.frames_used, 1);
        assert_relative_eq!(merged.last_camera_to_world.translation()[0], 1.0);
        Ok(())
    }

    #[test]
    fn test_parallel_matches_serial() -> Result<(), ReconError> {
        let depth = Array3::from_shape_fn((6, 16, 16), |(f, r, c)| {
            1.0 + 0.05 * f as f32 + 0.01 * (r * 16 + c) as f32
        });
        let extrinsics: Vec<_> = (0..6).map(|i| translation_w2c(-0.3 * i as f64)).collect();
        let batch = make_batch(depth, &extrinsics);

        let parallel = ReconstructionConfig {
            stride: 2,
            voxel_size: 0.02,
            ..Default::default()
        };
        let serial = ReconstructionConfig {
            execution: ExecutionStrategy::Serial,
            ..parallel.clone()
        };
        let a = merge_batch(&batch, &parallel)?;
        let b = merge_batch(&batch, &serial)?;
        assert_eq!(a.cloud, b.cloud);
        assert!(a.last_camera_to_world.abs_diff_eq(&b.last_camera_to_world, 0.0));
        Ok(())
    }

    #[test]
    fn test_frame_step_and_offset() -> Result<(), ReconError> {
        // each frame sits at a different depth so the used frames can be told apart
        let depth = Array3::from_shape_fn((4, 2, 2), |(f, _, _)| 1.0 + f as f32);
        let extrinsics = [translation_w2c(0.0); 4];
        let batch = make_batch(depth, &extrinsics);

        let config = ReconstructionConfig {
            stride: 1,
            voxel_size: 1e-3,
            frame_step: 2,
            frame_offset: 1,
            ..Default::default()
        };
        let merged = merge_batch(&batch, &config)?;
        assert_eq!(merged.frames_used, 2);
        let mut depths: Vec<f64> = merged.cloud.points().iter().map(|p| p[2]).collect();
        depths.dedup();
        assert_eq!(depths, vec![2.0, 4.0]);
        Ok(())
    }
}
