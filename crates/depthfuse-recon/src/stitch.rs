use depthfuse_3d::pointcloud::PointCloud;
use depthfuse_linalg::RigidTransform;

use crate::{merge::MergedBatch, ReconError};

/// The outcome of stitching one batch: its cloud in the global frame and the accumulator to
/// hand to the next batch.
#[derive(Debug, Clone)]
pub struct StitchStep {
    /// The batch cloud expressed in the global frame.
    pub cloud: PointCloud,
    /// The batch-to-global transform for the following batch.
    pub accumulator: RigidTransform,
}

/// Aligns consecutive batches into a single global frame.
pub trait BatchStitcher {
    /// Align `batch` with the current `accumulator` and return the next accumulator.
    fn stitch(
        &self,
        accumulator: &RigidTransform,
        batch: MergedBatch,
    ) -> Result<StitchStep, ReconError>;
}

/// Chains batches through the pose of the last frame of each batch.
///
/// Assumes every batch restarts its trajectory at the identity and that the last frame of
/// batch `i` is where batch `i + 1` starts. Drift and scale are not corrected.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastPoseChainStitcher;

impl BatchStitcher for LastPoseChainStitcher {
    fn stitch(
        &self,
        accumulator: &RigidTransform,
        batch: MergedBatch,
    ) -> Result<StitchStep, ReconError> {
        let mut cloud = batch.cloud;
        cloud.transform_mut(accumulator);

        // existing accumulator on the left, batch motion on the right
        let accumulator = accumulator.compose(&batch.last_camera_to_world);

        Ok(StitchStep { cloud, accumulator })
    }
}

/// The state threaded through the fold over batches.
#[derive(Debug, Clone, Default)]
pub struct StitchState {
    accumulator: RigidTransform,
    num_batches: usize,
}

impl StitchState {
    /// Start a fold with the identity accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current batch-to-global transform.
    pub fn accumulator(&self) -> &RigidTransform {
        &self.accumulator
    }

    /// Number of batches folded so far.
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Fold one more batch into the state.
    ///
    /// # Errors
    ///
    /// Returns [`ReconError::DegenerateAccumulator`] if the updated accumulator is not
    /// invertible.
    pub fn advance<S: BatchStitcher + ?Sized>(
        self,
        stitcher: &S,
        batch: MergedBatch,
    ) -> Result<(Self, PointCloud), ReconError> {
        let StitchStep { cloud, accumulator } = stitcher.stitch(&self.accumulator, batch)?;

        accumulator
            .try_inverse()
            .map_err(|source| ReconError::DegenerateAccumulator {
                batch: self.num_batches,
                source,
            })?;

        let state = Self {
            accumulator,
            num_batches: self.num_batches + 1,
        };
        Ok((state, cloud))
    }
}

/// Stitch a sequence of merged batches, strictly in order.
///
/// # Returns
///
/// The aligned cloud of every batch, in input order, and the final accumulator.
pub fn stitch_batches<S, I>(
    stitcher: &S,
    batches: I,
) -> Result<(Vec<PointCloud>, RigidTransform), ReconError>
where
    S: BatchStitcher + ?Sized,
    I: IntoIterator<Item = MergedBatch>,
{
    let (state, clouds) = batches.into_iter().try_fold(
        (StitchState::new(), Vec::new()),
        |(state, mut clouds), batch| {
            let (state, cloud) = state.advance(stitcher, batch)?;
            clouds.push(cloud);
            Ok::<_, ReconError>((state, clouds))
        },
    )?;
    log::debug!("Stitched {} batches", state.num_batches());
    Ok((clouds, state.accumulator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn batch(points: Vec<[f64; 3]>, last: RigidTransform) -> MergedBatch {
        MergedBatch {
            cloud: PointCloud::new(points),
            last_camera_to_world: last,
            frames_used: 1,
            frames_skipped: 0,
        }
    }

    #[test]
    fn test_identity_pose_keeps_identity_accumulator() -> Result<(), ReconError> {
        let state = StitchState::new();
        let (state, cloud) = state.advance(
            &LastPoseChainStitcher,
            batch(vec![[1.0, 2.0, 3.0]], RigidTransform::IDENTITY),
        )?;
        assert!(state.accumulator().is_identity(0.0));
        assert_eq!(cloud.points(), &[[1.0, 2.0, 3.0]]);
        Ok(())
    }

    #[test]
    fn test_first_batch_is_not_moved() -> Result<(), ReconError> {
        let shift = RigidTransform::from_translation(&[1.0, 0.0, 0.0]);
        let (clouds, accumulator) = stitch_batches(
            &LastPoseChainStitcher,
            vec![
                batch(vec![[0.0, 0.0, 5.0]], shift),
                batch(vec![[0.0, 0.0, 5.0]], shift),
                batch(vec![[0.0, 0.0, 5.0]], RigidTransform::IDENTITY),
            ],
        )?;
        assert_eq!(clouds[0].points(), &[[0.0, 0.0, 5.0]]);
        assert_relative_eq!(clouds[1].points()[0][0], 1.0);
        assert_relative_eq!(clouds[2].points()[0][0], 2.0);
        assert_relative_eq!(accumulator.translation()[0], 2.0);
        Ok(())
    }

    #[test]
    fn test_accumulator_on_the_left() -> Result<(), Box<dyn std::error::Error>> {
        let rotate = RigidTransform::from_axis_angle(
            &[0.0, 0.0, 1.0],
            std::f64::consts::FRAC_PI_2,
            &[0.0, 0.0, 0.0],
        )?;
        let shift = RigidTransform::from_translation(&[1.0, 0.0, 0.0]);
        let (_, accumulator) = stitch_batches(
            &LastPoseChainStitcher,
            vec![batch(Vec::new(), rotate), batch(Vec::new(), shift)],
        )?;
        // rotate * shift moves the origin to (0, 1, 0); shift * rotate would give (1, 0, 0)
        let origin = accumulator.transform_point(&[0.0, 0.0, 0.0]);
        assert_relative_eq!(origin[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(origin[1], 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_degenerate_accumulator_is_fatal() {
        let collapse = RigidTransform::from_rows(&[
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let res = stitch_batches(
            &LastPoseChainStitcher,
            vec![
                batch(vec![[0.0; 3]], RigidTransform::IDENTITY),
                batch(vec![[0.0; 3]], collapse),
            ],
        );
        assert!(matches!(
            res,
            Err(ReconError::DegenerateAccumulator { batch: 1, .. })
        ));
    }

    #[test]
    fn test_empty_sequence() -> Result<(), ReconError> {
        let (clouds, accumulator) =
            stitch_batches(&LastPoseChainStitcher, Vec::<MergedBatch>::new())?;
        assert!(clouds.is_empty());
        assert!(accumulator.is_identity(0.0));
        Ok(())
    }
}
