use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pointcloud::PointCloud;

/// Error types for the voxel grid.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VoxelGridError {
    /// The leaf size must be strictly positive and finite.
    #[error("Leaf size must be positive and finite. Got: {0}")]
    InvalidLeafSize(f64),
}

/// How the points falling into the same voxel are reduced to one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoxelReduction {
    /// Keep the mean of all the points in the voxel.
    #[default]
    Centroid,
    /// Keep the first point, in input order, that fell into the voxel.
    First,
}

/// A cubic voxel grid for downsampling point clouds.
///
/// Voxels are aligned to the world origin, so two clouds downsampled with the same leaf size
/// share the same cell boundaries. The output lists one point per occupied voxel, ordered by
/// the first input point that touched each voxel, which makes the result a pure function of
/// the input order.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// The edge length of a voxel.
    leaf_size: f64,
    /// How points in a voxel are reduced.
    reduction: VoxelReduction,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with the specified leaf size.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelGridError::InvalidLeafSize`] if `leaf_size` is not positive or not finite.
    pub fn new(leaf_size: f64) -> Result<Self, VoxelGridError> {
        if !leaf_size.is_finite() || leaf_size <= 0.0 {
            return Err(VoxelGridError::InvalidLeafSize(leaf_size));
        }

        Ok(VoxelGrid {
            leaf_size,
            reduction: VoxelReduction::default(),
        })
    }

    /// Sets the reduction applied to the points of a voxel.
    pub fn with_reduction(mut self, reduction: VoxelReduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Gets the voxel grid leaf size.
    pub fn leaf_size(&self) -> f64 {
        self.leaf_size
    }

    /// Gets the reduction applied to the points of a voxel.
    pub fn reduction(&self) -> VoxelReduction {
        self.reduction
    }

    /// Computes the voxel index for a given point.
    #[inline]
    pub fn get_voxel_index(&self, point: &[f64; 3]) -> [i64; 3] {
        [
            (point[0] / self.leaf_size).floor() as i64,
            (point[1] / self.leaf_size).floor() as i64,
            (point[2] / self.leaf_size).floor() as i64,
        ]
    }

    /// Downsamples the input point cloud keeping one point per occupied voxel.
    ///
    /// Points with non-finite coordinates are dropped.
    pub fn downsample(&self, point_cloud: &PointCloud) -> PointCloud {
        // voxel index -> slot in `cells`, cells kept in first-occurrence order
        let mut lookup: HashMap<[i64; 3], usize> = HashMap::new();
        let mut cells: Vec<([f64; 3], usize)> = Vec::new();

        for point in point_cloud.points() {
            if !point.iter().all(|v| v.is_finite()) {
                continue;
            }

            let key = self.get_voxel_index(point);
            let slot = *lookup.entry(key).or_insert_with(|| {
                cells.push(([0.0; 3], 0));
                cells.len() - 1
            });

            let (acc, count) = &mut cells[slot];
            match self.reduction {
                VoxelReduction::Centroid => {
                    acc[0] += point[0];
                    acc[1] += point[1];
                    acc[2] += point[2];
                }
                VoxelReduction::First => {
                    if *count == 0 {
                        *acc = *point;
                    }
                }
            }
            *count += 1;
        }

        cells
            .into_iter()
            .map(|(acc, count)| match self.reduction {
                VoxelReduction::Centroid => {
                    let inv_count = 1.0 / count as f64;
                    [acc[0] * inv_count, acc[1] * inv_count, acc[2] * inv_count]
                }
                VoxelReduction::First => acc,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_downsample_centroid() -> Result<(), VoxelGridError> {
        let pointcloud = PointCloud::new(vec![
            [0.0, 0.0, 0.0],
            [0.1, 0.1, 0.1],
            [1.0, 1.0, 1.0],
            [1.1, 1.1, 1.1],
        ]);

        let downsampled = VoxelGrid::new(1.0)?.downsample(&pointcloud);

        assert_eq!(downsampled.len(), 2);
        let p0 = downsampled.points()[0];
        let p1 = downsampled.points()[1];
        assert!((p0[0] - 0.05).abs() < 1e-12);
        assert!((p1[2] - 1.05).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_downsample_first() -> Result<(), VoxelGridError> {
        let pointcloud = PointCloud::new(vec![
            [0.2, 0.2, 0.2],
            [5.0, 5.0, 5.0],
            [0.1, 0.1, 0.1],
        ]);
        let grid = VoxelGrid::new(1.0)?.with_reduction(VoxelReduction::First);
        let downsampled = grid.downsample(&pointcloud);
        assert_eq!(downsampled.points(), &[[0.2, 0.2, 0.2], [5.0, 5.0, 5.0]]);
        Ok(())
    }

    #[test]
    fn test_negative_coordinates() -> Result<(), VoxelGridError> {
        let grid = VoxelGrid::new(0.5)?;
        assert_eq!(grid.get_voxel_index(&[-0.1, 0.1, -0.6]), [-1, 0, -2]);

        // the two points straddle the origin and must not be merged
        let downsampled =
            grid.downsample(&PointCloud::new(vec![[-0.1, 0.0, 0.0], [0.1, 0.0, 0.0]]));
        assert_eq!(downsampled.len(), 2);
        Ok(())
    }

    #[test]
    fn test_non_finite_points_are_dropped() -> Result<(), VoxelGridError> {
        let pointcloud = PointCloud::new(vec![[f64::NAN, 0.0, 0.0], [0.0, f64::INFINITY, 0.0]]);
        assert!(VoxelGrid::new(1.0)?.downsample(&pointcloud).is_empty());
        Ok(())
    }

    #[test]
    fn test_downsample_is_idempotent() -> Result<(), VoxelGridError> {
        let mut rng = StdRng::seed_from_u64(3);
        let pointcloud: PointCloud = (0..5000)
            .map(|_| {
                [
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(0.0..4.0),
                ]
            })
            .collect();

        for reduction in [VoxelReduction::Centroid, VoxelReduction::First] {
            let grid = VoxelGrid::new(0.25)?.with_reduction(reduction);
            let once = grid.downsample(&pointcloud);
            let twice = grid.downsample(&once);
            assert!(once.len() < pointcloud.len());
            assert_eq!(once.len(), twice.len());
        }
        Ok(())
    }

    #[test]
    fn test_invalid_leaf_size() {
        assert_eq!(
            VoxelGrid::new(0.0).err(),
            Some(VoxelGridError::InvalidLeafSize(0.0))
        );
        assert!(VoxelGrid::new(-1.0).is_err());
        assert!(VoxelGrid::new(f64::NAN).is_err());
    }
}
