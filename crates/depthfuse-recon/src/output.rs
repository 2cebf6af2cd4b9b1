use std::path::Path;

use depthfuse_3d::{
    io::ply::{write_ply, PlyEncoding},
    pointcloud::PointCloud,
    voxel_grid::VoxelGrid,
};

use crate::ReconError;

/// Union the aligned batch clouds and downsample the result once more.
///
/// Overlapping batches contribute points to the same voxels, so the final pass keeps the
/// density uniform across batch boundaries.
pub fn merge_clouds<I>(clouds: I, grid: &VoxelGrid) -> PointCloud
where
    I: IntoIterator<Item = PointCloud>,
{
    let mut union = PointCloud::default();
    for cloud in clouds {
        union.merge(cloud);
    }
    let merged = grid.downsample(&union);
    log::debug!(
        "Final downsampling: {} -> {} points",
        union.len(),
        merged.len()
    );
    merged
}

/// Write the final cloud as a PLY file.
pub fn write_output(
    path: impl AsRef<Path>,
    cloud: &PointCloud,
    encoding: PlyEncoding,
) -> Result<(), ReconError> {
    let path = path.as_ref();
    write_ply(path, cloud, encoding)?;
    log::info!(
        "Wrote {} points to {} ({})",
        cloud.len(),
        path.display(),
        encoding.keyword()
    );
    Ok(())
}
