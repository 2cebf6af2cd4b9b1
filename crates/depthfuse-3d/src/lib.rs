#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera model.
pub mod camera;

/// Depth images and backprojection into camera space.
pub mod depth;

/// I/O utilities for reading and writing 3D data.
pub mod io;

/// Point cloud container.
pub mod pointcloud;

/// Voxel grid downsampling.
pub mod voxel_grid;
