use depthfuse_linalg::{LinalgError, RigidTransform};

/// A per-frame world-to-camera extrinsic as stored in a batch artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extrinsic {
    /// A 3x4 `[R | t]` matrix in row-major order.
    Affine([[f64; 4]; 3]),
    /// A full 4x4 homogeneous matrix in row-major order.
    Homogeneous([[f64; 4]; 4]),
}

impl Extrinsic {
    /// The world-to-camera transform, promoting a 3x4 matrix with a `[0, 0, 0, 1]` row.
    ///
    /// A 4x4 matrix is taken as stored, bottom row included.
    pub fn world_to_camera(&self) -> RigidTransform {
        match self {
            Extrinsic::Affine(rows) => RigidTransform::from_rows_3x4(rows),
            Extrinsic::Homogeneous(rows) => RigidTransform::from_rows(rows),
        }
    }
}

/// Resolve the camera-to-world pose of a frame by inverting its world-to-camera extrinsic.
///
/// # Errors
///
/// Returns [`LinalgError::SingularMatrix`] when the extrinsic cannot be inverted. Callers
/// skip the frame in that case.
///
/// Example:
///
/// ```
/// use depthfuse_recon::pose::{camera_to_world, Extrinsic};
///
/// let w2c = Extrinsic::Affine([
///     [1.0, 0.0, 0.0, -2.0],
///     [0.0, 1.0, 0.0, 0.0],
///     [0.0, 0.0, 1.0, 0.0],
/// ]);
/// let c2w = camera_to_world(&w2c).unwrap();
/// assert_eq!(c2w.translation(), [2.0, 0.0, 0.0]);
/// ```
pub fn camera_to_world(extrinsic: &Extrinsic) -> Result<RigidTransform, LinalgError> {
    extrinsic.world_to_camera().try_inverse()
}
