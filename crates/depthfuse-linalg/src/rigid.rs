use glam::{DMat3, DMat4, DVec3, DVec4};

use crate::{transforms::axis_angle_to_rotation_matrix, LinalgError};

/// Determinants below this magnitude are treated as singular.
pub const SINGULAR_EPS: f64 = 1e-12;

/// A 4x4 homogeneous transform with the rotation in the upper-left block and the
/// translation in the last column.
///
/// The same type is used for both directions of a camera pose: world-to-camera as
/// stored by the depth model, and camera-to-world as obtained with [`RigidTransform::try_inverse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    matrix: DMat4,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        matrix: DMat4::IDENTITY,
    };

    /// Wrap an existing glam matrix.
    pub fn from_matrix(matrix: DMat4) -> Self {
        Self { matrix }
    }

    /// Create a transform from a row-major 4x4 matrix.
    pub fn from_rows(rows: &[[f64; 4]; 4]) -> Self {
        // glam stores columns, so the transposed row array is the column array
        Self {
            matrix: DMat4::from_cols_array_2d(rows).transpose(),
        }
    }

    /// Create a transform from a row-major 3x4 `[R|t]` matrix.
    ///
    /// The matrix is promoted to homogeneous form by appending the row `[0, 0, 0, 1]`.
    pub fn from_rows_3x4(rows: &[[f64; 4]; 3]) -> Self {
        Self::from_rows(&[rows[0], rows[1], rows[2], [0.0, 0.0, 0.0, 1.0]])
    }

    /// Create a transform from a row-major rotation matrix and a translation vector.
    pub fn from_rotation_translation(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> Self {
        let r = DMat3::from_cols_array_2d(rotation).transpose();
        let t = DVec3::from_array(*translation);
        Self {
            matrix: DMat4::from_cols(
                r.x_axis.extend(0.0),
                r.y_axis.extend(0.0),
                r.z_axis.extend(0.0),
                t.extend(1.0),
            ),
        }
    }

    /// Create a transform rotating by `angle` radians around `axis`, then translating.
    pub fn from_axis_angle(
        axis: &[f64; 3],
        angle: f64,
        translation: &[f64; 3],
    ) -> Result<Self, LinalgError> {
        let rotation = axis_angle_to_rotation_matrix(axis, angle)?;
        Ok(Self::from_rotation_translation(&rotation, translation))
    }

    /// Create a pure translation.
    pub fn from_translation(translation: &[f64; 3]) -> Self {
        Self {
            matrix: DMat4::from_translation(DVec3::from_array(*translation)),
        }
    }

    /// Get the underlying glam matrix.
    #[inline]
    pub fn matrix(&self) -> &DMat4 {
        &self.matrix
    }

    /// Get the transform as a row-major 4x4 array.
    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        self.matrix.transpose().to_cols_array_2d()
    }

    /// Get the rotation block as a row-major 3x3 array.
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let r = DMat3::from_mat4(self.matrix);
        r.transpose().to_cols_array_2d()
    }

    /// Get the translation column.
    pub fn translation(&self) -> [f64; 3] {
        self.matrix.w_axis.truncate().to_array()
    }

    /// Determinant of the full 4x4 matrix.
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Invert the transform.
    ///
    /// A general 4x4 inverse is used rather than the closed-form `[R^T | -R^T t]` since the
    /// stored matrices are not guaranteed to be orthonormal.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::SingularMatrix`] when the determinant is within
    /// [`SINGULAR_EPS`] of zero, is not finite, or the inverse contains non-finite values.
    pub fn try_inverse(&self) -> Result<Self, LinalgError> {
        let determinant = self.determinant();
        if !determinant.is_finite() || determinant.abs() < SINGULAR_EPS {
            return Err(LinalgError::SingularMatrix { determinant });
        }

        let inverse = self.matrix.inverse();
        if !inverse.is_finite() {
            return Err(LinalgError::SingularMatrix { determinant });
        }

        Ok(Self { matrix: inverse })
    }

    /// Compose two transforms as `self ∘ rhs`, i.e. the matrix product `self * rhs`.
    ///
    /// The resulting transform applies `rhs` first and `self` second.
    #[inline]
    pub fn compose(&self, rhs: &Self) -> Self {
        Self {
            matrix: self.matrix * rhs.matrix,
        }
    }

    /// Apply the transform to a single point.
    #[inline]
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        self.matrix
            .transform_point3(DVec3::from_array(*point))
            .to_array()
    }

    /// Check whether two transforms are element-wise equal within `max_abs_diff`.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f64) -> bool {
        self.matrix.abs_diff_eq(other.matrix, max_abs_diff)
    }

    /// Whether the transform is the identity within `max_abs_diff`.
    pub fn is_identity(&self, max_abs_diff: f64) -> bool {
        self.abs_diff_eq(&Self::IDENTITY, max_abs_diff)
    }

    /// Whether the last row is `[0, 0, 0, 1]` within `max_abs_diff`.
    pub fn is_homogeneous(&self, max_abs_diff: f64) -> bool {
        self.matrix
            .row(3)
            .abs_diff_eq(DVec4::new(0.0, 0.0, 0.0, 1.0), max_abs_diff)
    }
}

impl std::ops::Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(&rhs)
    }
}

/// Transform a set of points with a rigid transform.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `transform` - The transform to apply.
/// * `dst_points` - A pre-allocated buffer of the same length as `src_points`.
///
/// Example:
///
/// ```
/// use depthfuse_linalg::{transform_points, RigidTransform};
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let transform = RigidTransform::from_translation(&[1.0, 0.0, 0.0]);
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &transform, &mut dst_points).unwrap();
/// assert_eq!(dst_points[0], [3.0, 2.0, 2.0]);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    transform: &RigidTransform,
    dst_points: &mut [[f64; 3]],
) -> Result<(), LinalgError> {
    if src_points.len() != dst_points.len() {
        return Err(LinalgError::LengthMismatch(
            src_points.len(),
            dst_points.len(),
        ));
    }

    src_points
        .iter()
        .zip(dst_points.iter_mut())
        .for_each(|(src, dst)| *dst = transform.transform_point(src));

    Ok(())
}
