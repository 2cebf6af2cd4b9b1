use crate::LinalgError;

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It does not need to be normalized.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The row-major rotation matrix.
///
/// Example:
///
/// ```
/// use depthfuse_linalg::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], LinalgError> {
    let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
    if magnitude < 1e-10 {
        return Err(LinalgError::ZeroAxis);
    }

    let x = axis[0] / magnitude;
    let y = axis[1] / magnitude;
    let z = axis[2] / magnitude;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    // Rodrigues' formula, expanded
    let xy = x * y * t;
    let xz = x * z * t;
    let yz = y * z * t;

    Ok([
        [c + x * x * t, xy - z * s, xz + y * s],
        [xy + z * s, c + y * y * t, yz - x * s],
        [xz - y * s, yz + x * s, c + z * z * t],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_angle_quarter_turn_x() -> Result<(), LinalgError> {
        let rotation =
            axis_angle_to_rotation_matrix(&[2.0, 0.0, 0.0], std::f64::consts::FRAC_PI_2)?;
        let expected = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotation[i][j], expected[i][j], epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_axis_angle_zero_axis() {
        let res = axis_angle_to_rotation_matrix(&[0.0, 0.0, 0.0], 1.0);
        assert_eq!(res, Err(LinalgError::ZeroAxis));
    }
}
