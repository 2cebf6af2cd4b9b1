use crate::depth::DepthError;

/// The intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    /// Focal length along x, in pixels.
    pub fx: f64,
    /// Focal length along y, in pixels.
    pub fy: f64,
    /// Principal point x coordinate, in pixels.
    pub cx: f64,
    /// Principal point y coordinate, in pixels.
    pub cy: f64,
}

impl PinholeCamera {
    /// Creates a new camera from its focal lengths and principal point.
    ///
    /// # Errors
    ///
    /// Returns [`DepthError::InvalidFocalLength`] if a focal length is zero or not finite.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, DepthError> {
        if !fx.is_finite() || !fy.is_finite() || fx == 0.0 || fy == 0.0 {
            return Err(DepthError::InvalidFocalLength(fx, fy));
        }
        Ok(Self { fx, fy, cx, cy })
    }

    /// Reads the parameters from a row-major 3x3 camera matrix `K`.
    ///
    /// fx = K[0][0], fy = K[1][1], cx = K[0][2], cy = K[1][2]. Skew is ignored.
    pub fn from_matrix(k: &[[f64; 3]; 3]) -> Result<Self, DepthError> {
        Self::new(k[0][0], k[1][1], k[0][2], k[1][2])
    }

    /// Returns the row-major 3x3 camera matrix.
    pub fn camera_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Lifts pixel `(u, v)` = (column, row) at depth `d` to a camera-space point.
    #[inline]
    pub fn unproject(&self, u: f64, v: f64, d: f64) -> [f64; 3] {
        [(u - self.cx) * d / self.fx, (v - self.cy) * d / self.fy, d]
    }

    /// Projects a camera-space point to pixel `(u, v)` = (column, row).
    ///
    /// Returns `None` for points on or behind the image plane.
    #[inline]
    pub fn project(&self, point: &[f64; 3]) -> Option<[f64; 2]> {
        if point[2] <= 0.0 {
            return None;
        }
        Some([
            self.fx * point[0] / point[2] + self.cx,
            self.fy * point[1] / point[2] + self.cy,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_matrix() -> Result<(), DepthError> {
        let k = [[500.0, 0.0, 320.0], [0.0, 510.0, 240.0], [0.0, 0.0, 1.0]];
        let camera = PinholeCamera::from_matrix(&k)?;
        assert_eq!(camera.fx, 500.0);
        assert_eq!(camera.fy, 510.0);
        assert_eq!(camera.cx, 320.0);
        assert_eq!(camera.cy, 240.0);
        assert_eq!(camera.camera_matrix(), k);
        Ok(())
    }

    #[test]
    fn test_unproject_project() -> Result<(), DepthError> {
        let camera = PinholeCamera::new(100.0, 120.0, 50.0, 40.0)?;
        for &(u, v, d) in &[(0.0, 0.0, 1.0), (13.0, 77.0, 5.5), (99.0, 3.0, 0.25)] {
            let p = camera.unproject(u, v, d);
            assert_relative_eq!(p[2], d);
            let uv = camera.project(&p).unwrap();
            assert_relative_eq!(uv[0], u, epsilon = 1e-9);
            assert_relative_eq!(uv[1], v, epsilon = 1e-9);
        }
        assert!(camera.project(&[0.0, 0.0, -1.0]).is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_focal_length() {
        assert!(PinholeCamera::new(0.0, 1.0, 0.0, 0.0).is_err());
        assert!(PinholeCamera::new(1.0, f64::NAN, 0.0, 0.0).is_err());
    }
}
