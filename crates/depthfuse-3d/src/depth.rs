use serde::{Deserialize, Serialize};

use crate::{camera::PinholeCamera, pointcloud::PointCloud};

/// Error types for depth images and backprojection.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DepthError {
    /// The pixel stride must be at least one.
    #[error("Pixel stride must be >= 1")]
    InvalidStride,

    /// The buffer length does not match the image size, or two images differ in size.
    #[error("Image size mismatch: expected {expected} values, got {actual}")]
    SizeMismatch {
        /// Expected number of values.
        expected: usize,
        /// Actual number of values.
        actual: usize,
    },

    /// The focal lengths must be finite and non-zero.
    #[error("Invalid focal length ({0}, {1})")]
    InvalidFocalLength(f64, f64),
}

/// A borrowed single-channel image stored in row-major order.
///
/// Used for both depth maps and the per-pixel confidence maps produced alongside them.
#[derive(Debug, Clone, Copy)]
pub struct DepthImage<'a> {
    data: &'a [f32],
    width: usize,
    height: usize,
}

impl<'a> DepthImage<'a> {
    /// Wraps a row-major buffer of `width * height` values.
    pub fn new(data: &'a [f32], width: usize, height: usize) -> Result<Self, DepthError> {
        if data.len() != width * height {
            return Err(DepthError::SizeMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// The raw row-major values.
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Get the value at a specific pixel.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }
}

/// Policy for gating pixels on the confidence map that accompanies a depth map.
///
/// Whether the depth model's `conf` output is a confidence (higher is better) or an
/// uncertainty (lower is better) is not settled, so no policy is applied unless one is
/// chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "threshold", rename_all = "snake_case")]
pub enum ConfidenceFilter {
    /// Keep every pixel regardless of its confidence value.
    #[default]
    Disabled,
    /// Treat the map as a confidence and keep pixels with a value `>= threshold`.
    MinConfidence(f32),
    /// Treat the map as an uncertainty and keep pixels with a value `<= threshold`.
    MaxUncertainty(f32),
}

impl ConfidenceFilter {
    /// Whether a pixel with the given confidence value passes the filter.
    #[inline]
    pub fn accepts(&self, value: f32) -> bool {
        match *self {
            ConfidenceFilter::Disabled => true,
            ConfidenceFilter::MinConfidence(threshold) => value >= threshold,
            ConfidenceFilter::MaxUncertainty(threshold) => value <= threshold,
        }
    }

    /// Whether the filter is applied at all.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ConfidenceFilter::Disabled)
    }
}

/// Parameters of [`backproject_depth`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackprojectParams {
    /// Visit only pixels whose row and column are multiples of `stride`.
    pub stride: usize,
    /// Raw depth values are divided by this factor.
    pub depth_scale: f64,
    /// Points with a scaled depth above this value are discarded.
    pub depth_trunc: f64,
    /// Confidence gating policy.
    pub confidence: ConfidenceFilter,
}

impl Default for BackprojectParams {
    fn default() -> Self {
        Self {
            stride: 4,
            depth_scale: 1.0,
            depth_trunc: 20.0,
            confidence: ConfidenceFilter::Disabled,
        }
    }
}

/// Upper bound on the number of points [`backproject_depth`] can produce.
pub fn max_backprojected_points(width: usize, height: usize, stride: usize) -> usize {
    if stride == 0 {
        return 0;
    }
    width.div_ceil(stride) * height.div_ceil(stride)
}

/// Backproject a depth map into a camera-space point cloud.
///
/// For every visited pixel at row `r` and column `c` with scaled depth `d`:
/// `X = (c - cx) * d / fx`, `Y = (r - cy) * d / fy`, `Z = d`.
/// Pixels with `d <= 0`, a NaN depth, or `d > depth_trunc` are discarded. Points are
/// emitted in row-major scan order.
///
/// # Arguments
///
/// * `depth` - The depth map.
/// * `confidence` - Optional confidence map, only consulted when `params.confidence` is enabled.
/// * `camera` - The pinhole intrinsics of the frame.
/// * `params` - Stride, scale, truncation and confidence policy.
///
/// Example:
///
/// ```
/// use depthfuse_3d::camera::PinholeCamera;
/// use depthfuse_3d::depth::{backproject_depth, BackprojectParams, DepthImage};
///
/// let data = vec![2.0f32; 4 * 4];
/// let depth = DepthImage::new(&data, 4, 4).unwrap();
/// let camera = PinholeCamera::new(1.0, 1.0, 0.0, 0.0).unwrap();
/// let params = BackprojectParams { stride: 2, ..Default::default() };
/// let cloud = backproject_depth(&depth, None, &camera, &params).unwrap();
/// assert_eq!(cloud.len(), 4);
/// ```
pub fn backproject_depth(
    depth: &DepthImage,
    confidence: Option<&DepthImage>,
    camera: &PinholeCamera,
    params: &BackprojectParams,
) -> Result<PointCloud, DepthError> {
    if params.stride == 0 {
        return Err(DepthError::InvalidStride);
    }

    let confidence = match confidence {
        Some(conf) if params.confidence.is_enabled() => {
            if conf.width() != depth.width() || conf.height() != depth.height() {
                return Err(DepthError::SizeMismatch {
                    expected: depth.width() * depth.height(),
                    actual: conf.width() * conf.height(),
                });
            }
            Some(conf)
        }
        _ => None,
    };

    let mut points = PointCloud::with_capacity(max_backprojected_points(
        depth.width(),
        depth.height(),
        params.stride,
    ));

    for r in (0..depth.height()).step_by(params.stride) {
        for c in (0..depth.width()).step_by(params.stride) {
            let d = depth.get(r, c) as f64 / params.depth_scale;

            // written so that NaN depths are rejected too
            if !(d > 0.0 && d <= params.depth_trunc) {
                continue;
            }

            if let Some(conf) = confidence {
                if !params.confidence.accepts(conf.get(r, c)) {
                    continue;
                }
            }

            points.push(camera.unproject(c as f64, r as f64, d));
        }
    }

    Ok(points)
}
