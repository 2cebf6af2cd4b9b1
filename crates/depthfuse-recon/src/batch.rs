use std::fs::File;
use std::path::{Path, PathBuf};

use depthfuse_3d::depth::{DepthError, DepthImage};
use ndarray::{Array3, ArrayD, ArrayView2, Axis, Ix3, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpzError};

use crate::pose::Extrinsic;

/// Errors raised while loading a batch artifact.
///
/// All of them are recoverable at the run level: the offending file is skipped.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The input path does not exist.
    #[error("Input file does not exist: {0}")]
    MissingInput(PathBuf),

    /// The input file exists but could not be opened.
    #[error("Failed to open input file. {0}")]
    Io(#[from] std::io::Error),

    /// The container is unreadable, e.g. a truncated or partially written archive.
    #[error("Failed to read npz container. {0}")]
    Npz(#[from] ReadNpzError),

    /// A required array is not present in the container.
    #[error("Missing array '{0}'")]
    MissingArray(&'static str),

    /// Arrays have an unsupported rank or inner shape, or disagree on frame count or size.
    #[error("Shape error: {0}")]
    Shape(String),
}

/// Entry name of the per-frame depth maps.
pub const DEPTH_KEY: &str = "depth";
/// Entry name of the optional per-frame confidence maps.
pub const CONFIDENCE_KEY: &str = "conf";
/// Entry name of the world-to-camera extrinsics.
pub const EXTRINSICS_KEY: &str = "extrinsics";
/// Entry name of the pinhole intrinsics.
pub const INTRINSICS_KEY: &str = "intrinsics";

/// The contents of one batch artifact: N depth maps of the same size with their cameras.
///
/// Depth and confidence values are stored contiguously in `[frame, row, col]` order.
/// Extrinsics and intrinsics stored without a frame dimension are shared by every frame.
#[derive(Debug, Clone)]
pub struct FrameBatch {
    depth: Vec<f32>,
    confidence: Option<Vec<f32>>,
    extrinsics: Vec<Extrinsic>,
    intrinsics: Vec<[[f64; 3]; 3]>,
    num_frames: usize,
    height: usize,
    width: usize,
}

impl FrameBatch {
    /// Load a batch from an `.npz` container.
    ///
    /// The container must hold `depth`, `extrinsics` and `intrinsics` and may hold `conf`.
    /// Entry names are matched with or without the `.npy` suffix, and every array may be
    /// stored as `float32` or `float64`.
    ///
    /// # Errors
    ///
    /// * [`BatchError::MissingInput`] if the path does not exist.
    /// * [`BatchError::Npz`] if the container or one of its arrays cannot be decoded.
    /// * [`BatchError::MissingArray`] if a required array is absent.
    /// * [`BatchError::Shape`] if the arrays are inconsistent.
    pub fn from_npz(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BatchError::MissingInput(path.to_path_buf()));
        }

        let mut npz = NpzReader::new(File::open(path)?)?;
        let names = npz.names()?;

        let depth =
            read_f32(&mut npz, &names, DEPTH_KEY)?.ok_or(BatchError::MissingArray(DEPTH_KEY))?;
        let confidence = read_f32(&mut npz, &names, CONFIDENCE_KEY)?;
        let extrinsics = read_f64(&mut npz, &names, EXTRINSICS_KEY)?
            .ok_or(BatchError::MissingArray(EXTRINSICS_KEY))?;
        let intrinsics = read_f64(&mut npz, &names, INTRINSICS_KEY)?
            .ok_or(BatchError::MissingArray(INTRINSICS_KEY))?;

        let batch = Self::from_parts(depth, confidence, extrinsics, intrinsics)?;
        log::debug!(
            "Loaded {}: {} frames of {}x{}{}",
            path.display(),
            batch.num_frames,
            batch.width,
            batch.height,
            if batch.confidence.is_some() { " with confidence" } else { "" }
        );
        Ok(batch)
    }

    /// Build a batch from in-memory arrays.
    ///
    /// # Arguments
    ///
    /// * `depth` - `[N, H, W]` or `[H, W]` depth maps.
    /// * `confidence` - Optional confidence maps with the same shape as `depth`.
    /// * `extrinsics` - `[N, 3, 4]`, `[N, 4, 4]`, `[3, 4]` or `[4, 4]` world-to-camera matrices.
    /// * `intrinsics` - `[N, 3, 3]` or `[3, 3]` pinhole matrices.
    ///
    /// Rank-2 inputs gain a leading frame dimension of one; a rank-2 extrinsic or intrinsic
    /// is then shared by all frames.
    pub fn from_parts(
        depth: ArrayD<f32>,
        confidence: Option<ArrayD<f32>>,
        extrinsics: ArrayD<f64>,
        intrinsics: ArrayD<f64>,
    ) -> Result<Self, BatchError> {
        let (depth, _) = with_frame_axis(depth, DEPTH_KEY)?;
        let (num_frames, height, width) = depth.dim();

        let confidence = match confidence {
            Some(conf) => {
                let (conf, _) = with_frame_axis(conf, CONFIDENCE_KEY)?;
                if conf.dim() != depth.dim() {
                    return Err(BatchError::Shape(format!(
                        "conf has shape {:?}, depth has shape {:?}",
                        conf.shape(),
                        depth.shape()
                    )));
                }
                Some(conf.iter().copied().collect())
            }
            None => None,
        };

        let (extrinsics, shared) = with_frame_axis(extrinsics, EXTRINSICS_KEY)?;
        check_frame_count(EXTRINSICS_KEY, extrinsics.len_of(Axis(0)), shared, num_frames)?;
        let extrinsics: Vec<Extrinsic> = match (extrinsics.shape()[1], extrinsics.shape()[2]) {
            (3, 4) => extrinsics
                .outer_iter()
                .map(|m| Extrinsic::Affine(matrix_rows(m)))
                .collect(),
            (4, 4) => extrinsics
                .outer_iter()
                .map(|m| Extrinsic::Homogeneous(matrix_rows(m)))
                .collect(),
            (rows, cols) => {
                return Err(BatchError::Shape(format!(
                    "extrinsics must be 3x4 or 4x4, got {rows}x{cols}"
                )))
            }
        };

        let (intrinsics, shared) = with_frame_axis(intrinsics, INTRINSICS_KEY)?;
        check_frame_count(INTRINSICS_KEY, intrinsics.len_of(Axis(0)), shared, num_frames)?;
        if intrinsics.shape()[1..] != [3, 3] {
            return Err(BatchError::Shape(format!(
                "intrinsics must be 3x3, got {:?}",
                &intrinsics.shape()[1..]
            )));
        }
        let intrinsics: Vec<[[f64; 3]; 3]> = intrinsics.outer_iter().map(matrix_rows).collect();

        Ok(Self {
            depth: depth.iter().copied().collect(),
            confidence,
            extrinsics,
            intrinsics,
            num_frames,
            height,
            width,
        })
    }

    /// Number of frames N.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Height of every depth map.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width of every depth map.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether the batch carries confidence maps.
    pub fn has_confidence(&self) -> bool {
        self.confidence.is_some()
    }

    /// The depth map of frame `index`.
    ///
    /// PRECONDITION: `index < self.num_frames()`.
    pub fn depth(&self, index: usize) -> Result<DepthImage<'_>, DepthError> {
        DepthImage::new(self.frame_slice(&self.depth, index), self.width, self.height)
    }

    /// The confidence map of frame `index`, if the batch has one.
    ///
    /// PRECONDITION: `index < self.num_frames()`.
    pub fn confidence(&self, index: usize) -> Option<Result<DepthImage<'_>, DepthError>> {
        self.confidence
            .as_ref()
            .map(|conf| DepthImage::new(self.frame_slice(conf, index), self.width, self.height))
    }

    /// The world-to-camera extrinsic of frame `index`.
    ///
    /// PRECONDITION: `index < self.num_frames()`.
    pub fn extrinsic(&self, index: usize) -> Extrinsic {
        self.extrinsics[self.matrix_index(self.extrinsics.len(), index)]
    }

    /// The pinhole intrinsic matrix of frame `index`.
    ///
    /// PRECONDITION: `index < self.num_frames()`.
    pub fn intrinsic(&self, index: usize) -> [[f64; 3]; 3] {
        self.intrinsics[self.matrix_index(self.intrinsics.len(), index)]
    }

    fn frame_slice<'a>(&self, data: &'a [f32], index: usize) -> &'a [f32] {
        let frame_len = self.width * self.height;
        &data[index * frame_len..(index + 1) * frame_len]
    }

    fn matrix_index(&self, count: usize, index: usize) -> usize {
        if count == 1 {
            0
        } else {
            index
        }
    }
}

/// Promote a rank-2 array to `[1, ...]`, returning whether the promotion happened.
fn with_frame_axis<A>(array: ArrayD<A>, name: &str) -> Result<(Array3<A>, bool), BatchError> {
    let (array, promoted) = match array.ndim() {
        2 => (array.insert_axis(Axis(0)), true),
        3 => (array, false),
        rank => {
            return Err(BatchError::Shape(format!(
                "{name} must have rank 2 or 3, got rank {rank} with shape {:?}",
                array.shape()
            )))
        }
    };
    let array = array
        .into_dimensionality::<Ix3>()
        .map_err(|e| BatchError::Shape(format!("{name}: {e}")))?;
    Ok((array, promoted))
}

/// Copy a `R x C` matrix view into row-major arrays.
///
/// PRECONDITION: `matrix.dim() == (R, C)`.
fn matrix_rows<const R: usize, const C: usize>(matrix: ArrayView2<f64>) -> [[f64; C]; R] {
    std::array::from_fn(|r| std::array::from_fn(|c| matrix[[r, c]]))
}

fn check_frame_count(
    name: &str,
    count: usize,
    shared: bool,
    num_frames: usize,
) -> Result<(), BatchError> {
    if count == num_frames || shared {
        return Ok(());
    }
    Err(BatchError::Shape(format!(
        "{name} has {count} frames, depth has {num_frames}"
    )))
}

fn entry_index(names: &[String], key: &str) -> Option<usize> {
    names
        .iter()
        .position(|name| name == key || name.strip_suffix(".npy") == Some(key))
}

fn read_f32(
    npz: &mut NpzReader<File>,
    names: &[String],
    key: &str,
) -> Result<Option<ArrayD<f32>>, BatchError> {
    let Some(index) = entry_index(names, key) else {
        return Ok(None);
    };
    let array = match npz.by_index::<OwnedRepr<f32>, IxDyn>(index) {
        Ok(array) => array,
        Err(err) => npz
            .by_index::<OwnedRepr<f64>, IxDyn>(index)
            .map(|array| array.mapv(|v| v as f32))
            .map_err(|_| err)?,
    };
    Ok(Some(array))
}

fn read_f64(
    npz: &mut NpzReader<File>,
    names: &[String],
    key: &str,
) -> Result<Option<ArrayD<f64>>, BatchError> {
    let Some(index) = entry_index(names, key) else {
        return Ok(None);
    };
    let array = match npz.by_index::<OwnedRepr<f64>, IxDyn>(index) {
        Ok(array) => array,
        Err(err) => npz
            .by_index::<OwnedRepr<f32>, IxDyn>(index)
            .map(|array| array.mapv(f64::from))
            .map_err(|_| err)?,
    };
    Ok(Some(array))
}
