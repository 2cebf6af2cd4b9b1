#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::LinalgError;

/// Rigid 4x4 homogeneous transforms.
pub mod rigid;
pub use rigid::{transform_points, RigidTransform};

/// Rotation parameterizations.
pub mod transforms;
