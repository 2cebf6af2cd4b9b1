#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use depthfuse_3d as k3d;

#[doc(inline)]
pub use depthfuse_linalg as linalg;

#[doc(inline)]
pub use depthfuse_recon as recon;
