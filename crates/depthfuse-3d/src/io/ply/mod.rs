mod parser;
mod properties;
mod writer;

pub use parser::*;
pub use properties::*;
pub use writer::*;

/// Error types for the PLY module.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// Failed to read or write the PLY file
    #[error("Failed to access PLY file. {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize a vertex
    #[error("Failed to serialize PLY vertex. {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Failed to deserialize a vertex
    #[error("Failed to deserialize PLY vertex. {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Unsupported PLY format or property
    #[error("Unsupported PLY format or property: {0}")]
    UnsupportedFormat(String),

    /// Malformed PLY header or body
    #[error("Malformed PLY file: {0}")]
    Malformed(String),
}
