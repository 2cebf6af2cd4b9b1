/// Error type for the linear algebra operations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LinalgError {
    /// The matrix cannot be inverted.
    #[error("matrix is singular (determinant = {determinant})")]
    SingularMatrix {
        /// Determinant of the offending matrix.
        determinant: f64,
    },

    /// Source and destination buffers must have the same length.
    #[error("source and destination have different lengths: {0} != {1}")]
    LengthMismatch(usize, usize),

    /// A rotation axis must not be the zero vector.
    #[error("cannot compute rotation matrix from a zero vector")]
    ZeroAxis,
}
