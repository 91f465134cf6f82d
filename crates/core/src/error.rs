//! Vector math error types.

use thiserror::Error;

/// Errors raised by the vector math kernels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Operation requires at least one vector")]
    Empty,
}

pub type MathResult<T> = Result<T, MathError>;

/// Fail with [`MathError::DimensionMismatch`] unless both lengths agree.
#[inline]
pub fn ensure_same_len(expected: usize, got: usize) -> MathResult<()> {
    if expected != got {
        return Err(MathError::DimensionMismatch { expected, got });
    }
    Ok(())
}
