//! PQ error types.

use tessera_core::MathError;
use thiserror::Error;

/// Errors raised while training or using a product quantizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PqError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Not enough training vectors: need at least {min}, got {got}")]
    TrainingSetTooSmall { min: usize, got: usize },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Decoded dot product is not available: model is globally centered or was trained without it")]
    FastPathMisuse,

    #[error("Invalid code length: expected {expected} bytes, got {got}")]
    InvalidCodeLength { expected: usize, got: usize },
}

impl From<MathError> for PqError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::DimensionMismatch { expected, got } => {
                PqError::DimensionMismatch { expected, got }
            }
            MathError::Empty => PqError::EmptyTrainingSet,
        }
    }
}

pub type PqResult<T> = Result<T, PqError>;
