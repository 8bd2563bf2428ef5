//! Error types
//!
//! Every failure in this crate is structural: a tensor whose shape does not
//! line up with the model, or a configuration that cannot build one. None of
//! them are retryable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DkvmnError {
    #[error("dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("batch size mismatch: expected {expected}, got {actual}")]
    BatchMismatch { expected: usize, actual: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("sequence has no timesteps")]
    EmptySequence,
    #[error("snapshot decode failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DkvmnError>;

/// Fail with [`DkvmnError::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn ensure_dim(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DkvmnError::DimensionMismatch {
            context,
            expected,
            actual,
        })
    }
}

/// Fail with [`DkvmnError::BatchMismatch`] unless `actual == expected`.
pub(crate) fn ensure_batch(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DkvmnError::BatchMismatch { expected, actual })
    }
}
