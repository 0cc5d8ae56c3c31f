use nes_error::{ErrorCodes, NesError};
use thiserror::Error;

use crate::device::DeviceBinding;
use crate::kmeans::KMeansError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DimensionError {
    #[error("Vector {index} has width {actual}, expected {expected}")]
    VectorWidth {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Vector width {k} is not a multiple of subspace width {m}")]
    Indivisible { k: usize, m: usize },
}

/// Failure of the accelerator execution context. Any such failure aborts the
/// whole `encode` call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to acquire execution context on {binding}: {reason}")]
    ContextUnavailable {
        binding: DeviceBinding,
        reason: String,
    },
    #[error("Batch {batch} failed on {binding}: {reason}")]
    BatchFailed {
        batch: usize,
        binding: DeviceBinding,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum PqError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(#[from] DimensionError),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Cannot train on an empty set of vectors")]
    EmptyTrainingSet,
    #[error("Encoder must be trained or loaded before encoding")]
    NotTrained,
    #[error("Accelerator backend failure: {0}")]
    BackendFailure(#[from] BackendError),
    #[error("Clustering subspace {subspace} failed: {source}")]
    KMeans {
        subspace: usize,
        #[source]
        source: KMeansError,
    },
}

impl NesError for PqError {
    fn code(&self) -> ErrorCodes {
        match self {
            PqError::InvalidDimension(_) => ErrorCodes::InvalidArgument,
            PqError::InvalidParameters(_) => ErrorCodes::InvalidArgument,
            PqError::EmptyTrainingSet => ErrorCodes::InvalidArgument,
            PqError::NotTrained => ErrorCodes::FailedPrecondition,
            PqError::BackendFailure(_) => ErrorCodes::Internal,
            PqError::KMeans { .. } => ErrorCodes::Internal,
        }
    }

    fn should_trace_error(&self) -> bool {
        !matches!(self, PqError::NotTrained)
    }
}
