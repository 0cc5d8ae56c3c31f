use crate::{ErrorCodes, NesError};
use thiserror::Error;

/// Rejected configuration values, e.g. a codebook size that does not fit in a byte.
#[derive(Debug, Error)]
#[error("Validation error: {0}")]
pub struct NesValidationError(#[from] validator::ValidationErrors);

impl NesError for NesValidationError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}
