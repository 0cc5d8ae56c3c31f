// Error codes follow the gRPC status codes so that callers of the codec and
// of the service layer can handle failures generically.
// https://grpc.github.io/grpc/core/md_doc_statuscodes.html
use std::error::Error;

#[cfg(feature = "validator")]
mod validator;
#[cfg(feature = "validator")]
pub use validator::*;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorCodes {
    // OK is returned on success, we use "Success" since Ok is a keyword in Rust.
    Success = 0,
    // CANCELLED indicates the operation was cancelled (typically by the caller).
    Cancelled = 1,
    // UNKNOWN indicates an unknown error.
    Unknown = 2,
    // INVALID_ARGUMENT indicates client specified an invalid argument.
    InvalidArgument = 3,
    // DEADLINE_EXCEEDED means operation expired before completion.
    DeadlineExceeded = 4,
    // NOT_FOUND means some requested entity (e.g., a dumped model) was not found.
    NotFound = 5,
    // ALREADY_EXISTS means an entity that we attempted to create already exists.
    AlreadyExists = 6,
    // PERMISSION_DENIED indicates the caller does not have permission to execute the specified operation.
    PermissionDenied = 7,
    // RESOURCE_EXHAUSTED indicates some resource has been exhausted.
    ResourceExhausted = 8,
    // FAILED_PRECONDITION indicates the system is not in a state required for the operation,
    // e.g. encoding with an encoder that was never trained.
    FailedPrecondition = 9,
    // ABORTED indicates the operation was aborted.
    Aborted = 10,
    // OUT_OF_RANGE means operation was attempted past the valid range.
    OutOfRange = 11,
    // UNIMPLEMENTED indicates operation is not implemented or not supported/enabled.
    Unimplemented = 12,
    // INTERNAL errors are internal errors.
    Internal = 13,
    // UNAVAILABLE indicates a component is currently unavailable.
    Unavailable = 14,
    // DATA_LOSS indicates unrecoverable data loss or corruption.
    DataLoss = 15,
    // UNAUTHENTICATED indicates the request does not have valid authentication credentials for the operation.
    Unauthenticated = 16,
}

impl ErrorCodes {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCodes::InvalidArgument => "InvalidArgumentError",
            ErrorCodes::NotFound => "NotFoundError",
            ErrorCodes::FailedPrecondition => "FailedPreconditionError",
            ErrorCodes::Internal => "InternalError",
            _ => "NesError",
        }
    }
}

pub trait NesError: Error + Send {
    fn code(&self) -> ErrorCodes;
    fn boxed(self) -> Box<dyn NesError>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
    fn should_trace_error(&self) -> bool {
        true
    }
}

impl Error for Box<dyn NesError> {}

impl NesError for Box<dyn NesError> {
    fn code(&self) -> ErrorCodes {
        self.as_ref().code()
    }

    fn should_trace_error(&self) -> bool {
        self.as_ref().should_trace_error()
    }
}

impl NesError for std::io::Error {
    fn code(&self) -> ErrorCodes {
        match self.kind() {
            std::io::ErrorKind::NotFound => ErrorCodes::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCodes::PermissionDenied,
            _ => ErrorCodes::Unknown,
        }
    }
}
