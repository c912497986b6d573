//! Errors raised while servicing a boundary call

use beacon_core::BeaconError;
use ffi_support::{ErrorCode, ExternError, HandleError};
use thiserror::Error;

/// Why a boundary call could not be carried out
///
/// These never cross the boundary as values; they are turned into an
/// [`ExternError`], logged, and the caller sees a sentinel instead.
#[derive(Error, Debug)]
pub enum FfiError {
    #[error("Beacon has not been initialized")]
    NotInitialized,

    #[error("Null pointer passed for {0}")]
    NullPointer(&'static str),

    #[error("Null or invalid UTF-8 string passed for {0}")]
    InvalidString(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Handle error: {0:?}")]
    Handle(HandleError),

    #[error(transparent)]
    Beacon(#[from] BeaconError),
}

impl From<HandleError> for FfiError {
    fn from(e: HandleError) -> Self {
        FfiError::Handle(e)
    }
}

impl FfiError {
    /// Code reported through [`ExternError`]. 0 and -1 are reserved for
    /// success and panics.
    pub fn code(&self) -> ErrorCode {
        match self {
            FfiError::NotInitialized => ErrorCode::new(1),
            FfiError::NullPointer(_) => ErrorCode::new(2),
            FfiError::InvalidString(_) => ErrorCode::new(3),
            FfiError::InvalidArgument(_) => ErrorCode::new(4),
            FfiError::Beacon(_) => ErrorCode::new(5),
            FfiError::Handle(_) => ErrorCode::INVALID_HANDLE,
        }
    }
}

impl From<FfiError> for ExternError {
    fn from(e: FfiError) -> Self {
        ExternError::new_error(e.code(), e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FfiError>;
