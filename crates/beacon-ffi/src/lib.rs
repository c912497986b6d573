//! Beacon C ABI
//!
//! Exposes a process-wide [`beacon_core::Beacon`] to hosts that can only call
//! C functions. The boundary is built on `ffi_support`:
//! - objects live in its `ConcurrentHandleMap`s and cross as `u64` tokens
//! - strings come in as `FfiStr` and go out as owned C strings freed with
//!   `beacon_str_free`
//! - upload work is pulled with `beacon_get_upload_task` and acknowledged
//!   with `beacon_process_ping_upload_response`
//!
//! No call ever unwinds into the host. Errors and panics are caught into an
//! `ExternError`, logged, and the call returns a sentinel (0, null or `Done`).
//! Handle destructors also report through an `ExternError` out-parameter.

pub mod error;
pub mod fail_open;
pub mod global;
pub mod host;
pub mod metrics;
pub mod ping_type;
pub mod strings;
pub mod upload;

pub use error::{FfiError, Result};
pub use ffi_support::{ByteBuffer, ErrorCode, ExternError, FfiStr};
pub use global::FfiConfiguration;
pub use host::{
    BooleanHandle, CounterHandle, HandleKind, OwnedHandle, PingTypeHandle, StringHandle,
    TransferredString, UuidHandle,
};
pub use upload::{
    upload_result_from_ffi, FfiPingUploadTask, FfiStringArray, UPLOAD_RESULT_HTTP_STATUS,
    UPLOAD_RESULT_RECOVERABLE, UPLOAD_RESULT_UNRECOVERABLE,
};
