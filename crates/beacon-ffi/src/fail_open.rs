//! Fail-open wrappers for boundary calls
//!
//! Nothing may unwind across the C ABI and the host cannot receive rich
//! errors. Every entry point runs its body through [`fail_open`], which
//! hands it to `ffi_support::call_with_result`. Errors and panics land in an
//! [`ExternError`] that is logged and freed here, and the caller gets the
//! return type's `IntoFfi` default instead.
//!
//! Sentinels used across this crate:
//! - `0` for handles and `u8` booleans
//! - null for strings
//! - `Done` for upload tasks

use ffi_support::{ErrorCode, ExternError, IntoFfi};
use std::panic::AssertUnwindSafe;
use tracing::{error, warn};

use crate::error::Result;

/// Run a boundary call, returning the FFI default on error or panic
pub fn fail_open<R, F>(operation_name: &str, f: F) -> R::Value
where
    R: IntoFfi,
    F: FnOnce() -> Result<R>,
{
    let mut out_error = ExternError::success();
    let value = ffi_support::call_with_result(&mut out_error, AssertUnwindSafe(f));
    log_failure(operation_name, out_error);
    value
}

/// Log a failed call's error and free its message. Success is ignored.
pub fn log_failure(operation_name: &str, out_error: ExternError) {
    let code = out_error.get_code();
    if code.is_success() {
        return;
    }
    // SAFETY: the message was allocated by ffi_support and is read only here.
    let message = unsafe { out_error.get_and_consume_message() }.unwrap_or_default();
    if code == ErrorCode::PANIC {
        error!("{} panicked (fail-open): {}", operation_name, message);
    } else {
        warn!("{} failed (fail-open): {}", operation_name, message);
    }
}
