//! String transfer across the boundary
//!
//! Strings going in arrive as [`FfiStr`], borrowed from the host for the
//! duration of the call. Strings coming out are allocated by `ffi_support`
//! (`rust_string_to_c`, or the `IntoFfi` impl for `String`), and the host must
//! hand each one back to `beacon_str_free` exactly once.

use ffi_support::{define_string_destructor, FfiStr};

use crate::error::{FfiError, Result};

// Frees a string returned by this library. Null is ignored.
define_string_destructor!(beacon_str_free);

/// Borrow a string the call cannot do without
pub fn required_str<'a>(value: &FfiStr<'a>, what: &'static str) -> Result<&'a str> {
    value.as_opt_str().ok_or(FfiError::InvalidString(what))
}

/// Copy a host array of strings
///
/// # Safety
///
/// `values` must be null (with `len == 0`) or point to `len` valid `FfiStr`s.
pub unsafe fn string_vec(
    values: *const FfiStr<'_>,
    len: i32,
    what: &'static str,
) -> Result<Vec<String>> {
    let len = usize::try_from(len)
        .map_err(|_| FfiError::InvalidArgument(format!("negative length for {}", what)))?;
    if len == 0 {
        return Ok(Vec::new());
    }
    if values.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    std::slice::from_raw_parts(values, len)
        .iter()
        .map(|value| required_str(value, what).map(str::to_string))
        .collect()
}
