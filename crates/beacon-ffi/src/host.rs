//! Owning wrappers for the host side of the boundary
//!
//! A Rust host linking this library gets the same guarantees a hand-written
//! binding would need: every string and handle it receives is released
//! exactly once, either explicitly or on drop.

use ffi_support::ExternError;
use std::ffi::CStr;
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_char;

use crate::metrics::{
    beacon_destroy_boolean_metric, beacon_destroy_counter_metric, beacon_destroy_string_metric,
    beacon_destroy_uuid_metric,
};
use crate::fail_open::log_failure;
use crate::ping_type::beacon_destroy_ping_type;
use crate::strings::beacon_str_free;

/// A string allocated by this library and handed to the host
pub struct TransferredString {
    ptr: *mut c_char,
}

impl TransferredString {
    /// Take ownership of `ptr`. Null gives an already released wrapper.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a string returned by this library that no one
    /// else will free.
    pub unsafe fn wrap(ptr: *mut c_char) -> Self {
        Self { ptr }
    }

    /// Text up to the first NUL byte, or `None` once released or if the
    /// bytes are not UTF-8
    pub fn as_text(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        // SAFETY: `ptr` is live until `release` nulls it.
        unsafe { CStr::from_ptr(self.ptr) }.to_str().ok()
    }

    pub fn release(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        // SAFETY: `wrap` handed us sole ownership and `ptr` is nulled below.
        unsafe { beacon_str_free(self.ptr) };
        self.ptr = std::ptr::null_mut();
    }

    pub fn is_released(&self) -> bool {
        self.ptr.is_null()
    }
}

impl Drop for TransferredString {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TransferredString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferredString")
            .field("text", &self.as_text())
            .finish()
    }
}

/// A kind of handle, bound to the destructor for that kind
pub trait HandleKind {
    const NAME: &'static str;

    fn release(raw: u64, out_error: &mut ExternError);
}

pub enum BooleanKind {}
pub enum StringKind {}
pub enum UuidKind {}
pub enum CounterKind {}
pub enum PingTypeKind {}

impl HandleKind for BooleanKind {
    const NAME: &'static str = "boolean metric";

    fn release(raw: u64, out_error: &mut ExternError) {
        beacon_destroy_boolean_metric(raw, out_error)
    }
}

impl HandleKind for StringKind {
    const NAME: &'static str = "string metric";

    fn release(raw: u64, out_error: &mut ExternError) {
        beacon_destroy_string_metric(raw, out_error)
    }
}

impl HandleKind for UuidKind {
    const NAME: &'static str = "uuid metric";

    fn release(raw: u64, out_error: &mut ExternError) {
        beacon_destroy_uuid_metric(raw, out_error)
    }
}

impl HandleKind for CounterKind {
    const NAME: &'static str = "counter metric";

    fn release(raw: u64, out_error: &mut ExternError) {
        beacon_destroy_counter_metric(raw, out_error)
    }
}

impl HandleKind for PingTypeKind {
    const NAME: &'static str = "ping type";

    fn release(raw: u64, out_error: &mut ExternError) {
        beacon_destroy_ping_type(raw, out_error)
    }
}

/// A handle the host owns, released through its kind's destructor
pub struct OwnedHandle<K: HandleKind> {
    raw: u64,
    _kind: PhantomData<K>,
}

pub type BooleanHandle = OwnedHandle<BooleanKind>;
pub type StringHandle = OwnedHandle<StringKind>;
pub type UuidHandle = OwnedHandle<UuidKind>;
pub type CounterHandle = OwnedHandle<CounterKind>;
pub type PingTypeHandle = OwnedHandle<PingTypeKind>;

impl<K: HandleKind> OwnedHandle<K> {
    /// Adopt a handle returned by a constructor. `None` for the invalid handle.
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw == 0 {
            return None;
        }
        Some(Self {
            raw,
            _kind: PhantomData,
        })
    }

    /// The token to pass to boundary calls; 0 once released
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.raw != 0
    }

    pub fn release(&mut self) {
        if self.raw == 0 {
            return;
        }
        let mut out_error = ExternError::success();
        K::release(self.raw, &mut out_error);
        log_failure(K::NAME, out_error);
        self.raw = 0;
    }
}

impl<K: HandleKind> Drop for OwnedHandle<K> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<K: HandleKind> fmt::Debug for OwnedHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnedHandle<{}>({:#x})", K::NAME, self.raw)
    }
}
