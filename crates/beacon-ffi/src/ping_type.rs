//! Ping type handles and submission

use beacon_core::PingType;
use ffi_support::{define_handle_map_deleter, ConcurrentHandleMap, FfiStr};
use lazy_static::lazy_static;
use std::os::raw::c_char;
use tracing::debug;

use crate::error::FfiError;
use crate::fail_open::fail_open;
use crate::global::with_beacon;
use crate::strings::{required_str, string_vec};

lazy_static! {
    pub(crate) static ref PING_TYPES: ConcurrentHandleMap<PingType> = ConcurrentHandleMap::new();
}

// Releases the handle only. The registration with the registry stays.
define_handle_map_deleter!(PING_TYPES, beacon_destroy_ping_type);

/// Create a ping type and register it with the current registry. Returns 0
/// if the registry is not initialized or the arguments are invalid.
///
/// # Safety
///
/// `reason_codes` must point to `reason_codes_len` valid strings.
#[no_mangle]
pub unsafe extern "C" fn beacon_new_ping_type(
    ping_name: FfiStr<'_>,
    include_client_id: u8,
    send_if_empty: u8,
    reason_codes: *const FfiStr<'_>,
    reason_codes_len: i32,
) -> u64 {
    fail_open("beacon_new_ping_type", || {
        let name = required_str(&ping_name, "ping_name")?;
        if name.is_empty() {
            return Err(FfiError::InvalidArgument("ping name is empty".to_string()));
        }
        let reason_codes = string_vec(reason_codes, reason_codes_len, "reason_codes")?;
        let ping = PingType::new(name, include_client_id != 0, send_if_empty != 0, reason_codes);

        with_beacon(|beacon| {
            beacon.register_ping_type(&ping);
            Ok(())
        })?;
        let handle = PING_TYPES.insert(ping).into_u64();
        debug!("Registered ping type {} as {:#x}", name, handle);
        Ok(handle)
    })
}

/// Submit the ping behind `ping_type`. Returns 1 if a ping was queued.
#[no_mangle]
pub extern "C" fn beacon_submit_ping(ping_type: u64, reason: FfiStr<'_>) -> u8 {
    fail_open("beacon_submit_ping", || {
        let reason = reason.as_opt_str();
        let ping = PING_TYPES.get_u64(ping_type, |p| Ok::<_, FfiError>(p.clone()))?;
        with_beacon(|beacon| Ok(u8::from(beacon.submit_ping(&ping, reason))))
    })
}

/// Submit a registered ping by name. Returns 1 if a ping was queued.
#[no_mangle]
pub extern "C" fn beacon_submit_ping_by_name(ping_name: FfiStr<'_>, reason: FfiStr<'_>) -> u8 {
    fail_open("beacon_submit_ping_by_name", || {
        let name = required_str(&ping_name, "ping_name")?;
        let reason = reason.as_opt_str();
        with_beacon(|beacon| Ok(u8::from(beacon.submit_ping_by_name(name, reason))))
    })
}

/// Payload the ping would currently carry, or null if it would not be sent.
/// The caller owns the result and frees it with `beacon_str_free`.
#[no_mangle]
pub extern "C" fn beacon_collect_ping(ping_type: u64, reason: FfiStr<'_>) -> *mut c_char {
    fail_open("beacon_collect_ping", || {
        let reason = reason.as_opt_str();
        let ping = PING_TYPES.get_u64(ping_type, |p| Ok::<_, FfiError>(p.clone()))?;
        with_beacon(|beacon| Ok(beacon.collect_ping(&ping, reason)))
    })
}

/// Drop recorded data, queued pings and sequence numbers
#[no_mangle]
pub extern "C" fn beacon_test_clear_all() {
    fail_open("beacon_test_clear_all", || {
        with_beacon(|beacon| {
            beacon.test_clear_all();
            Ok(())
        })
    })
}
