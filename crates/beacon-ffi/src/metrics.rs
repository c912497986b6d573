//! Metric handles across the boundary
//!
//! Every metric type has its own `ffi_support` handle map and its own
//! destructor. Each map stamps its handles with its own id, so a boolean
//! handle passed to a string call is rejected instead of misread.

use beacon_core::{
    BooleanMetric, CommonMetricData, CounterMetric, Lifetime, StringMetric, UuidMetric,
};
use ffi_support::{define_handle_map_deleter, ConcurrentHandleMap, FfiStr};
use lazy_static::lazy_static;
use std::os::raw::c_char;

use crate::error::{FfiError, Result};
use crate::fail_open::fail_open;
use crate::global::with_beacon;
use crate::strings::{required_str, string_vec};

lazy_static! {
    pub(crate) static ref BOOLEAN_METRICS: ConcurrentHandleMap<BooleanMetric> =
        ConcurrentHandleMap::new();
    pub(crate) static ref STRING_METRICS: ConcurrentHandleMap<StringMetric> =
        ConcurrentHandleMap::new();
    pub(crate) static ref UUID_METRICS: ConcurrentHandleMap<UuidMetric> =
        ConcurrentHandleMap::new();
    pub(crate) static ref COUNTER_METRICS: ConcurrentHandleMap<CounterMetric> =
        ConcurrentHandleMap::new();
}

define_handle_map_deleter!(BOOLEAN_METRICS, beacon_destroy_boolean_metric);
define_handle_map_deleter!(STRING_METRICS, beacon_destroy_string_metric);
define_handle_map_deleter!(UUID_METRICS, beacon_destroy_uuid_metric);
define_handle_map_deleter!(COUNTER_METRICS, beacon_destroy_counter_metric);

/// Decode the constructor arguments every metric type shares
///
/// # Safety
///
/// `send_in_pings` must satisfy the contract of [`string_vec`].
unsafe fn common_metric_data(
    category: FfiStr<'_>,
    name: FfiStr<'_>,
    send_in_pings: *const FfiStr<'_>,
    send_in_pings_len: i32,
    lifetime: i32,
    disabled: u8,
) -> Result<CommonMetricData> {
    let category = required_str(&category, "category")?;
    let name = required_str(&name, "name")?;
    if name.is_empty() {
        return Err(FfiError::InvalidArgument("metric name is empty".to_string()));
    }
    let send_in_pings = string_vec(send_in_pings, send_in_pings_len, "send_in_pings")?;
    let lifetime = Lifetime::try_from(lifetime).map_err(FfiError::InvalidArgument)?;

    Ok(CommonMetricData::new(category, name, send_in_pings)
        .with_lifetime(lifetime)
        .with_disabled(disabled != 0))
}

// Boolean

/// Create a boolean metric. Returns 0 if the arguments are invalid.
///
/// # Safety
///
/// `send_in_pings` must point to `send_in_pings_len` valid strings.
#[no_mangle]
pub unsafe extern "C" fn beacon_new_boolean_metric(
    category: FfiStr<'_>,
    name: FfiStr<'_>,
    send_in_pings: *const FfiStr<'_>,
    send_in_pings_len: i32,
    lifetime: i32,
    disabled: u8,
) -> u64 {
    fail_open("beacon_new_boolean_metric", || {
        let meta = common_metric_data(
            category,
            name,
            send_in_pings,
            send_in_pings_len,
            lifetime,
            disabled,
        )?;
        Ok(BOOLEAN_METRICS.insert(BooleanMetric::new(meta)).into_u64())
    })
}

#[no_mangle]
pub extern "C" fn beacon_boolean_set(metric_id: u64, value: u8) {
    fail_open("beacon_boolean_set", || {
        with_beacon(|beacon| {
            BOOLEAN_METRICS.get_u64(metric_id, |m| {
                m.set(beacon, value != 0);
                Ok(())
            })
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_boolean_test_has_value(metric_id: u64, storage_name: FfiStr<'_>) -> u8 {
    fail_open("beacon_boolean_test_has_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            BOOLEAN_METRICS.get_u64(metric_id, |m| {
                Ok(u8::from(m.test_get_value(beacon, ping).is_some()))
            })
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_boolean_test_get_value(metric_id: u64, storage_name: FfiStr<'_>) -> u8 {
    fail_open("beacon_boolean_test_get_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            BOOLEAN_METRICS.get_u64(metric_id, |m| {
                Ok(u8::from(m.test_get_value(beacon, ping).unwrap_or(false)))
            })
        })
    })
}

// String

/// Create a string metric. Returns 0 if the arguments are invalid.
///
/// # Safety
///
/// See [`beacon_new_boolean_metric`].
#[no_mangle]
pub unsafe extern "C" fn beacon_new_string_metric(
    category: FfiStr<'_>,
    name: FfiStr<'_>,
    send_in_pings: *const FfiStr<'_>,
    send_in_pings_len: i32,
    lifetime: i32,
    disabled: u8,
) -> u64 {
    fail_open("beacon_new_string_metric", || {
        let meta = common_metric_data(
            category,
            name,
            send_in_pings,
            send_in_pings_len,
            lifetime,
            disabled,
        )?;
        Ok(STRING_METRICS.insert(StringMetric::new(meta)).into_u64())
    })
}

#[no_mangle]
pub extern "C" fn beacon_string_set(metric_id: u64, value: FfiStr<'_>) {
    fail_open("beacon_string_set", || {
        let value = required_str(&value, "value")?;
        with_beacon(|beacon| {
            STRING_METRICS.get_u64(metric_id, |m| {
                m.set(beacon, value);
                Ok(())
            })
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_string_test_has_value(metric_id: u64, storage_name: FfiStr<'_>) -> u8 {
    fail_open("beacon_string_test_has_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            STRING_METRICS.get_u64(metric_id, |m| {
                Ok(u8::from(m.test_get_value(beacon, ping).is_some()))
            })
        })
    })
}

/// Stored value, or null. The caller owns the result and frees it with
/// `beacon_str_free`.
#[no_mangle]
pub extern "C" fn beacon_string_test_get_value(
    metric_id: u64,
    storage_name: FfiStr<'_>,
) -> *mut c_char {
    fail_open("beacon_string_test_get_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            STRING_METRICS.get_u64(metric_id, |m| Ok(m.test_get_value(beacon, ping)))
        })
    })
}

// UUID

/// Create a UUID metric. Returns 0 if the arguments are invalid.
///
/// # Safety
///
/// See [`beacon_new_boolean_metric`].
#[no_mangle]
pub unsafe extern "C" fn beacon_new_uuid_metric(
    category: FfiStr<'_>,
    name: FfiStr<'_>,
    send_in_pings: *const FfiStr<'_>,
    send_in_pings_len: i32,
    lifetime: i32,
    disabled: u8,
) -> u64 {
    fail_open("beacon_new_uuid_metric", || {
        let meta = common_metric_data(
            category,
            name,
            send_in_pings,
            send_in_pings_len,
            lifetime,
            disabled,
        )?;
        Ok(UUID_METRICS.insert(UuidMetric::new(meta)).into_u64())
    })
}

#[no_mangle]
pub extern "C" fn beacon_uuid_set(metric_id: u64, value: FfiStr<'_>) {
    fail_open("beacon_uuid_set", || {
        let value = required_str(&value, "value")?;
        with_beacon(|beacon| {
            UUID_METRICS.get_u64(metric_id, |m| {
                m.set(beacon, value);
                Ok(())
            })
        })
    })
}

/// Store a fresh random UUID. The caller owns the returned text.
#[no_mangle]
pub extern "C" fn beacon_uuid_generate_and_set(metric_id: u64) -> *mut c_char {
    fail_open("beacon_uuid_generate_and_set", || {
        with_beacon(|beacon| {
            UUID_METRICS.get_u64(metric_id, |m| Ok(m.generate_and_set(beacon).to_string()))
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_uuid_test_has_value(metric_id: u64, storage_name: FfiStr<'_>) -> u8 {
    fail_open("beacon_uuid_test_has_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            UUID_METRICS.get_u64(metric_id, |m| {
                Ok(u8::from(m.test_get_value(beacon, ping).is_some()))
            })
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_uuid_test_get_value(
    metric_id: u64,
    storage_name: FfiStr<'_>,
) -> *mut c_char {
    fail_open("beacon_uuid_test_get_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            UUID_METRICS.get_u64(metric_id, |m| Ok(m.test_get_value(beacon, ping)))
        })
    })
}

// Counter

/// Create a counter metric. Returns 0 if the arguments are invalid.
///
/// # Safety
///
/// See [`beacon_new_boolean_metric`].
#[no_mangle]
pub unsafe extern "C" fn beacon_new_counter_metric(
    category: FfiStr<'_>,
    name: FfiStr<'_>,
    send_in_pings: *const FfiStr<'_>,
    send_in_pings_len: i32,
    lifetime: i32,
    disabled: u8,
) -> u64 {
    fail_open("beacon_new_counter_metric", || {
        let meta = common_metric_data(
            category,
            name,
            send_in_pings,
            send_in_pings_len,
            lifetime,
            disabled,
        )?;
        Ok(COUNTER_METRICS.insert(CounterMetric::new(meta)).into_u64())
    })
}

#[no_mangle]
pub extern "C" fn beacon_counter_add(metric_id: u64, amount: i32) {
    fail_open("beacon_counter_add", || {
        with_beacon(|beacon| {
            COUNTER_METRICS.get_u64(metric_id, |m| {
                m.add(beacon, amount);
                Ok(())
            })
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_counter_test_has_value(metric_id: u64, storage_name: FfiStr<'_>) -> u8 {
    fail_open("beacon_counter_test_has_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            COUNTER_METRICS.get_u64(metric_id, |m| {
                Ok(u8::from(m.test_get_value(beacon, ping).is_some()))
            })
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_counter_test_get_value(metric_id: u64, storage_name: FfiStr<'_>) -> i32 {
    fail_open("beacon_counter_test_get_value", || {
        let ping = storage_name.as_opt_str();
        with_beacon(|beacon| {
            COUNTER_METRICS.get_u64(metric_id, |m| Ok(m.test_get_value(beacon, ping).unwrap_or(0)))
        })
    })
}
