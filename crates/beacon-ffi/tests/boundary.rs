//! Integration tests for the C ABI
//!
//! All tests share the process-wide registry, so each one holds `LOCK` for
//! its whole run and initializes a fresh registry in its own temp dir.

use beacon_ffi::global::{beacon_destroy, beacon_initialize, beacon_is_initialized};
use beacon_ffi::metrics::*;
use beacon_ffi::ping_type::*;
use beacon_ffi::upload::{
    beacon_get_upload_task, beacon_process_ping_upload_response, beacon_upload_task_free,
};
use beacon_ffi::{
    BooleanHandle, CounterHandle, ExternError, FfiConfiguration, FfiPingUploadTask, FfiStr,
    PingTypeHandle, StringHandle, TransferredString, UPLOAD_RESULT_HTTP_STATUS,
    UPLOAD_RESULT_UNRECOVERABLE,
};
use std::ffi::CString;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;

static LOCK: Mutex<()> = Mutex::new(());

struct Session {
    _guard: MutexGuard<'static, ()>,
    _dir: TempDir,
}

impl Drop for Session {
    fn drop(&mut self) {
        beacon_destroy();
    }
}

/// Initialize a fresh registry for one test
fn start() -> Session {
    let guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    beacon_destroy();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = CString::new(dir.path().to_str().unwrap()).unwrap();
    let package = CString::new("org.example.host").unwrap();
    let config = FfiConfiguration {
        data_dir: FfiStr::from_cstr(&data_dir),
        package_name: FfiStr::from_cstr(&package),
        upload_enabled: 1,
        max_events: None,
        delay_ping_lifetime_io: 0,
    };
    assert_eq!(unsafe { beacon_initialize(&config) }, 1);

    Session {
        _guard: guard,
        _dir: dir,
    }
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn none() -> FfiStr<'static> {
    unsafe { FfiStr::from_raw(std::ptr::null()) }
}

/// Destroy a handle, returning whether the map accepted it
fn destroy_with(destroy: extern "C" fn(u64, &mut ExternError), raw: u64) -> bool {
    let mut error = ExternError::success();
    destroy(raw, &mut error);
    let accepted = error.get_code().is_success();
    if !accepted {
        unsafe { error.manually_release() };
    }
    accepted
}

fn new_ping(
    name: &str,
    include_client_id: bool,
    send_if_empty: bool,
    reasons: &[&str],
) -> PingTypeHandle {
    let name = c(name);
    let reasons: Vec<CString> = reasons.iter().map(|r| c(r)).collect();
    let values: Vec<FfiStr<'_>> = reasons.iter().map(|r| FfiStr::from_cstr(r)).collect();
    let raw = unsafe {
        beacon_new_ping_type(
            FfiStr::from_cstr(&name),
            u8::from(include_client_id),
            u8::from(send_if_empty),
            values.as_ptr(),
            i32::try_from(values.len()).unwrap(),
        )
    };
    PingTypeHandle::from_raw(raw).expect("ping type handle")
}

fn new_boolean(category: &str, name: &str, ping: &str) -> BooleanHandle {
    let (category, name, ping) = (c(category), c(name), c(ping));
    let pings = [FfiStr::from_cstr(&ping)];
    let raw = unsafe {
        beacon_new_boolean_metric(
            FfiStr::from_cstr(&category),
            FfiStr::from_cstr(&name),
            pings.as_ptr(),
            1,
            0,
            0,
        )
    };
    BooleanHandle::from_raw(raw).expect("boolean handle")
}

fn submit(name: &str, reason: Option<&str>) -> bool {
    let name = c(name);
    let reason = reason.map(c);
    let reason = match &reason {
        Some(r) => FfiStr::from_cstr(r),
        None => none(),
    };
    beacon_submit_ping_by_name(FfiStr::from_cstr(&name), reason) == 1
}

fn report(task: &mut FfiPingUploadTask, status: u32) -> bool {
    unsafe { beacon_process_ping_upload_response(task, status) == 1 }
}

/// Poll until an Upload shows up, honoring Wait hints
fn poll_upload() -> FfiPingUploadTask {
    for _ in 0..500 {
        match beacon_get_upload_task(0) {
            FfiPingUploadTask::Wait { backoff_ms } => {
                std::thread::sleep(Duration::from_millis(backoff_ms.clamp(1, 20)))
            }
            task @ FfiPingUploadTask::Upload { .. } => return task,
            FfiPingUploadTask::Done => panic!("queued ping was dropped"),
        }
    }
    panic!("no upload became available");
}

#[test]
fn test_events_ping_scenario() {
    let _session = start();
    let _events = new_ping("events", true, false, &["startup"]);

    assert!(submit("events", Some("startup")));

    let mut task = beacon_get_upload_task(0);
    assert!(task.is_upload());
    assert!(!task.document_id().unwrap().is_empty());
    assert!(task.path().unwrap().contains("events"));
    assert!(!task.body().unwrap().is_empty());

    let headers = task.headers();
    assert_eq!(headers.len() % 2, 0);
    assert!(headers.chunks(2).any(|kv| kv[0] == "Content-Type"));

    assert!(report(&mut task, UPLOAD_RESULT_HTTP_STATUS | 200));
    assert!(task.is_done());
    assert!(beacon_get_upload_task(0).is_done());
}

#[test]
fn test_done_then_new_ping_yields_upload() {
    let _session = start();
    assert!(beacon_get_upload_task(0).is_done());

    let _custom = new_ping("custom", false, true, &[]);
    assert!(submit("custom", None));
    assert!(beacon_get_upload_task(0).is_upload());
}

#[test]
fn test_pending_attempt_is_redelivered_not_duplicated() {
    let _session = start();
    let _custom = new_ping("custom", false, true, &[]);
    assert!(submit("custom", None));
    assert!(submit("custom", None));

    let mut first = beacon_get_upload_task(0);
    let first_id = first.document_id().unwrap().to_string();
    let again = beacon_get_upload_task(0);
    assert_eq!(again.document_id(), Some(first_id.as_str()));
    assert_eq!(again.attempt(), first.attempt());
    drop(again);

    assert!(report(&mut first, UPLOAD_RESULT_HTTP_STATUS | 200));
    let second = beacon_get_upload_task(0);
    assert!(second.is_upload());
    assert_ne!(second.document_id(), Some(first_id.as_str()));
}

#[test]
fn test_repeated_report_is_rejected() {
    let _session = start();
    let _custom = new_ping("custom", false, true, &[]);
    assert!(submit("custom", None));

    let mut task = beacon_get_upload_task(0);
    assert!(report(&mut task, UPLOAD_RESULT_UNRECOVERABLE));
    assert!(!report(&mut task, UPLOAD_RESULT_UNRECOVERABLE));
    assert!(beacon_get_upload_task(0).is_done());
}

#[test]
fn test_server_error_is_retried() {
    let _session = start();
    let _custom = new_ping("custom", false, true, &[]);
    assert!(submit("custom", None));

    let mut task = beacon_get_upload_task(0);
    let document_id = task.document_id().unwrap().to_string();
    assert!(report(&mut task, UPLOAD_RESULT_HTTP_STATUS | 500));

    let mut retried = poll_upload();
    assert_eq!(retried.document_id(), Some(document_id.as_str()));
    assert!(report(&mut retried, UPLOAD_RESULT_HTTP_STATUS | 200));
    assert!(beacon_get_upload_task(0).is_done());
}

#[test]
fn test_redelivered_copy_cannot_settle_a_later_attempt() {
    let _session = start();
    let _custom = new_ping("custom", false, true, &[]);
    assert!(submit("custom", None));

    // Two copies of the same hand-out, as two host workers would see them
    let mut first = beacon_get_upload_task(0);
    let mut copy = beacon_get_upload_task(0);
    let document_id = first.document_id().unwrap().to_string();
    assert_eq!(copy.attempt(), first.attempt());

    assert!(report(&mut first, UPLOAD_RESULT_HTTP_STATUS | 500));

    let mut retried = poll_upload();
    assert_eq!(retried.document_id(), Some(document_id.as_str()));
    assert_ne!(retried.attempt(), copy.attempt());

    // The late copy is rejected and freed; the retry stays pending
    assert!(!report(&mut copy, UPLOAD_RESULT_HTTP_STATUS | 200));
    assert!(copy.is_done());
    let pending = beacon_get_upload_task(0);
    assert_eq!(pending.attempt(), retried.attempt());
    drop(pending);

    assert!(report(&mut retried, UPLOAD_RESULT_HTTP_STATUS | 200));
    assert!(beacon_get_upload_task(0).is_done());
}

#[test]
fn test_unreported_task_can_be_freed_and_redelivered() {
    let _session = start();
    let _custom = new_ping("custom", false, true, &[]);
    assert!(submit("custom", None));

    let mut task = beacon_get_upload_task(0);
    let document_id = task.document_id().unwrap().to_string();
    unsafe { beacon_upload_task_free(&mut task) };
    assert!(task.is_done());

    let again = beacon_get_upload_task(0);
    assert_eq!(again.document_id(), Some(document_id.as_str()));
}

#[test]
fn test_metric_values_through_handles() {
    let _session = start();
    let metrics_ping = new_ping("metrics", false, false, &[]);
    let flag = new_boolean("ui", "dark_mode", "metrics");

    beacon_boolean_set(flag.raw(), 1);
    assert_eq!(beacon_boolean_test_get_value(flag.raw(), none()), 1);

    let (category, name, ping) = (c("app"), c("channel"), c("metrics"));
    let pings = [FfiStr::from_cstr(&ping)];
    let channel = StringHandle::from_raw(unsafe {
        beacon_new_string_metric(
            FfiStr::from_cstr(&category),
            FfiStr::from_cstr(&name),
            pings.as_ptr(),
            1,
            1,
            0,
        )
    })
    .unwrap();
    let value = c("nightly");
    beacon_string_set(channel.raw(), FfiStr::from_cstr(&value));
    let text =
        unsafe { TransferredString::wrap(beacon_string_test_get_value(channel.raw(), none())) };
    assert_eq!(text.as_text(), Some("nightly"));

    let name = c("launches");
    let launches = CounterHandle::from_raw(unsafe {
        beacon_new_counter_metric(
            FfiStr::from_cstr(&category),
            FfiStr::from_cstr(&name),
            pings.as_ptr(),
            1,
            0,
            0,
        )
    })
    .unwrap();
    beacon_counter_add(launches.raw(), 2);
    beacon_counter_add(launches.raw(), 3);
    assert_eq!(beacon_counter_test_get_value(launches.raw(), none()), 5);

    let payload =
        unsafe { TransferredString::wrap(beacon_collect_ping(metrics_ping.raw(), none())) };
    let json: serde_json::Value = serde_json::from_str(payload.as_text().unwrap()).unwrap();
    assert_eq!(json["metrics"]["boolean"]["ui.dark_mode"], true);
    assert_eq!(json["metrics"]["counter"]["app.launches"], 5);
    assert_eq!(json["metrics"]["string"]["app.channel"], "nightly");
}

#[test]
fn test_double_release_is_a_no_op() {
    let _session = start();
    let mut flag = new_boolean("ui", "flag", "metrics");
    let raw = flag.raw();

    flag.release();
    assert!(!flag.is_valid());
    flag.release();
    assert!(!destroy_with(beacon_destroy_boolean_metric, raw));
    assert!(!destroy_with(beacon_destroy_boolean_metric, 0));

    // The stale token no longer reaches any entry
    beacon_boolean_set(raw, 1);
    assert_eq!(beacon_boolean_test_has_value(raw, none()), 0);
}

#[test]
fn test_released_token_does_not_reach_reused_slot() {
    let _session = start();
    for round in 0..50 {
        let mut old = new_boolean("ui", &format!("old_{}", round), "metrics");
        let stale = old.raw();
        old.release();

        let fresh = new_boolean("ui", &format!("fresh_{}", round), "metrics");
        assert_ne!(fresh.raw(), stale);
        beacon_boolean_set(stale, 1);
        assert_eq!(beacon_boolean_test_has_value(fresh.raw(), none()), 0);
    }
}

#[test]
fn test_identical_definitions_get_distinct_handles() {
    let _session = start();
    let first = new_boolean("ui", "flag", "metrics");
    let second = new_boolean("ui", "flag", "metrics");
    assert_ne!(first.raw(), second.raw());
}

#[test]
fn test_handles_are_bound_to_their_kind() {
    let _session = start();
    let flag = new_boolean("ui", "flag", "metrics");

    // A boolean token passed to a string call is rejected, not misread
    let value = c("oops");
    beacon_string_set(flag.raw(), FfiStr::from_cstr(&value));
    assert!(!destroy_with(beacon_destroy_string_metric, flag.raw()));

    beacon_boolean_set(flag.raw(), 1);
    assert_eq!(beacon_boolean_test_get_value(flag.raw(), none()), 1);
}

#[test]
fn test_calls_without_registry_fail_open() {
    let _session = start();
    let _custom = new_ping("custom", false, true, &[]);
    beacon_destroy();
    assert_eq!(beacon_is_initialized(), 0);

    assert!(!submit("custom", None));
    assert!(beacon_get_upload_task(0).is_done());
    let late = c("late");
    assert_eq!(
        unsafe { beacon_new_ping_type(FfiStr::from_cstr(&late), 0, 0, std::ptr::null(), 0) },
        0
    );
}
