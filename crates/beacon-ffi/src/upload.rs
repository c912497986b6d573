//! The upload task protocol at the C ABI
//!
//! `beacon_get_upload_task` hands the host an [`FfiPingUploadTask`] by value.
//! For `Upload` tasks the strings and buffers inside are owned by this
//! library; the host passes a pointer to the task back to
//! `beacon_process_ping_upload_response`, which frees them and overwrites the
//! task with `Done`. Reporting the same task twice is therefore rejected
//! instead of freeing anything twice. A copy of an earlier hand-out carries
//! that hand-out's `attempt` and is rejected once a newer attempt is pending.

use beacon_core::{PingRequest, PingUploadTask, UploadResult};
use ffi_support::{rust_string_to_c, ByteBuffer, IntoFfi};
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;
use tracing::warn;

use crate::error::{FfiError, Result};
use crate::fail_open::fail_open;
use crate::global::with_beacon;
use crate::strings::beacon_str_free;

/// The attempt failed before reaching a server
pub const UPLOAD_RESULT_RECOVERABLE: u32 = 0x1;
/// The attempt can never succeed
pub const UPLOAD_RESULT_UNRECOVERABLE: u32 = 0x2;
/// Flag for an HTTP status; the low 15 bits carry the code
pub const UPLOAD_RESULT_HTTP_STATUS: u32 = 0x8000;

/// Owned array of owned C strings
#[repr(C)]
#[derive(Debug)]
pub struct FfiStringArray {
    pub data: *mut *mut c_char,
    pub len: i32,
}

impl FfiStringArray {
    fn from_strs(values: &[&str]) -> Result<Self> {
        let len = i32::try_from(values.len()).map_err(|_| {
            FfiError::InvalidArgument(format!("{} strings do not fit in an array", values.len()))
        })?;
        let strings: Box<[*mut c_char]> = values.iter().map(|v| rust_string_to_c(*v)).collect();
        Ok(Self {
            data: Box::into_raw(strings) as *mut *mut c_char,
            len,
        })
    }

    fn entries(&self) -> usize {
        usize::try_from(self.len).unwrap_or(0)
    }

    fn to_vec(&self) -> Vec<&str> {
        if self.data.is_null() {
            return Vec::new();
        }
        // SAFETY: built in `from_strs`; every entry is a live C string.
        unsafe { std::slice::from_raw_parts(self.data, self.entries()) }
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_str().unwrap_or_default())
            .collect()
    }

    /// # Safety
    ///
    /// Must be called at most once, on an array built by `from_strs`.
    unsafe fn release(&mut self) {
        if self.data.is_null() {
            return;
        }
        let slice = std::ptr::slice_from_raw_parts_mut(self.data, self.entries());
        let strings = Box::from_raw(slice);
        for &ptr in strings.iter() {
            beacon_str_free(ptr);
        }
        self.data = std::ptr::null_mut();
        self.len = 0;
    }
}

/// [`PingUploadTask`] as laid out for the host
#[repr(C, u8)]
pub enum FfiPingUploadTask {
    Upload {
        document_id: *mut c_char,
        path: *mut c_char,
        body: ByteBuffer,
        /// Alternating header names and values
        headers: FfiStringArray,
        /// Identifies this hand-out; reports for other attempts are rejected
        attempt: u64,
    },
    Wait {
        backoff_ms: u64,
    },
    Done,
}

// SAFETY: `Done` owns nothing, and every other value is handed to the host
// by value to be returned through `beacon_process_ping_upload_response` or
// `beacon_upload_task_free`.
unsafe impl IntoFfi for FfiPingUploadTask {
    type Value = Self;

    fn ffi_default() -> Self {
        Self::Done
    }

    fn into_ffi_value(self) -> Self {
        self
    }
}

impl TryFrom<PingUploadTask> for FfiPingUploadTask {
    type Error = FfiError;

    fn try_from(task: PingUploadTask) -> Result<Self> {
        match task {
            PingUploadTask::Upload { request, attempt } => Self::from_request(request, attempt),
            PingUploadTask::Wait(backoff_ms) => Ok(Self::Wait { backoff_ms }),
            PingUploadTask::Done => Ok(Self::Done),
        }
    }
}

impl FfiPingUploadTask {
    fn from_request(request: PingRequest, attempt: u64) -> Result<Self> {
        if i64::try_from(request.body.len()).is_err() {
            return Err(FfiError::InvalidArgument(format!(
                "body of {} is too large to hand out",
                request.document_id
            )));
        }
        let headers = FfiStringArray::from_strs(&request.flattened_headers())?;
        Ok(Self::Upload {
            document_id: rust_string_to_c(request.document_id),
            path: rust_string_to_c(request.path),
            body: ByteBuffer::from_vec(request.body),
            headers,
            attempt,
        })
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Self::Upload { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            // SAFETY: set from `rust_string_to_c` and freed only in `release`.
            Self::Upload { document_id, .. } => unsafe { CStr::from_ptr(*document_id) }
                .to_str()
                .ok(),
            _ => None,
        }
    }

    pub fn attempt(&self) -> Option<u64> {
        match self {
            Self::Upload { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            // SAFETY: as for `document_id`.
            Self::Upload { path, .. } => unsafe { CStr::from_ptr(*path) }.to_str().ok(),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Upload { body, .. } => Some(body.as_slice()),
            _ => None,
        }
    }

    pub fn headers(&self) -> Vec<&str> {
        match self {
            Self::Upload { headers, .. } => headers.to_vec(),
            _ => Vec::new(),
        }
    }

    /// Free everything an `Upload` owns, leaving `Done` behind
    fn release(&mut self) {
        if let Self::Upload {
            document_id,
            path,
            body,
            headers,
            ..
        } = self
        {
            // SAFETY: the task was built by `from_request`. The buffer is moved
            // out and the task overwritten with `Done` without running `Drop`
            // on the old value, so nothing is freed twice.
            unsafe {
                let body = std::ptr::read(body);
                beacon_str_free(*document_id);
                beacon_str_free(*path);
                headers.release();
                std::ptr::write(self, Self::Done);
                body.destroy();
            }
        }
    }
}

impl Drop for FfiPingUploadTask {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FfiPingUploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload { attempt, .. } => f
                .debug_struct("Upload")
                .field("document_id", &self.document_id())
                .field("path", &self.path())
                .field("attempt", attempt)
                .finish(),
            Self::Wait { backoff_ms } => f
                .debug_struct("Wait")
                .field("backoff_ms", backoff_ms)
                .finish(),
            Self::Done => f.write_str("Done"),
        }
    }
}

/// Decode a host-reported upload outcome
pub fn upload_result_from_ffi(status: u32) -> UploadResult {
    match status {
        UPLOAD_RESULT_RECOVERABLE => UploadResult::Recoverable,
        UPLOAD_RESULT_UNRECOVERABLE => UploadResult::Unrecoverable,
        s if s & UPLOAD_RESULT_HTTP_STATUS != 0 => {
            UploadResult::HttpStatus(s & !UPLOAD_RESULT_HTTP_STATUS)
        }
        other => {
            warn!("Unknown upload result {:#x}, treating as unrecoverable", other);
            UploadResult::Unrecoverable
        }
    }
}

/// Next unit of upload work. `Done` if the registry is not initialized.
#[no_mangle]
pub extern "C" fn beacon_get_upload_task(log_ping: u8) -> FfiPingUploadTask {
    fail_open("beacon_get_upload_task", || {
        with_beacon(|beacon| FfiPingUploadTask::try_from(beacon.get_upload_task(log_ping != 0)))
    })
}

/// Report the outcome of an `Upload` task and free it. Returns 1 if the
/// report was accepted, 0 if the task is not the attempt currently pending.
///
/// # Safety
///
/// `task` must be null or point to a task returned by
/// `beacon_get_upload_task` that has not been moved or copied since.
#[no_mangle]
pub unsafe extern "C" fn beacon_process_ping_upload_response(
    task: *mut FfiPingUploadTask,
    status: u32,
) -> u8 {
    fail_open("beacon_process_ping_upload_response", || -> Result<u8> {
        let task = task.as_mut().ok_or(FfiError::NullPointer("task"))?;
        let (document_id, attempt) = task
            .document_id()
            .map(str::to_string)
            .zip(task.attempt())
            .ok_or_else(|| {
                FfiError::InvalidArgument("only Upload tasks can be reported".to_string())
            })?;
        task.release();

        let result = upload_result_from_ffi(status);
        with_beacon(|beacon| {
            beacon.process_upload_response(&document_id, attempt, result)?;
            Ok(1)
        })
    })
}

/// Free a task without reporting it
///
/// # Safety
///
/// Same as [`beacon_process_ping_upload_response`].
#[no_mangle]
pub unsafe extern "C" fn beacon_upload_task_free(task: *mut FfiPingUploadTask) {
    fail_open("beacon_upload_task_free", || {
        if let Some(task) = task.as_mut() {
            task.release();
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(attempt: u64) -> FfiPingUploadTask {
        let request = PingRequest::new(
            "doc-1",
            "/submit/app/events/1/doc-1",
            b"{\"ok\":true}".to_vec(),
            vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-Client-Type".to_string(), "Beacon".to_string()),
            ],
        );
        FfiPingUploadTask::try_from(PingUploadTask::Upload { request, attempt }).unwrap()
    }

    #[test]
    fn test_upload_task_layout_round_trip() {
        let task = sample_task(3);
        assert!(task.is_upload());
        assert_eq!(task.document_id(), Some("doc-1"));
        assert_eq!(task.attempt(), Some(3));
        assert_eq!(task.path(), Some("/submit/app/events/1/doc-1"));
        assert_eq!(task.body(), Some(&b"{\"ok\":true}"[..]));
        assert_eq!(
            task.headers(),
            vec!["Content-Type", "application/json", "X-Client-Type", "Beacon"]
        );
    }

    #[test]
    fn test_release_leaves_done() {
        let mut task = sample_task(1);
        task.release();
        assert!(task.is_done());
        task.release();
        assert!(task.document_id().is_none());
        assert!(task.attempt().is_none());
    }

    #[test]
    fn test_wait_and_done_convert() {
        assert!(matches!(
            FfiPingUploadTask::try_from(PingUploadTask::Wait(250)),
            Ok(FfiPingUploadTask::Wait { backoff_ms: 250 })
        ));
        assert!(FfiPingUploadTask::try_from(PingUploadTask::Done)
            .unwrap()
            .is_done());
        assert!(FfiPingUploadTask::ffi_default().is_done());
    }

    #[test]
    fn test_string_array_lengths_are_checked() {
        let empty = FfiStringArray::from_strs(&[]).unwrap();
        assert_eq!(empty.len, 0);
        assert!(empty.to_vec().is_empty());

        let mut pair = FfiStringArray::from_strs(&["a", "b"]).unwrap();
        assert_eq!(pair.len, 2);
        assert_eq!(pair.to_vec(), vec!["a", "b"]);
        unsafe { pair.release() };
        assert!(pair.to_vec().is_empty());

        // A corrupted length reads as empty instead of wrapping
        let bogus = FfiStringArray {
            data: std::ptr::null_mut(),
            len: -4,
        };
        assert_eq!(bogus.entries(), 0);
    }

    #[test]
    fn test_upload_result_decoding() {
        assert_eq!(upload_result_from_ffi(0x1), UploadResult::Recoverable);
        assert_eq!(upload_result_from_ffi(0x2), UploadResult::Unrecoverable);
        assert_eq!(
            upload_result_from_ffi(UPLOAD_RESULT_HTTP_STATUS | 200),
            UploadResult::HttpStatus(200)
        );
        assert_eq!(
            upload_result_from_ffi(UPLOAD_RESULT_HTTP_STATUS | 503),
            UploadResult::HttpStatus(503)
        );
        assert_eq!(upload_result_from_ffi(0x40), UploadResult::Unrecoverable);
    }

    #[test]
    fn test_report_of_non_upload_task_is_rejected() {
        let mut task = FfiPingUploadTask::Done;
        assert_eq!(
            unsafe { beacon_process_ping_upload_response(&mut task, 0x8000 | 200) },
            0
        );
        assert_eq!(
            unsafe { beacon_process_ping_upload_response(std::ptr::null_mut(), 0x1) },
            0
        );
    }
}
