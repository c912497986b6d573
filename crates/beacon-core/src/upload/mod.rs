//! Pull-based upload task queue
//!
//! The host drains pending pings one at a time:
//!
//! ```text
//! get_upload_task ──Upload──▶ host performs request ──▶ process_upload_response
//!        │                                                        │
//!        ├──Wait(ms)──▶ host sleeps, then asks again              │
//!        └──Done──────▶ host stops until a new ping is submitted  │
//!        ▲────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one upload attempt is outstanding at any time. Asking for a task
//! while an attempt is pending re-delivers that same attempt. Each hand-out
//! of a ping carries a fresh attempt id, and a result is only accepted for
//! the attempt that is currently pending.

mod manager;
mod request;
mod result;

pub use manager::{PingUploadManager, UploadOutcome, UploadState};
pub use request::{PingRequest, PingUploadTask};
pub use result::UploadResult;
