//! Upload outcome reported by the host

use serde::{Deserialize, Serialize};

/// How an attempted upload ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadResult {
    /// The request never reached a server; try again later
    Recoverable,
    /// The request cannot succeed; drop the ping
    Unrecoverable,
    /// The server answered with this status code
    HttpStatus(u32),
}

/// What the queue does with a ping after its attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Sent,
    Discard,
    Retry,
}

impl UploadResult {
    pub(crate) fn disposition(self) -> Disposition {
        match self {
            Self::Recoverable => Disposition::Retry,
            Self::Unrecoverable => Disposition::Discard,
            Self::HttpStatus(200..=299) => Disposition::Sent,
            Self::HttpStatus(400..=499) => Disposition::Discard,
            Self::HttpStatus(_) => Disposition::Retry,
        }
    }
}

impl std::fmt::Display for UploadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recoverable => write!(f, "recoverable failure"),
            Self::Unrecoverable => write!(f, "unrecoverable failure"),
            Self::HttpStatus(code) => write!(f, "HTTP {}", code),
        }
    }
}
