//! Upload requests and tasks handed to the host

use serde::{Deserialize, Serialize};

/// Everything the host needs to perform one ping upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    pub document_id: String,
    /// Path relative to the server endpoint
    pub path: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl PingRequest {
    pub fn new(
        document_id: impl Into<String>,
        path: impl Into<String>,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            path: path.into(),
            body,
            headers,
        }
    }

    /// Headers as an alternating key/value sequence
    pub fn flattened_headers(&self) -> Vec<&str> {
        self.headers
            .iter()
            .flat_map(|(key, value)| [key.as_str(), value.as_str()])
            .collect()
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, for logging
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The unit of work handed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingUploadTask {
    /// A ping ready to be sent. `attempt` identifies this hand-out and must be
    /// passed back with the result.
    Upload { request: PingRequest, attempt: u64 },
    /// Nothing is ready yet; ask again after this many milliseconds (0 = shortly)
    Wait(u64),
    /// Nothing is queued; stop polling until a ping is submitted
    Done,
}

impl PingUploadTask {
    pub fn is_upload(&self) -> bool {
        matches!(self, Self::Upload { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Upload { request, .. } => Some(&request.document_id),
            _ => None,
        }
    }

    pub fn attempt(&self) -> Option<u64> {
        match self {
            Self::Upload { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattened_headers_alternate() {
        let request = PingRequest::new(
            "doc",
            "/submit/app/baseline/1/doc",
            b"{}".to_vec(),
            vec![
                ("Content-Type".into(), "application/json".into()),
                ("X-Client-Type".into(), "Beacon".into()),
            ],
        );

        let flat = request.flattened_headers();
        assert_eq!(flat.len() % 2, 0);
        assert_eq!(
            flat,
            vec!["Content-Type", "application/json", "X-Client-Type", "Beacon"]
        );
        assert_eq!(request.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_task_helpers() {
        let task = PingUploadTask::Upload {
            request: PingRequest::new("doc", "/p", vec![], vec![]),
            attempt: 7,
        };
        assert!(task.is_upload());
        assert_eq!(task.document_id(), Some("doc"));
        assert_eq!(task.attempt(), Some(7));
        assert!(PingUploadTask::Done.is_done());
        assert_eq!(PingUploadTask::Wait(10).document_id(), None);
        assert_eq!(PingUploadTask::Done.attempt(), None);
    }
}
