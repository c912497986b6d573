//! String metric

use tracing::warn;

use crate::metrics::{CommonMetricData, Metric};
use crate::Beacon;

/// Longest string value kept, in bytes
pub const MAX_STRING_LENGTH: usize = 100;

/// Records a short piece of text
#[derive(Debug, Clone)]
pub struct StringMetric {
    meta: CommonMetricData,
}

impl StringMetric {
    pub fn new(meta: CommonMetricData) -> Self {
        Self { meta }
    }

    pub fn meta(&self) -> &CommonMetricData {
        &self.meta
    }

    /// Store `value`, truncated to [`MAX_STRING_LENGTH`] bytes
    pub fn set(&self, beacon: &Beacon, value: impl Into<String>) {
        if !self.meta.should_record(beacon) {
            return;
        }

        let mut value = value.into();
        if value.len() > MAX_STRING_LENGTH {
            warn!(
                "Value for {} exceeds {} bytes, truncating",
                self.meta.identifier(),
                MAX_STRING_LENGTH
            );
            truncate_at_char_boundary(&mut value, MAX_STRING_LENGTH);
        }

        beacon.record(&self.meta, Metric::String(value));
    }

    pub fn test_get_value(&self, beacon: &Beacon, ping: Option<&str>) -> Option<String> {
        match beacon.test_get(&self.meta, ping)? {
            Metric::String(s) => Some(s),
            _ => None,
        }
    }
}

fn truncate_at_char_boundary(value: &mut String, max_len: usize) {
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value.truncate(end);
}
