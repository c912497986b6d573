//! Boolean metric

use crate::metrics::{CommonMetricData, Metric};
use crate::Beacon;

/// Records a single true/false flag
#[derive(Debug, Clone)]
pub struct BooleanMetric {
    meta: CommonMetricData,
}

impl BooleanMetric {
    pub fn new(meta: CommonMetricData) -> Self {
        Self { meta }
    }

    pub fn meta(&self) -> &CommonMetricData {
        &self.meta
    }

    pub fn set(&self, beacon: &Beacon, value: bool) {
        if !self.meta.should_record(beacon) {
            return;
        }
        beacon.record(&self.meta, Metric::Boolean(value));
    }

    /// Currently stored value, for tests
    pub fn test_get_value(&self, beacon: &Beacon, ping: Option<&str>) -> Option<bool> {
        match beacon.test_get(&self.meta, ping)? {
            Metric::Boolean(b) => Some(b),
            _ => None,
        }
    }
}
