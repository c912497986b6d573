//! Counter metric

use tracing::warn;

use crate::metrics::{CommonMetricData, Metric};
use crate::Beacon;

/// Records a monotonically increasing count
#[derive(Debug, Clone)]
pub struct CounterMetric {
    meta: CommonMetricData,
}

impl CounterMetric {
    pub fn new(meta: CommonMetricData) -> Self {
        Self { meta }
    }

    pub fn meta(&self) -> &CommonMetricData {
        &self.meta
    }

    /// Add `amount` to the stored count. Non-positive amounts are ignored.
    pub fn add(&self, beacon: &Beacon, amount: i32) {
        if !self.meta.should_record(beacon) {
            return;
        }

        if amount <= 0 {
            warn!(
                "Ignoring non-positive amount {} for counter {}",
                amount,
                self.meta.identifier()
            );
            return;
        }

        beacon.record_with(&self.meta, |old| match old {
            Some(Metric::Counter(count)) => Metric::Counter(count.saturating_add(amount)),
            _ => Metric::Counter(amount),
        });
    }

    pub fn test_get_value(&self, beacon: &Beacon, ping: Option<&str>) -> Option<i32> {
        match beacon.test_get(&self.meta, ping)? {
            Metric::Counter(c) => Some(c),
            _ => None,
        }
    }
}
