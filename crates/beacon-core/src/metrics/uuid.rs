//! UUID metric

use tracing::warn;
use uuid::Uuid;

use crate::metrics::{CommonMetricData, Metric};
use crate::Beacon;

/// Records a UUID, stored in its hyphenated lowercase form
#[derive(Debug, Clone)]
pub struct UuidMetric {
    meta: CommonMetricData,
}

impl UuidMetric {
    pub fn new(meta: CommonMetricData) -> Self {
        Self { meta }
    }

    pub fn meta(&self) -> &CommonMetricData {
        &self.meta
    }

    /// Store a UUID given as text; anything that does not parse is dropped
    pub fn set(&self, beacon: &Beacon, value: &str) {
        match Uuid::parse_str(value) {
            Ok(uuid) => self.set_from_uuid(beacon, uuid),
            Err(e) => warn!(
                "Rejecting value for {}: '{}' is not a UUID ({})",
                self.meta.identifier(),
                value,
                e
            ),
        }
    }

    pub fn set_from_uuid(&self, beacon: &Beacon, value: Uuid) {
        if !self.meta.should_record(beacon) {
            return;
        }
        beacon.record(&self.meta, Metric::Uuid(value.hyphenated().to_string()));
    }

    /// Store a fresh random UUID and return it
    pub fn generate_and_set(&self, beacon: &Beacon) -> Uuid {
        let uuid = Uuid::new_v4();
        self.set_from_uuid(beacon, uuid);
        uuid
    }

    pub fn test_get_value(&self, beacon: &Beacon, ping: Option<&str>) -> Option<String> {
        match beacon.test_get(&self.meta, ping)? {
            Metric::Uuid(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::new_beacon;

    fn metric() -> UuidMetric {
        UuidMetric::new(CommonMetricData::new("session", "id", vec!["baseline".into()]))
    }

    #[test]
    fn test_set_normalizes_case() {
        let (beacon, _dir) = new_beacon();
        let metric = metric();

        metric.set(&beacon, "3A4E5C0E-6F7B-4C53-9A8C-6E9D1C4A2B10");
        assert_eq!(
            metric.test_get_value(&beacon, None).as_deref(),
            Some("3a4e5c0e-6f7b-4c53-9a8c-6e9d1c4a2b10")
        );
    }

    #[test]
    fn test_invalid_text_is_rejected() {
        let (beacon, _dir) = new_beacon();
        let metric = metric();

        metric.set(&beacon, "not-a-uuid");
        assert_eq!(metric.test_get_value(&beacon, None), None);
    }

    #[test]
    fn test_generate_and_set() {
        let (beacon, _dir) = new_beacon();
        let metric = metric();

        let generated = metric.generate_and_set(&beacon);
        assert_eq!(metric.test_get_value(&beacon, None), Some(generated.to_string()));
    }
}
