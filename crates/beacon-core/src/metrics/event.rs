//! Event metric

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::metrics::{CommonMetricData, Metric};
use crate::Beacon;

/// Reason used when a ping is submitted because it holds too many events
pub const MAX_CAPACITY_REASON: &str = "max_capacity";

/// A single recorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub category: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, String>>,
}

/// Records a sequence of timestamped events
#[derive(Debug, Clone)]
pub struct EventMetric {
    meta: CommonMetricData,
}

impl EventMetric {
    pub fn new(meta: CommonMetricData) -> Self {
        Self { meta }
    }

    pub fn meta(&self) -> &CommonMetricData {
        &self.meta
    }

    /// Append an event. A ping whose event count reaches the configured
    /// `max_events` is submitted right away.
    pub fn record(&self, beacon: &Beacon, extra: Option<BTreeMap<String, String>>) {
        if !self.meta.should_record(beacon) {
            return;
        }

        let event = RecordedEvent {
            timestamp: Utc::now().timestamp_millis(),
            category: self.meta.category.clone(),
            name: self.meta.name.clone(),
            extra,
        };

        beacon.record_with(&self.meta, |old| match old {
            Some(Metric::Event(events)) => {
                let mut events = events.clone();
                events.push(event.clone());
                Metric::Event(events)
            }
            _ => Metric::Event(vec![event.clone()]),
        });

        let Some(max_events) = beacon.config().max_events else {
            return;
        };
        for ping in &self.meta.send_in_pings {
            if beacon.event_count(ping) >= max_events {
                debug!("Ping {} reached {} events, submitting", ping, max_events);
                beacon.submit_ping_by_name(ping, Some(MAX_CAPACITY_REASON));
            }
        }
    }

    pub fn test_get_value(&self, beacon: &Beacon, ping: Option<&str>) -> Option<Vec<RecordedEvent>> {
        match beacon.test_get(&self.meta, ping)? {
            Metric::Event(events) => Some(events),
            _ => None,
        }
    }
}
