//! In-memory metric storage
//!
//! Data is keyed by ping, then lifetime, then metric identifier. Snapshots
//! merge all lifetimes of one ping into the payload's `metrics` object.

use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::metrics::{group_by_section, CommonMetricData, Lifetime, Metric};

type LifetimeStore = HashMap<Lifetime, BTreeMap<String, Metric>>;

/// Metric data for every ping known to the registry
#[derive(Debug, Default)]
pub struct MetricStore {
    pings: HashMap<String, LifetimeStore>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` in every ping the metric is sent in
    pub fn record(&mut self, meta: &CommonMetricData, value: &Metric) {
        let identifier = meta.identifier();
        for ping in &meta.send_in_pings {
            self.bucket(ping, meta.lifetime)
                .insert(identifier.clone(), value.clone());
        }
    }

    /// Read-modify-write `meta`'s value in every ping it is sent in
    pub fn record_with<F>(&mut self, meta: &CommonMetricData, transform: F)
    where
        F: Fn(Option<&Metric>) -> Metric,
    {
        let identifier = meta.identifier();
        for ping in &meta.send_in_pings {
            let bucket = self.bucket(ping, meta.lifetime);
            let new_value = transform(bucket.get(&identifier));
            bucket.insert(identifier.clone(), new_value);
        }
    }

    pub fn get(&self, ping: &str, lifetime: Lifetime, identifier: &str) -> Option<&Metric> {
        self.pings.get(ping)?.get(&lifetime)?.get(identifier)
    }

    /// The `metrics` object for a ping, or `None` when nothing is stored
    pub fn snapshot(&self, ping: &str) -> Option<JsonValue> {
        let lifetimes = self.pings.get(ping)?;
        let all = lifetimes.values().flat_map(|bucket| bucket.iter());
        let sections = group_by_section(all);
        if sections.is_empty() {
            return None;
        }
        Some(json!(sections))
    }

    /// Total number of events recorded for a ping across all event metrics
    pub fn event_count(&self, ping: &str) -> usize {
        let Some(lifetimes) = self.pings.get(ping) else {
            return 0;
        };
        lifetimes
            .values()
            .flat_map(|bucket| bucket.values())
            .map(|metric| match metric {
                Metric::Event(events) => events.len(),
                _ => 0,
            })
            .sum()
    }

    /// Drop ping-lifetime data after the ping has been assembled
    pub fn clear_ping_lifetime(&mut self, ping: &str) {
        if let Some(lifetimes) = self.pings.get_mut(ping) {
            lifetimes.remove(&Lifetime::Ping);
            debug!("Cleared ping lifetime data for {}", ping);
        }
    }

    pub fn clear_all(&mut self) {
        self.pings.clear();
    }

    fn bucket(&mut self, ping: &str, lifetime: Lifetime) -> &mut BTreeMap<String, Metric> {
        self.pings
            .entry(ping.to_string())
            .or_default()
            .entry(lifetime)
            .or_default()
    }
}
