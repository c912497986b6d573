//! Ping types and ping assembly

use chrono::{DateTime, FixedOffset, Local};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

use crate::storage::MetricStore;
use crate::Beacon;

/// Name of the ping sent when the user turns upload off
pub const DELETION_REQUEST_PING: &str = "deletion-request";

/// A registered kind of ping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingType {
    pub name: String,
    /// Whether `client_info.client_id` is part of the payload
    pub include_client_id: bool,
    /// Whether the ping is sent when it carries no metric data
    pub send_if_empty: bool,
    /// Reasons this ping may be submitted with
    pub reason_codes: Vec<String>,
}

impl PingType {
    pub fn new(
        name: impl Into<String>,
        include_client_id: bool,
        send_if_empty: bool,
        reason_codes: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            include_client_id,
            send_if_empty,
            reason_codes,
        }
    }

    /// Submit this ping for upload. Returns whether a ping was queued.
    pub fn submit(&self, beacon: &Beacon, reason: Option<&str>) -> bool {
        beacon.submit_ping(self, reason)
    }

    /// Filter `reason` down to one this ping declares
    pub(crate) fn validated_reason<'a>(&self, reason: Option<&'a str>) -> Option<&'a str> {
        let reason = reason?;
        if self.reason_codes.iter().any(|code| code == reason) {
            Some(reason)
        } else {
            warn!(
                "Reason '{}' is not declared for ping {}, dropping it",
                reason, self.name
            );
            None
        }
    }
}

#[derive(Debug)]
struct PingState {
    seq: u64,
    start_time: DateTime<FixedOffset>,
}

/// Assembles ping payloads and tracks per-ping sequence numbers
#[derive(Debug, Default)]
pub struct PingMaker {
    state: Mutex<HashMap<String, PingState>>,
}

impl PingMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the payload for `ping` from `store`.
    ///
    /// Returns `None` for an empty ping that is not sent when empty. A ping
    /// that includes the client id always carries data and is never empty.
    /// With `advance` the ping's sequence number and start time move on,
    /// which is what a submission does; collecting for inspection does not.
    pub fn collect(
        &self,
        store: &MetricStore,
        ping: &PingType,
        reason: Option<&str>,
        client_id: &str,
        advance: bool,
    ) -> Option<JsonValue> {
        let metrics = store.snapshot(&ping.name);
        if metrics.is_none() && !ping.include_client_id && !ping.send_if_empty {
            return None;
        }

        let mut payload = Map::new();
        payload.insert(
            "ping_info".to_string(),
            self.ping_info(&ping.name, ping.validated_reason(reason), advance),
        );
        payload.insert(
            "client_info".to_string(),
            client_info(ping.include_client_id.then_some(client_id)),
        );
        if let Some(metrics) = metrics {
            payload.insert("metrics".to_string(), metrics);
        }
        Some(JsonValue::Object(payload))
    }

    /// Pretty-printed [`collect`](Self::collect) without side effects
    pub fn collect_string(
        &self,
        store: &MetricStore,
        ping: &PingType,
        reason: Option<&str>,
        client_id: &str,
    ) -> Option<String> {
        self.collect(store, ping, reason, client_id, false)
            .and_then(|payload| serde_json::to_string_pretty(&payload).ok())
    }

    /// Next sequence number `ping` would be sent with
    pub fn next_seq(&self, ping: &str) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.get(ping).map_or(0, |s| s.seq)
    }

    pub fn reset(&self) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn ping_info(&self, ping: &str, reason: Option<&str>, advance: bool) -> JsonValue {
        let now = now_local();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let entry = state.entry(ping.to_string()).or_insert_with(|| PingState {
            seq: 0,
            start_time: now,
        });

        let mut info = json!({
            "seq": entry.seq,
            "start_time": entry.start_time.to_rfc3339(),
            "end_time": now.to_rfc3339(),
        });
        if let Some(reason) = reason {
            info["reason"] = json!(reason);
        }

        if advance {
            entry.seq += 1;
            entry.start_time = now;
        }
        info
    }
}

fn client_info(client_id: Option<&str>) -> JsonValue {
    let mut info = json!({
        "telemetry_sdk_build": env!("CARGO_PKG_VERSION"),
    });
    if let Some(client_id) = client_id {
        info["client_id"] = json!(client_id);
    }
    info
}

fn now_local() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CommonMetricData, Metric};

    fn ping(include_client_id: bool, send_if_empty: bool) -> PingType {
        PingType::new("custom", include_client_id, send_if_empty, vec!["startup".into()])
    }

    #[test]
    fn test_empty_ping_is_skipped() {
        let maker = PingMaker::new();
        let store = MetricStore::new();
        assert!(maker
            .collect(&store, &ping(false, false), None, "id", true)
            .is_none());
        assert_eq!(maker.next_seq("custom"), 0);
    }

    #[test]
    fn test_send_if_empty_and_client_id_force_a_payload() {
        let maker = PingMaker::new();
        let store = MetricStore::new();

        let payload = maker
            .collect(&store, &ping(false, true), None, "id", false)
            .unwrap();
        assert!(payload.get("metrics").is_none());
        assert!(payload["client_info"].get("client_id").is_none());

        let payload = maker
            .collect(&store, &ping(true, false), None, "abc", false)
            .unwrap();
        assert_eq!(payload["client_info"]["client_id"], "abc");
    }

    #[test]
    fn test_seq_only_advances_on_submission() {
        let maker = PingMaker::new();
        let mut store = MetricStore::new();
        store.record(
            &CommonMetricData::new("a", "b", vec!["custom".into()]),
            &Metric::Boolean(true),
        );

        let p = ping(false, false);
        let first = maker.collect(&store, &p, None, "id", false).unwrap();
        let second = maker.collect(&store, &p, None, "id", true).unwrap();
        let third = maker.collect(&store, &p, None, "id", true).unwrap();

        assert_eq!(first["ping_info"]["seq"], 0);
        assert_eq!(second["ping_info"]["seq"], 0);
        assert_eq!(third["ping_info"]["seq"], 1);
        assert_eq!(third["metrics"]["boolean"]["a.b"], true);
    }

    #[test]
    fn test_undeclared_reason_is_dropped() {
        let maker = PingMaker::new();
        let store = MetricStore::new();
        let p = ping(true, false);

        let payload = maker
            .collect(&store, &p, Some("startup"), "id", false)
            .unwrap();
        assert_eq!(payload["ping_info"]["reason"], "startup");

        let payload = maker
            .collect(&store, &p, Some("shutdown"), "id", false)
            .unwrap();
        assert!(payload["ping_info"].get("reason").is_none());
    }
}
