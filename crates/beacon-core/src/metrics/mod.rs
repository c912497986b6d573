//! Metric types recorded into the Beacon registry
//!
//! Each metric type is a small value object describing *where* data goes
//! (category, name, target pings, lifetime). The data itself lives in the
//! registry's [`MetricStore`](crate::MetricStore); a metric only carries the
//! key to it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

use crate::Beacon;

mod boolean;
mod counter;
mod event;
mod string;
mod uuid;

pub use self::boolean::BooleanMetric;
pub use self::counter::CounterMetric;
pub use self::event::{EventMetric, RecordedEvent};
pub use self::string::{StringMetric, MAX_STRING_LENGTH};
pub use self::uuid::UuidMetric;

/// How long recorded data survives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// Cleared every time the ping it is sent in is submitted
    #[default]
    Ping,
    /// Kept for the lifetime of the registry instance
    Application,
    /// Kept until upload is disabled
    User,
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ping => write!(f, "ping"),
            Self::Application => write!(f, "application"),
            Self::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for Lifetime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ping" | "0" => Ok(Self::Ping),
            "application" | "1" => Ok(Self::Application),
            "user" | "2" => Ok(Self::User),
            _ => Err(format!("Invalid lifetime: {}", s)),
        }
    }
}

impl TryFrom<i32> for Lifetime {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ping),
            1 => Ok(Self::Application),
            2 => Ok(Self::User),
            other => Err(format!("Invalid lifetime: {}", other)),
        }
    }
}

/// Data shared by every metric type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonMetricData {
    pub category: String,
    pub name: String,
    /// Pings this metric is reported in
    pub send_in_pings: Vec<String>,
    #[serde(default)]
    pub lifetime: Lifetime,
    #[serde(default)]
    pub disabled: bool,
}

impl CommonMetricData {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        send_in_pings: Vec<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            send_in_pings,
            ..Default::default()
        }
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Key under which the metric appears in a ping payload
    pub fn identifier(&self) -> String {
        if self.category.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.category, self.name)
        }
    }

    /// Recording is skipped for disabled metrics and while upload is off
    pub(crate) fn should_record(&self, beacon: &Beacon) -> bool {
        !self.disabled && beacon.is_upload_enabled()
    }

    /// Ping used by test getters when none is given
    pub(crate) fn default_ping(&self) -> Option<&str> {
        self.send_in_pings.first().map(String::as_str)
    }
}

/// A recorded metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Metric {
    Boolean(bool),
    String(String),
    Uuid(String),
    Counter(i32),
    Event(Vec<RecordedEvent>),
}

impl Metric {
    /// Section of the ping payload's `metrics` object this value is reported under
    pub fn ping_section(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Uuid(_) => "uuid",
            Self::Counter(_) => "counter",
            Self::Event(_) => "event",
        }
    }

    pub fn as_json(&self) -> JsonValue {
        match self {
            Self::Boolean(b) => json!(b),
            Self::String(s) | Self::Uuid(s) => json!(s),
            Self::Counter(c) => json!(c),
            Self::Event(events) => json!(events),
        }
    }
}

/// Payload fragment for a set of metrics, grouped by section
pub(crate) fn group_by_section<'a>(
    metrics: impl IntoIterator<Item = (&'a String, &'a Metric)>,
) -> BTreeMap<&'static str, BTreeMap<String, JsonValue>> {
    let mut sections: BTreeMap<&'static str, BTreeMap<String, JsonValue>> = BTreeMap::new();
    for (identifier, metric) in metrics {
        sections
            .entry(metric.ping_section())
            .or_default()
            .insert(identifier.clone(), metric.as_json());
    }
    sections
}
