//! # beacon-core
//!
//! The registry side of the Beacon telemetry boundary.
//!
//! This crate provides:
//! - A [`Beacon`] context object holding metric storage and registered pings
//! - Metric types (boolean, string, uuid, counter, event)
//! - Ping assembly with per-ping sequence numbers
//! - A pull-based upload task queue the host drains one ping at a time
//!
//! The core never performs network I/O. It describes requests and is told
//! how they went.

mod beacon;
mod config;
mod error;
pub mod metrics;
mod ping;
mod storage;
pub mod upload;

pub use beacon::Beacon;
pub use config::{Configuration, UploadPolicy};
pub use error::{BeaconError, Result};
pub use metrics::{
    BooleanMetric, CommonMetricData, CounterMetric, EventMetric, Lifetime, Metric,
    RecordedEvent, StringMetric, UuidMetric,
};
pub use ping::{PingMaker, PingType, DELETION_REQUEST_PING};
pub use storage::MetricStore;
pub use upload::{
    PingRequest, PingUploadManager, PingUploadTask, UploadOutcome, UploadResult, UploadState,
};

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use crate::{Beacon, Configuration};

    pub fn new_beacon() -> (Beacon, TempDir) {
        new_beacon_with(|_| {})
    }

    pub fn new_beacon_with(customize: impl FnOnce(&mut Configuration)) -> (Beacon, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Configuration::new(dir.path(), "org.example.test");
        customize(&mut config);
        let beacon = Beacon::new(config).unwrap();
        (beacon, dir)
    }
}
