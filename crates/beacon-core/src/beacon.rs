//! The registry context object

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Configuration;
use crate::metrics::{CommonMetricData, Metric};
use crate::ping::{PingMaker, PingType, DELETION_REQUEST_PING};
use crate::storage::MetricStore;
use crate::upload::{PingRequest, PingUploadManager, PingUploadTask, UploadOutcome, UploadResult};
use crate::{BeaconError, Result};

const CLIENT_ID_FILE: &str = "client_id";
const SCHEMA_VERSION: u32 = 1;

/// A telemetry registry: metric storage, registered pings and the upload queue.
///
/// There is no hidden global; hosts create as many independent instances as
/// they need and pass them to every operation.
#[derive(Debug)]
pub struct Beacon {
    config: Configuration,
    client_id: Mutex<Uuid>,
    upload_enabled: AtomicBool,
    storage: Mutex<MetricStore>,
    pings: RwLock<HashMap<String, PingType>>,
    ping_maker: PingMaker,
    upload_manager: PingUploadManager,
}

impl Beacon {
    /// Create a registry, preparing the data directory and client id
    pub fn new(config: Configuration) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_path)?;
        let client_id = load_or_create_client_id(&config.data_path)?;

        if config.delay_ping_lifetime_io {
            debug!("Ping lifetime data is kept in memory only");
        }

        let beacon = Self {
            upload_enabled: AtomicBool::new(config.upload_enabled),
            client_id: Mutex::new(client_id),
            storage: Mutex::new(MetricStore::new()),
            pings: RwLock::new(HashMap::new()),
            ping_maker: PingMaker::new(),
            upload_manager: PingUploadManager::new(config.upload.clone()),
            config,
        };
        beacon.register_ping_type(&PingType::new(
            DELETION_REQUEST_PING,
            true,
            true,
            vec!["at_init".to_string(), "set_upload_enabled".to_string()],
        ));

        info!(
            "Beacon initialized for {} in {:?}",
            beacon.config.package_name, beacon.config.data_path
        );
        Ok(beacon)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn client_id(&self) -> Uuid {
        *self.client_id.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_upload_enabled(&self) -> bool {
        self.upload_enabled.load(Ordering::SeqCst)
    }

    /// Turn upload on or off. Returns whether the setting changed.
    ///
    /// Turning it off drops all queued pings and recorded data, and queues a
    /// `deletion-request` ping for the current client id.
    pub fn set_upload_enabled(&self, enabled: bool) -> bool {
        let was_enabled = self.upload_enabled.swap(enabled, Ordering::SeqCst);
        if was_enabled == enabled {
            return false;
        }

        if enabled {
            info!("Upload enabled");
            return true;
        }

        info!("Upload disabled, clearing pending data");
        self.upload_manager.clear();
        self.lock_storage().clear_all();
        self.ping_maker.reset();

        if let Some(ping) = self.get_ping_by_name(DELETION_REQUEST_PING) {
            if !self.enqueue_ping(&ping, Some("set_upload_enabled")) {
                warn!("Failed to queue deletion-request ping");
            }
        }

        let mut client_id = self.client_id.lock().unwrap_or_else(|e| e.into_inner());
        *client_id = Uuid::new_v4();
        if let Err(e) = write_client_id(&self.config.data_path, &client_id) {
            warn!("Failed to persist new client id: {}", e);
        }
        true
    }

    /// Make a ping known so it can be submitted by name
    pub fn register_ping_type(&self, ping: &PingType) {
        let mut pings = self.pings.write().unwrap_or_else(|e| e.into_inner());
        if pings.insert(ping.name.clone(), ping.clone()).is_some() {
            debug!("Ping {} re-registered", ping.name);
        }
    }

    pub fn get_ping_by_name(&self, name: &str) -> Option<PingType> {
        self.pings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Assemble `ping` and queue it for upload. Returns whether a ping was queued.
    pub fn submit_ping(&self, ping: &PingType, reason: Option<&str>) -> bool {
        if !self.is_upload_enabled() {
            info!("Upload disabled, not submitting {}", ping.name);
            return false;
        }
        self.enqueue_ping(ping, reason)
    }

    /// [`submit_ping`](Self::submit_ping) for a registered ping name
    pub fn submit_ping_by_name(&self, name: &str, reason: Option<&str>) -> bool {
        match self.get_ping_by_name(name) {
            Some(ping) => self.submit_ping(&ping, reason),
            None => {
                warn!("Attempted to submit unknown ping {}", name);
                false
            }
        }
    }

    /// Payload `ping` would be sent with, as pretty JSON. Nothing is cleared.
    pub fn collect_ping(&self, ping: &PingType, reason: Option<&str>) -> Option<String> {
        let client_id = self.client_id().to_string();
        let storage = self.lock_storage();
        self.ping_maker
            .collect_string(&storage, ping, reason, &client_id)
    }

    /// Next unit of upload work for the host
    pub fn get_upload_task(&self, log_ping: bool) -> PingUploadTask {
        self.upload_manager.get_upload_task(log_ping)
    }

    /// Report how `attempt`, the pending upload of `document_id`, ended
    pub fn process_upload_response(
        &self,
        document_id: &str,
        attempt: u64,
        result: UploadResult,
    ) -> Result<UploadOutcome> {
        self.upload_manager
            .process_upload_response(document_id, attempt, result)
    }

    pub fn upload_manager(&self) -> &PingUploadManager {
        &self.upload_manager
    }

    /// Pings queued or in flight
    pub fn pending_uploads(&self) -> usize {
        self.upload_manager.pending_count()
    }

    /// Drop all recorded data and queued pings
    pub fn test_clear_all(&self) {
        self.lock_storage().clear_all();
        self.upload_manager.clear();
        self.ping_maker.reset();
    }

    pub(crate) fn record(&self, meta: &CommonMetricData, value: Metric) {
        self.lock_storage().record(meta, &value);
    }

    pub(crate) fn record_with<F>(&self, meta: &CommonMetricData, transform: F)
    where
        F: Fn(Option<&Metric>) -> Metric,
    {
        self.lock_storage().record_with(meta, transform);
    }

    pub(crate) fn test_get(&self, meta: &CommonMetricData, ping: Option<&str>) -> Option<Metric> {
        let ping = ping.or_else(|| meta.default_ping())?;
        self.lock_storage()
            .get(ping, meta.lifetime, &meta.identifier())
            .cloned()
    }

    pub(crate) fn event_count(&self, ping: &str) -> usize {
        self.lock_storage().event_count(ping)
    }

    fn enqueue_ping(&self, ping: &PingType, reason: Option<&str>) -> bool {
        let client_id = self.client_id().to_string();
        let payload = {
            let mut storage = self.lock_storage();
            let payload = self
                .ping_maker
                .collect(&storage, ping, reason, &client_id, true);
            if payload.is_some() {
                storage.clear_ping_lifetime(&ping.name);
            }
            payload
        };
        let Some(payload) = payload else {
            info!("Ping {} is empty, not submitting", ping.name);
            return false;
        };

        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to serialize ping {}: {}", ping.name, e);
                return false;
            }
        };

        let document_id = Uuid::new_v4().to_string();
        let path = format!(
            "/submit/{}/{}/{}/{}",
            self.config.package_name, ping.name, SCHEMA_VERSION, document_id
        );
        let request = PingRequest::new(document_id, path, body, default_headers());
        info!("Submitting ping {} as {}", ping.name, request.document_id);
        self.upload_manager.enqueue(request)
    }

    fn lock_storage(&self) -> MutexGuard<'_, MetricStore> {
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn default_headers() -> Vec<(String, String)> {
    vec![
        (
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        ),
        (
            "Date".to_string(),
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        ),
        ("X-Client-Type".to_string(), "Beacon".to_string()),
        (
            "X-Client-Version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
    ]
}

fn load_or_create_client_id(data_path: &Path) -> Result<Uuid> {
    let path = data_path.join(CLIENT_ID_FILE);
    if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        match Uuid::parse_str(content.trim()) {
            Ok(id) => return Ok(id),
            Err(e) => warn!("Stored client id is corrupt ({}), generating a new one", e),
        }
    }

    let id = Uuid::new_v4();
    write_client_id(data_path, &id)?;
    debug!("Generated client id {}", id);
    Ok(id)
}

fn write_client_id(data_path: &Path, id: &Uuid) -> Result<()> {
    std::fs::write(data_path.join(CLIENT_ID_FILE), id.to_string()).map_err(BeaconError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_beacon, new_beacon_with};
    use crate::BooleanMetric;
    use serde_json::Value as JsonValue;
    use tempfile::tempdir;

    fn upload(beacon: &Beacon) -> (PingRequest, u64) {
        match beacon.get_upload_task(false) {
            PingUploadTask::Upload { request, attempt } => (request, attempt),
            other => panic!("expected Upload, got {:?}", other),
        }
    }

    #[test]
    fn test_client_id_survives_restart() {
        let dir = tempdir().unwrap();
        let first = Beacon::new(Configuration::new(dir.path(), "app")).unwrap();
        let second = Beacon::new(Configuration::new(dir.path(), "app")).unwrap();
        assert_eq!(first.client_id(), second.client_id());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Beacon::new(Configuration::new(dir.path(), "")),
            Err(BeaconError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_submit_builds_request() {
        let (beacon, _dir) = new_beacon();
        let ping = PingType::new("baseline", false, false, vec![]);
        beacon.register_ping_type(&ping);
        BooleanMetric::new(CommonMetricData::new("a", "b", vec!["baseline".into()]))
            .set(&beacon, true);

        assert!(beacon.submit_ping_by_name("baseline", None));

        let (request, _) = upload(&beacon);
        assert!(request
            .path
            .starts_with("/submit/org.example.test/baseline/1/"));
        assert!(request.path.ends_with(&request.document_id));
        assert_eq!(
            request.header("Content-Type"),
            Some("application/json; charset=utf-8")
        );
        let body: JsonValue = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["metrics"]["boolean"]["a.b"], true);
        assert_eq!(body["ping_info"]["seq"], 0);
    }

    #[test]
    fn test_submit_clears_ping_lifetime_data() {
        let (beacon, _dir) = new_beacon();
        beacon.register_ping_type(&PingType::new("baseline", false, false, vec![]));
        let metric =
            BooleanMetric::new(CommonMetricData::new("a", "b", vec!["baseline".into()]));
        metric.set(&beacon, true);

        assert!(beacon.submit_ping_by_name("baseline", None));
        assert_eq!(metric.test_get_value(&beacon, None), None);
        assert!(!beacon.submit_ping_by_name("baseline", None));
    }

    #[test]
    fn test_unknown_ping_is_not_submitted() {
        let (beacon, _dir) = new_beacon();
        assert!(!beacon.submit_ping_by_name("nope", None));
        assert_eq!(beacon.pending_uploads(), 0);
    }

    #[test]
    fn test_disabling_upload_queues_deletion_request() {
        let (beacon, _dir) = new_beacon();
        beacon.register_ping_type(&PingType::new("baseline", true, true, vec![]));
        assert!(beacon.submit_ping_by_name("baseline", None));
        let old_client_id = beacon.client_id();

        assert!(beacon.set_upload_enabled(false));
        assert!(!beacon.set_upload_enabled(false));
        assert!(!beacon.is_upload_enabled());
        assert!(!beacon.submit_ping_by_name("baseline", None));

        let (request, attempt) = upload(&beacon);
        assert!(request.path.contains(DELETION_REQUEST_PING));
        let body: JsonValue = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(
            body["client_info"]["client_id"],
            old_client_id.to_string().as_str()
        );
        assert_ne!(beacon.client_id(), old_client_id);

        beacon
            .process_upload_response(&request.document_id, attempt, UploadResult::HttpStatus(200))
            .unwrap();
        assert_eq!(beacon.get_upload_task(false), PingUploadTask::Done);
    }

    #[test]
    fn test_starting_disabled_records_nothing() {
        let (beacon, _dir) = new_beacon_with(|config| config.upload_enabled = false);
        let metric =
            BooleanMetric::new(CommonMetricData::new("a", "b", vec!["baseline".into()]));
        metric.set(&beacon, true);
        assert_eq!(metric.test_get_value(&beacon, None), None);
    }

    #[test]
    fn test_collect_ping_has_no_side_effects() {
        let (beacon, _dir) = new_beacon();
        let ping = PingType::new("baseline", false, false, vec![]);
        beacon.register_ping_type(&ping);
        let metric =
            BooleanMetric::new(CommonMetricData::new("a", "b", vec!["baseline".into()]));

        assert_eq!(beacon.collect_ping(&ping, None), None);

        metric.set(&beacon, true);
        let json = beacon.collect_ping(&ping, None).unwrap();
        let payload: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(payload["metrics"]["boolean"]["a.b"], true);
        assert_eq!(metric.test_get_value(&beacon, None), Some(true));
        assert_eq!(beacon.pending_uploads(), 0);
    }
}
