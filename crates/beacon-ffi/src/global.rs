//! The process-wide registry behind the C ABI
//!
//! A C host has no way to carry a context object around, so the boundary
//! keeps one [`Beacon`] per process. Lifecycle is explicit:
//! `beacon_initialize` → calls → `beacon_destroy`, after which a new
//! registry may be initialized.

use beacon_core::{Beacon, Configuration};
use ffi_support::FfiStr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{FfiError, Result};
use crate::fail_open::fail_open;
use crate::strings::required_str;

static BEACON: RwLock<Option<Arc<Beacon>>> = RwLock::new(None);

/// Configuration as laid out by the host
#[repr(C)]
pub struct FfiConfiguration<'a> {
    pub data_dir: FfiStr<'a>,
    pub package_name: FfiStr<'a>,
    pub upload_enabled: u8,
    /// Null when unset
    pub max_events: Option<&'a i32>,
    pub delay_ping_lifetime_io: u8,
}

impl FfiConfiguration<'_> {
    fn to_configuration(&self) -> Result<Configuration> {
        let data_dir = required_str(&self.data_dir, "data_dir")?;
        let package_name = required_str(&self.package_name, "package_name")?;

        let max_events = match self.max_events {
            None => None,
            Some(&value) => Some(usize::try_from(value).map_err(|_| {
                FfiError::InvalidArgument(format!("max_events must not be negative: {}", value))
            })?),
        };

        let mut config = Configuration::new(PathBuf::from(data_dir), package_name);
        config.upload_enabled = self.upload_enabled != 0;
        config.max_events = max_events;
        config.delay_ping_lifetime_io = self.delay_ping_lifetime_io != 0;
        Ok(config)
    }
}

/// The current registry, if one is initialized
pub(crate) fn current() -> Option<Arc<Beacon>> {
    BEACON.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Run `f` against the current registry
pub(crate) fn with_beacon<R>(f: impl FnOnce(&Beacon) -> Result<R>) -> Result<R> {
    let beacon = current().ok_or(FfiError::NotInitialized)?;
    f(&beacon)
}

/// Install the registry for this process. Returns 1 on success, 0 if the
/// configuration is invalid or a registry is already installed.
///
/// # Safety
///
/// `config` must be null or point to a valid [`FfiConfiguration`].
#[no_mangle]
pub unsafe extern "C" fn beacon_initialize(config: *const FfiConfiguration<'_>) -> u8 {
    fail_open("beacon_initialize", || -> Result<u8> {
        let config = config
            .as_ref()
            .ok_or(FfiError::NullPointer("config"))?
            .to_configuration()?;

        let mut slot = BEACON.write().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            warn!("Beacon is already initialized, ignoring");
            return Ok(0);
        }
        *slot = Some(Arc::new(Beacon::new(config)?));
        info!("Beacon boundary initialized");
        Ok(1)
    })
}

/// Drop the registry. Handles stay valid; calls that need a registry fail
/// until `beacon_initialize` is called again.
#[no_mangle]
pub extern "C" fn beacon_destroy() {
    fail_open("beacon_destroy", || {
        if BEACON
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            info!("Beacon boundary destroyed");
        }
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn beacon_is_initialized() -> u8 {
    u8::from(current().is_some())
}

#[no_mangle]
pub extern "C" fn beacon_set_upload_enabled(flag: u8) {
    fail_open("beacon_set_upload_enabled", || {
        with_beacon(|beacon| {
            beacon.set_upload_enabled(flag != 0);
            Ok(())
        })
    })
}

#[no_mangle]
pub extern "C" fn beacon_is_upload_enabled() -> u8 {
    fail_open("beacon_is_upload_enabled", || {
        with_beacon(|beacon| Ok(u8::from(beacon.is_upload_enabled())))
    })
}

/// Route log output to stderr, filtered by `RUST_LOG` (default `info`).
/// Calling it again is harmless.
#[no_mangle]
pub extern "C" fn beacon_enable_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_ok();
    if installed {
        info!("Beacon logging enabled");
    }
}
