//! Validated settings structures

use crate::schema::{RawConfig, RawOfficeConfig, RawScannerConfig, RawServiceConfig, RawSyncConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Default office request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default reconciliation poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default simulated scan delay
pub const DEFAULT_SCAN_DELAY: Duration = Duration::from_millis(3000);

/// Validated settings ready for use by the service
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceSettings,
    pub office: OfficeSettings,
    pub sync: SyncSettings,
    pub scanner: ScannerSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSettings::from_raw(raw.service),
            office: OfficeSettings::from_raw(raw.office),
            sync: SyncSettings::from_raw(raw.sync),
            scanner: ScannerSettings::from_raw(raw.scanner),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceSettings {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(shiftlog_util::socket_path_without_env),
            data_dir: raw
                .data_dir
                .unwrap_or_else(shiftlog_util::data_dir_without_env),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct OfficeSettings {
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl OfficeSettings {
    fn from_raw(raw: RawOfficeConfig) -> Self {
        Self {
            endpoint: raw.endpoint,
            request_timeout: raw
                .request_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub poll_interval: Duration,
}

impl SyncSettings {
    fn from_raw(raw: RawSyncConfig) -> Self {
        Self {
            poll_interval: raw
                .poll_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Simulated scanner behaviour; no optical or NFC decoding happens
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub delay: Duration,
    pub driver_code: String,
    pub vehicle_code: String,
}

impl ScannerSettings {
    fn from_raw(raw: RawScannerConfig) -> Self {
        Self {
            delay: raw
                .delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SCAN_DELAY),
            driver_code: raw.driver_code.unwrap_or_else(|| "12345".into()),
            vehicle_code: raw.vehicle_code.unwrap_or_else(|| "VEH_001".into()),
        }
    }
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self::from_raw(RawScannerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let raw = RawConfig {
            config_version: 1,
            service: Default::default(),
            office: RawOfficeConfig {
                endpoint: "https://example.com/exec".into(),
                request_timeout_seconds: None,
            },
            sync: Default::default(),
            scanner: Default::default(),
        };

        let settings = Settings::from_raw(raw);
        assert_eq!(settings.office.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(settings.sync.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(settings.scanner.delay, DEFAULT_SCAN_DELAY);
        assert_eq!(settings.scanner.driver_code, "12345");
        assert!(settings.service.socket_path.to_string_lossy().ends_with("shiftd.sock"));
    }
}
