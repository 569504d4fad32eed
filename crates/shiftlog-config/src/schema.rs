//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Office script endpoint
    pub office: RawOfficeConfig,

    /// Reconciliation polling
    #[serde(default)]
    pub sync: RawSyncConfig,

    /// Simulated scanner
    #[serde(default)]
    pub scanner: RawScannerConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the local store
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawOfficeConfig {
    /// Script endpoint URL
    pub endpoint: String,

    /// Timeout for every office call, in seconds
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSyncConfig {
    /// Interval between office reconciliation polls, in seconds
    pub poll_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawScannerConfig {
    /// Simulated read delay in milliseconds
    pub delay_ms: Option<u64>,

    /// Code returned for badge scans
    pub driver_code: Option<String>,

    /// Code returned for vehicle tag scans
    pub vehicle_code: Option<String>,
}
