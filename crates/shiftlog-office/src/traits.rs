//! Office and scanner traits

use async_trait::async_trait;
use shiftlog_api::{
    DriverIdentity, DriverShift, OutboundEvent, ScanKind, ScanOutcome, Station, Vehicle,
    VehicleUsage,
};
use shiftlog_util::EmployeeId;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::RemoteStart;

/// Errors from office calls
#[derive(Debug, Error)]
pub enum OfficeError {
    #[error("Office unreachable: {0}")]
    Transport(String),

    #[error("Office request timed out")]
    Timeout,

    #[error("Office returned HTTP {0}")]
    Status(u16),

    #[error("Office rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed office response: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OfficeError {
    /// The office could not be reached or did not answer in time
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            OfficeError::Transport(_) | OfficeError::Timeout | OfficeError::Status(_)
        )
    }
}

pub type OfficeResult<T> = Result<T, OfficeError>;

impl From<OfficeError> for shiftlog_util::ShiftError {
    fn from(e: OfficeError) -> Self {
        shiftlog_util::ShiftError::office(e.to_string())
    }
}

/// Bound an office call by `timeout`, whatever the backend does internally
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> OfficeResult<T>
where
    F: Future<Output = OfficeResult<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| OfficeError::Timeout)?
}

/// The back office's lookup and logging endpoint
///
/// Every call is best-effort; the caller decides how a failure degrades.
#[async_trait]
pub trait OfficeBackend: Send + Sync {
    /// Look up a driver by employee number
    async fn get_driver(&self, employee_id: &EmployeeId) -> OfficeResult<Option<DriverIdentity>>;

    /// Vehicles known to the office
    async fn get_vehicles(&self) -> OfficeResult<Vec<Vehicle>>;

    /// Today's office-entered start for a driver
    async fn check_remote_start(&self, driver_name: &str) -> OfficeResult<RemoteStart>;

    /// Usage history of one vehicle
    async fn get_history(&self, vehicle: &str) -> OfficeResult<Vec<VehicleUsage>>;

    /// Past shifts of one driver
    async fn get_driver_history(&self, employee_id: &EmployeeId) -> OfficeResult<Vec<DriverShift>>;

    /// Fuel stations
    async fn get_stations(&self) -> OfficeResult<Vec<Station>>;

    /// Deliver one outbound record
    async fn push(&self, event: &OutboundEvent) -> OfficeResult<()>;

    /// Optional: check if the backend is usable at all
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Badge and vehicle tag reader
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Read one code. Resolves to `Cancelled` once `cancel` is called.
    async fn scan(&self, kind: ScanKind) -> ScanOutcome;

    /// Abort the scan in progress, if any
    fn cancel(&self);
}
