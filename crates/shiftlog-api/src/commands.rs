//! Command types for the shiftd protocol

use serde::{Deserialize, Serialize};
use shiftlog_util::{ClientId, EmployeeId};

use crate::{
    API_VERSION, ClosedShiftSummary, DriverIdentity, DriverShift, FuelEntry, HealthStatus,
    ScanKind, ScanOutcome, ServiceStateSnapshot, ShiftSession, Station, Vehicle, VehicleUsage,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    DriverNotFound,
    InvalidFuelRecord,
    InvalidTransition,
    NoActiveSession,
    OfficeUnavailable,
    PermissionDenied,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get current service state
    GetState,

    /// Log a driver in by employee number
    Login { employee_id: EmployeeId },

    /// Start the shift with driver-entered vehicle and odometer.
    /// Repeat the same call to confirm a low-odometer warning.
    StartManual { vehicle: String, odometer: u64 },

    /// Record a refueling event
    AddFuel { entry: FuelEntry },

    /// Move to the shift closure screen
    BeginClose,

    /// Leave the closure screen without closing
    CancelClose,

    /// Close the shift with the final odometer reading
    CloseShift { end_odometer: u64 },

    /// Leave the terminal; an open shift stays saved for today
    Logout,

    /// Office vehicle list
    ListVehicles,

    /// Office fuel station list
    ListStations,

    /// Usage history of one vehicle
    VehicleHistory { plate: String },

    /// Past shifts of the logged-in driver
    DriverHistory,

    /// Read a badge or vehicle tag
    Scan { kind: ScanKind },

    /// Abort the scan in progress
    CancelScan,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Whether the command changes shift state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::Login { .. }
                | Command::StartManual { .. }
                | Command::AddFuel { .. }
                | Command::BeginClose
                | Command::CancelClose
                | Command::CloseShift { .. }
                | Command::Logout
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(ServiceStateSnapshot),
    /// An open shift: preloaded, resumed, started, or updated
    Session(ShiftSession),
    /// No preload found; the driver has to enter vehicle and odometer
    ManualStartRequired {
        driver: DriverIdentity,
    },
    /// Entered odometer is below the vehicle's last known reading.
    /// Repeat the same StartManual to confirm.
    AnomalyConfirmationRequired {
        vehicle: String,
        entered_odometer: u64,
        last_known_odometer: u64,
    },
    ShiftClosed(ClosedShiftSummary),
    LoggedOut,
    ScreenChanged {
        screen: crate::ShiftScreen,
    },
    Vehicles(Vec<Vehicle>),
    Stations(Vec<Station>),
    VehicleHistory(Vec<VehicleUsage>),
    DriverHistory(Vec<DriverShift>),
    Scanned(ScanOutcome),
    ScanCancelled,
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}
