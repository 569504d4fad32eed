//! Shared types for the shiftd API

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use shiftlog_util::{ClientId, EmployeeId, SessionId};
use std::fmt;

/// Which screen the terminal should be showing
///
/// This is the explicit state of the shift state machine; every engine
/// transition starts from one of these and lands in one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftScreen {
    LoggedOut,
    AwaitingPreloadCheck,
    AwaitingManualStart,
    ShiftActive,
    ClosingShift,
}

impl ShiftScreen {
    /// Whether a shift session is open in this state
    pub fn has_open_shift(&self) -> bool {
        matches!(self, ShiftScreen::ShiftActive | ShiftScreen::ClosingShift)
    }
}

impl fmt::Display for ShiftScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShiftScreen::LoggedOut => "logged out",
            ShiftScreen::AwaitingPreloadCheck => "waiting for the office preload check",
            ShiftScreen::AwaitingManualStart => "waiting for a manual start",
            ShiftScreen::ShiftActive => "on shift",
            ShiftScreen::ClosingShift => "closing the shift",
        };
        f.write_str(s)
    }
}

/// Driver identity, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub employee_id: EmployeeId,
    pub name: String,
}

impl DriverIdentity {
    pub fn new(employee_id: EmployeeId, name: impl Into<String>) -> Self {
        Self {
            employee_id,
            name: name.into(),
        }
    }
}

/// Where the starting odometer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOrigin {
    /// Entered by the back office before the driver checked in
    Office,
    /// Typed by the driver on the start screen
    Manual,
}

/// One refueling event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelRecord {
    pub odometer_at_fill: Option<u64>,
    pub litres: f64,
    pub cost: f64,
    pub card_number: String,
    pub station_name: String,
    pub recorded_at: DateTime<Local>,
}

/// Fuel form as submitted by the terminal, before validation
///
/// Numbers arrive as the strings the driver typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelEntry {
    #[serde(default)]
    pub odometer_at_fill: Option<String>,
    #[serde(default)]
    pub litres: Option<String>,
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default)]
    pub card_number: String,
    #[serde(default)]
    pub station_name: String,
}

/// A driver's shift for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftSession {
    pub session_id: SessionId,
    pub date: NaiveDate,
    pub driver: DriverIdentity,
    pub vehicle: String,
    pub start_odometer: u64,
    pub end_odometer: Option<u64>,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    #[serde(default)]
    fuel_records: Vec<FuelRecord>,
    pub anomaly: bool,
    pub origin: StartOrigin,
    pub is_open: bool,
}

impl ShiftSession {
    /// Open a new session starting now
    pub fn open(
        driver: DriverIdentity,
        vehicle: impl Into<String>,
        start_odometer: u64,
        origin: StartOrigin,
        anomaly: bool,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            date: now.date_naive(),
            driver,
            vehicle: vehicle.into(),
            start_odometer,
            end_odometer: None,
            started_at: now,
            ended_at: None,
            fuel_records: Vec::new(),
            anomaly,
            origin,
            is_open: true,
        }
    }

    /// Fuel records in the order they were entered
    pub fn fuel_records(&self) -> &[FuelRecord] {
        &self.fuel_records
    }

    /// Append a fuel record, returning its index
    ///
    /// Records are never edited or removed once appended.
    pub fn append_fuel(&mut self, record: FuelRecord) -> usize {
        self.fuel_records.push(record);
        self.fuel_records.len() - 1
    }

    pub fn fuel_count(&self) -> usize {
        self.fuel_records.len()
    }

    pub fn total_litres(&self) -> f64 {
        self.fuel_records.iter().map(|r| r.litres).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.fuel_records.iter().map(|r| r.cost).sum()
    }

    /// Signed distance from the starting odometer; negative on rollover or a
    /// pending office correction.
    pub fn distance_to(&self, end_odometer: u64) -> i64 {
        end_odometer as i64 - self.start_odometer as i64
    }

    /// Whether this session may be resumed on `day`
    pub fn resumable_on(&self, day: NaiveDate) -> bool {
        self.is_open && self.date == day
    }
}

/// A field the office overwrote during reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum ShiftCorrection {
    StartOdometer { from: u64, to: u64 },
    Vehicle { from: String, to: String },
}

impl fmt::Display for ShiftCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftCorrection::StartOdometer { from, to } => {
                write!(f, "starting km corrected by the office: {} -> {}", from, to)
            }
            ShiftCorrection::Vehicle { from, to } => {
                write!(f, "vehicle corrected by the office: {} -> {}", from, to)
            }
        }
    }
}

/// Final record of a closed shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedShiftSummary {
    pub session_id: SessionId,
    pub date: NaiveDate,
    pub driver: DriverIdentity,
    pub vehicle: String,
    pub start_odometer: u64,
    pub end_odometer: u64,
    /// Not clamped: negative when the end reading is below the start
    pub total_distance: i64,
    pub fuel_records: Vec<FuelRecord>,
    pub total_litres: f64,
    pub total_cost: f64,
    pub anomaly: bool,
    pub origin: StartOrigin,
    /// The terminal should show a confirmation notice
    pub end_below_start: bool,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
}

/// Vehicle known to the office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub plate: String,
    pub model: String,
    pub last_odometer: Option<u64>,
    pub last_driver: Option<String>,
}

/// One past use of a vehicle (display only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleUsage {
    pub driver: String,
    pub date: String,
    pub odometer: Option<u64>,
}

/// One past shift of a driver (display only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverShift {
    pub date: String,
    pub vehicle: String,
    pub start_odometer: Option<u64>,
    pub end_odometer: Option<u64>,
    pub total_distance: Option<i64>,
}

/// Fuel station known to the office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
}

/// What a scan is expected to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// Employee badge
    Driver,
    /// Plate or asset tag on the vehicle
    Vehicle,
}

/// Result of a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum ScanOutcome {
    Code(String),
    Cancelled,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub screen: ShiftScreen,
    pub driver: Option<DriverIdentity>,
    pub session: Option<ShiftSession>,
    /// Outbound office events not yet delivered
    pub pending_outbound: usize,
    /// Whether the reconciliation poll is running
    pub polling: bool,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// In-cab terminal: can run shifts
    Terminal,
    /// Local admin on the device
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    /// Whether this client may change shift state
    pub fn can_operate(&self) -> bool {
        matches!(self, ClientRole::Terminal | ClientRole::Admin)
    }
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub pending_outbound: usize,
}
