//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use shiftlog_api::{ShiftCorrection, StartOrigin};
use shiftlog_util::{EmployeeId, SessionId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Unknown employee number at login
    LoginFailed { employee_id: EmployeeId },

    /// Shift opened from a preload or a manual start
    ShiftStarted {
        session_id: SessionId,
        employee_id: EmployeeId,
        vehicle: String,
        start_odometer: u64,
        origin: StartOrigin,
        anomaly: bool,
    },

    /// Same-day shift picked up again after a logout or restart
    ShiftResumed {
        session_id: SessionId,
        employee_id: EmployeeId,
    },

    /// Fuel record appended
    FuelRecorded {
        session_id: SessionId,
        index: usize,
        litres: f64,
        cost: f64,
    },

    /// Office overwrote local fields
    OfficeCorrection {
        session_id: SessionId,
        corrections: Vec<ShiftCorrection>,
    },

    /// Shift closed
    ShiftClosed {
        session_id: SessionId,
        end_odometer: u64,
        total_distance: i64,
    },

    /// Delivery of an outbound record failed
    PushFailed {
        idempotency_key: String,
        error: String,
    },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: shiftlog_util::now(),
            event,
        }
    }
}
