//! Event types for shiftd -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use shiftlog_util::SessionId;

use crate::{
    API_VERSION, ClosedShiftSummary, FuelRecord, ServiceStateSnapshot, ShiftCorrection,
    ShiftSession,
};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: shiftlog_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe and major changes)
    StateChanged(ServiceStateSnapshot),

    /// A shift is open (preloaded, resumed, or started manually)
    ShiftStarted { session: ShiftSession },

    /// A fuel record was appended
    FuelRecorded {
        session_id: SessionId,
        index: usize,
        record: FuelRecord,
    },

    /// The office overwrote local fields; the terminal shows a notice
    OfficeCorrection {
        session_id: SessionId,
        corrections: Vec<ShiftCorrection>,
        session: ShiftSession,
    },

    /// Shift closed locally
    ShiftClosed { summary: ClosedShiftSummary },

    /// The final record could not be delivered yet; it stays queued
    PushFailed {
        idempotency_key: String,
        action: String,
        message: String,
    },

    /// Service is shutting down
    Shutdown,
}
