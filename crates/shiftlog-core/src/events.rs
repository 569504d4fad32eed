//! Core events emitted by the engine

use chrono::NaiveDate;
use shiftlog_api::{ClosedShiftSummary, FuelRecord, ShiftCorrection, ShiftScreen, ShiftSession};
use shiftlog_util::{EmployeeId, SessionId};

/// Events emitted by the core engine
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Screen changed
    ScreenChanged {
        from: ShiftScreen,
        to: ShiftScreen,
    },

    /// A shift was opened from a preload or a manual start
    ShiftStarted { session: ShiftSession },

    /// A same-day shift was picked up again
    ShiftResumed { session: ShiftSession },

    /// A local record from another day was thrown away at login
    StaleSessionDiscarded {
        employee_id: EmployeeId,
        date: NaiveDate,
    },

    /// Fuel record appended
    FuelRecorded {
        session_id: SessionId,
        index: usize,
        record: FuelRecord,
    },

    /// The office overwrote local fields
    OfficeCorrection {
        session: ShiftSession,
        corrections: Vec<ShiftCorrection>,
    },

    /// Shift closed
    ShiftClosed { summary: ClosedShiftSummary },
}
