//! Store trait definitions

use chrono::{DateTime, Local};
use shiftlog_api::{OutboundAction, OutboundEvent, ShiftSession};
use shiftlog_util::EmployeeId;

use crate::{AuditEvent, StoreResult};

/// Version of the serialized local shift record
pub const SESSION_STORAGE_VERSION: u32 = 1;

/// Storage key of a driver's local shift record
pub fn session_key(employee_id: &EmployeeId) -> String {
    format!("shift:v{}:{}", SESSION_STORAGE_VERSION, employee_id)
}

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Local shift records

    /// Load the driver's local shift record, if any
    fn load_session(&self, employee_id: &EmployeeId) -> StoreResult<Option<ShiftSession>>;

    /// Overwrite the driver's local shift record
    fn save_session(&self, session: &ShiftSession) -> StoreResult<()>;

    /// Delete the driver's local shift record
    fn delete_session(&self, employee_id: &EmployeeId) -> StoreResult<()>;

    // Outbound queue

    /// Queue a record for the office. Returns false if the key was already queued.
    fn enqueue_outbound(&self, event: &OutboundEvent) -> StoreResult<bool>;

    /// Queued records, oldest first
    fn pending_outbound(&self) -> StoreResult<Vec<OutboxEntry>>;

    /// Number of queued records
    fn outbound_count(&self) -> StoreResult<usize>;

    /// Drop a delivered record
    fn mark_delivered(&self, idempotency_key: &str) -> StoreResult<()>;

    /// Record a failed delivery attempt
    fn record_failure(&self, idempotency_key: &str, error: &str) -> StoreResult<()>;

    // Odometer cache

    /// Closing odometer of the last shift closed on this device for a vehicle
    fn last_odometer(&self, vehicle: &str) -> StoreResult<Option<u64>>;

    /// Remember a vehicle's closing odometer
    fn remember_odometer(&self, vehicle: &str, odometer: u64) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// A queued outbound record with its delivery bookkeeping
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub action: OutboundAction,
    pub event: OutboundEvent,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Local>,
}
