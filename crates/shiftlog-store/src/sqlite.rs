//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension, params};
use shiftlog_api::{OutboundEvent, ShiftSession};
use shiftlog_util::EmployeeId;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, OutboxEntry, Store, StoreError, StoreResult, session_key};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- One shift record per driver
            CREATE TABLE IF NOT EXISTS local_sessions (
                storage_key TEXT PRIMARY KEY,
                session_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Records waiting for the office
            CREATE TABLE IF NOT EXISTS outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                idempotency_key TEXT NOT NULL UNIQUE,
                action TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL
            );

            -- Closing odometer of the last shift closed here, per vehicle
            CREATE TABLE IF NOT EXISTS vehicle_odometers (
                vehicle TEXT PRIMARY KEY,
                odometer INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| shiftlog_util::now())
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp: parse_timestamp(&timestamp_str),
                event,
            });
        }

        Ok(events)
    }

    fn load_session(&self, employee_id: &EmployeeId) -> StoreResult<Option<ShiftSession>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT session_json FROM local_sessions WHERE storage_key = ?",
                [session_key(employee_id)],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => match serde_json::from_str(&s) {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    // A record we cannot read is as good as no record
                    warn!(employee_id = %employee_id, error = %e, "Discarding unreadable shift record");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn save_session(&self, session: &ShiftSession) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(session)?;

        conn.execute(
            r#"
            INSERT INTO local_sessions (storage_key, session_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(storage_key)
            DO UPDATE SET session_json = excluded.session_json, updated_at = excluded.updated_at
            "#,
            params![
                session_key(&session.driver.employee_id),
                json,
                shiftlog_util::now().to_rfc3339()
            ],
        )?;

        debug!(session_id = %session.session_id, "Shift record saved");
        Ok(())
    }

    fn delete_session(&self, employee_id: &EmployeeId) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM local_sessions WHERE storage_key = ?",
            [session_key(employee_id)],
        )?;
        debug!(employee_id = %employee_id, "Shift record deleted");
        Ok(())
    }

    fn enqueue_outbound(&self, event: &OutboundEvent) -> StoreResult<bool> {
        let conn = self.conn()?;
        let payload_json = serde_json::to_string(&event.payload)?;

        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO outbox (idempotency_key, action, payload_json, created_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                event.idempotency_key,
                event.action().as_str(),
                payload_json,
                shiftlog_util::now().to_rfc3339()
            ],
        )?;

        if inserted == 0 {
            debug!(key = %event.idempotency_key, "Outbound record already queued");
        }
        Ok(inserted > 0)
    }

    fn pending_outbound(&self) -> StoreResult<Vec<OutboxEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, idempotency_key, payload_json, attempts, last_error, created_at
            FROM outbox ORDER BY id ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let key: String = row.get(1)?;
            let payload_json: String = row.get(2)?;
            let attempts: u32 = row.get(3)?;
            let last_error: Option<String> = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok((id, key, payload_json, attempts, last_error, created_at))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, idempotency_key, payload_json, attempts, last_error, created_at) = row?;
            let event = OutboundEvent {
                idempotency_key,
                payload: serde_json::from_str(&payload_json)?,
            };

            entries.push(OutboxEntry {
                id,
                action: event.action(),
                event,
                attempts,
                last_error,
                created_at: parse_timestamp(&created_at),
            });
        }

        Ok(entries)
    }

    fn outbound_count(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn mark_delivered(&self, idempotency_key: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM outbox WHERE idempotency_key = ?",
            [idempotency_key],
        )?;
        debug!(key = %idempotency_key, "Outbound record delivered");
        Ok(())
    }

    fn record_failure(&self, idempotency_key: &str, error: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE outbox SET attempts = attempts + 1, last_error = ? WHERE idempotency_key = ?",
            params![error, idempotency_key],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(idempotency_key.to_string()));
        }
        Ok(())
    }

    fn last_odometer(&self, vehicle: &str) -> StoreResult<Option<u64>> {
        let conn = self.conn()?;

        let odometer: Option<i64> = conn
            .query_row(
                "SELECT odometer FROM vehicle_odometers WHERE vehicle = ?",
                [vehicle],
                |row| row.get(0),
            )
            .optional()?;

        Ok(odometer.map(|o| o as u64))
    }

    fn remember_odometer(&self, vehicle: &str, odometer: u64) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO vehicle_odometers (vehicle, odometer, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(vehicle)
            DO UPDATE SET odometer = excluded.odometer, updated_at = excluded.updated_at
            "#,
            params![vehicle, odometer as i64, shiftlog_util::now().to_rfc3339()],
        )?;

        debug!(vehicle = %vehicle, odometer, "Closing odometer remembered");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
