//! Ordered delivery of queued office records

use shiftlog_api::OutboundAction;
use shiftlog_office::{OfficeBackend, OfficeError, with_timeout};
use shiftlog_store::{AuditEvent, AuditEventType, Store, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A record that could not be delivered this round
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub idempotency_key: String,
    pub action: OutboundAction,
    /// Attempts so far, this one included
    pub attempts: u32,
    pub error: String,
}

/// What one flush did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub delivered: Vec<String>,
    pub failures: Vec<DeliveryFailure>,
    /// Records still queued afterwards
    pub remaining: usize,
}

impl FlushReport {
    /// Nothing was attempted
    pub fn is_idle(&self) -> bool {
        self.delivered.is_empty() && self.failures.is_empty()
    }

    /// Failure of a shift's final record, if any
    pub fn end_failure(&self) -> Option<&DeliveryFailure> {
        self.failures
            .iter()
            .find(|f| f.action == OutboundAction::End)
    }
}

/// Pushes queued records to the office, oldest first
///
/// Rows leave the queue only once the office accepted them. Every record
/// carries its idempotency key, so a retry after a lost answer is harmless.
#[derive(Clone)]
pub struct Outbox {
    store: Arc<dyn Store>,
    office: Arc<dyn OfficeBackend>,
    timeout: Duration,
    flushing: Arc<Mutex<()>>,
}

impl Outbox {
    pub fn new(store: Arc<dyn Store>, office: Arc<dyn OfficeBackend>, timeout: Duration) -> Self {
        Self {
            store,
            office,
            timeout,
            flushing: Arc::new(Mutex::new(())),
        }
    }

    /// Number of records waiting for delivery
    pub fn pending(&self) -> usize {
        self.store.outbound_count().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to count queued records");
            0
        })
    }

    /// Try to deliver everything queued.
    ///
    /// An unreachable office ends the round at the first failure, so later
    /// records of a shift never overtake earlier ones. A record the office
    /// answered with an error stays queued and the round moves on.
    pub async fn flush(&self) -> StoreResult<FlushReport> {
        let _guard = self.flushing.lock().await;
        let mut report = FlushReport::default();

        let pending = self.store.pending_outbound()?;
        if pending.is_empty() {
            return Ok(report);
        }
        debug!(count = pending.len(), "Flushing outbox");

        for entry in pending {
            let key = entry.event.idempotency_key.clone();
            match with_timeout(self.timeout, self.office.push(&entry.event)).await {
                Ok(()) => {
                    self.store.mark_delivered(&key)?;
                    info!(idempotency_key = %key, action = %entry.action, "Delivered to office");
                    report.delivered.push(key);
                }
                Err(e) => {
                    let office_answered = matches!(e, OfficeError::Rejected(_));
                    let error = e.to_string();
                    self.store.record_failure(&key, &error)?;

                    let attempts = entry.attempts + 1;
                    warn!(
                        idempotency_key = %key,
                        action = %entry.action,
                        attempts,
                        error = %error,
                        "Office push failed, record stays queued"
                    );
                    if let Err(e) = self.store.append_audit(AuditEvent::new(
                        AuditEventType::PushFailed {
                            idempotency_key: key.clone(),
                            error: error.clone(),
                        },
                    )) {
                        warn!(error = %e, "Failed to audit push failure");
                    }

                    report.failures.push(DeliveryFailure {
                        idempotency_key: key,
                        action: entry.action,
                        attempts,
                        error,
                    });

                    if !office_answered {
                        break;
                    }
                }
            }
        }

        report.remaining = self.store.outbound_count()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shiftlog_api::{
        DriverIdentity, DriverShift, FuelRecord, OutboundEvent, ShiftSession, StartOrigin,
        Station, Vehicle, VehicleUsage,
    };
    use shiftlog_office::{MockOffice, OfficeResult, RemoteStart};
    use shiftlog_store::SqliteStore;
    use shiftlog_util::EmployeeId;

    fn session() -> ShiftSession {
        let mut session = ShiftSession::open(
            DriverIdentity::new(EmployeeId::new("12345"), "Mario Rossi"),
            "VEH_001",
            60000,
            StartOrigin::Manual,
            false,
            shiftlog_util::now(),
        );
        session.append_fuel(FuelRecord {
            odometer_at_fill: Some(60120),
            litres: 40.5,
            cost: 80.0,
            card_number: "CARD-1".into(),
            station_name: "Q8 Modena Nord".into(),
            recorded_at: shiftlog_util::now(),
        });
        session
    }

    fn queue(store: &SqliteStore, session: &ShiftSession) {
        store.enqueue_outbound(&OutboundEvent::start(session)).unwrap();
        store
            .enqueue_outbound(&OutboundEvent::fuel(session, 0).unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn delivers_in_queue_order() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let office = Arc::new(MockOffice::new());
        let session = session();
        queue(&store, &session);

        let outbox = Outbox::new(store.clone(), office.clone(), Duration::from_secs(1));
        let report = outbox.flush().await.unwrap();

        assert_eq!(report.delivered.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.remaining, 0);

        let pushed = office.pushed();
        assert_eq!(pushed[0].action(), OutboundAction::Start);
        assert_eq!(pushed[1].action(), OutboundAction::Fuel);
    }

    #[tokio::test]
    async fn unreachable_office_keeps_everything() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let office = Arc::new(MockOffice::new());
        office.set_fail_push(true);
        let session = session();
        queue(&store, &session);

        let outbox = Outbox::new(store.clone(), office.clone(), Duration::from_secs(1));
        let report = outbox.flush().await.unwrap();

        // The round ends at the first record
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].action, OutboundAction::Start);
        assert_eq!(report.failures[0].attempts, 1);
        assert_eq!(report.remaining, 2);
        assert!(office.pushed().is_empty());

        let audits = store.get_recent_audits(10).unwrap();
        assert!(
            audits
                .iter()
                .any(|a| matches!(a.event, AuditEventType::PushFailed { .. }))
        );

        office.set_fail_push(false);
        let report = outbox.flush().await.unwrap();
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let outbox = Outbox::new(store, Arc::new(MockOffice::new()), Duration::from_secs(1));
        let report = outbox.flush().await.unwrap();
        assert!(report.is_idle());
        assert_eq!(outbox.pending(), 0);
    }

    /// Office that answers every START with an error
    struct RejectingOffice {
        inner: MockOffice,
    }

    #[async_trait]
    impl OfficeBackend for RejectingOffice {
        async fn get_driver(&self, id: &EmployeeId) -> OfficeResult<Option<DriverIdentity>> {
            self.inner.get_driver(id).await
        }
        async fn get_vehicles(&self) -> OfficeResult<Vec<Vehicle>> {
            self.inner.get_vehicles().await
        }
        async fn check_remote_start(&self, driver_name: &str) -> OfficeResult<RemoteStart> {
            self.inner.check_remote_start(driver_name).await
        }
        async fn get_history(&self, vehicle: &str) -> OfficeResult<Vec<VehicleUsage>> {
            self.inner.get_history(vehicle).await
        }
        async fn get_driver_history(&self, id: &EmployeeId) -> OfficeResult<Vec<DriverShift>> {
            self.inner.get_driver_history(id).await
        }
        async fn get_stations(&self) -> OfficeResult<Vec<Station>> {
            self.inner.get_stations().await
        }
        async fn push(&self, event: &OutboundEvent) -> OfficeResult<()> {
            if event.action() == OutboundAction::Start {
                return Err(OfficeError::Rejected("Targa sconosciuta".into()));
            }
            self.inner.push(event).await
        }
    }

    #[tokio::test]
    async fn rejected_record_does_not_block_the_rest() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let office = Arc::new(RejectingOffice {
            inner: MockOffice::new(),
        });
        let session = session();
        queue(&store, &session);

        let outbox = Outbox::new(store.clone(), office.clone(), Duration::from_secs(1));
        let report = outbox.flush().await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.delivered, vec![format!("{}:fuel:0", session.session_id)]);
        assert_eq!(report.remaining, 1);
        assert!(report.end_failure().is_none());

        let pending = store.pending_outbound().unwrap();
        assert_eq!(pending[0].action, OutboundAction::Start);
        assert!(pending[0].last_error.as_deref().unwrap().contains("Targa"));
    }
}
