//! The shift engine and the side effects it asks for

use shiftlog_api::{
    ErrorCode, ErrorInfo, Event, EventPayload, FuelEntry, HealthStatus, ResponsePayload,
    ServiceStateSnapshot, ShiftScreen,
};
use shiftlog_config::Settings;
use shiftlog_core::{CoreEvent, Effect, LoginStep, PreloadStep, ShiftEngine, StartStep, Transition};
use shiftlog_office::{OfficeBackend, Scanner, with_timeout};
use shiftlog_store::{AuditEvent, AuditEventType, Store};
use shiftlog_util::{EmployeeId, ShiftError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{FlushReport, Outbox, PollTask, PollUpdate};

pub type ServiceResult<T> = Result<T, ShiftError>;

/// Work finished off the main loop, handed back to it
#[derive(Debug)]
pub enum ServiceMessage {
    Poll(PollUpdate),
    Flushed(FlushReport),
}

/// Timeouts and intervals for office traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTiming {
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl ServiceTiming {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            request_timeout: settings.office.request_timeout,
            poll_interval: settings.sync.poll_interval,
        }
    }
}

/// Map a shift error to its protocol error
pub fn error_info(err: &ShiftError) -> ErrorInfo {
    let code = match err {
        ShiftError::DriverNotFound(_) => ErrorCode::DriverNotFound,
        ShiftError::InvalidFuelRecord { .. } => ErrorCode::InvalidFuelRecord,
        ShiftError::InvalidStart(_) => ErrorCode::InvalidRequest,
        ShiftError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        ShiftError::NoActiveSession => ErrorCode::NoActiveSession,
        ShiftError::OfficeError(_) => ErrorCode::OfficeUnavailable,
        ShiftError::StoreError(_) => ErrorCode::StoreError,
        ShiftError::ConfigError(_) | ShiftError::Internal(_) => ErrorCode::InternalError,
    };
    ErrorInfo::new(code, err.to_string())
}

/// Read-only office lookups, safe to run off the main loop
#[derive(Clone)]
pub struct OfficeQueries {
    office: Arc<dyn OfficeBackend>,
    timeout: Duration,
}

impl OfficeQueries {
    pub fn new(office: Arc<dyn OfficeBackend>, timeout: Duration) -> Self {
        Self { office, timeout }
    }

    pub async fn vehicles(&self) -> ServiceResult<ResponsePayload> {
        let vehicles = with_timeout(self.timeout, self.office.get_vehicles()).await?;
        Ok(ResponsePayload::Vehicles(vehicles))
    }

    pub async fn stations(&self) -> ServiceResult<ResponsePayload> {
        let stations = with_timeout(self.timeout, self.office.get_stations()).await?;
        Ok(ResponsePayload::Stations(stations))
    }

    pub async fn vehicle_history(&self, plate: &str) -> ServiceResult<ResponsePayload> {
        let plate = plate.trim();
        if plate.is_empty() {
            return Ok(ResponsePayload::VehicleHistory(Vec::new()));
        }
        let usage = with_timeout(self.timeout, self.office.get_history(plate)).await?;
        Ok(ResponsePayload::VehicleHistory(usage))
    }

    pub async fn driver_history(&self, employee_id: &EmployeeId) -> ServiceResult<ResponsePayload> {
        let shifts = with_timeout(self.timeout, self.office.get_driver_history(employee_id)).await?;
        Ok(ResponsePayload::DriverHistory(shifts))
    }
}

/// One terminal's shift service
///
/// Owned by a single task. Office calls that change the shift are awaited
/// in place; deliveries and polls run in spawned tasks and report back
/// through `ServiceMessage`.
pub struct ShiftService {
    engine: ShiftEngine,
    store: Arc<dyn Store>,
    office: Arc<dyn OfficeBackend>,
    scanner: Arc<dyn Scanner>,
    outbox: Outbox,
    timing: ServiceTiming,
    poll: Option<PollTask>,
    messages: mpsc::UnboundedSender<ServiceMessage>,
    events: Vec<Event>,
}

impl ShiftService {
    pub fn new(
        store: Arc<dyn Store>,
        office: Arc<dyn OfficeBackend>,
        scanner: Arc<dyn Scanner>,
        timing: ServiceTiming,
        messages: mpsc::UnboundedSender<ServiceMessage>,
    ) -> Self {
        let outbox = Outbox::new(store.clone(), office.clone(), timing.request_timeout);
        Self {
            engine: ShiftEngine::new(),
            store,
            office,
            scanner,
            outbox,
            timing,
            poll: None,
            messages,
            events: Vec::new(),
        }
    }

    pub fn engine(&self) -> &ShiftEngine {
        &self.engine
    }

    pub fn scanner(&self) -> Arc<dyn Scanner> {
        self.scanner.clone()
    }

    pub fn queries(&self) -> OfficeQueries {
        OfficeQueries::new(self.office.clone(), self.timing.request_timeout)
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn state(&self) -> ServiceStateSnapshot {
        self.engine.snapshot(self.outbox.pending(), self.is_polling())
    }

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        HealthStatus {
            live: true,
            ready: store_ok && self.office.is_healthy(),
            store_ok,
            pending_outbound: self.outbox.pending(),
        }
    }

    /// Events produced since the last call, oldest first
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Employee number of the logged-in driver
    pub fn current_driver(&self) -> ServiceResult<EmployeeId> {
        self.engine
            .driver()
            .map(|d| d.employee_id.clone())
            .ok_or(ShiftError::NoActiveSession)
    }

    fn require_screen(&self, screen: ShiftScreen, action: &'static str) -> ServiceResult<()> {
        if self.engine.screen() == screen {
            Ok(())
        } else {
            Err(ShiftError::transition(self.engine.screen(), action))
        }
    }

    /// Identify the driver, then resume today's shift or look for an office preload
    pub async fn login(&mut self, employee_id: EmployeeId) -> ServiceResult<ResponsePayload> {
        self.require_screen(ShiftScreen::LoggedOut, "log in")?;
        if employee_id.is_empty() {
            return Err(ShiftError::DriverNotFound(employee_id));
        }

        let timeout = self.timing.request_timeout;
        let stored = self.store.load_session(&employee_id).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load saved shift");
            None
        });

        let identity = match with_timeout(timeout, self.office.get_driver(&employee_id)).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                info!(employee_id = %employee_id, "Unknown employee number");
                self.audit(AuditEventType::LoginFailed {
                    employee_id: employee_id.clone(),
                });
                return Err(ShiftError::DriverNotFound(employee_id));
            }
            // Today's saved shift carries the identity the office gave earlier
            Err(e) if e.is_unreachable() => match &stored {
                Some(session) if session.resumable_on(shiftlog_util::today()) => {
                    warn!(
                        employee_id = %employee_id,
                        error = %e,
                        "Office unreachable, resuming saved shift"
                    );
                    session.driver.clone()
                }
                _ => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        };

        let transition = self
            .engine
            .identify_driver(identity, shiftlog_util::today(), stored)?;

        match self.apply(transition) {
            LoginStep::Resumed(session) => Ok(ResponsePayload::Session(session)),
            LoginStep::CheckPreload { driver_name } => {
                let remote =
                    match with_timeout(timeout, self.office.check_remote_start(&driver_name)).await {
                        Ok(remote) => Some(remote),
                        Err(e) => {
                            warn!(error = %e, "Preload check failed, driver starts manually");
                            None
                        }
                    };

                let transition = self
                    .engine
                    .apply_preload(remote.as_ref(), shiftlog_util::now())?;
                Ok(match self.apply(transition) {
                    PreloadStep::Opened(session) => ResponsePayload::Session(session),
                    PreloadStep::ManualStartRequired(driver) => {
                        ResponsePayload::ManualStartRequired { driver }
                    }
                })
            }
        }
    }

    /// Start from the driver's own vehicle and odometer reading
    pub async fn start_manual(
        &mut self,
        vehicle: &str,
        odometer: u64,
    ) -> ServiceResult<ResponsePayload> {
        self.require_screen(ShiftScreen::AwaitingManualStart, "start a shift")?;

        let last_known = self.last_known_odometer(vehicle.trim()).await;
        let transition = self
            .engine
            .start_manual(vehicle, odometer, last_known, shiftlog_util::now())?;

        Ok(match self.apply(transition) {
            StartStep::Opened(session) => ResponsePayload::Session(session),
            StartStep::AnomalyConfirmationRequired {
                vehicle,
                entered_odometer,
                last_known_odometer,
            } => ResponsePayload::AnomalyConfirmationRequired {
                vehicle,
                entered_odometer,
                last_known_odometer,
            },
        })
    }

    /// Highest reading known for a vehicle, from the office or this device
    async fn last_known_odometer(&self, plate: &str) -> Option<u64> {
        if plate.is_empty() {
            return None;
        }

        let office = match with_timeout(self.timing.request_timeout, self.office.get_vehicles()).await
        {
            Ok(vehicles) => vehicles
                .into_iter()
                .find(|v| v.plate.eq_ignore_ascii_case(plate))
                .and_then(|v| v.last_odometer),
            Err(e) => {
                debug!(error = %e, "Vehicle list unavailable, using local readings only");
                None
            }
        };

        let local = self.store.last_odometer(plate).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read local odometer");
            None
        });

        office.max(local)
    }

    pub fn add_fuel(&mut self, entry: &FuelEntry) -> ServiceResult<ResponsePayload> {
        let transition = self.engine.add_fuel(entry, shiftlog_util::now())?;
        Ok(ResponsePayload::Session(self.apply(transition)))
    }

    pub fn begin_close(&mut self) -> ServiceResult<ResponsePayload> {
        let transition = self.engine.begin_close()?;
        let screen = self.apply(transition);
        Ok(ResponsePayload::ScreenChanged { screen })
    }

    pub fn cancel_close(&mut self) -> ServiceResult<ResponsePayload> {
        let transition = self.engine.cancel_close()?;
        let screen = self.apply(transition);
        Ok(ResponsePayload::ScreenChanged { screen })
    }

    /// Close the shift. Completes locally; the final record is delivered in the background.
    pub fn close_shift(&mut self, end_odometer: u64) -> ServiceResult<ResponsePayload> {
        let transition = self.engine.close_shift(end_odometer, shiftlog_util::now())?;
        Ok(ResponsePayload::ShiftClosed(self.apply(transition)))
    }

    pub fn logout(&mut self) -> ServiceResult<ResponsePayload> {
        let transition = self.engine.logout();
        self.apply(transition);
        Ok(ResponsePayload::LoggedOut)
    }

    /// Handle work reported by a poll or a delivery task
    pub fn handle_message(&mut self, msg: ServiceMessage) {
        match msg {
            ServiceMessage::Poll(update) => {
                self.spawn_flush();

                let Some(remote) = update.remote else {
                    return;
                };
                if self.engine.session_id() != Some(&update.session_id) {
                    debug!(session_id = %update.session_id, "Dropping poll result for a closed shift");
                    return;
                }

                match self.engine.reconcile(&remote) {
                    Ok(transition) => {
                        self.apply(transition);
                    }
                    Err(e) => debug!(error = %e, "Poll result not applied"),
                }
            }

            ServiceMessage::Flushed(report) => {
                if let Some(failure) = report.end_failure() {
                    self.events.push(Event::new(EventPayload::PushFailed {
                        idempotency_key: failure.idempotency_key.clone(),
                        action: failure.action.to_string(),
                        message: failure.error.clone(),
                    }));
                }
                debug!(
                    delivered = report.delivered.len(),
                    failed = report.failures.len(),
                    remaining = report.remaining,
                    "Outbox flushed"
                );
                self.push_state();
            }
        }
    }

    /// Retry queued records when no poll is doing it
    pub fn retry_delivery(&self) {
        if self.poll.is_none() && self.outbox.pending() > 0 {
            self.spawn_flush();
        }
    }

    /// Stop background work before exit
    pub fn shutdown(&mut self) {
        self.stop_polling();
        self.scanner.cancel();
    }

    fn apply<T>(&mut self, transition: Transition<T>) -> T {
        let Transition {
            outcome,
            effects,
            events,
        } = transition;

        let mut enqueued = false;
        for effect in effects {
            match effect {
                Effect::PersistSession(session) => {
                    if let Err(e) = self.store.save_session(&session) {
                        error!(session_id = %session.session_id, error = %e, "Failed to save shift");
                    }
                }
                Effect::DeleteSession(employee_id) => {
                    if let Err(e) = self.store.delete_session(&employee_id) {
                        error!(employee_id = %employee_id, error = %e, "Failed to delete saved shift");
                    }
                }
                Effect::Enqueue(event) => match self.store.enqueue_outbound(&event) {
                    Ok(true) => enqueued = true,
                    Ok(false) => {
                        debug!(idempotency_key = %event.idempotency_key, "Record already queued")
                    }
                    Err(e) => error!(
                        idempotency_key = %event.idempotency_key,
                        error = %e,
                        "Failed to queue record for the office"
                    ),
                },
                Effect::StartPolling { driver_name } => self.start_polling(driver_name),
                Effect::StopPolling => self.stop_polling(),
                Effect::RememberOdometer { vehicle, odometer } => {
                    if let Err(e) = self.store.remember_odometer(&vehicle, odometer) {
                        warn!(vehicle = %vehicle, error = %e, "Failed to remember odometer");
                    }
                }
            }
        }

        let mut changed = false;
        for event in events {
            changed |= self.publish(event);
        }

        if enqueued {
            self.spawn_flush();
            changed = true;
        }
        if changed {
            self.push_state();
        }

        outcome
    }

    /// Audit and broadcast one engine event. Returns whether state changed.
    fn publish(&mut self, event: CoreEvent) -> bool {
        match event {
            CoreEvent::ScreenChanged { from, to } => {
                debug!(%from, %to, "Screen changed");
            }

            CoreEvent::ShiftStarted { session } => {
                self.audit(AuditEventType::ShiftStarted {
                    session_id: session.session_id.clone(),
                    employee_id: session.driver.employee_id.clone(),
                    vehicle: session.vehicle.clone(),
                    start_odometer: session.start_odometer,
                    origin: session.origin,
                    anomaly: session.anomaly,
                });
                self.events
                    .push(Event::new(EventPayload::ShiftStarted { session }));
            }

            CoreEvent::ShiftResumed { session } => {
                self.audit(AuditEventType::ShiftResumed {
                    session_id: session.session_id.clone(),
                    employee_id: session.driver.employee_id.clone(),
                });
                self.events
                    .push(Event::new(EventPayload::ShiftStarted { session }));
            }

            CoreEvent::StaleSessionDiscarded { employee_id, date } => {
                info!(employee_id = %employee_id, %date, "Discarded shift left open on an earlier day");
                return false;
            }

            CoreEvent::FuelRecorded {
                session_id,
                index,
                record,
            } => {
                self.audit(AuditEventType::FuelRecorded {
                    session_id: session_id.clone(),
                    index,
                    litres: record.litres,
                    cost: record.cost,
                });
                self.events.push(Event::new(EventPayload::FuelRecorded {
                    session_id,
                    index,
                    record,
                }));
            }

            CoreEvent::OfficeCorrection {
                session,
                corrections,
            } => {
                self.audit(AuditEventType::OfficeCorrection {
                    session_id: session.session_id.clone(),
                    corrections: corrections.clone(),
                });
                self.events.push(Event::new(EventPayload::OfficeCorrection {
                    session_id: session.session_id.clone(),
                    corrections,
                    session,
                }));
            }

            CoreEvent::ShiftClosed { summary } => {
                self.audit(AuditEventType::ShiftClosed {
                    session_id: summary.session_id.clone(),
                    end_odometer: summary.end_odometer,
                    total_distance: summary.total_distance,
                });
                self.events
                    .push(Event::new(EventPayload::ShiftClosed { summary }));
            }
        }
        true
    }

    fn push_state(&mut self) {
        let state = self.state();
        self.events.push(Event::new(EventPayload::StateChanged(state)));
    }

    fn start_polling(&mut self, driver_name: String) {
        let Some(session_id) = self.engine.session_id().cloned() else {
            warn!("Poll requested without an open shift");
            return;
        };

        // Replacing the task drops, and so stops, the previous one
        self.poll = Some(PollTask::spawn(
            self.office.clone(),
            driver_name,
            session_id,
            self.timing.poll_interval,
            self.timing.request_timeout,
            self.messages.clone(),
        ));
    }

    fn stop_polling(&mut self) {
        if let Some(task) = self.poll.take() {
            info!(session_id = %task.session_id(), "Stopping office poll");
            task.cancel();
        }
    }

    fn spawn_flush(&self) {
        let outbox = self.outbox.clone();
        let messages = self.messages.clone();
        tokio::spawn(async move {
            match outbox.flush().await {
                Ok(report) if !report.is_idle() => {
                    let _ = messages.send(ServiceMessage::Flushed(report));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Outbox flush failed"),
            }
        });
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftlog_api::OutboundAction;
    use shiftlog_office::{MockOffice, MockScanner, RemoteStart};
    use shiftlog_store::SqliteStore;

    struct Harness {
        service: ShiftService,
        office: Arc<MockOffice>,
        store: Arc<SqliteStore>,
        messages: mpsc::UnboundedReceiver<ServiceMessage>,
    }

    fn harness() -> Harness {
        let office = Arc::new(MockOffice::sample());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let service = ShiftService::new(
            store.clone(),
            office.clone(),
            Arc::new(MockScanner::new("12345", "VEH_001")),
            ServiceTiming {
                request_timeout: Duration::from_secs(1),
                poll_interval: Duration::from_secs(3600),
            },
            tx,
        );
        Harness {
            service,
            office,
            store,
            messages: rx,
        }
    }

    #[test]
    fn errors_map_to_protocol_codes() {
        let cases = [
            (ShiftError::DriverNotFound(EmployeeId::new("1")), ErrorCode::DriverNotFound),
            (ShiftError::invalid_fuel("litres", "is required"), ErrorCode::InvalidFuelRecord),
            (ShiftError::invalid_start("vehicle is required"), ErrorCode::InvalidRequest),
            (ShiftError::transition(ShiftScreen::LoggedOut, "close the shift"), ErrorCode::InvalidTransition),
            (ShiftError::NoActiveSession, ErrorCode::NoActiveSession),
            (ShiftError::office("timeout"), ErrorCode::OfficeUnavailable),
            (ShiftError::store("locked"), ErrorCode::StoreError),
            (ShiftError::internal("boom"), ErrorCode::InternalError),
        ];
        for (err, code) in cases {
            assert_eq!(error_info(&err).code, code, "{}", err);
        }
    }

    #[tokio::test]
    async fn unknown_driver_is_rejected_and_audited() {
        let mut h = harness();
        let err = h.service.login(EmployeeId::new("404")).await.unwrap_err();
        assert!(matches!(err, ShiftError::DriverNotFound(_)));
        assert_eq!(h.service.engine().screen(), ShiftScreen::LoggedOut);

        let audits = h.store.get_recent_audits(10).unwrap();
        assert!(matches!(audits[0].event, AuditEventType::LoginFailed { .. }));
    }

    #[tokio::test]
    async fn office_down_at_login_is_reported() {
        let mut h = harness();
        h.office.set_fail_lookups(true);
        let err = h.service.login(EmployeeId::new("12345")).await.unwrap_err();
        assert_eq!(error_info(&err).code, ErrorCode::OfficeUnavailable);
        assert_eq!(h.service.engine().screen(), ShiftScreen::LoggedOut);
    }

    #[tokio::test]
    async fn preload_opens_shift_and_starts_polling() {
        let mut h = harness();
        let payload = h.service.login(EmployeeId::new("999")).await.unwrap();

        let ResponsePayload::Session(session) = payload else {
            panic!("expected an open shift, got {:?}", payload);
        };
        assert_eq!(session.vehicle, "VEH_999");
        assert_eq!(session.start_odometer, 124578);
        assert!(h.service.is_polling());

        let events = h.service.take_events();
        assert!(events.iter().any(|e| matches!(e.payload, EventPayload::ShiftStarted { .. })));
        assert!(matches!(
            events.last().map(|e| &e.payload),
            Some(EventPayload::StateChanged(_))
        ));

        // The office already has the start; nothing is queued
        assert_eq!(h.store.outbound_count().unwrap(), 0);
        assert!(h.store.load_session(&EmployeeId::new("999")).unwrap().is_some());
    }

    #[tokio::test]
    async fn manual_start_uses_office_odometer() {
        let mut h = harness();
        let payload = h.service.login(EmployeeId::new("12345")).await.unwrap();
        assert!(matches!(payload, ResponsePayload::ManualStartRequired { .. }));

        let payload = h.service.start_manual("VEH_001", 59000).await.unwrap();
        match payload {
            ResponsePayload::AnomalyConfirmationRequired {
                last_known_odometer,
                ..
            } => assert_eq!(last_known_odometer, 60000),
            other => panic!("expected a confirmation request, got {:?}", other),
        }
        assert_eq!(h.service.engine().screen(), ShiftScreen::AwaitingManualStart);

        let payload = h.service.start_manual("VEH_001", 59000).await.unwrap();
        let ResponsePayload::Session(session) = payload else {
            panic!("expected an open shift");
        };
        assert!(session.anomaly);
    }

    #[tokio::test]
    async fn local_odometer_counts_when_office_is_down() {
        let mut h = harness();
        h.service.login(EmployeeId::new("12345")).await.unwrap();
        h.store.remember_odometer("VEH_001", 61000).unwrap();
        h.office.set_fail_lookups(true);

        let payload = h.service.start_manual("VEH_001", 60500).await.unwrap();
        assert!(matches!(
            payload,
            ResponsePayload::AnomalyConfirmationRequired {
                last_known_odometer: 61000,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn start_is_delivered_in_background() {
        let mut h = harness();
        h.service.login(EmployeeId::new("12345")).await.unwrap();
        h.service.start_manual("VEH_001", 60100).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), h.messages.recv())
            .await
            .unwrap()
            .unwrap();
        let ServiceMessage::Flushed(report) = msg else {
            panic!("expected a flush report");
        };
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(h.office.pushed()[0].action(), OutboundAction::Start);

        h.service.handle_message(ServiceMessage::Flushed(report));
        assert_eq!(h.service.state().pending_outbound, 0);
    }

    #[tokio::test]
    async fn failed_end_push_notifies_terminal() {
        let mut h = harness();
        h.office.set_fail_push(true);
        h.service.login(EmployeeId::new("999")).await.unwrap();
        h.service.begin_close().unwrap();
        let payload = h.service.close_shift(124700).unwrap();
        assert!(matches!(payload, ResponsePayload::ShiftClosed(_)));
        assert!(!h.service.is_polling());
        h.service.take_events();

        let msg = tokio::time::timeout(Duration::from_secs(2), h.messages.recv())
            .await
            .unwrap()
            .unwrap();
        h.service.handle_message(msg);

        let events = h.service.take_events();
        assert!(events.iter().any(|e| matches!(
            &e.payload,
            EventPayload::PushFailed { action, .. } if action == "END"
        )));
        assert_eq!(h.service.state().pending_outbound, 1);
    }

    #[tokio::test]
    async fn poll_result_corrects_open_shift() {
        let mut h = harness();
        h.service.login(EmployeeId::new("999")).await.unwrap();
        let session_id = h.service.engine().session_id().cloned().unwrap();
        h.service.take_events();

        h.service.handle_message(ServiceMessage::Poll(PollUpdate {
            session_id,
            remote: Some(RemoteStart::found("VEH_999", 124600)),
        }));

        let session = h.service.engine().session().unwrap();
        assert_eq!(session.start_odometer, 124600);
        let events = h.service.take_events();
        assert!(events.iter().any(|e| matches!(e.payload, EventPayload::OfficeCorrection { .. })));

        let saved = h.store.load_session(&EmployeeId::new("999")).unwrap().unwrap();
        assert_eq!(saved.start_odometer, 124600);
    }

    #[tokio::test]
    async fn stale_poll_result_is_ignored() {
        let mut h = harness();
        h.service.login(EmployeeId::new("999")).await.unwrap();
        h.service.take_events();

        h.service.handle_message(ServiceMessage::Poll(PollUpdate {
            session_id: shiftlog_util::SessionId::new(),
            remote: Some(RemoteStart::found("VEH_999", 1)),
        }));

        assert_eq!(h.service.engine().session().unwrap().start_odometer, 124578);
        assert!(h.service.take_events().is_empty());
    }

    #[tokio::test]
    async fn logout_keeps_shift_for_resume() {
        let mut h = harness();
        h.service.login(EmployeeId::new("999")).await.unwrap();
        h.service.logout().unwrap();
        assert!(!h.service.is_polling());

        let payload = h.service.login(EmployeeId::new("999")).await.unwrap();
        assert!(matches!(payload, ResponsePayload::Session(_)));
        assert!(h.service.is_polling());

        let audits = h.store.get_recent_audits(10).unwrap();
        assert!(matches!(audits[0].event, AuditEventType::ShiftResumed { .. }));
    }

    #[tokio::test]
    async fn queries_and_current_driver() {
        let mut h = harness();
        assert!(h.service.current_driver().is_err());

        h.service.login(EmployeeId::new("12345")).await.unwrap();
        assert_eq!(h.service.current_driver().unwrap().as_str(), "12345");

        let queries = h.service.queries();
        match queries.vehicles().await.unwrap() {
            ResponsePayload::Vehicles(vehicles) => assert_eq!(vehicles.len(), 2),
            other => panic!("unexpected payload {:?}", other),
        }
        match queries.vehicle_history("  ").await.unwrap() {
            ResponsePayload::VehicleHistory(usage) => assert!(usage.is_empty()),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
