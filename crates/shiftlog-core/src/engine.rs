//! Shift engine

use chrono::{DateTime, Local, NaiveDate};
use shiftlog_api::{
    API_VERSION, ClosedShiftSummary, DriverIdentity, FuelEntry, OutboundEvent,
    ServiceStateSnapshot, ShiftCorrection, ShiftScreen, ShiftSession, StartOrigin,
};
use shiftlog_office::RemoteStart;
use shiftlog_util::{SessionId, ShiftError};
use tracing::{debug, info, warn};

use crate::{ActiveShift, CoreEvent, Effect, PendingAnomaly, Transition, parse_fuel_entry};

/// Where login goes after the driver is identified
#[derive(Debug, Clone, PartialEq)]
pub enum LoginStep {
    /// Today's open shift was found on the device
    Resumed(ShiftSession),
    /// Ask the office whether it preloaded a start
    CheckPreload { driver_name: String },
}

/// Result of the preload check
#[derive(Debug, Clone, PartialEq)]
pub enum PreloadStep {
    Opened(ShiftSession),
    ManualStartRequired(DriverIdentity),
}

/// Result of a manual start attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StartStep {
    Opened(ShiftSession),
    /// Nothing was created; repeat the same start to confirm
    AnomalyConfirmationRequired {
        vehicle: String,
        entered_odometer: u64,
        last_known_odometer: u64,
    },
}

/// The shift state machine for one terminal
///
/// One driver at a time. The open shift is owned here; the service
/// persists it through the returned effects.
#[derive(Debug)]
pub struct ShiftEngine {
    screen: ShiftScreen,
    driver: Option<DriverIdentity>,
    shift: Option<ActiveShift>,
    pending_anomaly: Option<PendingAnomaly>,
}

impl Default for ShiftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ShiftEngine {
    pub fn new() -> Self {
        Self {
            screen: ShiftScreen::LoggedOut,
            driver: None,
            shift: None,
            pending_anomaly: None,
        }
    }

    pub fn screen(&self) -> ShiftScreen {
        self.screen
    }

    pub fn driver(&self) -> Option<&DriverIdentity> {
        self.driver.as_ref()
    }

    pub fn session(&self) -> Option<&ShiftSession> {
        self.shift.as_ref().map(ActiveShift::session)
    }

    /// Id of the open shift, if any
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session().map(|s| &s.session_id)
    }

    pub fn pending_anomaly(&self) -> Option<&PendingAnomaly> {
        self.pending_anomaly.as_ref()
    }

    /// Get current service state snapshot
    pub fn snapshot(&self, pending_outbound: usize, polling: bool) -> ServiceStateSnapshot {
        ServiceStateSnapshot {
            api_version: API_VERSION,
            screen: self.screen,
            driver: self.driver.clone(),
            session: self.session().cloned(),
            pending_outbound,
            polling,
        }
    }

    fn require(&self, allowed: &[ShiftScreen], action: &'static str) -> Result<(), ShiftError> {
        if allowed.contains(&self.screen) {
            Ok(())
        } else {
            Err(ShiftError::transition(self.screen, action))
        }
    }

    fn move_to<T>(&mut self, to: ShiftScreen, transition: Transition<T>) -> Transition<T> {
        let from = self.screen;
        if from == to {
            return transition;
        }
        self.screen = to;
        debug!(%from, %to, "Screen changed");
        transition.with_event(CoreEvent::ScreenChanged { from, to })
    }

    /// Driver identified by the office.
    ///
    /// `stored` is the driver's local record, if the device has one.
    pub fn identify_driver(
        &mut self,
        identity: DriverIdentity,
        today: NaiveDate,
        stored: Option<ShiftSession>,
    ) -> Result<Transition<LoginStep>, ShiftError> {
        self.require(&[ShiftScreen::LoggedOut], "log in")?;
        self.pending_anomaly = None;

        let mut discarded = None;
        if let Some(session) = stored {
            if session.resumable_on(today) && session.driver.employee_id == identity.employee_id {
                info!(
                    session_id = %session.session_id,
                    employee_id = %session.driver.employee_id,
                    "Resuming today's shift"
                );

                let driver_name = session.driver.name.clone();
                self.driver = Some(session.driver.clone());
                self.shift = Some(ActiveShift::new(session.clone()));

                let transition = Transition::new(LoginStep::Resumed(session.clone()))
                    .with_effect(Effect::StartPolling { driver_name })
                    .with_event(CoreEvent::ShiftResumed { session });
                return Ok(self.move_to(ShiftScreen::ShiftActive, transition));
            }

            info!(
                employee_id = %identity.employee_id,
                date = %session.date,
                "Discarding shift record from another day"
            );
            discarded = Some(session.date);
        }

        let driver_name = identity.name.clone();
        let mut transition = Transition::new(LoginStep::CheckPreload { driver_name });
        if let Some(date) = discarded {
            transition = transition
                .with_effect(Effect::DeleteSession(identity.employee_id.clone()))
                .with_event(CoreEvent::StaleSessionDiscarded {
                    employee_id: identity.employee_id.clone(),
                    date,
                });
        }

        self.driver = Some(identity);
        Ok(self.move_to(ShiftScreen::AwaitingPreloadCheck, transition))
    }

    /// Apply the office's answer to the preload check.
    ///
    /// `None` means the office could not be asked; the driver starts manually.
    pub fn apply_preload(
        &mut self,
        remote: Option<&RemoteStart>,
        now: DateTime<Local>,
    ) -> Result<Transition<PreloadStep>, ShiftError> {
        self.require(&[ShiftScreen::AwaitingPreloadCheck], "apply the office preload")?;
        let driver = self.driver.clone().ok_or(ShiftError::NoActiveSession)?;

        let preload = remote.and_then(|r| r.valid_start().map(|km| (r.valid_vehicle(), km)));

        match preload {
            Some((vehicle, start_odometer)) => {
                let session = ShiftSession::open(
                    driver,
                    vehicle.unwrap_or_default(),
                    start_odometer,
                    StartOrigin::Office,
                    false,
                    now,
                );

                info!(
                    session_id = %session.session_id,
                    vehicle = %session.vehicle,
                    start_odometer,
                    "Shift opened from office preload"
                );

                self.shift = Some(ActiveShift::new(session.clone()));
                let transition = Transition::new(PreloadStep::Opened(session.clone()))
                    .with_effect(Effect::PersistSession(session.clone()))
                    .with_effect(Effect::StartPolling {
                        driver_name: session.driver.name.clone(),
                    })
                    .with_event(CoreEvent::ShiftStarted { session });
                Ok(self.move_to(ShiftScreen::ShiftActive, transition))
            }
            None => {
                debug!(employee_id = %driver.employee_id, "No office preload, manual start required");
                let transition = Transition::new(PreloadStep::ManualStartRequired(driver));
                Ok(self.move_to(ShiftScreen::AwaitingManualStart, transition))
            }
        }
    }

    /// Start the shift from the driver's own reading.
    ///
    /// A reading below `last_known` is refused once; the same reading
    /// entered again opens the shift flagged as an anomaly.
    pub fn start_manual(
        &mut self,
        vehicle: &str,
        odometer: u64,
        last_known: Option<u64>,
        now: DateTime<Local>,
    ) -> Result<Transition<StartStep>, ShiftError> {
        self.require(&[ShiftScreen::AwaitingManualStart], "start a shift")?;
        let driver = self.driver.clone().ok_or(ShiftError::NoActiveSession)?;

        let vehicle = vehicle.trim();
        if vehicle.is_empty() {
            return Err(ShiftError::invalid_start("vehicle is required"));
        }
        if odometer == 0 {
            return Err(ShiftError::invalid_start("odometer must be greater than zero"));
        }

        let attempt = PendingAnomaly {
            vehicle: vehicle.to_string(),
            odometer,
        };

        let anomaly = match last_known {
            Some(last) if odometer < last => {
                if self.pending_anomaly.as_ref() != Some(&attempt) {
                    info!(
                        vehicle = %vehicle,
                        entered = odometer,
                        last_known = last,
                        "Start odometer below last known reading, asking for confirmation"
                    );
                    self.pending_anomaly = Some(attempt);
                    return Ok(Transition::new(StartStep::AnomalyConfirmationRequired {
                        vehicle: vehicle.to_string(),
                        entered_odometer: odometer,
                        last_known_odometer: last,
                    }));
                }
                warn!(vehicle = %vehicle, entered = odometer, last_known = last, "Low start odometer confirmed");
                true
            }
            _ => false,
        };
        self.pending_anomaly = None;

        let session = ShiftSession::open(driver, vehicle, odometer, StartOrigin::Manual, anomaly, now);

        info!(
            session_id = %session.session_id,
            vehicle = %session.vehicle,
            start_odometer = odometer,
            anomaly,
            "Shift started manually"
        );

        self.shift = Some(ActiveShift::new(session.clone()));
        let transition = Transition::new(StartStep::Opened(session.clone()))
            .with_effect(Effect::PersistSession(session.clone()))
            .with_effect(Effect::Enqueue(OutboundEvent::start(&session)))
            .with_effect(Effect::StartPolling {
                driver_name: session.driver.name.clone(),
            })
            .with_event(CoreEvent::ShiftStarted { session });
        Ok(self.move_to(ShiftScreen::ShiftActive, transition))
    }

    /// Append a fuel record to the open shift
    pub fn add_fuel(
        &mut self,
        entry: &FuelEntry,
        now: DateTime<Local>,
    ) -> Result<Transition<ShiftSession>, ShiftError> {
        self.require(&[ShiftScreen::ShiftActive], "add a fuel record")?;
        let record = parse_fuel_entry(entry, now)?;

        let shift = self.shift.as_mut().ok_or(ShiftError::NoActiveSession)?;
        let index = shift.record_fuel(record.clone());
        let session = shift.session().clone();

        info!(
            session_id = %session.session_id,
            index,
            litres = record.litres,
            cost = record.cost,
            "Fuel recorded"
        );

        let outbound = OutboundEvent::fuel(&session, index)
            .ok_or_else(|| ShiftError::internal("fuel record missing after append"))?;

        Ok(Transition::new(session.clone())
            .with_effect(Effect::PersistSession(session.clone()))
            .with_effect(Effect::Enqueue(outbound))
            .with_event(CoreEvent::FuelRecorded {
                session_id: session.session_id,
                index,
                record,
            }))
    }

    /// Apply the office's view of the open shift
    pub fn reconcile(
        &mut self,
        remote: &RemoteStart,
    ) -> Result<Transition<Vec<ShiftCorrection>>, ShiftError> {
        self.require(
            &[ShiftScreen::ShiftActive, ShiftScreen::ClosingShift],
            "reconcile with the office",
        )?;
        let shift = self.shift.as_mut().ok_or(ShiftError::NoActiveSession)?;

        let corrections = shift.apply_remote(remote);
        if corrections.is_empty() {
            return Ok(Transition::new(corrections));
        }

        let session = shift.session().clone();
        for correction in &corrections {
            info!(session_id = %session.session_id, %correction, "Office correction applied");
        }

        Ok(Transition::new(corrections.clone())
            .with_effect(Effect::PersistSession(session.clone()))
            .with_event(CoreEvent::OfficeCorrection {
                session,
                corrections,
            }))
    }

    /// Go to the closure screen
    pub fn begin_close(&mut self) -> Result<Transition<ShiftScreen>, ShiftError> {
        self.require(&[ShiftScreen::ShiftActive], "close the shift")?;
        let transition = Transition::new(ShiftScreen::ClosingShift);
        Ok(self.move_to(ShiftScreen::ClosingShift, transition))
    }

    /// Leave the closure screen without closing
    pub fn cancel_close(&mut self) -> Result<Transition<ShiftScreen>, ShiftError> {
        self.require(&[ShiftScreen::ClosingShift], "cancel the closure")?;
        let transition = Transition::new(ShiftScreen::ShiftActive);
        Ok(self.move_to(ShiftScreen::ShiftActive, transition))
    }

    /// Close the open shift. Never refused for a low reading.
    pub fn close_shift(
        &mut self,
        end_odometer: u64,
        now: DateTime<Local>,
    ) -> Result<Transition<ClosedShiftSummary>, ShiftError> {
        self.require(
            &[ShiftScreen::ShiftActive, ShiftScreen::ClosingShift],
            "close the shift",
        )?;
        let shift = self.shift.take().ok_or(ShiftError::NoActiveSession)?;
        let summary = shift.close(end_odometer, now);

        if summary.end_below_start {
            warn!(
                session_id = %summary.session_id,
                start = summary.start_odometer,
                end = end_odometer,
                "End odometer below start"
            );
        }
        info!(
            session_id = %summary.session_id,
            total_distance = summary.total_distance,
            fuel_records = summary.fuel_records.len(),
            "Shift closed"
        );

        self.driver = None;
        self.pending_anomaly = None;

        let transition = Transition::new(summary.clone())
            .with_effect(Effect::StopPolling)
            .with_effect(Effect::Enqueue(OutboundEvent::end(&summary)))
            .with_effect(Effect::DeleteSession(summary.driver.employee_id.clone()))
            .with_effect(Effect::RememberOdometer {
                vehicle: summary.vehicle.clone(),
                odometer: end_odometer,
            })
            .with_event(CoreEvent::ShiftClosed { summary });
        Ok(self.move_to(ShiftScreen::LoggedOut, transition))
    }

    /// Leave the terminal. An open shift stays on the device for today.
    pub fn logout(&mut self) -> Transition<()> {
        let mut transition = Transition::new(());
        if let Some(shift) = self.shift.take() {
            info!(session_id = %shift.session().session_id, "Logged out with shift still open");
            transition = transition.with_effect(Effect::StopPolling);
        }

        self.driver = None;
        self.pending_anomaly = None;
        self.move_to(ShiftScreen::LoggedOut, transition)
    }
}
