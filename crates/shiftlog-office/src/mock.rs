//! In-memory office and scanner for testing

use async_trait::async_trait;
use shiftlog_api::{
    DriverIdentity, DriverShift, OutboundEvent, ScanKind, ScanOutcome, Station, Vehicle,
    VehicleUsage,
};
use shiftlog_util::EmployeeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::{OfficeBackend, OfficeError, OfficeResult, RemoteStart, Scanner};

/// Mock office for unit/integration testing
///
/// Lookups and pushes read and write shared state, so a test can change
/// what the office "knows" between two calls.
pub struct MockOffice {
    drivers: Arc<Mutex<HashMap<EmployeeId, String>>>,
    vehicles: Arc<Mutex<Vec<Vehicle>>>,
    remote_starts: Arc<Mutex<HashMap<String, RemoteStart>>>,
    vehicle_history: Arc<Mutex<HashMap<String, Vec<VehicleUsage>>>>,
    driver_history: Arc<Mutex<HashMap<EmployeeId, Vec<DriverShift>>>>,
    stations: Arc<Mutex<Vec<Station>>>,
    pushed: Arc<Mutex<Vec<OutboundEvent>>>,
    remote_start_calls: AtomicUsize,

    /// Configure lookups to fail
    pub fail_lookups: Arc<Mutex<bool>>,

    /// Configure pushes to fail
    pub fail_push: Arc<Mutex<bool>>,
}

impl MockOffice {
    pub fn new() -> Self {
        Self {
            drivers: Arc::new(Mutex::new(HashMap::new())),
            vehicles: Arc::new(Mutex::new(Vec::new())),
            remote_starts: Arc::new(Mutex::new(HashMap::new())),
            vehicle_history: Arc::new(Mutex::new(HashMap::new())),
            driver_history: Arc::new(Mutex::new(HashMap::new())),
            stations: Arc::new(Mutex::new(Vec::new())),
            pushed: Arc::new(Mutex::new(Vec::new())),
            remote_start_calls: AtomicUsize::new(0),
            fail_lookups: Arc::new(Mutex::new(false)),
            fail_push: Arc::new(Mutex::new(false)),
        }
    }

    /// Two drivers, one of them with an office preload
    pub fn sample() -> Self {
        let office = Self::new()
            .with_driver("12345", "Mario Rossi")
            .with_driver("999", "Autista Pre-carico")
            .with_vehicle("VEH_001", "Iveco Stralis", Some(60000))
            .with_vehicle("VEH_999", "Scania R450", Some(124000))
            .with_station("Q8 Modena Nord");
        office.set_remote_start("Autista Pre-carico", RemoteStart::found("VEH_999", 124578));
        office
    }

    pub fn with_driver(self, employee_id: &str, name: &str) -> Self {
        self.drivers
            .lock()
            .unwrap()
            .insert(EmployeeId::new(employee_id), name.to_string());
        self
    }

    pub fn with_vehicle(self, plate: &str, model: &str, last_odometer: Option<u64>) -> Self {
        self.vehicles.lock().unwrap().push(Vehicle {
            plate: plate.to_string(),
            model: model.to_string(),
            last_odometer,
            last_driver: None,
        });
        self
    }

    pub fn with_station(self, name: &str) -> Self {
        self.stations.lock().unwrap().push(Station {
            name: name.to_string(),
        });
        self
    }

    pub fn with_vehicle_history(self, plate: &str, usage: Vec<VehicleUsage>) -> Self {
        self.vehicle_history
            .lock()
            .unwrap()
            .insert(plate.to_string(), usage);
        self
    }

    pub fn with_driver_history(self, employee_id: &str, shifts: Vec<DriverShift>) -> Self {
        self.driver_history
            .lock()
            .unwrap()
            .insert(EmployeeId::new(employee_id), shifts);
        self
    }

    /// Change what the office reports for a driver's start
    pub fn set_remote_start(&self, driver_name: &str, remote: RemoteStart) {
        self.remote_starts
            .lock()
            .unwrap()
            .insert(driver_name.to_string(), remote);
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        *self.fail_lookups.lock().unwrap() = fail;
    }

    pub fn set_fail_push(&self, fail: bool) {
        *self.fail_push.lock().unwrap() = fail;
    }

    /// Records delivered so far, in order
    pub fn pushed(&self) -> Vec<OutboundEvent> {
        self.pushed.lock().unwrap().clone()
    }

    /// How many times the remote start was queried
    pub fn remote_start_calls(&self) -> usize {
        self.remote_start_calls.load(Ordering::SeqCst)
    }

    fn check_lookup(&self) -> OfficeResult<()> {
        if *self.fail_lookups.lock().unwrap() {
            return Err(OfficeError::Transport("Mock lookup failure".into()));
        }
        Ok(())
    }
}

impl Default for MockOffice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OfficeBackend for MockOffice {
    async fn get_driver(&self, employee_id: &EmployeeId) -> OfficeResult<Option<DriverIdentity>> {
        self.check_lookup()?;
        Ok(self
            .drivers
            .lock()
            .unwrap()
            .get(employee_id)
            .map(|name| DriverIdentity::new(employee_id.clone(), name.clone())))
    }

    async fn get_vehicles(&self) -> OfficeResult<Vec<Vehicle>> {
        self.check_lookup()?;
        Ok(self.vehicles.lock().unwrap().clone())
    }

    async fn check_remote_start(&self, driver_name: &str) -> OfficeResult<RemoteStart> {
        self.remote_start_calls.fetch_add(1, Ordering::SeqCst);
        self.check_lookup()?;
        Ok(self
            .remote_starts
            .lock()
            .unwrap()
            .get(driver_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_history(&self, vehicle: &str) -> OfficeResult<Vec<VehicleUsage>> {
        self.check_lookup()?;
        Ok(self
            .vehicle_history
            .lock()
            .unwrap()
            .get(vehicle)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_driver_history(&self, employee_id: &EmployeeId) -> OfficeResult<Vec<DriverShift>> {
        self.check_lookup()?;
        Ok(self
            .driver_history
            .lock()
            .unwrap()
            .get(employee_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_stations(&self) -> OfficeResult<Vec<Station>> {
        self.check_lookup()?;
        Ok(self.stations.lock().unwrap().clone())
    }

    async fn push(&self, event: &OutboundEvent) -> OfficeResult<()> {
        if *self.fail_push.lock().unwrap() {
            return Err(OfficeError::Transport("Mock push failure".into()));
        }

        let mut pushed = self.pushed.lock().unwrap();
        // The real endpoint drops repeated request ids
        if !pushed
            .iter()
            .any(|e| e.idempotency_key == event.idempotency_key)
        {
            pushed.push(event.clone());
        }
        Ok(())
    }
}

/// Mock scanner returning fixed codes
pub struct MockScanner {
    codes: HashMap<ScanKind, String>,
    delay: Duration,
    cancelled: Notify,
}

impl MockScanner {
    pub fn new(driver_code: &str, vehicle_code: &str) -> Self {
        let mut codes = HashMap::new();
        codes.insert(ScanKind::Driver, driver_code.to_string());
        codes.insert(ScanKind::Vehicle, vehicle_code.to_string());
        Self {
            codes,
            delay: Duration::ZERO,
            cancelled: Notify::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Scanner for MockScanner {
    async fn scan(&self, kind: ScanKind) -> ScanOutcome {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {
                match self.codes.get(&kind) {
                    Some(code) => ScanOutcome::Code(code.clone()),
                    None => ScanOutcome::Cancelled,
                }
            }
            _ = self.cancelled.notified() => ScanOutcome::Cancelled,
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use shiftlog_api::StartOrigin;
    use shiftlog_api::ShiftSession;

    #[tokio::test]
    async fn sample_office_has_preload() {
        let office = MockOffice::sample();

        let driver = office
            .get_driver(&EmployeeId::new("999"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(driver.name, "Autista Pre-carico");

        let remote = office.check_remote_start(&driver.name).await.unwrap();
        assert_eq!(remote.valid_start(), Some(124578));
        assert_eq!(remote.valid_vehicle(), Some("VEH_999"));

        let none = office.check_remote_start("Mario Rossi").await.unwrap();
        assert!(!none.found);
        assert_eq!(office.remote_start_calls(), 2);
    }

    #[tokio::test]
    async fn unknown_driver_is_none() {
        let office = MockOffice::sample();
        assert!(office
            .get_driver(&EmployeeId::new("000"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lookup_failure() {
        let office = MockOffice::sample();
        office.set_fail_lookups(true);
        assert!(office.get_vehicles().await.is_err());
    }

    #[tokio::test]
    async fn push_drops_repeated_keys() {
        let office = MockOffice::new();
        let session = ShiftSession::open(
            DriverIdentity::new(EmployeeId::new("12345"), "Mario Rossi"),
            "VEH_001",
            60000,
            StartOrigin::Manual,
            false,
            Local::now(),
        );
        let event = OutboundEvent::start(&session);

        office.push(&event).await.unwrap();
        office.push(&event).await.unwrap();
        assert_eq!(office.pushed().len(), 1);

        office.set_fail_push(true);
        assert!(office.push(&event).await.is_err());
    }

    #[tokio::test]
    async fn scanner_returns_code_per_kind() {
        let scanner = MockScanner::new("12345", "VEH_001");
        assert_eq!(
            scanner.scan(ScanKind::Driver).await,
            ScanOutcome::Code("12345".into())
        );
        assert_eq!(
            scanner.scan(ScanKind::Vehicle).await,
            ScanOutcome::Code("VEH_001".into())
        );
    }

    #[tokio::test]
    async fn scanner_cancel() {
        let scanner = Arc::new(MockScanner::new("12345", "VEH_001").with_delay(Duration::from_secs(30)));

        let task = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.scan(ScanKind::Driver).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        scanner.cancel();

        assert_eq!(task.await.unwrap(), ScanOutcome::Cancelled);
    }
}
