//! Integration tests for shiftd
//!
//! These drive whole shifts through the service with a real SQLite store
//! and the in-memory office.

use shiftd::{FlushReport, ServiceMessage, ServiceTiming, ShiftService};
use shiftlog_api::{
    DriverIdentity, EventPayload, FuelEntry, OutboundAction, OutboundPayload, ResponsePayload,
    ShiftScreen, ShiftSession, StartOrigin,
};
use shiftlog_office::{MockOffice, MockScanner, RemoteStart};
use shiftlog_store::{SqliteStore, Store};
use shiftlog_util::EmployeeId;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Terminal {
    service: ShiftService,
    messages: mpsc::UnboundedReceiver<ServiceMessage>,
}

fn make_terminal(store: Arc<dyn Store>, office: Arc<MockOffice>) -> Terminal {
    let (tx, rx) = mpsc::unbounded_channel();
    let service = ShiftService::new(
        store,
        office,
        Arc::new(MockScanner::new("12345", "VEH_001")),
        ServiceTiming {
            request_timeout: Duration::from_secs(1),
            // Rounds are fed by hand below
            poll_interval: Duration::from_secs(3600),
        },
        tx,
    );
    Terminal {
        service,
        messages: rx,
    }
}

fn file_store(dir: &Path) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open(dir.join("shiftd.db")).unwrap())
}

/// Wait for the next delivery report and hand it back to the service
async fn next_flush(terminal: &mut Terminal) -> FlushReport {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), terminal.messages.recv())
            .await
            .expect("no delivery report")
            .expect("channel closed");
        if let ServiceMessage::Flushed(report) = msg {
            terminal
                .service
                .handle_message(ServiceMessage::Flushed(report.clone()));
            return report;
        }
    }
}

fn fuel(litres: &str, cost: &str) -> FuelEntry {
    FuelEntry {
        odometer_at_fill: Some("124650".into()),
        litres: Some(litres.into()),
        cost: Some(cost.into()),
        card_number: "CARD-77".into(),
        station_name: "Q8 Modena Nord".into(),
    }
}

#[tokio::test]
async fn test_preloaded_shift_end_to_end() {
    let office = Arc::new(MockOffice::sample());
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut terminal = make_terminal(store.clone(), office.clone());

    let payload = terminal
        .service
        .login(EmployeeId::new("999"))
        .await
        .unwrap();
    let ResponsePayload::Session(session) = payload else {
        panic!("expected the preloaded shift, got {:?}", payload);
    };
    assert_eq!(session.origin, StartOrigin::Office);
    assert_eq!(session.vehicle, "VEH_999");
    assert_eq!(session.start_odometer, 124578);
    assert_eq!(terminal.service.engine().screen(), ShiftScreen::ShiftActive);

    // Fuel with a comma decimal separator
    let payload = terminal.service.add_fuel(&fuel("40,5", "80")).unwrap();
    let ResponsePayload::Session(session) = payload else {
        panic!("expected the updated shift");
    };
    assert_eq!(session.fuel_count(), 1);
    assert!((session.total_litres() - 40.5).abs() < f64::EPSILON);
    let report = next_flush(&mut terminal).await;
    assert_eq!(report.delivered.len(), 1);

    terminal.service.begin_close().unwrap();
    let payload = terminal.service.close_shift(124800).unwrap();
    let ResponsePayload::ShiftClosed(summary) = payload else {
        panic!("expected the closed shift");
    };
    assert_eq!(summary.total_distance, 222);
    assert!(!summary.end_below_start);
    assert_eq!(terminal.service.engine().screen(), ShiftScreen::LoggedOut);
    assert!(!terminal.service.is_polling());

    next_flush(&mut terminal).await;

    // FUEL then END; the office entered the start itself
    let actions: Vec<_> = office.pushed().iter().map(|e| e.action()).collect();
    assert_eq!(actions, vec![OutboundAction::Fuel, OutboundAction::End]);
    match &office.pushed()[1].payload {
        OutboundPayload::End { summary } => assert_eq!(summary.fuel_records.len(), 1),
        other => panic!("unexpected payload {:?}", other),
    }

    assert!(store.load_session(&EmployeeId::new("999")).unwrap().is_none());
    assert_eq!(store.last_odometer("VEH_999").unwrap(), Some(124800));
    assert_eq!(store.outbound_count().unwrap(), 0);
}

#[tokio::test]
async fn test_manual_shift_with_anomaly_and_short_close() {
    let office = Arc::new(MockOffice::sample());
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut terminal = make_terminal(store.clone(), office.clone());

    let payload = terminal
        .service
        .login(EmployeeId::new("12345"))
        .await
        .unwrap();
    assert!(matches!(
        payload,
        ResponsePayload::ManualStartRequired { driver } if driver.name == "Mario Rossi"
    ));

    // Below the office's 60000: refused once
    let payload = terminal
        .service
        .start_manual("VEH_001", 59000)
        .await
        .unwrap();
    assert!(matches!(
        payload,
        ResponsePayload::AnomalyConfirmationRequired {
            entered_odometer: 59000,
            last_known_odometer: 60000,
            ..
        }
    ));
    assert!(store.load_session(&EmployeeId::new("12345")).unwrap().is_none());

    // Same reading again: confirmed
    let payload = terminal
        .service
        .start_manual("VEH_001", 59000)
        .await
        .unwrap();
    let ResponsePayload::Session(session) = payload else {
        panic!("expected the started shift");
    };
    assert!(session.anomaly);
    assert_eq!(session.origin, StartOrigin::Manual);
    next_flush(&mut terminal).await;

    match &office.pushed()[0].payload {
        OutboundPayload::Start { anomaly, start_odometer, .. } => {
            assert!(*anomaly);
            assert_eq!(*start_odometer, 59000);
        }
        other => panic!("unexpected payload {:?}", other),
    }

    // A close below the start is accepted and flagged
    let payload = terminal.service.close_shift(58980).unwrap();
    let ResponsePayload::ShiftClosed(summary) = payload else {
        panic!("expected the closed shift");
    };
    assert_eq!(summary.total_distance, -20);
    assert!(summary.end_below_start);
    assert!(summary.anomaly);
}

#[tokio::test]
async fn test_invalid_input_leaves_state_alone() {
    let office = Arc::new(MockOffice::sample());
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut terminal = make_terminal(store.clone(), office);

    assert!(terminal.service.close_shift(1).is_err());
    assert!(terminal.service.add_fuel(&fuel("10", "20")).is_err());

    terminal
        .service
        .login(EmployeeId::new("12345"))
        .await
        .unwrap();
    assert!(terminal.service.start_manual("  ", 1000).await.is_err());
    assert!(terminal.service.start_manual("VEH_001", 0).await.is_err());
    assert_eq!(
        terminal.service.engine().screen(),
        ShiftScreen::AwaitingManualStart
    );

    terminal
        .service
        .start_manual("VEH_001", 60500)
        .await
        .unwrap();
    let err = terminal.service.add_fuel(&fuel("abc", "20")).unwrap_err();
    assert!(err.to_string().contains("litres"));
    assert_eq!(terminal.service.engine().session().unwrap().fuel_count(), 0);
}

#[tokio::test]
async fn test_office_correction_while_active() {
    let office = Arc::new(MockOffice::sample());
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut terminal = make_terminal(store.clone(), office.clone());

    terminal
        .service
        .login(EmployeeId::new("999"))
        .await
        .unwrap();
    terminal.service.take_events();

    // The office fixes the plate and the reading
    let session_id = terminal.service.engine().session_id().cloned().unwrap();
    terminal.service.handle_message(ServiceMessage::Poll(shiftd::PollUpdate {
        session_id,
        remote: Some(RemoteStart::found("VEH_998", 124590)),
    }));

    let session = terminal.service.engine().session().unwrap().clone();
    assert_eq!(session.vehicle, "VEH_998");
    assert_eq!(session.start_odometer, 124590);

    let events = terminal.service.take_events();
    let corrections = events
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::OfficeCorrection { corrections, .. } => Some(corrections.len()),
            _ => None,
        })
        .expect("no correction event");
    assert_eq!(corrections, 2);

    let saved = store.load_session(&EmployeeId::new("999")).unwrap().unwrap();
    assert_eq!(saved.vehicle, "VEH_998");
}

#[tokio::test]
async fn test_shift_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let office = Arc::new(MockOffice::sample());

    {
        let mut terminal = make_terminal(file_store(dir.path()), office.clone());
        terminal
            .service
            .login(EmployeeId::new("999"))
            .await
            .unwrap();
        terminal.service.add_fuel(&fuel("30", "60,25")).unwrap();
        next_flush(&mut terminal).await;
    }

    let mut terminal = make_terminal(file_store(dir.path()), office.clone());
    let payload = terminal
        .service
        .login(EmployeeId::new("999"))
        .await
        .unwrap();
    let ResponsePayload::Session(session) = payload else {
        panic!("expected the resumed shift");
    };
    assert_eq!(session.fuel_count(), 1);
    assert!((session.total_cost() - 60.25).abs() < 1e-9);
    assert!(terminal.service.is_polling());

    // Resuming does not ask the office for a preload again
    assert_eq!(office.remote_start_calls(), 1);
}

#[tokio::test]
async fn test_saved_shift_resumes_while_office_is_down() {
    let office = Arc::new(MockOffice::sample());
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut terminal = make_terminal(store.clone(), office.clone());

    terminal
        .service
        .login(EmployeeId::new("999"))
        .await
        .unwrap();
    terminal.service.add_fuel(&fuel("40", "80")).unwrap();
    next_flush(&mut terminal).await;
    terminal.service.logout().unwrap();

    office.set_fail_lookups(true);
    let payload = terminal
        .service
        .login(EmployeeId::new("999"))
        .await
        .unwrap();
    let ResponsePayload::Session(session) = payload else {
        panic!("expected the saved shift, got {:?}", payload);
    };
    assert_eq!(session.vehicle, "VEH_999");
    assert_eq!(session.fuel_count(), 1);
    assert_eq!(terminal.service.engine().screen(), ShiftScreen::ShiftActive);

    // The shift can still be worked and closed
    terminal.service.add_fuel(&fuel("10", "20")).unwrap();
    let payload = terminal.service.close_shift(124800).unwrap();
    assert!(matches!(payload, ResponsePayload::ShiftClosed(_)));

    // Nothing saved for this driver: the office is needed
    let err = terminal
        .service
        .login(EmployeeId::new("12345"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unreachable"));
    assert_eq!(terminal.service.engine().screen(), ShiftScreen::LoggedOut);
}

#[tokio::test]
async fn test_shift_from_an_earlier_day_is_discarded() {
    let office = Arc::new(MockOffice::sample());
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let mut stale = ShiftSession::open(
        DriverIdentity::new(EmployeeId::new("12345"), "Mario Rossi"),
        "VEH_001",
        60000,
        StartOrigin::Manual,
        false,
        shiftlog_util::now(),
    );
    stale.date = stale.date.pred_opt().unwrap();
    store.save_session(&stale).unwrap();

    let mut terminal = make_terminal(store.clone(), office);
    let payload = terminal
        .service
        .login(EmployeeId::new("12345"))
        .await
        .unwrap();
    assert!(matches!(payload, ResponsePayload::ManualStartRequired { .. }));
    assert!(store.load_session(&EmployeeId::new("12345")).unwrap().is_none());
}

#[tokio::test]
async fn test_queued_records_survive_restart_once_each() {
    let dir = tempfile::tempdir().unwrap();
    let office = Arc::new(MockOffice::sample());
    office.set_fail_push(true);

    {
        let mut terminal = make_terminal(file_store(dir.path()), office.clone());
        terminal
            .service
            .login(EmployeeId::new("12345"))
            .await
            .unwrap();
        terminal
            .service
            .start_manual("VEH_001", 60100)
            .await
            .unwrap();
        let report = next_flush(&mut terminal).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.remaining, 1);

        terminal.service.close_shift(60250).unwrap();
        let report = next_flush(&mut terminal).await;
        assert_eq!(report.remaining, 2);
        assert!(office.pushed().is_empty());
    }

    office.set_fail_push(false);
    let mut terminal = make_terminal(file_store(dir.path()), office.clone());
    assert_eq!(terminal.service.state().pending_outbound, 2);

    terminal.service.retry_delivery();
    let report = next_flush(&mut terminal).await;
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(terminal.service.state().pending_outbound, 0);

    // Nothing left to send a second time
    terminal.service.retry_delivery();
    let actions: Vec<_> = office.pushed().iter().map(|e| e.action()).collect();
    assert_eq!(actions, vec![OutboundAction::Start, OutboundAction::End]);
}
