//! Records pushed to the office log

use serde::{Deserialize, Serialize};
use shiftlog_util::SessionId;
use std::fmt;

use crate::{ClosedShiftSummary, DriverIdentity, FuelRecord, ShiftSession};

/// Kind of record sent to the office
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundAction {
    Start,
    Fuel,
    End,
}

impl OutboundAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundAction::Start => "START",
            OutboundAction::Fuel => "FUEL",
            OutboundAction::End => "END",
        }
    }
}

impl fmt::Display for OutboundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an outbound record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundPayload {
    Start {
        driver: DriverIdentity,
        vehicle: String,
        start_odometer: u64,
        anomaly: bool,
    },
    Fuel {
        driver: DriverIdentity,
        vehicle: String,
        record: FuelRecord,
    },
    End {
        summary: ClosedShiftSummary,
    },
}

/// A record queued for delivery to the office
///
/// The idempotency key is derived from the session id, so re-enqueueing
/// the same record never produces a second delivery row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub idempotency_key: String,
    pub payload: OutboundPayload,
}

impl OutboundEvent {
    pub fn start(session: &ShiftSession) -> Self {
        Self {
            idempotency_key: format!("{}:start", session.session_id),
            payload: OutboundPayload::Start {
                driver: session.driver.clone(),
                vehicle: session.vehicle.clone(),
                start_odometer: session.start_odometer,
                anomaly: session.anomaly,
            },
        }
    }

    pub fn fuel(session: &ShiftSession, index: usize) -> Option<Self> {
        let record = session.fuel_records().get(index)?.clone();
        Some(Self {
            idempotency_key: fuel_key(&session.session_id, index),
            payload: OutboundPayload::Fuel {
                driver: session.driver.clone(),
                vehicle: session.vehicle.clone(),
                record,
            },
        })
    }

    pub fn end(summary: &ClosedShiftSummary) -> Self {
        Self {
            idempotency_key: format!("{}:end", summary.session_id),
            payload: OutboundPayload::End {
                summary: summary.clone(),
            },
        }
    }

    pub fn action(&self) -> OutboundAction {
        match self.payload {
            OutboundPayload::Start { .. } => OutboundAction::Start,
            OutboundPayload::Fuel { .. } => OutboundAction::Fuel,
            OutboundPayload::End { .. } => OutboundAction::End,
        }
    }
}

fn fuel_key(session_id: &SessionId, index: usize) -> String {
    format!("{}:fuel:{}", session_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StartOrigin;
    use chrono::{Local, TimeZone};
    use shiftlog_util::EmployeeId;

    fn session() -> ShiftSession {
        let now = Local.with_ymd_and_hms(2025, 5, 6, 6, 0, 0).unwrap();
        let mut session = ShiftSession::open(
            DriverIdentity::new(EmployeeId::new("12345"), "Mario Rossi"),
            "AB123CD",
            1000,
            StartOrigin::Manual,
            false,
            now,
        );
        session.append_fuel(FuelRecord {
            odometer_at_fill: Some(1100),
            litres: 40.0,
            cost: 72.0,
            card_number: "CARD-1".into(),
            station_name: "Q8".into(),
            recorded_at: now,
        });
        session
    }

    #[test]
    fn keys_follow_session_id() {
        let session = session();
        let id = session.session_id.to_string();

        let start = OutboundEvent::start(&session);
        assert_eq!(start.idempotency_key, format!("{}:start", id));
        assert_eq!(start.action(), OutboundAction::Start);

        let fuel = OutboundEvent::fuel(&session, 0).unwrap();
        assert_eq!(fuel.idempotency_key, format!("{}:fuel:0", id));
        assert!(OutboundEvent::fuel(&session, 1).is_none());
    }

    #[test]
    fn payload_is_tagged_by_action() {
        let json = serde_json::to_string(&OutboundEvent::start(&session())).unwrap();
        assert!(json.contains("\"action\":\"START\""));
    }
}
