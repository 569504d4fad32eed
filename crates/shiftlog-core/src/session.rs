//! Open shift tracking and fuel form parsing

use chrono::{DateTime, Local};
use shiftlog_api::{ClosedShiftSummary, FuelEntry, FuelRecord, ShiftCorrection, ShiftSession};
use shiftlog_office::RemoteStart;
use shiftlog_util::ShiftError;

/// The open shift held by the engine
#[derive(Debug, Clone)]
pub struct ActiveShift {
    session: ShiftSession,
}

impl ActiveShift {
    pub fn new(session: ShiftSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ShiftSession {
        &self.session
    }

    pub fn into_session(self) -> ShiftSession {
        self.session
    }

    /// Append a validated fuel record, returning its index
    pub fn record_fuel(&mut self, record: FuelRecord) -> usize {
        self.session.append_fuel(record)
    }

    /// Apply the office's view, office wins
    ///
    /// A new starting odometer clears the anomaly flag. A remote view
    /// equal to the local one changes nothing and returns no corrections.
    pub fn apply_remote(&mut self, remote: &RemoteStart) -> Vec<ShiftCorrection> {
        let mut corrections = Vec::new();

        if let Some(start) = remote.valid_start() {
            if start != self.session.start_odometer {
                corrections.push(ShiftCorrection::StartOdometer {
                    from: self.session.start_odometer,
                    to: start,
                });
                self.session.start_odometer = start;
                self.session.anomaly = false;
            }
        }

        if let Some(vehicle) = remote.valid_vehicle() {
            if vehicle != self.session.vehicle {
                corrections.push(ShiftCorrection::Vehicle {
                    from: self.session.vehicle.clone(),
                    to: vehicle.to_string(),
                });
                self.session.vehicle = vehicle.to_string();
            }
        }

        corrections
    }

    /// Close the shift. Any end reading is accepted.
    pub fn close(mut self, end_odometer: u64, now: DateTime<Local>) -> ClosedShiftSummary {
        self.session.end_odometer = Some(end_odometer);
        self.session.ended_at = Some(now);
        self.session.is_open = false;

        let total_distance = self.session.distance_to(end_odometer);
        let session = self.session;

        ClosedShiftSummary {
            total_litres: session.total_litres(),
            total_cost: session.total_cost(),
            fuel_records: session.fuel_records().to_vec(),
            session_id: session.session_id,
            date: session.date,
            driver: session.driver,
            vehicle: session.vehicle,
            start_odometer: session.start_odometer,
            end_odometer,
            total_distance,
            anomaly: session.anomaly,
            origin: session.origin,
            end_below_start: total_distance < 0,
            started_at: session.started_at,
            ended_at: now,
        }
    }
}

/// A low-odometer start waiting for the driver to repeat it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnomaly {
    pub vehicle: String,
    pub odometer: u64,
}

/// Validate a fuel form into a record
pub fn parse_fuel_entry(entry: &FuelEntry, now: DateTime<Local>) -> Result<FuelRecord, ShiftError> {
    let litres = parse_amount("litres", entry.litres.as_deref())?;
    let cost = parse_amount("cost", entry.cost.as_deref())?;

    let odometer_at_fill = match entry.odometer_at_fill.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            ShiftError::invalid_fuel("odometer_at_fill", format!("'{}' is not a whole number", raw))
        })?),
    };

    Ok(FuelRecord {
        odometer_at_fill,
        litres,
        cost,
        card_number: entry.card_number.trim().to_string(),
        station_name: entry.station_name.trim().to_string(),
        recorded_at: now,
    })
}

/// Parse a positive decimal typed by the driver; "45,50" and "45.50" are equal
pub fn parse_amount(field: &'static str, raw: Option<&str>) -> Result<f64, ShiftError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ShiftError::invalid_fuel(field, "is required"));
    }

    let value: f64 = raw
        .replace(',', ".")
        .parse()
        .map_err(|_| ShiftError::invalid_fuel(field, format!("'{}' is not a number", raw)))?;

    if !value.is_finite() || value <= 0.0 {
        return Err(ShiftError::invalid_fuel(field, "must be greater than zero"));
    }

    Ok(value)
}
