//! Office sheet wire format
//!
//! The script endpoint speaks in the sheet's column names. Spreadsheet
//! cells come back as numbers, numeric strings, or blanks, so numeric
//! fields are read leniently.

use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use shiftlog_api::{
    DriverShift, FuelRecord, OutboundEvent, OutboundPayload, Station, Vehicle, VehicleUsage,
};
use shiftlog_office::RemoteStart;

#[derive(Debug, Deserialize)]
pub(crate) struct WireDriver {
    #[serde(default)]
    pub found: bool,
    #[serde(default, alias = "nome")]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireVehicle {
    targa: String,
    #[serde(default)]
    modello: Option<String>,
    #[serde(default, rename = "lastKm", deserialize_with = "lenient_u64")]
    last_km: Option<u64>,
    #[serde(default, rename = "lastDriver")]
    last_driver: Option<String>,
}

impl From<WireVehicle> for Vehicle {
    fn from(w: WireVehicle) -> Self {
        Self {
            plate: w.targa,
            model: w.modello.unwrap_or_default(),
            last_odometer: w.last_km,
            last_driver: w.last_driver.filter(|d| !d.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRemoteStart {
    #[serde(default)]
    found: bool,
    #[serde(default, rename = "startKm", deserialize_with = "lenient_u64")]
    start_km: Option<u64>,
    #[serde(default)]
    targa: Option<String>,
}

impl From<WireRemoteStart> for RemoteStart {
    fn from(w: WireRemoteStart) -> Self {
        Self {
            found: w.found,
            start_odometer: w.start_km,
            vehicle: w.targa,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    driver: String,
    #[serde(default, deserialize_with = "lenient_string")]
    date: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    km: Option<u64>,
}

impl From<WireUsage> for VehicleUsage {
    fn from(w: WireUsage) -> Self {
        Self {
            driver: w.driver,
            date: w.date,
            odometer: w.km,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDriverShift {
    #[serde(default, deserialize_with = "lenient_string")]
    date: String,
    #[serde(default)]
    targa: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    start: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    end: Option<u64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    total: Option<i64>,
}

impl From<WireDriverShift> for DriverShift {
    fn from(w: WireDriverShift) -> Self {
        Self {
            date: w.date,
            vehicle: w.targa,
            start_odometer: w.start,
            end_odometer: w.end,
            total_distance: w.total,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireStation {
    nome: String,
}

impl From<WireStation> for Station {
    fn from(w: WireStation) -> Self {
        Self { name: w.nome }
    }
}

/// Error message carried in a `{"error": "..."}` body
pub(crate) fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn fuel_operation(record: &FuelRecord) -> Value {
    json!({
        "km": record.odometer_at_fill,
        "litri": record.litres,
        "importo": record.cost,
        "tessera": record.card_number,
        "impianto": record.station_name,
        "time": shiftlog_util::format_clock_time(&record.recorded_at),
    })
}

/// JSON body of a POST for one outbound record
pub(crate) fn push_body(event: &OutboundEvent) -> Value {
    let mut body = match &event.payload {
        OutboundPayload::Start {
            driver,
            vehicle,
            start_odometer,
            anomaly,
        } => json!({
            "targa": vehicle,
            "driver": driver.employee_id.as_str(),
            "driverName": driver.name,
            "start": start_odometer,
            "anomaly": anomaly,
        }),
        OutboundPayload::Fuel {
            driver,
            vehicle,
            record,
        } => {
            let mut body = fuel_operation(record);
            body["driver"] = json!(driver.employee_id.as_str());
            body["driverName"] = json!(driver.name);
            body["targa"] = json!(vehicle);
            body
        }
        OutboundPayload::End { summary } => json!({
            "driver": summary.driver.employee_id.as_str(),
            "driverName": summary.driver.name,
            "targa": summary.vehicle,
            "start": summary.start_odometer,
            "end": summary.end_odometer,
            "totalKm": summary.total_distance,
            "fuelOperations": summary.fuel_records.iter().map(fuel_operation).collect::<Vec<_>>(),
            "anomaly": summary.anomaly,
        }),
    };

    body["action"] = json!(event.action().as_str());
    body["requestId"] = json!(event.idempotency_key);
    body
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_i64(deserializer)?.and_then(|n| u64::try_from(n).ok()))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
