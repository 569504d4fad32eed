//! Records returned by the office endpoint

use serde::{Deserialize, Serialize};

/// The office's view of a driver's shift start for today
///
/// Used both for the login preload and for every reconciliation poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStart {
    pub found: bool,
    pub start_odometer: Option<u64>,
    pub vehicle: Option<String>,
}

impl RemoteStart {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn found(vehicle: impl Into<String>, start_odometer: u64) -> Self {
        Self {
            found: true,
            start_odometer: Some(start_odometer),
            vehicle: Some(vehicle.into()),
        }
    }

    /// Starting odometer, if the office entered a usable one
    pub fn valid_start(&self) -> Option<u64> {
        match (self.found, self.start_odometer) {
            (true, Some(km)) if km > 0 => Some(km),
            _ => None,
        }
    }

    /// Vehicle, if the office entered one
    pub fn valid_vehicle(&self) -> Option<&str> {
        if !self.found {
            return None;
        }
        self.vehicle
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}
