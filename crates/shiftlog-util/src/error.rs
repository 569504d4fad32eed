//! Error types for shiftlog

use thiserror::Error;

use crate::EmployeeId;

/// Error type for shift session operations
///
/// Every variant is recoverable: the caller re-prompts or retries later.
#[derive(Debug, Error)]
pub enum ShiftError {
    #[error("Driver not found: {0}")]
    DriverNotFound(EmployeeId),

    #[error("Invalid fuel record: {field} {reason}")]
    InvalidFuelRecord { field: &'static str, reason: String },

    #[error("Invalid shift start: {0}")]
    InvalidStart(String),

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("No active shift")]
    NoActiveSession,

    #[error("Office error: {0}")]
    OfficeError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShiftError {
    pub fn invalid_fuel(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFuelRecord {
            field,
            reason: reason.into(),
        }
    }

    pub fn invalid_start(reason: impl Into<String>) -> Self {
        Self::InvalidStart(reason.into())
    }

    pub fn transition(from: impl ToString, action: &'static str) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            action,
        }
    }

    pub fn office(msg: impl Into<String>) -> Self {
        Self::OfficeError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ShiftError>;
