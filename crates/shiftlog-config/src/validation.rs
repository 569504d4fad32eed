//! Configuration validation

use crate::schema::RawConfig;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid office endpoint '{value}': {message}")]
    InvalidEndpoint { value: String, message: String },

    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error("Scanner {kind} code cannot be empty")]
    EmptyScannerCode { kind: &'static str },
}

/// Validate a raw configuration, collecting every error
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(message) = check_endpoint(&config.office.endpoint) {
        errors.push(ValidationError::InvalidEndpoint {
            value: config.office.endpoint.clone(),
            message,
        });
    }

    if config.office.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroInterval {
            field: "office.request_timeout_seconds",
        });
    }

    if config.sync.poll_interval_seconds == Some(0) {
        errors.push(ValidationError::ZeroInterval {
            field: "sync.poll_interval_seconds",
        });
    }

    for (kind, code) in [
        ("driver", &config.scanner.driver_code),
        ("vehicle", &config.scanner.vehicle_code),
    ] {
        if code.as_deref().is_some_and(|c| c.trim().is_empty()) {
            errors.push(ValidationError::EmptyScannerCode { kind });
        }
    }

    errors
}

/// Check that the endpoint is an absolute http(s) URL with a host
pub fn check_endpoint(endpoint: &str) -> Result<(), String> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .ok_or_else(|| "must start with http:// or https://".to_string())?;

    let host = rest.split(['/', '?']).next().unwrap_or_default();
    if host.is_empty() {
        return Err("missing host".into());
    }
    if endpoint.chars().any(char::is_whitespace) {
        return Err("must not contain whitespace".into());
    }

    Ok(())
}
