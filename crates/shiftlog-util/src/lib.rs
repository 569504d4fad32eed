//! Shared utilities for shiftlog
//!
//! This crate provides:
//! - ID types (EmployeeId, SessionId, ClientId)
//! - Wall-clock helpers with mock time support for development
//! - Error types shared by the engine and the service
//! - Default paths for socket, data, and config files

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
