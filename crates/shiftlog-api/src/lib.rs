//! Protocol types for shiftd IPC
//!
//! This crate defines the stable API between shiftd and its front ends:
//! - Shift data (sessions, fuel records, closing summaries)
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> clients)
//! - Outbound office records
//! - Versioning

mod commands;
mod events;
mod outbound;
mod types;

pub use commands::*;
pub use events::*;
pub use outbound::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
