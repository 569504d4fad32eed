//! Shift session state machine for shiftd
//!
//! This crate is the heart of shiftd, containing:
//! - The screen state machine (LoggedOut -> AwaitingPreloadCheck ->
//!   AwaitingManualStart -> ShiftActive <-> ClosingShift -> LoggedOut)
//! - Low-odometer anomaly confirmation
//! - Fuel form validation and the append-only fuel log
//! - Last-writer-wins reconciliation against the office's view
//!
//! The engine performs no I/O. Every transition returns the side effects
//! the service has to carry out.

mod effects;
mod engine;
mod events;
mod session;

pub use effects::*;
pub use engine::*;
pub use events::*;
pub use session::*;
