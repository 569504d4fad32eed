//! shiftd service internals
//!
//! The binary connects these to the IPC server and the signal loop:
//! - `ShiftService`: the shift engine and the side effects it asks for
//! - `Outbox`: ordered, retried delivery of records to the office
//! - `PollTask`: periodic reconciliation of the open shift

mod outbox;
mod poller;
mod service;

pub use outbox::*;
pub use poller::*;
pub use service::*;
