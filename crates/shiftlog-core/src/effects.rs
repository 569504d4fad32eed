//! Side effects requested by engine transitions

use shiftlog_api::{OutboundEvent, ShiftSession};
use shiftlog_util::EmployeeId;

use crate::CoreEvent;

/// Work the service must do after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Overwrite the driver's local shift record
    PersistSession(ShiftSession),

    /// Remove the driver's local shift record
    DeleteSession(EmployeeId),

    /// Queue a record for the office and try to deliver it
    Enqueue(OutboundEvent),

    /// Start the reconciliation poll for this driver
    StartPolling { driver_name: String },

    /// Cancel the reconciliation poll
    StopPolling,

    /// Cache a vehicle's closing odometer on this device
    RememberOdometer { vehicle: String, odometer: u64 },
}

/// Result of a successful transition
#[derive(Debug)]
pub struct Transition<T> {
    pub outcome: T,
    pub effects: Vec<Effect>,
    pub events: Vec<CoreEvent>,
}

impl<T> Transition<T> {
    pub fn new(outcome: T) -> Self {
        Self {
            outcome,
            effects: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_event(mut self, event: CoreEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Whether the transition asked for a given kind of effect
    pub fn has_effect(&self, pred: impl Fn(&Effect) -> bool) -> bool {
        self.effects.iter().any(pred)
    }
}
