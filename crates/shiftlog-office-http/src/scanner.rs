//! Simulated badge and tag scanner
//!
//! Stands in for a camera or NFC reader: after a fixed delay it "reads"
//! the code configured for the requested kind.

use async_trait::async_trait;
use shiftlog_api::{ScanKind, ScanOutcome};
use shiftlog_office::Scanner;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct SimulatedScanner {
    delay: Duration,
    driver_code: String,
    vehicle_code: String,
    /// Bumped on every cancel; scans in flight watch for the change
    cancel_tx: watch::Sender<u64>,
}

impl SimulatedScanner {
    pub fn new(delay: Duration, driver_code: impl Into<String>, vehicle_code: impl Into<String>) -> Self {
        let (cancel_tx, _) = watch::channel(0);
        Self {
            delay,
            driver_code: driver_code.into(),
            vehicle_code: vehicle_code.into(),
            cancel_tx,
        }
    }

    fn code_for(&self, kind: ScanKind) -> &str {
        match kind {
            ScanKind::Driver => &self.driver_code,
            ScanKind::Vehicle => &self.vehicle_code,
        }
    }
}

#[async_trait]
impl Scanner for SimulatedScanner {
    async fn scan(&self, kind: ScanKind) -> ScanOutcome {
        let mut cancel_rx = self.cancel_tx.subscribe();
        debug!(?kind, delay_ms = self.delay.as_millis() as u64, "Simulated scan started");

        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {
                let code = self.code_for(kind).to_string();
                info!(?kind, code = %code, "Simulated scan read a code");
                ScanOutcome::Code(code)
            }
            _ = cancel_rx.changed() => {
                info!(?kind, "Simulated scan cancelled");
                ScanOutcome::Cancelled
            }
        }
    }

    fn cancel(&self) {
        self.cancel_tx.send_modify(|generation| *generation += 1);
    }
}
