//! Periodic reconciliation of the open shift

use shiftlog_office::{OfficeBackend, RemoteStart, with_timeout};
use shiftlog_util::SessionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::ServiceMessage;

/// One poll round
#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
    pub session_id: SessionId,
    /// `None` when the office could not be asked this round
    pub remote: Option<RemoteStart>,
}

/// Background task asking the office for the open shift's start record
///
/// Stops when cancelled or dropped; at most one runs per terminal.
pub struct PollTask {
    session_id: SessionId,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Start polling. The first round runs one `interval` from now.
    pub fn spawn(
        office: Arc<dyn OfficeBackend>,
        driver_name: String,
        session_id: SessionId,
        interval: Duration,
        timeout: Duration,
        messages: mpsc::UnboundedSender<ServiceMessage>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task_session = session_id.clone();

        info!(session_id = %session_id, interval_secs = interval.as_secs(), "Starting office poll");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let remote = match with_timeout(timeout, office.check_remote_start(&driver_name)).await {
                            Ok(remote) => Some(remote),
                            Err(e) => {
                                debug!(error = %e, "Office poll failed, skipping round");
                                None
                            }
                        };

                        let update = PollUpdate {
                            session_id: task_session.clone(),
                            remote,
                        };
                        if messages.send(ServiceMessage::Poll(update)).is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!(session_id = %task_session, "Office poll stopped");
        });

        Self {
            session_id,
            shutdown_tx,
            handle,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop polling; a request in flight is abandoned
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftlog_office::MockOffice;

    fn spawn(office: Arc<MockOffice>) -> (PollTask, mpsc::UnboundedReceiver<ServiceMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = PollTask::spawn(
            office,
            "Autista Pre-carico".into(),
            SessionId::new(),
            Duration::from_millis(20),
            Duration::from_secs(1),
            tx,
        );
        (task, rx)
    }

    async fn next_update(rx: &mut mpsc::UnboundedReceiver<ServiceMessage>) -> PollUpdate {
        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poll round did not arrive")
            .expect("channel closed");
        match msg {
            ServiceMessage::Poll(update) => update,
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn reports_office_start_record() {
        let office = Arc::new(MockOffice::sample());
        let (task, mut rx) = spawn(office.clone());

        let update = next_update(&mut rx).await;
        assert_eq!(&update.session_id, task.session_id());
        let remote = update.remote.unwrap();
        assert_eq!(remote.valid_start(), Some(124578));
        assert!(office.remote_start_calls() >= 1);
    }

    #[tokio::test]
    async fn failed_round_is_reported_empty() {
        let office = Arc::new(MockOffice::sample());
        office.set_fail_lookups(true);
        let (_task, mut rx) = spawn(office);

        let update = next_update(&mut rx).await;
        assert!(update.remote.is_none());
    }

    #[tokio::test]
    async fn drop_stops_polling() {
        let office = Arc::new(MockOffice::sample());
        let (task, mut rx) = spawn(office);
        next_update(&mut rx).await;

        drop(task);

        // The task's sender goes away once it stops
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }
}
