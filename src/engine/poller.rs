use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::source::EnablementController;

/// Periodic presence check for one source, running on a tokio task.
///
/// The presence query itself may block on hardware, so each tick runs it
/// on the blocking pool. Ticks are skipped while the controller has polling
/// paused, and the timer phase restarts whenever polling resumes.
pub struct PresencePoller {
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl PresencePoller {
    /// Must be called from within a tokio runtime
    pub fn spawn(controller: Arc<EnablementController>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Presence poller started ({:?} period)", period);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = controller.restart_notifier().notified() => {
                        ticker.reset();
                    }
                    _ = ticker.tick() => {
                        if !controller.polling_active() {
                            continue;
                        }
                        let polled = controller.clone();
                        match tokio::task::spawn_blocking(move || polled.poll()).await {
                            Ok(state) => trace!("Presence poll: {}", state.as_str()),
                            Err(e) => warn!("Presence poll task failed: {}", e),
                        }
                    }
                }
            }

            debug!("Presence poller stopped");
        });

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Stop the timer and wait for the task to finish
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PresencePoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
