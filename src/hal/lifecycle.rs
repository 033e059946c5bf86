use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::SourceError;

/// Bound used when the thread is dropped without an explicit stop
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Cooperative stop flag polled by the acquisition loop
#[derive(Clone)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Owns a producer thread from spawn to join.
///
/// Dropping the handle always joins the thread: a bounded stop request is
/// tried first, and if it times out the handle escalates to a blocking join.
pub struct AcquisitionThread {
    stop: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl AcquisitionThread {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded(1);
        let signal = StopSignal(stop.clone());

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body(signal);
                let _ = done_tx.send(());
            })
            .context(format!("Failed to spawn acquisition thread '{}'", name))?;

        Ok(Self {
            stop,
            done_rx,
            handle: Some(handle),
        })
    }

    /// True once the thread body has returned (or was never started)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Signal the thread and wait up to `timeout` for it to exit.
    ///
    /// On success the thread has been joined. On timeout it is still
    /// running and the caller decides whether to escalate with [`join`](Self::join).
    pub fn request_stop(&mut self, timeout: Duration) -> Result<(), SourceError> {
        self.stop.store(true, Ordering::Release);
        if self.handle.is_none() {
            return Ok(());
        }

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(SourceError::DriverStopTimeout { timeout }),
        }
    }

    /// Signal the thread and block until it exits
    pub fn join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let name = handle.thread().name().unwrap_or("acquisition").to_string();
            if handle.join().is_err() {
                error!("Acquisition thread '{}' panicked", name);
            } else {
                debug!("Acquisition thread '{}' joined", name);
            }
        }
    }
}

impl Drop for AcquisitionThread {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if let Err(e) = self.request_stop(DEFAULT_STOP_TIMEOUT) {
            error!("{}; waiting for thread to exit", e);
            self.join();
        }
    }
}
