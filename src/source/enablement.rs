use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::core::HostGraph;
use crate::hal::{AcquisitionDriver, BufferFence};

/// Whether the adapter's source is armed for acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnablementState {
    Disabled,
    Searching,
    Enabled,
}

impl EnablementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnablementState::Disabled => "disabled",
            EnablementState::Searching => "searching",
            EnablementState::Enabled => "enabled",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: EnablementState,
    /// Set when the operator stopped acquisition; suppresses the UI
    /// notification for the driver's own stop callback that follows.
    operator_stopped: bool,
    acquiring: bool,
}

/// Hot-plug state machine for one acquisition source.
///
/// Presence polling, operator enable/disable and driver stop callbacks all
/// land here from the control context. Host notifications are issued after
/// the internal lock is released.
pub struct EnablementController {
    driver: Option<Arc<dyn AcquisitionDriver>>,
    host: Arc<dyn HostGraph>,
    inner: Mutex<Inner>,
    polling: AtomicBool,
    poll_restart: Notify,
    stale_fence: Option<BufferFence>,
}

impl EnablementController {
    pub fn new(driver: Option<Arc<dyn AcquisitionDriver>>, host: Arc<dyn HostGraph>) -> Self {
        let state = if driver.is_some() {
            EnablementState::Searching
        } else {
            EnablementState::Disabled
        };
        let polling = AtomicBool::new(driver.is_some());

        Self {
            driver,
            host,
            inner: Mutex::new(Inner {
                state,
                operator_stopped: true,
                acquiring: false,
            }),
            polling,
            poll_restart: Notify::new(),
            stale_fence: None,
        }
    }

    /// Fence advanced on every operator stop, so data acquired before the
    /// stop is never handed to block processing
    pub fn with_stale_fence(mut self, fence: BufferFence) -> Self {
        self.stale_fence = Some(fence);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> EnablementState {
        self.lock().state
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == EnablementState::Enabled
    }

    pub fn is_acquiring(&self) -> bool {
        self.lock().acquiring
    }

    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    /// Disabled for good: no driver was resolved, nothing will ever poll
    pub fn is_terminal(&self) -> bool {
        self.driver.is_none()
    }

    /// Driver attached and physical source reachable
    pub fn is_ready(&self) -> bool {
        self.driver
            .as_ref()
            .map_or(false, |driver| driver.found_input_source())
    }

    /// Should the presence timer fire right now
    pub fn polling_active(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    /// Notified whenever polling restarts, so the timer can reset its phase
    pub fn restart_notifier(&self) -> &Notify {
        &self.poll_restart
    }

    /// Arm the source if it is reachable. Returns false when it is not;
    /// already being armed is a successful no-op.
    pub fn try_enable(&self) -> bool {
        if !self.is_ready() {
            return false;
        }

        {
            let mut inner = self.lock();
            if inner.state == EnablementState::Enabled {
                return true;
            }
            inner.state = EnablementState::Enabled;
        }

        info!("Input source found");
        self.host.show_editor(EnablementState::Enabled);
        true
    }

    /// Presence timer callback
    pub fn poll(&self) -> EnablementState {
        if self.driver.is_none() || !self.polling_active() {
            return self.state();
        }

        if !self.try_enable() {
            let lost = {
                let mut inner = self.lock();
                if inner.state == EnablementState::Enabled {
                    inner.state = EnablementState::Disabled;
                    true
                } else {
                    false
                }
            };

            if lost {
                info!("Input source lost");
                self.host.show_editor(EnablementState::Disabled);
            }
        }

        self.state()
    }

    /// Host asked to start acquisition. Returns false without a driver or
    /// if the driver refuses to start; a second call while acquiring is a
    /// successful no-op.
    pub fn begin_acquisition(&self) -> bool {
        let Some(driver) = self.driver.as_ref() else {
            warn!("Enable requested but no driver is attached");
            return false;
        };

        {
            let mut inner = self.lock();
            if inner.acquiring {
                debug!("Enable requested while already acquiring");
                return true;
            }
            inner.acquiring = true;
            inner.operator_stopped = false;
        }

        info!("Source received enable signal");
        match driver.start_acquisition() {
            Ok(()) => {
                self.pause_polling();
                true
            }
            Err(e) => {
                warn!("Failed to start acquisition: {:#}", e);
                let mut inner = self.lock();
                inner.acquiring = false;
                inner.operator_stopped = true;
                false
            }
        }
    }

    /// Host asked to stop acquisition. The producer is stopped before this
    /// returns, and data acquired until then is marked stale.
    pub fn end_acquisition(&self) -> bool {
        info!("Source received disable signal");

        self.lock().operator_stopped = true;

        if let Some(driver) = self.driver.as_ref() {
            if let Err(e) = driver.stop_acquisition() {
                warn!("Driver failed to stop cleanly: {:#}", e);
            }
        }
        if let Some(fence) = self.stale_fence.as_ref() {
            fence.advance();
        }

        {
            let mut inner = self.lock();
            inner.acquiring = false;
            if inner.state == EnablementState::Enabled {
                inner.state = EnablementState::Searching;
            }
        }

        if self.driver.is_some() {
            self.restart_polling();
        }
        true
    }

    /// Driver reports that acquisition ended on its own
    pub fn acquisition_stopped(&self) {
        let notify = {
            let mut inner = self.lock();
            inner.acquiring = false;
            if inner.operator_stopped {
                None
            } else {
                inner.operator_stopped = true;
                if self.driver.is_some() {
                    inner.state = EnablementState::Searching;
                }
                Some(inner.state)
            }
        };

        if let Some(state) = notify {
            info!("Acquisition stopped by driver; notifying UI");
            self.host.disable_callbacks();
            self.host.show_editor(state);
        }

        if self.driver.is_some() {
            self.restart_polling();
        }
    }

    fn pause_polling(&self) {
        self.polling.store(false, Ordering::Release);
    }

    fn restart_polling(&self) {
        self.polling.store(true, Ordering::Release);
        self.poll_restart.notify_one();
    }
}
