use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::channel_registry::{ChannelRegistry, ChannelSnapshot};
use super::edge_encoder::EdgeEventEncoder;
use super::enablement::{EnablementController, EnablementState};
use super::metadata::{ChannelsInfo, MetadataSync};
use super::persistence::SourceSettings;
use crate::config::AdapterConfig;
use crate::core::{HostGraph, OutputEvent, SampleBlock};
use crate::engine::PresencePoller;
use crate::error::SourceError;
use crate::hal::{
    AcquisitionDriver, BackendKind, BufferConsumer, ChannelType, DriverRegistry, NamingScheme,
};
use crate::observability::{AdapterMetrics, MetricsSnapshot};

pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
pub const DEFAULT_BIT_VOLTS: f32 = 1.0;

/// What one processing call hands to the host graph
#[derive(Debug)]
pub struct BlockOutput<'a> {
    pub samples: &'a SampleBlock,
    pub events: &'a [OutputEvent],
    pub sample_count: usize,
}

/// Entry node of a processing graph for one acquisition source.
///
/// The adapter itself is driven by the real-time tick through
/// [`process`](Self::process). Everything the control context needs
/// (enable/disable, presence polling, channel metadata) goes through the
/// cloneable [`SourceControl`] handle from [`control`](Self::control).
pub struct SourceAdapter {
    control: SourceControl,
    consumer: Option<BufferConsumer>,
    encoder: EdgeEventEncoder,
    block: SampleBlock,
    event_codes: Vec<u64>,
    events: Vec<OutputEvent>,
    overflow_reported: bool,
}

impl SourceAdapter {
    /// Resolve `config.source` against `drivers` and build the adapter.
    /// An unrecognized name, or a factory failure, leaves the adapter
    /// permanently disabled with neutral defaults.
    pub fn new(config: AdapterConfig, drivers: &DriverRegistry, host: Arc<dyn HostGraph>) -> Self {
        let driver = match config.backend() {
            Some(kind) => match drivers.create(kind) {
                Ok(driver) => Some(driver),
                Err(e) => {
                    error!("Failed to create {} driver: {:#}", kind, e);
                    None
                }
            },
            None => {
                warn!(
                    "{}",
                    SourceError::NoDriverResolved {
                        name: config.source.clone()
                    }
                );
                None
            }
        };

        Self::with_driver(config, driver, host)
    }

    pub fn with_driver(
        config: AdapterConfig,
        driver: Option<Arc<dyn AcquisitionDriver>>,
        host: Arc<dyn HostGraph>,
    ) -> Self {
        info!("Creating source adapter for '{}'", config.source);

        let consumer = driver.as_ref().and_then(|d| d.take_buffer());
        if driver.is_some() && consumer.is_none() {
            warn!("Driver has no data buffer to hand out; blocks will stay empty");
        }

        let num_channels = driver.as_ref().map_or(0, |d| d.num_channels());
        let registry = Arc::new(ChannelRegistry::from_snapshot(
            driver
                .as_ref()
                .map(|d| ChannelSnapshot::from_driver(d.as_ref()))
                .unwrap_or_default(),
        ));
        let capacity = config.event_code_capacity;
        let encoder =
            EdgeEventEncoder::new(config.source_id, registry.num_event_channels(), capacity);

        let mut controller = EnablementController::new(driver.clone(), host.clone());
        if let Some(consumer) = consumer.as_ref() {
            controller = controller.with_stale_fence(consumer.fence());
        }
        let enablement = Arc::new(controller);
        if let Some(driver) = driver.as_ref() {
            let weak = Arc::downgrade(&enablement);
            driver.set_stop_listener(Box::new(move || {
                if let Some(controller) = weak.upgrade() {
                    controller.acquisition_stopped();
                }
            }));
            if !driver.found_input_source() {
                info!("No input source found yet; searching");
            }
        }

        let control = SourceControl {
            inner: Arc::new(ControlInner {
                metadata: MetadataSync::new(driver.clone(), registry.clone(), host),
                backend: driver.as_ref().map(|d| d.backend()),
                config,
                driver,
                registry,
                enablement,
                ttl_high: AtomicBool::new(false),
                metrics: Arc::new(AdapterMetrics::new()),
            }),
        };

        // Worst case: every line toggles on every sample, plus the timestamp
        let max_events = capacity
            .saturating_mul(encoder.num_lines())
            .saturating_add(1);

        Self {
            control,
            consumer,
            encoder,
            block: SampleBlock::new(num_channels, capacity),
            event_codes: vec![0; capacity],
            events: Vec::with_capacity(max_events),
            overflow_reported: false,
        }
    }

    pub fn control(&self) -> SourceControl {
        self.control.clone()
    }

    /// Last known state of every digital line
    pub fn event_channel_state(&self) -> &[bool] {
        self.encoder.line_state()
    }

    pub fn block_capacity(&self) -> usize {
        self.encoder.capacity()
    }

    /// Real-time entry point: drain up to `max_samples` frames and encode
    /// their digital lines.
    ///
    /// Never blocks and, within capacity, never allocates. Requests above
    /// the event-code capacity are clamped; the excess stays buffered for
    /// the next call. Without a data buffer the block is empty and carries
    /// no events.
    pub fn process(&mut self, max_samples: usize) -> BlockOutput<'_> {
        self.events.clear();
        self.block.clear();

        let Some(consumer) = self.consumer.as_mut() else {
            return BlockOutput {
                samples: &self.block,
                events: &self.events,
                sample_count: 0,
            };
        };

        let inner = &self.control.inner;

        let capacity = self.encoder.capacity();
        let requested = if max_samples > capacity {
            if !self.overflow_reported {
                warn!(
                    "{}; clamping",
                    SourceError::BufferOverflow {
                        requested: max_samples,
                        capacity
                    }
                );
                self.overflow_reported = true;
            }
            inner.metrics.record_overflow();
            capacity
        } else {
            max_samples
        };

        let drained = consumer.drain(requested, self.block.storage_mut(), &mut self.event_codes);
        self.block.set_len(drained.count);

        let stale = consumer.take_stale_frames();
        if stale > 0 {
            debug!("Discarded {} samples acquired before stop", stale);
            inner.metrics.record_flush(stale);
        }

        match self.encoder.encode(
            drained.timestamp,
            &self.event_codes[..drained.count],
            &mut self.events,
        ) {
            Ok(edges) => inner.metrics.record_block(drained.count, edges),
            Err(e) => warn!("Rejected block: {}", e),
        }

        BlockOutput {
            samples: &self.block,
            events: &self.events,
            sample_count: drained.count,
        }
    }
}

struct ControlInner {
    config: AdapterConfig,
    backend: Option<BackendKind>,
    driver: Option<Arc<dyn AcquisitionDriver>>,
    registry: Arc<ChannelRegistry>,
    enablement: Arc<EnablementController>,
    metadata: MetadataSync,
    ttl_high: AtomicBool,
    metrics: Arc<AdapterMetrics>,
}

impl ControlInner {
    fn shutdown(&self) -> Result<(), SourceError> {
        let Some(driver) = self.driver.as_ref() else {
            return Ok(());
        };
        if !driver.is_running() {
            return Ok(());
        }

        info!("Forcing acquisition thread to stop");
        match driver.request_stop(self.config.stop_timeout()) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("{}; escalating to a blocking stop", e);
                if let Err(stop_err) = driver.stop_acquisition() {
                    error!("Blocking stop failed: {:#}", stop_err);
                }
                Err(e)
            }
        }
    }
}

impl Drop for ControlInner {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Control-context handle to a [`SourceAdapter`]
#[derive(Clone)]
pub struct SourceControl {
    inner: Arc<ControlInner>,
}

impl SourceControl {
    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.inner.backend
    }

    pub fn driver(&self) -> Option<&Arc<dyn AcquisitionDriver>> {
        self.inner.driver.as_ref()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn enablement(&self) -> &Arc<EnablementController> {
        &self.inner.enablement
    }

    pub fn state(&self) -> EnablementState {
        self.inner.enablement.state()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enablement.is_enabled()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.enablement.is_ready()
    }

    pub fn sample_rate(&self) -> f32 {
        self.inner
            .driver
            .as_ref()
            .map_or(DEFAULT_SAMPLE_RATE, |d| d.sample_rate())
    }

    pub fn default_sample_rate(&self) -> f32 {
        self.sample_rate()
    }

    pub fn default_num_outputs(&self) -> usize {
        self.inner.driver.as_ref().map_or(0, |d| d.num_channels())
    }

    pub fn num_event_channels(&self) -> usize {
        self.inner.registry.num_event_channels()
    }

    pub fn bit_volts(&self, channel: usize) -> f32 {
        self.inner
            .driver
            .as_ref()
            .map_or(DEFAULT_BIT_VOLTS, |d| d.bit_volts(channel))
    }

    /// Consistent view of the cached channel metadata
    pub fn channels(&self) -> Arc<ChannelSnapshot> {
        self.inner.registry.snapshot()
    }

    /// Host `enable()`: start acquisition
    pub fn enable(&self) -> bool {
        self.inner.enablement.begin_acquisition()
    }

    /// Host `disable()`: stop acquisition synchronously
    pub fn disable(&self) -> bool {
        self.inner.enablement.end_acquisition()
    }

    /// Driver-originated stop
    pub fn acquisition_stopped(&self) {
        self.inner.enablement.acquisition_stopped()
    }

    /// One presence check, as the timer would run it
    pub fn poll(&self) -> EnablementState {
        self.inner.enablement.poll()
    }

    /// Start the presence timer on the current tokio runtime. `None` when
    /// no driver is attached, since nothing would ever be found.
    pub fn spawn_poller(&self) -> Option<PresencePoller> {
        if !self.inner.enablement.has_driver() {
            return None;
        }
        Some(PresencePoller::spawn(
            self.inner.enablement.clone(),
            self.inner.config.poll_interval(),
        ))
    }

    pub fn update_settings(&self) {
        self.inner.metadata.update_settings()
    }

    pub fn modify_channel_name(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        name: &str,
        propagate: bool,
    ) -> Option<usize> {
        self.inner
            .metadata
            .modify_channel_name(channel_type, stream, number, name, propagate)
    }

    pub fn modify_channel_gain(
        &self,
        stream: i32,
        number: i32,
        channel_type: ChannelType,
        gain: f32,
        propagate: bool,
    ) -> Option<usize> {
        self.inner
            .metadata
            .modify_channel_gain(stream, number, channel_type, gain, propagate)
    }

    pub fn channels_info(&self) -> ChannelsInfo {
        self.inner.metadata.channels_info()
    }

    pub fn set_default_naming_scheme(&self, scheme: NamingScheme) -> usize {
        self.inner.metadata.set_default_naming_scheme(scheme)
    }

    pub fn event_channel_names(&self) -> Vec<String> {
        self.inner.metadata.event_channel_names()
    }

    pub fn save_settings(&self) -> SourceSettings {
        SourceSettings {
            channel_info: Some(self.inner.metadata.save()),
        }
    }

    pub fn load_settings(&self, settings: &SourceSettings) {
        if let Some(group) = settings.channel_info.as_ref() {
            self.inner.metadata.load(group);
        }
    }

    /// Editor action messages: "HI" / "LO" set the TTL output state
    pub fn handle_action(&self, message: &str) {
        if message.eq_ignore_ascii_case("HI") {
            self.inner.ttl_high.store(true, Ordering::Release);
        } else if message.eq_ignore_ascii_case("LO") {
            self.inner.ttl_high.store(false, Ordering::Release);
        } else {
            debug!("Ignoring action message '{}'", message);
        }
    }

    pub fn ttl_state(&self) -> bool {
        self.inner.ttl_high.load(Ordering::Acquire)
    }

    /// Stop a still-running producer within the configured bound, falling
    /// back to a blocking stop on timeout. Also runs when the last handle
    /// is dropped.
    pub fn shutdown(&self) -> Result<(), SourceError> {
        self.inner.shutdown()
    }
}
