use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::signal::SignalGenerator;
use crate::error::SourceError;
use crate::hal::buffer::{data_buffer, BufferConsumer, BufferProducer};
use crate::hal::lifecycle::{AcquisitionThread, StopSignal, DEFAULT_STOP_TIMEOUT};
use crate::hal::traits::{AcquisitionDriver, StopListener};
use crate::hal::types::{BackendKind, ChannelInfo, ChannelType, NamingScheme};

/// Shape of a simulated acquisition board
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedProfile {
    pub backend: BackendKind,
    pub sample_rate: f32,
    /// Channel count of each stream
    pub streams: Vec<usize>,
    pub num_event_channels: usize,
    pub bit_volts: f32,
    pub frames_per_packet: usize,
    pub pool_size: usize,
    /// Half period of the fastest TTL line, in samples
    pub ttl_period: u64,
}

impl SimulatedProfile {
    pub fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::CustomFpga => Self {
                backend,
                sample_rate: 25000.0,
                streams: vec![16],
                num_event_channels: 8,
                bit_volts: 1.0,
                frames_per_packet: 256,
                pool_size: 16,
                ttl_period: 2500,
            },
            BackendKind::RhythmFpga => Self {
                backend,
                sample_rate: 30000.0,
                streams: vec![32, 32],
                num_event_channels: 8,
                bit_volts: 0.195,
                frames_per_packet: 256,
                pool_size: 16,
                ttl_period: 3000,
            },
            BackendKind::Ecube => Self {
                backend,
                sample_rate: 25000.0,
                streams: vec![32],
                num_event_channels: 16,
                bit_volts: 0.1,
                frames_per_packet: 250,
                pool_size: 16,
                ttl_period: 2500,
            },
        }
    }

    pub fn num_channels(&self) -> usize {
        self.streams.iter().sum()
    }

    fn default_channels(&self) -> Vec<ChannelInfo> {
        let mut channels = Vec::with_capacity(self.num_channels());
        for (stream, &count) in self.streams.iter().enumerate() {
            for number in 0..count {
                let index = channels.len();
                channels.push(ChannelInfo {
                    name: NamingScheme::Ordinal.channel_name(index, stream as i32, number as i32),
                    channel_type: ChannelType::Continuous,
                    stream: stream as i32,
                    number: number as i32,
                    gain: 1.0,
                });
            }
        }
        channels
    }
}

/// Flips the simulated board between plugged and unplugged
#[derive(Debug, Clone)]
pub struct PresenceSwitch(Arc<AtomicBool>);

impl PresenceSwitch {
    pub fn set_present(&self, present: bool) {
        self.0.store(present, Ordering::Release);
    }

    pub fn is_present(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// In-process driver that behaves like a hot-pluggable acquisition board
pub struct SimulatedDriver {
    profile: SimulatedProfile,
    present: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    clock: Arc<AtomicU64>,
    channels: Mutex<Vec<ChannelInfo>>,
    producer: BufferProducer,
    consumer: Mutex<Option<BufferConsumer>>,
    thread: Mutex<Option<AcquisitionThread>>,
    listener: Arc<Mutex<Option<StopListener>>>,
}

impl SimulatedDriver {
    pub fn new(profile: SimulatedProfile) -> Result<Self> {
        let (producer, consumer) = data_buffer(
            profile.num_channels(),
            profile.frames_per_packet,
            profile.pool_size,
        )?;

        Ok(Self {
            channels: Mutex::new(profile.default_channels()),
            profile,
            present: Arc::new(AtomicBool::new(true)),
            running: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(AtomicU64::new(0)),
            producer,
            consumer: Mutex::new(Some(consumer)),
            thread: Mutex::new(None),
            listener: Arc::new(Mutex::new(None)),
        })
    }

    pub fn profile(&self) -> &SimulatedProfile {
        &self.profile
    }

    pub fn presence_switch(&self) -> PresenceSwitch {
        PresenceSwitch(self.present.clone())
    }

    /// Writer half of the data buffer, for feeding hand-built packets
    pub fn producer_handle(&self) -> BufferProducer {
        self.producer.clone()
    }

    fn spawn_producer(&self) -> Result<AcquisitionThread> {
        let producer = self.producer.clone();
        let present = self.present.clone();
        let running = self.running.clone();
        let clock = self.clock.clone();
        let listener = self.listener.clone();
        let num_channels = self.profile.num_channels();
        let frames_per_packet = self.profile.frames_per_packet;
        let generator = SignalGenerator::new(
            self.profile.sample_rate,
            self.profile.num_event_channels,
            self.profile.ttl_period,
        );
        let period =
            Duration::from_secs_f64(frames_per_packet as f64 / self.profile.sample_rate as f64);

        running.store(true, Ordering::Release);

        let name = format!("{}-producer", self.profile.backend.name());
        let spawned = AcquisitionThread::spawn(&name, move |stop: StopSignal| {
            let mut frame = vec![0.0f32; num_channels];
            let mut source_lost = false;

            loop {
                if stop.is_set() {
                    break;
                }
                if !present.load(Ordering::Acquire) {
                    source_lost = true;
                    break;
                }

                let start = clock.load(Ordering::Acquire);
                match producer.acquire(start) {
                    Some(mut packet) => {
                        for offset in 0..frames_per_packet as u64 {
                            let t = start + offset;
                            generator.fill_frame(t, &mut frame);
                            packet.push_frame(&frame, generator.event_code(t));
                        }
                        if let Err(e) = producer.publish(packet) {
                            warn!("Dropping simulated packet at {}: {}", start, e);
                        }
                    }
                    None => producer.record_dropped(frames_per_packet),
                }
                clock.fetch_add(frames_per_packet as u64, Ordering::AcqRel);

                thread::sleep(period);
            }

            running.store(false, Ordering::Release);

            if source_lost {
                info!("Simulated source disappeared during acquisition");
                let listener = listener.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(callback) = listener.as_ref() {
                    callback();
                }
            }
        });

        if spawned.is_err() {
            self.running.store(false, Ordering::Release);
        }
        spawned
    }
}

impl AcquisitionDriver for SimulatedDriver {
    fn backend(&self) -> BackendKind {
        self.profile.backend
    }

    fn found_input_source(&self) -> bool {
        self.present.load(Ordering::Acquire)
    }

    fn start_acquisition(&self) -> Result<()> {
        let mut slot = self.thread.lock().unwrap_or_else(|p| p.into_inner());

        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.found_input_source() {
            bail!(SourceError::SourceNotFound);
        }

        // A thread that ended on source loss is reaped before respawning
        if let Some(mut finished) = slot.take() {
            finished.join();
        }

        *slot = Some(self.spawn_producer()?);
        info!("{} acquisition started", self.profile.backend);
        Ok(())
    }

    fn stop_acquisition(&self) -> Result<()> {
        let thread = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take();

        if let Some(mut thread) = thread {
            if let Err(e) = thread.request_stop(DEFAULT_STOP_TIMEOUT) {
                warn!("{}; joining", e);
                thread.join();
            }
            info!("{} acquisition stopped", self.profile.backend);
        }
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn request_stop(&self, timeout: Duration) -> Result<(), SourceError> {
        let mut slot = self.thread.lock().unwrap_or_else(|p| p.into_inner());
        let Some(thread) = slot.as_mut() else {
            return Ok(());
        };

        thread.request_stop(timeout)?;
        *slot = None;
        Ok(())
    }

    fn take_buffer(&self) -> Option<BufferConsumer> {
        self.consumer.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    fn sample_rate(&self) -> f32 {
        self.profile.sample_rate
    }

    fn num_channels(&self) -> usize {
        self.profile.num_channels()
    }

    fn num_event_channels(&self) -> usize {
        self.profile.num_event_channels
    }

    fn bit_volts(&self, channel: usize) -> f32 {
        if channel < self.profile.num_channels() {
            self.profile.bit_volts
        } else {
            1.0
        }
    }

    fn channels_info(&self) -> Vec<ChannelInfo> {
        self.channels.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn modify_channel_name(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        name: &str,
    ) -> Option<usize> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        let index = find_channel(&channels, channel_type, stream, number)?;
        channels[index].name = name.to_string();
        Some(index)
    }

    fn modify_channel_gain(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        gain: f32,
    ) -> Option<usize> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        let index = find_channel(&channels, channel_type, stream, number)?;
        channels[index].gain = gain;
        Some(index)
    }

    fn set_default_naming_scheme(&self, scheme: NamingScheme) {
        debug!("Applying naming scheme {:?}", scheme);
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        for (index, channel) in channels.iter_mut().enumerate() {
            channel.name = scheme.channel_name(index, channel.stream, channel.number);
        }
    }

    fn event_channel_names(&self) -> Vec<String> {
        (0..self.profile.num_event_channels)
            .map(|line| format!("TTL{}", line + 1))
            .collect()
    }

    fn set_stop_listener(&self, listener: StopListener) {
        *self.listener.lock().unwrap_or_else(|p| p.into_inner()) = Some(listener);
    }
}

fn find_channel(
    channels: &[ChannelInfo],
    channel_type: ChannelType,
    stream: i32,
    number: i32,
) -> Option<usize> {
    channels.iter().position(|ch| {
        ch.channel_type == channel_type && ch.stream == stream && ch.number == number
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn small_profile() -> SimulatedProfile {
        SimulatedProfile {
            backend: BackendKind::CustomFpga,
            sample_rate: 10000.0,
            streams: vec![2, 2],
            num_event_channels: 2,
            bit_volts: 0.5,
            frames_per_packet: 10,
            pool_size: 8,
            ttl_period: 5,
        }
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_channel_resolution_by_stream_and_number() {
        let driver = SimulatedDriver::new(small_profile()).unwrap();

        assert_eq!(
            driver.modify_channel_name(ChannelType::Continuous, 1, 0, "probe"),
            Some(2)
        );
        assert_eq!(driver.channels_info()[2].name, "probe");
        assert_eq!(
            driver.modify_channel_name(ChannelType::Continuous, 5, 0, "x"),
            None
        );
        assert_eq!(
            driver.modify_channel_gain(ChannelType::Event, 0, 0, 2.0),
            None
        );
    }

    #[test]
    fn test_naming_scheme_renames_all_channels() {
        let driver = SimulatedDriver::new(small_profile()).unwrap();
        driver.set_default_naming_scheme(NamingScheme::StreamPrefixed);

        let names: Vec<String> = driver.channels_info().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["A-CH1", "A-CH2", "B-CH1", "B-CH2"]);
    }

    #[test]
    fn test_buffer_is_handed_out_once() {
        let driver = SimulatedDriver::new(small_profile()).unwrap();
        assert!(driver.take_buffer().is_some());
        assert!(driver.take_buffer().is_none());
    }

    #[test]
    fn test_start_requires_present_source() {
        let driver = SimulatedDriver::new(small_profile()).unwrap();
        driver.presence_switch().set_present(false);

        assert!(driver.start_acquisition().is_err());
        assert!(!driver.is_running());
    }

    #[test]
    fn test_acquisition_fills_buffer_and_stops() {
        let driver = SimulatedDriver::new(small_profile()).unwrap();
        let mut consumer = driver.take_buffer().unwrap();

        driver.start_acquisition().unwrap();
        assert!(driver.is_running());

        let mut samples = vec![0.0; 4 * 100];
        let mut codes = vec![0u64; 100];
        let mut total = 0;
        assert!(wait_until(Duration::from_secs(2), || {
            total += consumer.drain(100, &mut samples, &mut codes).count;
            total >= 20
        }));

        driver.stop_acquisition().unwrap();
        assert!(!driver.is_running());
    }

    #[test]
    fn test_source_loss_fires_listener() {
        let driver = SimulatedDriver::new(small_profile()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        driver.set_stop_listener(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        driver.start_acquisition().unwrap();
        driver.presence_switch().set_present(false);

        assert!(wait_until(Duration::from_secs(2), || fired.load(Ordering::SeqCst) == 1));
        assert!(wait_until(Duration::from_secs(1), || !driver.is_running()));
    }

    #[test]
    fn test_requested_stop_does_not_fire_listener() {
        let driver = SimulatedDriver::new(small_profile()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        driver.set_stop_listener(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        driver.start_acquisition().unwrap();
        assert!(driver.request_stop(Duration::from_millis(500)).is_ok());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!driver.is_running());
    }
}
