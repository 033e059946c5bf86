#![allow(dead_code)]

use acqsource::core::HostGraph;
use acqsource::hal::mock::{SimulatedDriver, SimulatedProfile};
use acqsource::hal::{AcquisitionDriver, BackendKind};
use acqsource::source::{EnablementState, SourceAdapter};
use acqsource::AdapterConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Host that records every notification it receives
#[derive(Default)]
pub struct RecordingHost {
    pub shown: Mutex<Vec<EnablementState>>,
    pub refreshes: AtomicUsize,
    pub callbacks_disabled: AtomicUsize,
}

impl RecordingHost {
    pub fn shown(&self) -> Vec<EnablementState> {
        self.shown.lock().unwrap().clone()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn callbacks_disabled(&self) -> usize {
        self.callbacks_disabled.load(Ordering::SeqCst)
    }
}

impl HostGraph for RecordingHost {
    fn show_editor(&self, state: EnablementState) {
        self.shown.lock().unwrap().push(state);
    }

    fn request_ui_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn disable_callbacks(&self) {
        self.callbacks_disabled.fetch_add(1, Ordering::SeqCst);
    }
}

/// Two streams of two channels, two TTL lines, 1 ms packets
pub fn small_profile() -> SimulatedProfile {
    SimulatedProfile {
        backend: BackendKind::RhythmFpga,
        sample_rate: 4000.0,
        streams: vec![2, 2],
        num_event_channels: 2,
        bit_volts: 0.195,
        frames_per_packet: 4,
        pool_size: 64,
        ttl_period: 3,
    }
}

pub fn adapter_with(
    profile: SimulatedProfile,
    config: AdapterConfig,
) -> (SourceAdapter, Arc<SimulatedDriver>, Arc<RecordingHost>) {
    let driver = Arc::new(SimulatedDriver::new(profile).unwrap());
    let host = Arc::new(RecordingHost::default());
    let adapter = SourceAdapter::with_driver(
        config,
        Some(driver.clone() as Arc<dyn AcquisitionDriver>),
        host.clone(),
    );
    (adapter, driver, host)
}

pub fn small_adapter() -> (SourceAdapter, Arc<SimulatedDriver>, Arc<RecordingHost>) {
    adapter_with(small_profile(), AdapterConfig::for_source("Rhythm FPGA"))
}

/// Publish one hand-built packet with the given event codes
pub fn feed(driver: &SimulatedDriver, timestamp: u64, codes: &[u64]) {
    let producer = driver.producer_handle();
    let mut packet = producer.acquire(timestamp).expect("packet pool exhausted");
    let frame = vec![0.0f32; driver.profile().num_channels()];
    for code in codes {
        assert!(packet.push_frame(&frame, *code));
    }
    producer.publish(packet).unwrap();
}

pub fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
