mod common;

use acqsource::hal::mock::SimulatedDriver;
use acqsource::hal::{
    AcquisitionDriver, BackendKind, BufferConsumer, ChannelInfo, ChannelType, NamingScheme,
    StopListener,
};
use acqsource::source::{SourceAdapter, SourceSettings};
use acqsource::error::SourceError;
use acqsource::AdapterConfig;
use anyhow::Result;
use common::{small_adapter, small_profile, RecordingHost};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Driver that resolves channels to indices past the end of its layout
struct MisindexingDriver(SimulatedDriver);

impl AcquisitionDriver for MisindexingDriver {
    fn backend(&self) -> BackendKind {
        self.0.backend()
    }

    fn found_input_source(&self) -> bool {
        self.0.found_input_source()
    }

    fn start_acquisition(&self) -> Result<()> {
        self.0.start_acquisition()
    }

    fn stop_acquisition(&self) -> Result<()> {
        self.0.stop_acquisition()
    }

    fn is_running(&self) -> bool {
        self.0.is_running()
    }

    fn request_stop(&self, timeout: Duration) -> Result<(), SourceError> {
        self.0.request_stop(timeout)
    }

    fn take_buffer(&self) -> Option<BufferConsumer> {
        self.0.take_buffer()
    }

    fn sample_rate(&self) -> f32 {
        self.0.sample_rate()
    }

    fn num_channels(&self) -> usize {
        self.0.num_channels()
    }

    fn num_event_channels(&self) -> usize {
        self.0.num_event_channels()
    }

    fn bit_volts(&self, channel: usize) -> f32 {
        self.0.bit_volts(channel)
    }

    fn channels_info(&self) -> Vec<ChannelInfo> {
        self.0.channels_info()
    }

    fn modify_channel_name(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        name: &str,
    ) -> Option<usize> {
        self.0
            .modify_channel_name(channel_type, stream, number, name)
            .map(|index| index + 100)
    }

    fn modify_channel_gain(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        gain: f32,
    ) -> Option<usize> {
        self.0
            .modify_channel_gain(channel_type, stream, number, gain)
            .map(|index| index + 100)
    }

    fn set_default_naming_scheme(&self, scheme: NamingScheme) {
        self.0.set_default_naming_scheme(scheme)
    }

    fn event_channel_names(&self) -> Vec<String> {
        self.0.event_channel_names()
    }

    fn set_stop_listener(&self, listener: StopListener) {
        self.0.set_stop_listener(listener)
    }
}

#[test]
fn test_rename_is_idempotent() {
    let (adapter, _driver, host) = small_adapter();
    let control = adapter.control();

    let first = control.modify_channel_name(ChannelType::Continuous, 1, 0, "ref", true);
    let second = control.modify_channel_name(ChannelType::Continuous, 1, 0, "ref", true);

    assert_eq!(first, Some(2));
    assert_eq!(second, Some(2));
    assert_eq!(control.channels().continuous[2].name, "ref");
    assert_eq!(host.refreshes(), 1);
}

#[test]
fn test_rename_without_propagation_is_quiet() {
    let (adapter, _driver, host) = small_adapter();
    let control = adapter.control();

    assert_eq!(
        control.modify_channel_name(ChannelType::Continuous, 0, 1, "emg", false),
        Some(1)
    );
    assert_eq!(control.channels().continuous[1].name, "emg");
    assert_eq!(control.channels_info().names[1], "emg");
    assert_eq!(host.refreshes(), 0);
}

#[test]
fn test_gain_updates_only_on_real_change() {
    let (adapter, _driver, host) = small_adapter();
    let control = adapter.control();

    assert_eq!(
        control.modify_channel_gain(0, 0, ChannelType::Continuous, 2.5, true),
        Some(0)
    );
    // Same value again, and one within rounding noise
    control.modify_channel_gain(0, 0, ChannelType::Continuous, 2.5, true);
    control.modify_channel_gain(0, 0, ChannelType::Continuous, 2.5 + f32::EPSILON, true);

    assert_eq!(control.channels().continuous[0].gain, 2.5);
    assert_eq!(host.refreshes(), 1);
}

#[test]
fn test_unknown_channel_is_rejected() {
    let (adapter, _driver, host) = small_adapter();
    let control = adapter.control();
    let before = control.channels();

    assert_eq!(
        control.modify_channel_name(ChannelType::Continuous, 7, 0, "x", true),
        None
    );
    assert_eq!(
        control.modify_channel_gain(0, 0, ChannelType::Event, 3.0, true),
        None
    );

    assert_eq!(*control.channels(), *before);
    assert_eq!(host.refreshes(), 0);
}

#[test]
fn test_out_of_range_driver_index_leaves_cache_alone() {
    let driver = Arc::new(MisindexingDriver(SimulatedDriver::new(small_profile()).unwrap()));
    let host = Arc::new(RecordingHost::default());
    let adapter = SourceAdapter::with_driver(
        AdapterConfig::for_source("Rhythm FPGA"),
        Some(driver as Arc<dyn AcquisitionDriver>),
        host.clone(),
    );
    let control = adapter.control();
    let before = control.channels();

    assert_eq!(
        control.modify_channel_name(ChannelType::Continuous, 0, 0, "x", true),
        None
    );
    assert_eq!(
        control.modify_channel_gain(0, 0, ChannelType::Continuous, 9.0, true),
        None
    );

    assert_eq!(*control.channels(), *before);
    assert_eq!(host.refreshes(), 0);
}

#[test]
fn test_naming_scheme_refreshes_once() {
    let (adapter, _driver, host) = small_adapter();
    let control = adapter.control();

    assert_eq!(control.set_default_naming_scheme(NamingScheme::StreamPrefixed), 4);
    assert_eq!(host.refreshes(), 1);

    let names: Vec<String> = control
        .channels()
        .continuous
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(names, vec!["A-CH1", "A-CH2", "B-CH1", "B-CH2"]);

    // Reapplying the same scheme changes nothing
    assert_eq!(control.set_default_naming_scheme(NamingScheme::StreamPrefixed), 0);
    assert_eq!(host.refreshes(), 1);

    assert_eq!(control.set_default_naming_scheme(NamingScheme::Numeric), 4);
    assert_eq!(control.channels().continuous[3].name, "2");
    assert_eq!(host.refreshes(), 2);
}

#[test]
fn test_channels_info_is_parallel() {
    let (adapter, _driver, _host) = small_adapter();
    let info = adapter.control().channels_info();

    assert_eq!(info.len(), 4);
    assert_eq!(info.streams, vec![0, 0, 1, 1]);
    assert_eq!(info.original_numbers, vec![0, 1, 0, 1]);
    assert!(info.types.iter().all(|t| *t == ChannelType::Continuous));
    assert_eq!(info.gains.len(), info.names.len());
}

#[test]
fn test_event_channel_names_follow_driver() {
    let (adapter, _driver, _host) = small_adapter();
    let control = adapter.control();

    assert_eq!(control.event_channel_names(), vec!["TTL1", "TTL2"]);
    let events = &control.channels().events;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].name, "TTL2");
    assert_eq!(events[1].channel_type, ChannelType::Event);
}

#[test]
fn test_settings_roundtrip_into_fresh_adapter() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("source.json");

    let (adapter, _driver, _host) = small_adapter();
    let control = adapter.control();
    control.modify_channel_name(ChannelType::Continuous, 0, 1, "emg", true);
    control.modify_channel_gain(1, 1, ChannelType::Continuous, 4.0, true);
    control.save_settings().save_to_file(&path)?;

    let (fresh, _fresh_driver, fresh_host) = small_adapter();
    let fresh_control = fresh.control();
    fresh_control.load_settings(&SourceSettings::load_from_file(&path)?);

    assert_eq!(*fresh_control.channels(), *control.channels());
    assert_eq!(fresh_control.channels_info(), control.channels_info());
    // Loading replays without per-channel refreshes
    assert_eq!(fresh_host.refreshes(), 0);
    Ok(())
}

#[test]
fn test_settings_with_unknown_type_are_skipped() -> Result<()> {
    let (adapter, _driver, _host) = small_adapter();
    let control = adapter.control();

    let settings = SourceSettings::from_json(
        r#"{"CHANNEL_INFO": {"CHANNEL": [
            {"name": "bad", "stream": 0, "number": 0, "type": 5, "gain": 2.0},
            {"name": "good", "stream": 0, "number": 1, "type": 0, "gain": 3.0}
        ]}}"#,
    )?;
    control.load_settings(&settings);

    let channels = control.channels();
    assert_eq!(channels.continuous[0].name, "CH1");
    assert_eq!(channels.continuous[1].name, "good");
    assert_eq!(channels.continuous[1].gain, 3.0);
    Ok(())
}

#[test]
fn test_update_settings_resyncs_from_driver() {
    let (adapter, driver, host) = small_adapter();
    let control = adapter.control();

    // Driver renamed behind the adapter's back
    driver.set_default_naming_scheme(NamingScheme::Numeric);
    assert_eq!(control.channels().continuous[0].name, "CH1");

    control.update_settings();
    assert_eq!(control.channels().continuous[0].name, "1");
    assert_eq!(host.refreshes(), 0);
}
