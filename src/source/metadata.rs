use std::sync::Arc;
use tracing::{debug, info, warn};

use super::channel_registry::{ChannelRegistry, ChannelSnapshot};
use super::persistence::{ChannelInfoGroup, ConfigurationRecord};
use crate::core::HostGraph;
use crate::hal::{AcquisitionDriver, ChannelInfo, ChannelType, NamingScheme};

/// Channel metadata in parallel-sequence form, one entry per channel in
/// flat index order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelsInfo {
    pub names: Vec<String>,
    pub types: Vec<ChannelType>,
    pub streams: Vec<i32>,
    pub original_numbers: Vec<i32>,
    pub gains: Vec<f32>,
}

impl ChannelsInfo {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = ConfigurationRecord> + '_ {
        (0..self.len()).map(move |k| ConfigurationRecord {
            name: self.names[k].clone(),
            stream: self.streams[k],
            number: self.original_numbers[k],
            channel_type: self.types[k].code(),
            gain: self.gains[k],
        })
    }
}

impl FromIterator<ChannelInfo> for ChannelsInfo {
    fn from_iter<I: IntoIterator<Item = ChannelInfo>>(iter: I) -> Self {
        let mut info = ChannelsInfo::default();
        for channel in iter {
            info.names.push(channel.name);
            info.types.push(channel.channel_type);
            info.streams.push(channel.stream);
            info.original_numbers.push(channel.number);
            info.gains.push(channel.gain);
        }
        info
    }
}

/// Keeps the local channel cache in step with the driver.
///
/// Every mutation asks the driver to resolve the channel first; the cache
/// is only touched when the driver's index is valid for it. The number of
/// event channels is fixed by the registry handed to [`new`](Self::new),
/// since the edge encoder's line state was sized from it.
pub struct MetadataSync {
    driver: Option<Arc<dyn AcquisitionDriver>>,
    registry: Arc<ChannelRegistry>,
    host: Arc<dyn HostGraph>,
    event_lines: usize,
}

impl MetadataSync {
    pub fn new(
        driver: Option<Arc<dyn AcquisitionDriver>>,
        registry: Arc<ChannelRegistry>,
        host: Arc<dyn HostGraph>,
    ) -> Self {
        let event_lines = registry.num_event_channels();
        Self {
            driver,
            registry,
            host,
            event_lines,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Rebuild the cache from the driver's current layout
    pub fn update_settings(&self) {
        match self.driver.as_ref() {
            Some(driver) => {
                let mut snapshot = ChannelSnapshot::from_driver(driver.as_ref());
                if snapshot.events.len() != self.event_lines {
                    warn!(
                        "Driver now reports {} event channels, keeping {}",
                        snapshot.events.len(),
                        self.event_lines
                    );
                    snapshot.events = self.registry.snapshot().events.clone();
                }
                debug!(
                    "Channel layout: {} continuous, {} event",
                    snapshot.continuous.len(),
                    snapshot.events.len()
                );
                self.registry.replace(snapshot);
            }
            None => self.registry.replace(ChannelSnapshot {
                events: self.registry.snapshot().events.clone(),
                ..ChannelSnapshot::default()
            }),
        }
    }

    /// Returns the driver-resolved index, or `None` if the driver does not
    /// know the channel or the index is outside the cache.
    pub fn modify_channel_name(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        name: &str,
        propagate: bool,
    ) -> Option<usize> {
        let driver = self.driver.as_ref()?;
        let index = driver.modify_channel_name(channel_type, stream, number, name)?;

        match self.registry.rename(index, name) {
            Ok(true) => {
                if propagate {
                    self.host.request_ui_refresh();
                }
                Some(index)
            }
            Ok(false) => Some(index),
            Err(e) => {
                debug!("Ignoring rename of ({}, {}): {}", stream, number, e);
                None
            }
        }
    }

    /// Same resolution as [`modify_channel_name`](Self::modify_channel_name).
    /// The cache is updated, and the host optionally told, only when the
    /// gain differs beyond rounding noise.
    pub fn modify_channel_gain(
        &self,
        stream: i32,
        number: i32,
        channel_type: ChannelType,
        gain: f32,
        propagate: bool,
    ) -> Option<usize> {
        let driver = self.driver.as_ref()?;
        let index = driver.modify_channel_gain(channel_type, stream, number, gain)?;

        match self.registry.set_gain(index, gain) {
            Ok(true) => {
                if propagate {
                    self.host.request_ui_refresh();
                }
                Some(index)
            }
            Ok(false) => Some(index),
            Err(e) => {
                debug!("Ignoring gain change of ({}, {}): {}", stream, number, e);
                None
            }
        }
    }

    pub fn channels_info(&self) -> ChannelsInfo {
        self.driver
            .as_ref()
            .map(|driver| driver.channels_info().into_iter().collect())
            .unwrap_or_default()
    }

    /// Rename every channel through the driver, then mirror the result into
    /// the cache with a single host refresh for the whole batch.
    /// Returns how many cached names changed.
    pub fn set_default_naming_scheme(&self, scheme: NamingScheme) -> usize {
        let Some(driver) = self.driver.as_ref() else {
            return 0;
        };
        driver.set_default_naming_scheme(scheme);

        let info = self.channels_info();
        let before = self.registry.snapshot();
        for k in 0..info.len() {
            self.modify_channel_name(
                info.types[k],
                info.streams[k],
                info.original_numbers[k],
                &info.names[k],
                false,
            );
        }

        let after = self.registry.snapshot();
        let changed = before
            .continuous
            .iter()
            .zip(after.continuous.iter())
            .filter(|(old, new)| old.name != new.name)
            .count();

        if changed > 0 {
            info!("Naming scheme {:?} renamed {} channels", scheme, changed);
            self.host.request_ui_refresh();
        }
        changed
    }

    pub fn event_channel_names(&self) -> Vec<String> {
        self.driver
            .as_ref()
            .map(|driver| driver.event_channel_names())
            .unwrap_or_default()
    }

    pub fn save(&self) -> ChannelInfoGroup {
        ChannelInfoGroup {
            channels: self.channels_info().records().collect(),
        }
    }

    /// Replay saved names and gains without notifying the host per channel
    pub fn load(&self, group: &ChannelInfoGroup) {
        for record in &group.channels {
            let Some(channel_type) = record.channel_type() else {
                warn!(
                    "Skipping saved channel '{}' with unknown type code {}",
                    record.name, record.channel_type
                );
                continue;
            };
            self.modify_channel_name(
                channel_type,
                record.stream,
                record.number,
                &record.name,
                false,
            );
            self.modify_channel_gain(
                record.stream,
                record.number,
                channel_type,
                record.gain,
                false,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DetachedHost;
    use crate::hal::mock::{SimulatedDriver, SimulatedProfile};
    use crate::hal::BackendKind;

    fn driver(event_lines: usize) -> Arc<dyn AcquisitionDriver> {
        let profile = SimulatedProfile {
            num_event_channels: event_lines,
            ..SimulatedProfile::for_backend(BackendKind::CustomFpga)
        };
        Arc::new(SimulatedDriver::new(profile).unwrap())
    }

    #[test]
    fn test_update_settings_keeps_event_line_count() {
        // Cache built for three lines; the driver now reports two
        let snapshot = ChannelSnapshot::from_driver(driver(3).as_ref());
        let registry = Arc::new(ChannelRegistry::from_snapshot(snapshot));
        let sync = MetadataSync::new(Some(driver(2)), registry.clone(), Arc::new(DetachedHost));

        sync.update_settings();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.events.len(), 3);
        assert_eq!(snapshot.events[2].name, "TTL3");
        assert_eq!(snapshot.continuous.len(), 16);
    }

    #[test]
    fn test_update_settings_follows_matching_driver() {
        let registry = Arc::new(ChannelRegistry::new());
        let sync = MetadataSync::new(Some(driver(0)), registry.clone(), Arc::new(DetachedHost));

        sync.update_settings();

        assert_eq!(registry.num_event_channels(), 0);
        assert_eq!(registry.len(), 16);
    }
}
