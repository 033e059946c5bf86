use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::edge_encoder::MAX_EVENT_LINES;
use crate::error::SourceError;
use crate::hal::{AcquisitionDriver, ChannelInfo, ChannelType};

/// Cached metadata for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub channel_type: ChannelType,
    pub stream_id: i32,
    pub original_channel_number: i32,
    pub gain: f32,
}

impl From<ChannelInfo> for ChannelDescriptor {
    fn from(info: ChannelInfo) -> Self {
        Self {
            name: info.name,
            channel_type: info.channel_type,
            stream_id: info.stream,
            original_channel_number: info.number,
            gain: info.gain,
        }
    }
}

impl From<&ChannelDescriptor> for ChannelInfo {
    fn from(desc: &ChannelDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            channel_type: desc.channel_type,
            stream: desc.stream_id,
            number: desc.original_channel_number,
            gain: desc.gain,
        }
    }
}

/// Immutable view of every cached channel at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSnapshot {
    pub continuous: Vec<ChannelDescriptor>,
    pub events: Vec<ChannelDescriptor>,
}

impl ChannelSnapshot {
    /// Mirror the driver's current channel layout, with one event channel
    /// per digital line
    pub fn from_driver(driver: &dyn AcquisitionDriver) -> Self {
        let continuous = driver
            .channels_info()
            .into_iter()
            .map(ChannelDescriptor::from)
            .collect();

        let mut names = driver.event_channel_names().into_iter();
        let events = (0..driver.num_event_channels().min(MAX_EVENT_LINES))
            .map(|line| ChannelDescriptor {
                name: names.next().unwrap_or_else(|| format!("TTL{}", line + 1)),
                channel_type: ChannelType::Event,
                stream_id: 0,
                original_channel_number: line as i32,
                gain: 1.0,
            })
            .collect();

        Self { continuous, events }
    }
}

/// Two gains count as the same value when they differ by no more than a
/// few ulps relative to their magnitude.
pub fn gain_changed(old: f32, new: f32) -> bool {
    let scale = old.abs().max(new.abs()).max(1.0);
    (old - new).abs() > 4.0 * f32::EPSILON * scale
}

/// Channel metadata shared between the control context and block processing.
///
/// Writers copy the current snapshot, modify the copy and swap it in, so
/// readers holding an `Arc<ChannelSnapshot>` never observe a half-applied
/// update. Reads never take a lock.
#[derive(Debug)]
pub struct ChannelRegistry {
    current: ArcSwap<ChannelSnapshot>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::from_snapshot(ChannelSnapshot::default())
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ChannelSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn snapshot(&self) -> Arc<ChannelSnapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().continuous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_event_channels(&self) -> usize {
        self.current.load().events.len()
    }

    pub fn replace(&self, snapshot: ChannelSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// Set the name of continuous channel `index`. Returns whether the
    /// cached name actually changed.
    pub fn rename(&self, index: usize, name: &str) -> Result<bool, SourceError> {
        self.update(index, |channel| {
            if channel.name == name {
                return false;
            }
            channel.name = name.to_string();
            true
        })
    }

    /// Set the gain of continuous channel `index`. Returns whether the
    /// cached gain actually changed (see [`gain_changed`]).
    pub fn set_gain(&self, index: usize, gain: f32) -> Result<bool, SourceError> {
        self.update(index, |channel| {
            if !gain_changed(channel.gain, gain) {
                return false;
            }
            channel.gain = gain;
            true
        })
    }

    fn update<F>(&self, index: usize, mut apply: F) -> Result<bool, SourceError>
    where
        F: FnMut(&mut ChannelDescriptor) -> bool,
    {
        let mut outcome = Ok(false);

        // `rcu` may rerun the closure if another writer swapped in between
        self.current.rcu(|current| {
            let len = current.continuous.len();
            if index >= len {
                outcome = Err(SourceError::ChannelIndexOutOfRange { index, len });
                return Arc::clone(current);
            }

            let mut probe = current.continuous[index].clone();
            if !apply(&mut probe) {
                outcome = Ok(false);
                return Arc::clone(current);
            }

            let mut next = ChannelSnapshot::clone(current);
            next.continuous[index] = probe;
            outcome = Ok(true);
            Arc::new(next)
        });

        outcome
    }
}
