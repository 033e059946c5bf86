use anyhow::Result;
use std::time::Duration;

use super::buffer::BufferConsumer;
use super::types::{BackendKind, ChannelInfo, ChannelType, NamingScheme};
use crate::error::SourceError;

/// Invoked from the acquisition thread when acquisition ends on its own
pub type StopListener = Box<dyn Fn() + Send + Sync>;

/// Capability set every acquisition backend exposes to the adapter.
///
/// Implementations are shared between the control context and teardown,
/// so every method takes `&self` and the driver handles its own locking.
pub trait AcquisitionDriver: Send + Sync {
    /// Which backend family this driver implements
    fn backend(&self) -> BackendKind;

    /// Is the physical source currently reachable
    fn found_input_source(&self) -> bool;

    /// Spawn the producer thread and start filling the buffer
    fn start_acquisition(&self) -> Result<()>;

    /// Stop the producer thread and wait for it to exit
    fn stop_acquisition(&self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Ask the producer thread to stop, waiting at most `timeout`
    fn request_stop(&self, timeout: Duration) -> Result<(), SourceError>;

    /// Hand out the consumer half of the data buffer. Only the first call
    /// returns `Some`; the buffer has a single reader.
    fn take_buffer(&self) -> Option<BufferConsumer>;

    fn sample_rate(&self) -> f32;

    fn num_channels(&self) -> usize;

    fn num_event_channels(&self) -> usize;

    fn bit_volts(&self, channel: usize) -> f32;

    /// Current metadata of every continuous channel, in flat index order
    fn channels_info(&self) -> Vec<ChannelInfo>;

    /// Rename the channel identified by `(channel_type, stream, number)`.
    /// Returns its flat index, or `None` if the driver has no such channel.
    fn modify_channel_name(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        name: &str,
    ) -> Option<usize>;

    /// Same resolution as [`modify_channel_name`](Self::modify_channel_name), for gain
    fn modify_channel_gain(
        &self,
        channel_type: ChannelType,
        stream: i32,
        number: i32,
        gain: f32,
    ) -> Option<usize>;

    fn set_default_naming_scheme(&self, scheme: NamingScheme);

    fn event_channel_names(&self) -> Vec<String>;

    /// Register the callback fired when acquisition stops without a
    /// stop request (e.g. the source was unplugged)
    fn set_stop_listener(&self, listener: StopListener);
}
