pub mod buffer;
pub mod lifecycle;
pub mod mock;
pub mod registry;
pub mod traits;
pub mod types;

pub use buffer::{data_buffer, BufferConsumer, BufferFence, BufferProducer, Drained, Packet};
pub use lifecycle::{AcquisitionThread, StopSignal};
pub use registry::DriverRegistry;
pub use traits::{AcquisitionDriver, StopListener};
pub use types::{BackendKind, ChannelInfo, ChannelType, NamingScheme};
