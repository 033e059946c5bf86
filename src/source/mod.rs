pub mod adapter;
pub mod channel_registry;
pub mod edge_encoder;
pub mod enablement;
pub mod metadata;
pub mod persistence;

pub use adapter::{
    BlockOutput, SourceAdapter, SourceControl, DEFAULT_BIT_VOLTS, DEFAULT_SAMPLE_RATE,
};
pub use channel_registry::{gain_changed, ChannelDescriptor, ChannelRegistry, ChannelSnapshot};
pub use edge_encoder::{EdgeEventEncoder, MAX_EVENT_LINES};
pub use enablement::{EnablementController, EnablementState};
pub use metadata::{ChannelsInfo, MetadataSync};
pub use persistence::{ChannelInfoGroup, ConfigurationRecord, SourceSettings};
