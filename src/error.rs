use std::time::Duration;

/// Failures the adapter reports to its caller.
///
/// Presence loss never surfaces as an error on its own; it only drives the
/// enablement state machine. `SourceNotFound` exists for callers that ask
/// for an operation which requires a present source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("no acquisition backend matches source name '{name}'")]
    NoDriverResolved { name: String },

    #[error("input source not found")]
    SourceNotFound,

    #[error("channel index {index} out of range (0..{len})")]
    ChannelIndexOutOfRange { index: usize, len: usize },

    #[error("block of {requested} samples exceeds event-code capacity {capacity}")]
    BufferOverflow { requested: usize, capacity: usize },

    #[error("acquisition thread did not stop within {timeout:?}")]
    DriverStopTimeout { timeout: Duration },
}
