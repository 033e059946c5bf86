pub mod block;
pub mod event;
pub mod host;

pub use block::SampleBlock;
pub use event::{EventKind, OutputEvent};
pub use host::{DetachedHost, HostGraph};
