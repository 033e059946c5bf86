pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod hal;
pub mod observability;
pub mod source;

pub use config::AdapterConfig;
pub use error::SourceError;
pub use source::{SourceAdapter, SourceControl};
