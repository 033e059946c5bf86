pub mod metrics;

pub use metrics::{AdapterMetrics, MetricsSnapshot};
