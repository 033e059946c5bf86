use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from the block-processing path
#[derive(Debug, Default)]
pub struct AdapterMetrics {
    blocks_processed: AtomicU64,
    samples_drained: AtomicU64,
    edges_emitted: AtomicU64,
    overflowed_requests: AtomicU64,
    stale_samples_flushed: AtomicU64,
}

/// Point-in-time copy of [`AdapterMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub blocks_processed: u64,
    pub samples_drained: u64,
    pub edges_emitted: u64,
    pub overflowed_requests: u64,
    pub stale_samples_flushed: u64,
}

impl AdapterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_block(&self, samples: usize, edges: usize) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.samples_drained.fetch_add(samples as u64, Ordering::Relaxed);
        self.edges_emitted.fetch_add(edges as u64, Ordering::Relaxed);
    }

    pub fn record_overflow(&self) {
        self.overflowed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, samples: usize) {
        self.stale_samples_flushed
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            samples_drained: self.samples_drained.load(Ordering::Relaxed),
            edges_emitted: self.edges_emitted.load(Ordering::Relaxed),
            overflowed_requests: self.overflowed_requests.load(Ordering::Relaxed),
            stale_samples_flushed: self.stale_samples_flushed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = AdapterMetrics::new();
        metrics.record_block(128, 3);
        metrics.record_block(64, 0);
        metrics.record_overflow();
        metrics.record_flush(10);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks_processed, 2);
        assert_eq!(snapshot.samples_drained, 192);
        assert_eq!(snapshot.edges_emitted, 3);
        assert_eq!(snapshot.overflowed_requests, 1);
        assert_eq!(snapshot.stale_samples_flushed, 10);
    }
}
