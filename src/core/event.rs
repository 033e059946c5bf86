use serde::{Deserialize, Serialize};

/// Kind of record emitted into a block's event sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Block-start timestamp, always at offset 0
    Timestamp,
    /// A digital line changed state
    DigitalEdge,
}

/// One event produced by block processing and handed to downstream stages.
///
/// Edge events carry `id = 1` when the line turned on and `id = 0` when it
/// turned off. Timestamp events carry the block-start sample clock as an
/// 8-byte payload in host byte order; sample `i` of the block lies at
/// `timestamp + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub kind: EventKind,
    pub sample_offset: usize,
    pub id: u32,
    pub channel: usize,
    pub payload: Option<[u8; 8]>,
}

impl OutputEvent {
    pub fn timestamp(source_id: u32, timestamp: u64) -> Self {
        Self {
            kind: EventKind::Timestamp,
            sample_offset: 0,
            id: source_id,
            channel: 0,
            payload: Some(timestamp.to_ne_bytes()),
        }
    }

    pub fn edge(sample_offset: usize, channel: usize, on: bool) -> Self {
        Self {
            kind: EventKind::DigitalEdge,
            sample_offset,
            id: on as u32,
            channel,
            payload: None,
        }
    }

    /// Decode the timestamp payload, if this is a timestamp event
    pub fn timestamp_value(&self) -> Option<u64> {
        match (self.kind, self.payload) {
            (EventKind::Timestamp, Some(bytes)) => Some(u64::from_ne_bytes(bytes)),
            _ => None,
        }
    }

    pub fn is_rising(&self) -> bool {
        self.kind == EventKind::DigitalEdge && self.id == 1
    }
}
