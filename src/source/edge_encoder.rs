use crate::core::OutputEvent;
use crate::error::SourceError;

/// Widest digital word the encoder can track
pub const MAX_EVENT_LINES: usize = 64;

/// Turns per-sample event-code words into edge-triggered events.
///
/// Holds the last known state of every digital line; this is the only
/// place that state changes.
#[derive(Debug, Clone)]
pub struct EdgeEventEncoder {
    source_id: u32,
    capacity: usize,
    line_state: Vec<bool>,
}

impl EdgeEventEncoder {
    /// `num_lines` above [`MAX_EVENT_LINES`] are clamped; the caller is
    /// expected to size the event-channel registry from [`num_lines`](Self::num_lines).
    pub fn new(source_id: u32, num_lines: usize, capacity: usize) -> Self {
        Self {
            source_id,
            capacity,
            line_state: vec![false; num_lines.min(MAX_EVENT_LINES)],
        }
    }

    pub fn num_lines(&self) -> usize {
        self.line_state.len()
    }

    /// Largest block (in samples) `encode` accepts
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn line_state(&self) -> &[bool] {
        &self.line_state
    }

    /// Append the block's timestamp event followed by one event per line
    /// transition, ordered by `(sample_offset, channel)`.
    ///
    /// Returns the number of edges emitted. A block larger than the
    /// capacity is rejected untouched: no events, no state change.
    pub fn encode(
        &mut self,
        timestamp: u64,
        event_codes: &[u64],
        events: &mut Vec<OutputEvent>,
    ) -> Result<usize, SourceError> {
        if event_codes.len() > self.capacity {
            return Err(SourceError::BufferOverflow {
                requested: event_codes.len(),
                capacity: self.capacity,
            });
        }

        events.push(OutputEvent::timestamp(self.source_id, timestamp));

        let mut edges = 0;
        for (offset, &code) in event_codes.iter().enumerate() {
            for (line, state) in self.line_state.iter_mut().enumerate() {
                let bit = (code >> line) & 1 == 1;
                if bit != *state {
                    events.push(OutputEvent::edge(offset, line, bit));
                    *state = bit;
                    edges += 1;
                }
            }
        }

        Ok(edges)
    }
}
