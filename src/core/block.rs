/// Multiplexed sample storage for one processing call.
///
/// Storage is allocated once for the largest block the adapter accepts and
/// reused every tick; only the first `len` frames are meaningful.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    num_channels: usize,
    capacity: usize,
    data: Vec<f32>,
    len: usize,
}

impl SampleBlock {
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            num_channels,
            capacity,
            data: vec![0.0; num_channels * capacity],
            len: 0,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Maximum number of frames the block can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid frames
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero the valid region and mark the block empty
    pub fn clear(&mut self) {
        let used = self.len * self.num_channels;
        self.data[..used].fill(0.0);
        self.len = 0;
    }

    /// Whole backing storage, for a drain to write into
    pub(crate) fn storage_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub(crate) fn set_len(&mut self, frames: usize) {
        self.len = frames.min(self.capacity);
    }

    /// Interleaved samples of the valid frames
    pub fn interleaved(&self) -> &[f32] {
        &self.data[..self.len * self.num_channels]
    }

    pub fn sample(&self, frame: usize, channel: usize) -> Option<f32> {
        if frame >= self.len || channel >= self.num_channels {
            return None;
        }
        Some(self.data[frame * self.num_channels + channel])
    }

    /// Samples of a single channel across the valid frames
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        let stride = self.num_channels.max(1);
        let valid = if channel < self.num_channels { self.len } else { 0 };
        self.data
            .iter()
            .skip(channel)
            .step_by(stride)
            .take(valid)
            .copied()
    }
}
