use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A run of multiplexed frames written by the acquisition thread
#[derive(Debug, Clone)]
pub struct Packet {
    /// Sample clock of the first frame
    pub timestamp: u64,
    /// Fence epoch current when the packet was acquired
    epoch: u64,
    num_channels: usize,
    frames: usize,
    samples: Vec<f32>,
    event_codes: Vec<u64>,
}

impl Packet {
    pub fn new(num_channels: usize, frames_per_packet: usize) -> Self {
        Self {
            timestamp: 0,
            epoch: 0,
            num_channels,
            frames: 0,
            samples: vec![0.0; num_channels * frames_per_packet],
            event_codes: vec![0; frames_per_packet],
        }
    }

    pub fn capacity(&self) -> usize {
        self.event_codes.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_full(&self) -> bool {
        self.frames == self.capacity()
    }

    fn reset(&mut self, timestamp: u64, epoch: u64) {
        self.timestamp = timestamp;
        self.epoch = epoch;
        self.frames = 0;
    }

    /// Append one frame; returns false if the packet is full or the frame
    /// has the wrong channel count.
    pub fn push_frame(&mut self, samples: &[f32], event_code: u64) -> bool {
        if self.is_full() || samples.len() != self.num_channels {
            return false;
        }
        let start = self.frames * self.num_channels;
        self.samples[start..start + self.num_channels].copy_from_slice(samples);
        self.event_codes[self.frames] = event_code;
        self.frames += 1;
        true
    }
}

/// Create the producer/consumer pair for one acquisition source.
///
/// `pool_size` packets are pre-allocated and circulate between the two
/// sides, so steady-state streaming allocates nothing.
pub fn data_buffer(
    num_channels: usize,
    frames_per_packet: usize,
    pool_size: usize,
) -> Result<(BufferProducer, BufferConsumer)> {
    let pool_size = pool_size.max(2);
    let (filled_tx, filled_rx) = bounded(pool_size);
    let (empty_tx, empty_rx) = bounded(pool_size);

    for _ in 0..pool_size {
        empty_tx
            .send(Packet::new(num_channels, frames_per_packet))
            .map_err(|e| anyhow!("Failed to seed packet pool: {}", e))?;
    }

    let dropped = Arc::new(AtomicU64::new(0));
    let epoch = Arc::new(AtomicU64::new(0));

    let producer = BufferProducer {
        filled_tx,
        empty_rx,
        epoch: epoch.clone(),
        dropped_frames: dropped.clone(),
    };
    let consumer = BufferConsumer {
        filled_rx,
        empty_tx,
        num_channels,
        pending: None,
        cursor: 0,
        next_timestamp: 0,
        epoch,
        stale_frames: 0,
        dropped_frames: dropped,
    };

    Ok((producer, consumer))
}

/// Writer half, owned by the acquisition thread
#[derive(Clone)]
pub struct BufferProducer {
    filled_tx: Sender<Packet>,
    empty_rx: Receiver<Packet>,
    epoch: Arc<AtomicU64>,
    dropped_frames: Arc<AtomicU64>,
}

impl BufferProducer {
    /// Take an empty packet stamped with `timestamp`. `None` means the
    /// consumer has fallen behind and every packet is in flight.
    pub fn acquire(&self, timestamp: u64) -> Option<Packet> {
        let epoch = self.epoch.load(Ordering::Acquire);
        self.empty_rx.try_recv().ok().map(|mut packet| {
            packet.reset(timestamp, epoch);
            packet
        })
    }

    /// Hand a filled packet to the consumer
    pub fn publish(&self, packet: Packet) -> Result<()> {
        match self.filled_tx.try_send(packet) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(packet)) => {
                self.record_dropped(packet.frames());
                Err(anyhow!("Packet queue full"))
            }
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("Buffer consumer dropped")),
        }
    }

    pub fn record_dropped(&self, frames: usize) {
        self.dropped_frames.fetch_add(frames as u64, Ordering::Relaxed);
    }
}

/// Result of one drain call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    pub count: usize,
    /// Sample clock of the first drained frame
    pub timestamp: u64,
}

/// Marks everything acquired so far as stale.
///
/// Held by the control context; advancing it is a single atomic bump, and
/// the consumer drops stale packets on its next drain. Packets acquired
/// after the bump are delivered normally.
#[derive(Debug, Clone)]
pub struct BufferFence(Arc<AtomicU64>);

impl BufferFence {
    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn epoch(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Reader half, owned by the block-processing path
pub struct BufferConsumer {
    filled_rx: Receiver<Packet>,
    empty_tx: Sender<Packet>,
    num_channels: usize,
    pending: Option<Packet>,
    cursor: usize,
    next_timestamp: u64,
    epoch: Arc<AtomicU64>,
    stale_frames: usize,
    dropped_frames: Arc<AtomicU64>,
}

impl BufferConsumer {
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn fence(&self) -> BufferFence {
        BufferFence(self.epoch.clone())
    }

    /// Frames dropped as stale since the last call
    pub fn take_stale_frames(&mut self) -> usize {
        std::mem::take(&mut self.stale_frames)
    }

    /// Frames the producer could not deliver because the pool was exhausted
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Copy up to `max_frames` frames into `samples` (interleaved) and
    /// `event_codes`, never blocking.
    ///
    /// A drain stops early at a clock discontinuity so that every drained
    /// frame sits at `timestamp + i`.
    pub fn drain(
        &mut self,
        max_frames: usize,
        samples: &mut [f32],
        event_codes: &mut [u64],
    ) -> Drained {
        let nc = self.num_channels;
        let mut limit = max_frames.min(event_codes.len());
        if nc > 0 {
            limit = limit.min(samples.len() / nc);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        if let Some(packet) = self.pending.as_ref() {
            if packet.epoch < epoch {
                self.stale_frames += packet.frames - self.cursor;
                self.recycle_pending();
            }
        }

        let mut count = 0;
        let mut start: Option<u64> = None;

        while count < limit {
            if self.pending.is_none() {
                match self.filled_rx.try_recv() {
                    Ok(packet) if packet.epoch < epoch => {
                        self.stale_frames += packet.frames;
                        let _ = self.empty_tx.try_send(packet);
                        continue;
                    }
                    Ok(packet) => {
                        self.pending = Some(packet);
                        self.cursor = 0;
                    }
                    Err(_) => break,
                }
            }

            let Some(packet) = self.pending.as_ref() else {
                break;
            };

            let position = packet.timestamp + self.cursor as u64;
            if let Some(first) = start {
                if position != first + count as u64 {
                    break;
                }
            }

            let available = packet.frames - self.cursor;
            if available > 0 {
                start.get_or_insert(position);

                let take = available.min(limit - count);
                let src = self.cursor * nc..(self.cursor + take) * nc;
                samples[count * nc..(count + take) * nc].copy_from_slice(&packet.samples[src]);
                event_codes[count..count + take]
                    .copy_from_slice(&packet.event_codes[self.cursor..self.cursor + take]);

                count += take;
                self.cursor += take;
            }

            if self.cursor >= packet.frames {
                self.recycle_pending();
            }
        }

        let timestamp = start.unwrap_or(self.next_timestamp);
        self.next_timestamp = timestamp + count as u64;

        Drained { count, timestamp }
    }

    /// Discard everything buffered so far
    pub fn clear(&mut self) -> usize {
        let mut discarded = 0;
        if let Some(packet) = self.pending.as_ref() {
            discarded += packet.frames - self.cursor;
            self.next_timestamp = packet.timestamp + packet.frames as u64;
        }
        self.recycle_pending();
        while let Ok(packet) = self.filled_rx.try_recv() {
            discarded += packet.frames;
            self.next_timestamp = packet.timestamp + packet.frames as u64;
            let _ = self.empty_tx.try_send(packet);
        }
        discarded
    }

    fn recycle_pending(&mut self) {
        if let Some(packet) = self.pending.take() {
            let _ = self.empty_tx.try_send(packet);
        }
        self.cursor = 0;
    }
}
