use std::f64::consts::PI;

/// Deterministic synthetic signal used by the simulated backends.
///
/// Every value is a pure function of the sample clock, so a packet can be
/// regenerated exactly in tests.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    sample_rate: f64,
    amplitude: f64,
    base_frequency: f64,
    num_event_lines: usize,
    ttl_period: u64,
}

impl SignalGenerator {
    pub fn new(sample_rate: f32, num_event_lines: usize, ttl_period: u64) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            amplitude: 100.0,
            base_frequency: 10.0,
            num_event_lines: num_event_lines.min(64),
            ttl_period: ttl_period.max(1),
        }
    }

    /// Channel `c` carries a sine at `(c + 1) * base_frequency`
    pub fn fill_frame(&self, clock: u64, frame: &mut [f32]) {
        let t = clock as f64 / self.sample_rate;
        for (c, sample) in frame.iter_mut().enumerate() {
            let freq = self.base_frequency * (c + 1) as f64;
            *sample = (self.amplitude * (2.0 * PI * freq * t).sin()) as f32;
        }
    }

    /// Line `c` is a square wave toggling every `ttl_period << c` samples
    pub fn event_code(&self, clock: u64) -> u64 {
        (0..self.num_event_lines).fold(0u64, |code, line| {
            let half_period = self.ttl_period.saturating_mul(1u64 << line.min(32));
            let high = (clock / half_period) % 2 == 1;
            code | ((high as u64) << line)
        })
    }
}
