use std::time::Instant;

/// Weight of the newest sample in the running average.
pub const DEFAULT_SMOOTHING: f64 = 0.2;

/// Emulation speed: simulated seconds per wall-clock second, 1.0 = real time.
/// Observational only; nothing here throttles the engine.
#[derive(Debug)]
pub struct CpuPerformance {
    frequency_hz: u64,
    smoothing: f64,
    last: Option<(u64, Instant)>,
    ratio: f64,
    samples: u64,
}

impl CpuPerformance {
    pub fn new(frequency_hz: u64) -> Self {
        Self::with_smoothing(frequency_hz, DEFAULT_SMOOTHING)
    }

    pub fn with_smoothing(frequency_hz: u64, smoothing: f64) -> Self {
        Self {
            frequency_hz,
            smoothing: smoothing.clamp(f64::EPSILON, 1.0),
            last: None,
            ratio: 0.0,
            samples: 0,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.ratio = 0.0;
        self.samples = 0;
    }

    pub fn update(&mut self, cycles: u64) -> f64 {
        self.update_at(cycles, Instant::now())
    }

    /// Same as [`update`](Self::update) with an explicit wall-clock reading.
    pub fn update_at(&mut self, cycles: u64, now: Instant) -> f64 {
        let Some((prev_cycles, prev_time)) = self.last.replace((cycles, now)) else {
            return self.ratio;
        };

        let wall = now.saturating_duration_since(prev_time).as_secs_f64();
        if wall <= 0.0 || self.frequency_hz == 0 {
            // No elapsed wall time: keep the baseline, no new sample.
            self.last = Some((prev_cycles, prev_time));
            return self.ratio;
        }

        let simulated = cycles.saturating_sub(prev_cycles) as f64 / self.frequency_hz as f64;
        let sample = simulated / wall;
        self.ratio = if self.samples == 0 {
            sample
        } else {
            self.ratio + self.smoothing * (sample - self.ratio)
        };
        self.samples += 1;
        self.ratio
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
