//! Simulated time. The only time source is the engine's cycle counter.

const NANOS_PER_SEC: u128 = 1_000_000_000;
const MILLIS_PER_SEC: u128 = 1_000;

fn scale(cycles: u64, frequency_hz: u64, unit: u128) -> u64 {
    if frequency_hz == 0 {
        return 0;
    }
    let freq = frequency_hz as u128;
    // Round half up; u128 keeps the product exact for any u64 cycle count.
    let value = (cycles as u128 * unit + freq / 2) / freq;
    value.min(u64::MAX as u128) as u64
}

pub fn cycles_to_nanos(cycles: u64, frequency_hz: u64) -> u64 {
    scale(cycles, frequency_hz, NANOS_PER_SEC)
}

pub fn cycles_to_millis(cycles: u64, frequency_hz: u64) -> u64 {
    scale(cycles, frequency_hz, MILLIS_PER_SEC)
}

/// Cycle counter to wall-time conversion bound to one core frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleClock {
    frequency_hz: u64,
}

impl CycleClock {
    pub fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    pub fn frequency(&self) -> u64 {
        self.frequency_hz
    }

    pub fn nanos(&self, cycles: u64) -> u64 {
        cycles_to_nanos(cycles, self.frequency_hz)
    }

    pub fn millis(&self, cycles: u64) -> u64 {
        cycles_to_millis(cycles, self.frequency_hz)
    }
}
