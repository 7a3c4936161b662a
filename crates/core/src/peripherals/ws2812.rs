//! WS2812 single-wire NRZ decoder.
//!
//! Bits are encoded in the width of each high pulse; colour bytes arrive
//! MSB first in G, R, B (, W) order. A low line held past the reset time
//! latches the frame.

/// WS2812B datasheet: T0H = 0.4 us, T1H = 0.8 us, both +/-150 ns.
pub const T0H_NS: u64 = 400;
pub const T1H_NS: u64 = 800;
pub const PULSE_TOLERANCE_NS: u64 = 150;
/// Reset code: low for more than 50 us.
pub const RESET_NS: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Collecting,
}

fn within(width: u64, nominal: u64) -> bool {
    width >= nominal - PULSE_TOLERANCE_NS && width <= nominal + PULSE_TOLERANCE_NS
}

#[derive(Debug)]
pub struct Ws2812Controller {
    pixel_count: usize,
    channels: usize,
    state: FrameState,
    line: bool,
    last_edge_ns: u64,
    byte: u8,
    bit_index: usize,
    byte_index: usize,
    word: u32,
    pixels: Vec<u32>,
    overflow: bool,
    published: Option<Vec<u32>>,
}

impl Ws2812Controller {
    /// `channels` is 3 for GRB strips or 4 for RGBW parts.
    pub fn new(pixel_count: usize, channels: usize) -> Self {
        Self {
            pixel_count,
            channels: channels.clamp(3, 4),
            state: FrameState::Idle,
            line: false,
            last_edge_ns: 0,
            byte: 0,
            bit_index: 0,
            byte_index: 0,
            word: 0,
            pixels: Vec::with_capacity(pixel_count),
            overflow: false,
            published: None,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    pub fn line_level(&self) -> bool {
        self.line
    }

    /// Feeds one sample of the data line. Repeated samples at the same level
    /// are fine; only edges carry timing.
    pub fn feed_value(&mut self, high: bool, now_ns: u64) {
        let elapsed = now_ns.saturating_sub(self.last_edge_ns);

        if high == self.line {
            if !high && elapsed > RESET_NS {
                self.latch();
            }
            return;
        }

        if high {
            // Rising edge closes a low period.
            if elapsed > RESET_NS {
                self.latch();
            }
        } else {
            self.decode_pulse(elapsed);
        }

        self.line = high;
        self.last_edge_ns = now_ns;
    }

    /// Returns the most recently latched frame exactly once.
    pub fn update(&mut self, now_ns: u64) -> Option<Vec<u32>> {
        if !self.line && now_ns.saturating_sub(self.last_edge_ns) > RESET_NS {
            self.latch();
        }
        self.published.take()
    }

    fn decode_pulse(&mut self, width: u64) {
        let bit = if within(width, T0H_NS) {
            0
        } else if within(width, T1H_NS) {
            1
        } else {
            tracing::trace!(
                "WS2812: {} ns pulse outside both windows, restarting byte {} of pixel {}",
                width,
                self.byte_index,
                self.pixels.len()
            );
            self.byte = 0;
            self.bit_index = 0;
            return;
        };

        self.state = FrameState::Collecting;
        if self.pixels.len() >= self.pixel_count {
            if !self.overflow {
                tracing::debug!("WS2812: frame exceeds {} pixels, truncating", self.pixel_count);
                self.overflow = true;
            }
            return;
        }

        self.byte = (self.byte << 1) | bit;
        self.bit_index += 1;
        if self.bit_index < 8 {
            return;
        }

        self.word = (self.word << 8) | self.byte as u32;
        self.byte = 0;
        self.bit_index = 0;
        self.byte_index += 1;
        if self.byte_index == self.channels {
            self.pixels.push(self.word);
            self.word = 0;
            self.byte_index = 0;
        }
    }

    /// In-progress pixel with every undecoded bit as zero.
    fn partial_pixel(&self) -> Option<u32> {
        if self.byte_index == 0 && self.bit_index == 0 {
            return None;
        }
        let mut word = self.word;
        let mut filled = self.byte_index;
        if self.bit_index > 0 {
            word = (word << 8) | ((self.byte as u32) << (8 - self.bit_index));
            filled += 1;
        }
        Some(word << (8 * (self.channels - filled)))
    }

    fn latch(&mut self) {
        if self.state != FrameState::Collecting {
            return;
        }

        let partial = self.partial_pixel();
        let mut frame = std::mem::replace(&mut self.pixels, Vec::with_capacity(self.pixel_count));
        if let Some(word) = partial {
            if frame.len() < self.pixel_count {
                frame.push(word);
            }
        }
        tracing::debug!("WS2812: latched frame of {} pixels", frame.len());
        self.published = Some(frame);

        self.state = FrameState::Idle;
        self.byte = 0;
        self.bit_index = 0;
        self.byte_index = 0;
        self.word = 0;
        self.overflow = false;
    }
}
