//! SSD1306 128x64 monochrome OLED on I2C.
//!
//! Each transaction opens with a control byte: D/C# (bit 6) selects command
//! or GDDRAM data, Co (bit 7) set means only one byte follows before the
//! next control byte. GDDRAM is 8 pages of 128 columns; each data byte paints
//! 8 vertically stacked pixels, LSB on top.

use crate::bus::i2c::{Direction, I2cDevice};
use serde::{Deserialize, Serialize};
use std::any::Any;

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 64;
pub const PAGES: usize = HEIGHT / 8;

const CONTROL_CO: u8 = 0x80;
const CONTROL_DATA: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    Horizontal,
    Vertical,
    Page,
}

/// Where the next byte of the current transaction goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Control,
    Command { single: bool },
    Data { single: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OledSnapshot {
    /// Page-major GDDRAM: byte `page * 128 + column`, bit n is row `page * 8 + n`.
    pub framebuffer: Vec<u8>,
    pub display_on: bool,
    pub inverted: bool,
    pub contrast: u8,
}

impl OledSnapshot {
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        self.framebuffer[(y / 8) * WIDTH + x] & (1 << (y % 8)) != 0
    }
}

#[derive(Debug)]
pub struct Ssd1306Controller {
    gddram: Vec<u8>,
    mode: AddressingMode,
    col: u8,
    page: u8,
    col_start: u8,
    col_end: u8,
    page_start: u8,
    page_end: u8,
    display_on: bool,
    inverted: bool,
    contrast: u8,
    stream: Stream,
    /// Command waiting for argument bytes, with the arguments seen so far.
    pending: Option<(u8, Vec<u8>)>,
}

impl Default for Ssd1306Controller {
    fn default() -> Self {
        Self::new()
    }
}

fn argument_count(cmd: u8) -> usize {
    match cmd {
        0x20 | 0x81 | 0x8D | 0xA8 | 0xD3 | 0xD5 | 0xD9 | 0xDA | 0xDB => 1,
        0x21 | 0x22 | 0xA3 => 2,
        0x29 | 0x2A => 5,
        0x26 | 0x27 => 6,
        _ => 0,
    }
}

impl Ssd1306Controller {
    pub fn new() -> Self {
        Self {
            gddram: vec![0; WIDTH * PAGES],
            mode: AddressingMode::Page,
            col: 0,
            page: 0,
            col_start: 0,
            col_end: (WIDTH - 1) as u8,
            page_start: 0,
            page_end: (PAGES - 1) as u8,
            display_on: false,
            inverted: false,
            contrast: 0x7F,
            stream: Stream::Control,
            pending: None,
        }
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        self.mode
    }

    /// Column and page the next data byte lands on.
    pub fn pointer(&self) -> (u8, u8) {
        (self.col, self.page)
    }

    pub fn command(&mut self, byte: u8) {
        if let Some((cmd, mut args)) = self.pending.take() {
            args.push(byte);
            if args.len() < argument_count(cmd) {
                self.pending = Some((cmd, args));
            } else {
                self.apply(cmd, &args);
            }
            return;
        }

        if argument_count(byte) > 0 {
            self.pending = Some((byte, Vec::with_capacity(6)));
        } else {
            self.apply(byte, &[]);
        }
    }

    fn apply(&mut self, cmd: u8, args: &[u8]) {
        tracing::trace!("SSD1306: command {:#04x} {:02x?}", cmd, args);
        match (cmd, args) {
            (0x20, [mode]) => {
                self.mode = match mode & 0x03 {
                    0 => AddressingMode::Horizontal,
                    1 => AddressingMode::Vertical,
                    // 0b11 is reserved; the part treats it as page mode.
                    _ => AddressingMode::Page,
                };
                tracing::debug!("SSD1306: {:?} addressing", self.mode);
            }
            (0x21, [start, end]) => {
                self.col_start = start & 0x7F;
                self.col_end = end & 0x7F;
                self.col = self.col_start;
            }
            (0x22, [start, end]) => {
                self.page_start = start & 0x07;
                self.page_end = end & 0x07;
                self.page = self.page_start;
            }
            (0x81, [contrast]) => self.contrast = *contrast,
            (0x00..=0x0F, _) => self.col = (self.col & 0xF0) | cmd,
            (0x10..=0x1F, _) => self.col = ((cmd & 0x07) << 4) | (self.col & 0x0F),
            (0xB0..=0xB7, _) => self.page = cmd & 0x07,
            (0xA6, _) => self.inverted = false,
            (0xA7, _) => self.inverted = true,
            (0xAE, _) => self.display_on = false,
            (0xAF, _) => self.display_on = true,
            // Start line, remap, scan direction, scroll and timing setup do
            // not change what GDDRAM holds.
            _ => {}
        }
    }

    pub fn data(&mut self, byte: u8) {
        let index = self.page as usize * WIDTH + self.col as usize;
        if let Some(cell) = self.gddram.get_mut(index) {
            *cell = byte;
        }
        self.advance();
    }

    fn advance(&mut self) {
        match self.mode {
            AddressingMode::Horizontal => {
                if self.col >= self.col_end {
                    self.col = self.col_start;
                    self.page = if self.page >= self.page_end {
                        self.page_start
                    } else {
                        self.page + 1
                    };
                } else {
                    self.col += 1;
                }
            }
            AddressingMode::Vertical => {
                if self.page >= self.page_end {
                    self.page = self.page_start;
                    self.col = if self.col >= self.col_end {
                        self.col_start
                    } else {
                        self.col + 1
                    };
                } else {
                    self.page += 1;
                }
            }
            AddressingMode::Page => {
                // Page pointer is left alone; the column wraps within the page.
                self.col = if self.col as usize >= WIDTH - 1 { 0 } else { self.col + 1 };
            }
        }
    }

    /// Full GDDRAM and display flags. Pure read: may be called any number of times.
    pub fn update(&self) -> OledSnapshot {
        OledSnapshot {
            framebuffer: self.gddram.clone(),
            display_on: self.display_on,
            inverted: self.inverted,
            contrast: self.contrast,
        }
    }
}

impl I2cDevice for Ssd1306Controller {
    fn connect(&mut self, _addr: u8, direction: Direction) -> bool {
        self.stream = Stream::Control;
        direction == Direction::Write
    }

    fn write_byte(&mut self, value: u8) -> bool {
        match self.stream {
            Stream::Control => {
                let single = value & CONTROL_CO != 0;
                self.stream = if value & CONTROL_DATA != 0 {
                    Stream::Data { single }
                } else {
                    Stream::Command { single }
                };
            }
            Stream::Command { single } => {
                self.command(value);
                if single {
                    self.stream = Stream::Control;
                }
            }
            Stream::Data { single } => {
                self.data(value);
                if single {
                    self.stream = Stream::Control;
                }
            }
        }
        true
    }

    fn disconnect(&mut self) {
        // Pointers and half-received commands persist; only framing resets.
        self.stream = Stream::Control;
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
