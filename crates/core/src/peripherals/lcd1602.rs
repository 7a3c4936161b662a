//! HD44780 16x2 character LCD behind a PCF8574 I2C backpack.
//!
//! The backpack maps its 8 output bits to RS, RW, EN, backlight and the four
//! upper data lines, so every instruction arrives as two nibbles, each
//! written once with EN high and once with EN low.

use crate::bus::i2c::{Direction, I2cDevice};
use serde::{Deserialize, Serialize};
use std::any::Any;

pub const COLS: usize = 16;
pub const ROWS: usize = 2;
/// Each display line holds 40 characters in DDRAM.
const LINE_LEN: u8 = 40;
const LINE2_BASE: u8 = 0x40;

bitflags::bitflags! {
    /// PCF8574 output bits on the common LCD backpack.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Backpack: u8 {
        const RS = 0x01;
        const RW = 0x02;
        const EN = 0x04;
        const BACKLIGHT = 0x08;
    }
}

const CMD_CLEAR: u8 = 0x01;
const CMD_HOME: u8 = 0x02;
const CMD_ENTRY_MODE: u8 = 0x04;
const CMD_DISPLAY_CONTROL: u8 = 0x08;
const CMD_SHIFT: u8 = 0x10;
const CMD_FUNCTION_SET: u8 = 0x20;
const CMD_SET_CGRAM: u8 = 0x40;
const CMD_SET_DDRAM: u8 = 0x80;

const ENTRY_INCREMENT: u8 = 0x02;
const ENTRY_SHIFT: u8 = 0x01;
const DISPLAY_ON: u8 = 0x04;
const DISPLAY_CURSOR: u8 = 0x02;
const DISPLAY_BLINK: u8 = 0x01;
const SHIFT_DISPLAY: u8 = 0x08;
const SHIFT_RIGHT: u8 = 0x04;
const FUNCTION_8BIT: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nibble {
    AwaitHigh,
    AwaitLow { high: u8, rs: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RamTarget {
    Ddram,
    Cgram,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LcdSnapshot {
    /// Row 0 then row 1, 16 character codes each.
    pub characters: Vec<u8>,
    pub cursor: bool,
    pub blink: bool,
    pub cursor_x: u8,
    pub cursor_y: u8,
    pub backlight: bool,
    pub display_on: bool,
    /// Present only when CGRAM changed since the previous pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgram: Option<Vec<u8>>,
}

impl LcdSnapshot {
    /// Printable text of one row; custom glyph codes render as '?'.
    pub fn line(&self, row: usize) -> String {
        self.characters
            .iter()
            .skip(row * COLS)
            .take(COLS)
            .map(|&c| if (0x20..0x7F).contains(&c) { c as char } else { '?' })
            .collect()
    }
}

#[derive(Debug)]
pub struct Lcd1602Controller {
    ddram: [u8; 128],
    cgram: [u8; 64],
    /// DDRAM address counter; the cursor follows it.
    ddram_addr: u8,
    cgram_addr: u8,
    shift: u8,
    target: RamTarget,
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
    backlight: bool,
    increment: bool,
    shift_on_write: bool,
    eight_bit: bool,
    nibble: Nibble,
    strobe: Option<u8>,
    cgram_dirty: bool,
}

impl Default for Lcd1602Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Lcd1602Controller {
    pub fn new() -> Self {
        Self {
            ddram: [b' '; 128],
            cgram: [0; 64],
            ddram_addr: 0,
            cgram_addr: 0,
            shift: 0,
            target: RamTarget::Ddram,
            display_on: false,
            cursor_on: false,
            blink_on: false,
            backlight: false,
            increment: true,
            shift_on_write: false,
            // HD44780 powers up with an 8-bit interface.
            eight_bit: true,
            nibble: Nibble::AwaitHigh,
            strobe: None,
            cgram_dirty: false,
        }
    }

    /// One PCF8574 output byte.
    pub fn write_backpack(&mut self, value: u8) {
        let bits = Backpack::from_bits_truncate(value);
        self.backlight = bits.contains(Backpack::BACKLIGHT);

        if bits.contains(Backpack::EN) {
            self.strobe = Some(value);
        } else if let Some(latched) = self.strobe.take() {
            // The controller samples the bus on the falling edge of EN.
            let latched_bits = Backpack::from_bits_truncate(latched);
            if !latched_bits.contains(Backpack::RW) {
                self.latch_nibble(latched & 0xF0, latched_bits.contains(Backpack::RS));
            }
        }
    }

    fn latch_nibble(&mut self, data: u8, rs: bool) {
        if self.eight_bit {
            self.write_instruction(data, rs);
            return;
        }
        match self.nibble {
            Nibble::AwaitHigh => self.nibble = Nibble::AwaitLow { high: data, rs },
            Nibble::AwaitLow { high, rs } => {
                self.nibble = Nibble::AwaitHigh;
                self.write_instruction(high | (data >> 4), rs);
            }
        }
    }

    /// Executes one assembled byte: an instruction when `rs` is low, RAM data otherwise.
    pub fn write_instruction(&mut self, value: u8, rs: bool) {
        if rs {
            self.write_data(value);
        } else {
            self.command(value);
        }
    }

    fn command(&mut self, value: u8) {
        tracing::trace!("LCD1602: command {:#04x}", value);
        if value & CMD_SET_DDRAM != 0 {
            self.target = RamTarget::Ddram;
            self.ddram_addr = value & 0x7F;
        } else if value & CMD_SET_CGRAM != 0 {
            self.target = RamTarget::Cgram;
            self.cgram_addr = value & 0x3F;
        } else if value & CMD_FUNCTION_SET != 0 {
            let eight_bit = value & FUNCTION_8BIT != 0;
            if eight_bit != self.eight_bit {
                tracing::debug!("LCD1602: {}-bit interface", if eight_bit { 8 } else { 4 });
            }
            self.eight_bit = eight_bit;
            self.nibble = Nibble::AwaitHigh;
        } else if value & CMD_SHIFT != 0 {
            let right = value & SHIFT_RIGHT != 0;
            if value & SHIFT_DISPLAY != 0 {
                self.shift_display(right);
            } else {
                self.move_cursor(right);
            }
        } else if value & CMD_DISPLAY_CONTROL != 0 {
            self.display_on = value & DISPLAY_ON != 0;
            self.cursor_on = value & DISPLAY_CURSOR != 0;
            self.blink_on = value & DISPLAY_BLINK != 0;
        } else if value & CMD_ENTRY_MODE != 0 {
            self.increment = value & ENTRY_INCREMENT != 0;
            self.shift_on_write = value & ENTRY_SHIFT != 0;
        } else if value & CMD_HOME != 0 {
            self.target = RamTarget::Ddram;
            self.ddram_addr = 0;
            self.shift = 0;
        } else if value & CMD_CLEAR != 0 {
            self.ddram.fill(b' ');
            self.target = RamTarget::Ddram;
            self.ddram_addr = 0;
            self.shift = 0;
            self.increment = true;
        }
    }

    fn write_data(&mut self, value: u8) {
        match self.target {
            RamTarget::Cgram => {
                self.cgram[(self.cgram_addr & 0x3F) as usize] = value;
                self.cgram_dirty = true;
                self.cgram_addr = if self.increment {
                    (self.cgram_addr + 1) & 0x3F
                } else {
                    self.cgram_addr.wrapping_sub(1) & 0x3F
                };
            }
            RamTarget::Ddram => {
                self.ddram[(self.ddram_addr & 0x7F) as usize] = value;
                self.move_cursor(self.increment);
                if self.shift_on_write {
                    // I/D=1 with S=1 scrolls the text left under a fixed cursor.
                    self.shift_display(!self.increment);
                }
            }
        }
    }

    fn move_cursor(&mut self, forward: bool) {
        self.ddram_addr = if forward {
            match self.ddram_addr {
                0x27 => LINE2_BASE,
                0x67 => 0x00,
                a => (a + 1) & 0x7F,
            }
        } else {
            match self.ddram_addr {
                0x00 => 0x67,
                LINE2_BASE => 0x27,
                a => a.wrapping_sub(1) & 0x7F,
            }
        };
    }

    fn shift_display(&mut self, right: bool) {
        self.shift = if right {
            (self.shift + LINE_LEN - 1) % LINE_LEN
        } else {
            (self.shift + 1) % LINE_LEN
        };
    }

    pub fn cgram_dirty(&self) -> bool {
        self.cgram_dirty
    }

    /// Current display state. CGRAM is attached only once per change.
    pub fn update(&mut self) -> LcdSnapshot {
        let snapshot = self.peek();
        self.cgram_dirty = false;
        snapshot
    }

    /// Like [`update`](Self::update) but leaves the CGRAM dirty flag set.
    pub fn peek(&self) -> LcdSnapshot {
        let mut characters = vec![b' '; COLS * ROWS];
        if self.display_on {
            for row in 0..ROWS {
                let base = if row == 0 { 0 } else { LINE2_BASE };
                for col in 0..COLS {
                    let offset = (col as u8 + self.shift) % LINE_LEN;
                    characters[row * COLS + col] = self.ddram[(base + offset) as usize];
                }
            }
        }

        let cgram = self.cgram_dirty.then(|| self.cgram.to_vec());

        // Screen column of the DDRAM cursor under the current display shift.
        let col = self.ddram_addr & 0x3F;
        let cursor_x = (col + LINE_LEN - self.shift % LINE_LEN) % LINE_LEN;

        LcdSnapshot {
            characters,
            cursor: self.display_on && self.cursor_on,
            blink: self.display_on && self.blink_on,
            cursor_x,
            cursor_y: u8::from(self.ddram_addr >= LINE2_BASE),
            backlight: self.backlight,
            display_on: self.display_on,
            cgram,
        }
    }
}

impl I2cDevice for Lcd1602Controller {
    // Drivers open a new transaction for every expander write, so the
    // nibble pairing and EN edge have to survive STOP.
    fn connect(&mut self, _addr: u8, direction: Direction) -> bool {
        direction == Direction::Write
    }

    fn write_byte(&mut self, value: u8) -> bool {
        self.write_backpack(value);
        true
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BL: u8 = 0x08;

    fn nibble(lcd: &mut Lcd1602Controller, data: u8, rs: bool) {
        let base = (data & 0xF0) | BL | if rs { 0x01 } else { 0x00 };
        lcd.write_backpack(base | 0x04);
        lcd.write_backpack(base);
    }

    fn send(lcd: &mut Lcd1602Controller, value: u8, rs: bool) {
        nibble(lcd, value & 0xF0, rs);
        nibble(lcd, value << 4, rs);
    }

    /// LiquidCrystal_I2C's begin() sequence.
    fn init_4bit(lcd: &mut Lcd1602Controller) {
        nibble(lcd, 0x30, false);
        nibble(lcd, 0x30, false);
        nibble(lcd, 0x30, false);
        nibble(lcd, 0x20, false);
        send(lcd, 0x28, false); // 4-bit, 2 lines
        send(lcd, 0x0C, false); // display on
        send(lcd, CMD_CLEAR, false);
        send(lcd, 0x06, false); // increment, no shift
    }

    fn print(lcd: &mut Lcd1602Controller, text: &str) {
        for b in text.bytes() {
            send(lcd, b, true);
        }
    }

    #[test]
    fn test_print_over_backpack() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        print(&mut lcd, "Hello");
        send(&mut lcd, 0xC0, false); // row 1
        print(&mut lcd, "World");

        let snap = lcd.update();
        assert_eq!(snap.line(0), "Hello           ");
        assert_eq!(snap.line(1), "World           ");
        assert_eq!((snap.cursor_x, snap.cursor_y), (5, 1));
        assert!(snap.backlight);
        assert!(snap.display_on);
        assert!(!snap.cursor);
    }

    #[test]
    fn test_nibble_stream_matches_direct_bytes() {
        let program: &[(u8, bool)] = &[
            (0x28, false),
            (0x0F, false),
            (CMD_CLEAR, false),
            (0x06, false),
            (b'A', true),
            (b'B', true),
            (0x14, false), // cursor right
            (0xC3, false),
            (b'Z', true),
            (0x10, false), // cursor left
            (0x0D, false), // cursor off, blink on
        ];

        let mut paired = Lcd1602Controller::new();
        nibble(&mut paired, 0x30, false);
        nibble(&mut paired, 0x20, false);
        for &(value, rs) in program {
            send(&mut paired, value, rs);
        }

        let mut direct = Lcd1602Controller::new();
        direct.backlight = true;
        for &(value, rs) in program {
            direct.write_instruction(value, rs);
        }

        assert_eq!(paired.update(), direct.update());
        let snap = paired.update();
        assert_eq!((snap.cursor_x, snap.cursor_y), (3, 1));
        assert!(snap.blink);
        assert!(!snap.cursor);
    }

    #[test]
    fn test_cgram_consumed_once() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        assert!(lcd.update().cgram.is_none());

        send(&mut lcd, CMD_SET_CGRAM | 0x08, false); // glyph 1
        for row in [0x00, 0x0A, 0x1F, 0x0E, 0x04, 0x00, 0x00, 0x00] {
            send(&mut lcd, row, true);
        }
        assert!(lcd.cgram_dirty());
        assert!(lcd.peek().cgram.is_some());
        assert!(lcd.cgram_dirty());

        let snap = lcd.update();
        let cgram = snap.cgram.unwrap();
        assert_eq!(cgram.len(), 64);
        assert_eq!(&cgram[8..13], &[0x00, 0x0A, 0x1F, 0x0E, 0x04]);
        assert!(!lcd.cgram_dirty());
        assert!(lcd.update().cgram.is_none());

        // DDRAM writes after a CGRAM session do not mark it dirty.
        send(&mut lcd, CMD_SET_DDRAM, false);
        send(&mut lcd, 0x01, true);
        let snap = lcd.update();
        assert!(snap.cgram.is_none());
        assert_eq!(snap.characters[0], 0x01);
    }

    #[test]
    fn test_backlight_independent_of_framing() {
        let mut lcd = Lcd1602Controller::new();
        lcd.write_backpack(BL);
        assert!(lcd.update().backlight);
        lcd.write_backpack(0x00);
        assert!(!lcd.update().backlight);
    }

    #[test]
    fn test_half_pair_survives_stop() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        nibble(&mut lcd, b'Q' & 0xF0, true);
        lcd.disconnect();
        assert!(lcd.connect(0x27, Direction::Write));
        nibble(&mut lcd, b'Q' << 4, true);
        assert_eq!(lcd.update().line(0).trim_end(), "Q");
    }

    #[test]
    fn test_display_off_blanks_and_shift() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        print(&mut lcd, "abc");
        send(&mut lcd, 0x18, false); // shift display left
        assert_eq!(lcd.update().line(0), "bc              ");
        send(&mut lcd, CMD_HOME, false);
        assert_eq!(lcd.update().line(0), "abc             ");

        send(&mut lcd, 0x08, false);
        let snap = lcd.update();
        assert!(!snap.display_on);
        assert_eq!(snap.line(0), " ".repeat(COLS));
    }

    #[test]
    fn test_line_wrap_addresses() {
        let mut lcd = Lcd1602Controller::new();
        lcd.write_instruction(CMD_SET_DDRAM | 0x27, false);
        lcd.write_instruction(b'x', true);
        let snap = lcd.update();
        assert_eq!((snap.cursor_x, snap.cursor_y), (0, 1));
    }

    #[test]
    fn test_decrement_entry_mode() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        send(&mut lcd, CMD_ENTRY_MODE, false); // decrement, no shift
        send(&mut lcd, CMD_SET_DDRAM | 0x05, false);
        print(&mut lcd, "cba");

        let snap = lcd.update();
        assert_eq!(snap.line(0), "   abc          ");
        assert_eq!((snap.cursor_x, snap.cursor_y), (2, 0));

        // Stepping back from the start of row 1 lands on the end of row 0.
        send(&mut lcd, CMD_SET_DDRAM | LINE2_BASE, false);
        send(&mut lcd, b'q', true);
        assert_eq!(lcd.ddram[LINE2_BASE as usize], b'q');
        assert_eq!(lcd.ddram_addr, 0x27);
    }

    #[test]
    fn test_decrement_wraps_from_origin_to_row1_end() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        send(&mut lcd, CMD_ENTRY_MODE, false);
        send(&mut lcd, CMD_SET_DDRAM, false);
        print(&mut lcd, "x");
        let snap = lcd.update();
        assert_eq!((snap.cursor_x, snap.cursor_y), (39, 1));

        print(&mut lcd, "y");
        assert_eq!(lcd.ddram[0x67], b'y');

        // One shift right brings column 39 into view.
        send(&mut lcd, CMD_SHIFT | SHIFT_DISPLAY | SHIFT_RIGHT, false);
        let snap = lcd.update();
        assert_eq!(snap.line(0), " x              ");
        assert_eq!(snap.line(1), "y               ");
        assert_eq!((snap.cursor_x, snap.cursor_y), (39, 1));
    }

    #[test]
    fn test_shift_on_write_keeps_cursor_fixed() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        send(&mut lcd, CMD_ENTRY_MODE | ENTRY_INCREMENT | ENTRY_SHIFT, false);
        send(&mut lcd, CMD_SET_DDRAM | 0x10, false);
        print(&mut lcd, "ab");

        // Text scrolls in from the right edge; the cursor stays just past it.
        let snap = lcd.update();
        assert_eq!(snap.line(0), "              ab");
        assert_eq!((snap.cursor_x, snap.cursor_y), (16, 0));
        assert_eq!(lcd.ddram_addr, 0x12);

        print(&mut lcd, "c");
        let snap = lcd.update();
        assert_eq!(snap.line(0), "             abc");
        assert_eq!(snap.cursor_x, 16);
    }

    #[test]
    fn test_cgram_decrement_wraps() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        send(&mut lcd, CMD_ENTRY_MODE, false);
        send(&mut lcd, CMD_SET_CGRAM | 0x01, false);
        for row in [0xAA, 0xBB, 0xCC] {
            send(&mut lcd, row, true);
        }

        let cgram = lcd.update().cgram.unwrap();
        assert_eq!(cgram[1], 0xAA);
        assert_eq!(cgram[0], 0xBB);
        assert_eq!(cgram[63], 0xCC);
        assert_eq!(lcd.cgram_addr, 0x3E);
    }

    #[test]
    fn test_cursor_ignores_cgram_address() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        send(&mut lcd, CMD_SET_DDRAM | LINE2_BASE | 0x02, false);
        print(&mut lcd, "Hi");

        send(&mut lcd, CMD_SET_CGRAM | 0x3B, false);
        for row in [0x1F; 3] {
            send(&mut lcd, row, true);
        }
        let snap = lcd.update();
        assert_eq!((snap.cursor_x, snap.cursor_y), (4, 1));
        assert!(snap.cgram.is_some());
        assert_eq!(snap.line(1), "  Hi            ");
    }

    #[test]
    fn test_cursor_follows_display_shift() {
        let mut lcd = Lcd1602Controller::new();
        init_4bit(&mut lcd);
        print(&mut lcd, "abc");
        assert_eq!(lcd.update().cursor_x, 3);

        send(&mut lcd, CMD_SHIFT | SHIFT_DISPLAY, false); // left
        assert_eq!(lcd.update().cursor_x, 2);

        send(&mut lcd, CMD_SHIFT | SHIFT_DISPLAY | SHIFT_RIGHT, false);
        send(&mut lcd, CMD_SHIFT | SHIFT_DISPLAY | SHIFT_RIGHT, false);
        let snap = lcd.update();
        assert_eq!(snap.line(0), " abc            ");
        assert_eq!(snap.cursor_x, 4);
    }
}
