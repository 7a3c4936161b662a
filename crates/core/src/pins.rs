//! Pin numbering and the static pin → role table built from the circuit.

use crate::{CircuitError, CircuitResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wirebench_config::{CircuitDescriptor, ComponentConfig};

pub const LCD1602_DEFAULT_ADDR: u8 = 0x27;
pub const SSD1306_DEFAULT_ADDR: u8 = 0x3C;
/// Longest side of a neopixel matrix.
pub const MAX_MATRIX_SIDE: u64 = 64;

/// One of the three 8-bit GPIO ports of the Uno's ATmega328P.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Port {
    B,
    C,
    D,
}

impl Port {
    pub const ALL: [Port; 3] = [Port::B, Port::C, Port::D];

    pub fn index(self) -> usize {
        match self {
            Port::B => 0,
            Port::C => 1,
            Port::D => 2,
        }
    }

    /// Board pin number of bit 0 of this port.
    pub fn base_pin(self) -> u8 {
        match self {
            Port::D => 0,
            Port::B => 8,
            Port::C => 14,
        }
    }

    /// Maps a board pin number (0-13 digital, 14-19 for A0-A5) to its port and bit.
    pub fn locate(pin: u8) -> Option<(Port, u8)> {
        match pin {
            0..=7 => Some((Port::D, pin)),
            8..=13 => Some((Port::B, pin - 8)),
            14..=19 => Some((Port::C, pin - 14)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    Led(usize),
    Button(usize),
    BuzzerGate,
    MatrixData,
    /// Segment line index, a..g then dp.
    SegmentLine(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedPin {
    pub id: String,
    pub pin: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixConfig {
    pub pin: u8,
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
}

impl MatrixConfig {
    pub fn pixel_count(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }
}

/// Instantaneous pin levels, as the engine reports them on demand.
pub trait PinSampler {
    fn pin_level(&self, port: Port, bit: u8) -> bool;
}

/// Latest byte of every port. Serves as the sampler when the engine only
/// reports byte-level changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortLevels(pub [u8; 3]);

impl PinSampler for PortLevels {
    fn pin_level(&self, port: Port, bit: u8) -> bool {
        self.0[port.index()] & (1 << bit) != 0
    }
}

/// Read-only for the whole run once built.
#[derive(Debug, Clone, Default)]
pub struct PinAssignment {
    roles: [[Option<PinRole>; 8]; 3],
    masks: [u8; 3],
    leds: Vec<LedPin>,
    buttons: Vec<LedPin>,
    buzzer: Option<u8>,
    matrix: Option<MatrixConfig>,
    segment: bool,
    lcd_address: Option<u8>,
    oled_address: Option<u8>,
}

struct Builder {
    table: PinAssignment,
    owners: HashMap<u8, String>,
}

impl Builder {
    /// Parts the bus models once per circuit.
    fn single(&self, kind: &'static str, taken: bool, id: &str) -> CircuitResult<()> {
        if taken {
            return Err(CircuitError::DuplicatePeripheral {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn claim(&mut self, pin: u8, role: PinRole, owner: &str) -> CircuitResult<()> {
        let (port, bit) = Port::locate(pin).ok_or(CircuitError::InvalidPin(pin))?;
        if let Some(first) = self.owners.get(&pin) {
            return Err(CircuitError::PinConflict {
                pin,
                first: first.clone(),
                second: owner.to_string(),
            });
        }
        self.owners.insert(pin, owner.to_string());
        self.table.roles[port.index()][bit as usize] = Some(role);
        self.table.masks[port.index()] |= 1 << bit;
        Ok(())
    }
}

fn required_pin(c: &ComponentConfig) -> CircuitResult<u8> {
    c.pin.ok_or_else(|| CircuitError::MissingField {
        id: c.id.clone(),
        field: "pin",
    })
}

fn matrix_side(c: &ComponentConfig, field: &'static str) -> CircuitResult<usize> {
    match c.config_u64(field).unwrap_or(1) {
        n @ 1..=MAX_MATRIX_SIDE => Ok(n as usize),
        n => Err(CircuitError::InvalidValue {
            id: c.id.clone(),
            field,
            value: n,
        }),
    }
}

fn i2c_address(c: &ComponentConfig, default: u8) -> CircuitResult<u8> {
    match c.config_u64("address") {
        None => Ok(default),
        Some(addr) if addr <= 0x7F => Ok(addr as u8),
        Some(addr) => Err(CircuitError::InvalidValue {
            id: c.id.clone(),
            field: "address",
            value: addr,
        }),
    }
}

impl PinAssignment {
    pub fn from_config(circuit: &CircuitDescriptor) -> CircuitResult<Self> {
        let mut b = Builder {
            table: PinAssignment::default(),
            owners: HashMap::new(),
        };

        for c in &circuit.components {
            match c.r#type.as_str() {
                "led" => {
                    let pin = required_pin(c)?;
                    let index = b.table.leds.len();
                    b.claim(pin, PinRole::Led(index), &c.id)?;
                    b.table.leds.push(LedPin {
                        id: c.id.clone(),
                        pin,
                    });
                }
                "pushbutton" => {
                    let pin = required_pin(c)?;
                    let index = b.table.buttons.len();
                    b.claim(pin, PinRole::Button(index), &c.id)?;
                    b.table.buttons.push(LedPin {
                        id: c.id.clone(),
                        pin,
                    });
                }
                "buzzer" => {
                    b.single("buzzer", b.table.buzzer.is_some(), &c.id)?;
                    let pin = required_pin(c)?;
                    b.claim(pin, PinRole::BuzzerGate, &c.id)?;
                    b.table.buzzer = Some(pin);
                }
                "neopixel-matrix" => {
                    b.single("neopixel-matrix", b.table.matrix.is_some(), &c.id)?;
                    let pin = required_pin(c)?;
                    let rows = matrix_side(c, "rows")?;
                    let cols = matrix_side(c, "cols")?;
                    let channels = c.config_u64("channels").unwrap_or(3);
                    if channels != 3 && channels != 4 {
                        return Err(CircuitError::InvalidValue {
                            id: c.id.clone(),
                            field: "channels",
                            value: channels,
                        });
                    }
                    b.claim(pin, PinRole::MatrixData, &c.id)?;
                    b.table.matrix = Some(MatrixConfig {
                        pin,
                        rows,
                        cols,
                        channels: channels as usize,
                    });
                }
                "7segment" => {
                    b.single("7segment", b.table.segment, &c.id)?;
                    let pins: Vec<u8> = if c.pins.is_empty() {
                        (0..8).collect()
                    } else {
                        c.pins.clone()
                    };
                    for (segment, pin) in pins.iter().take(8).enumerate() {
                        b.claim(*pin, PinRole::SegmentLine(segment as u8), &c.id)?;
                    }
                    b.table.segment = true;
                }
                "lcd1602" => {
                    b.single("lcd1602", b.table.lcd_address.is_some(), &c.id)?;
                    b.table.lcd_address = Some(i2c_address(c, LCD1602_DEFAULT_ADDR)?);
                }
                "ssd1306" => {
                    b.single("ssd1306", b.table.oled_address.is_some(), &c.id)?;
                    b.table.oled_address = Some(i2c_address(c, SSD1306_DEFAULT_ADDR)?);
                }
                other => {
                    tracing::warn!(
                        "Unsupported component type '{}' for id '{}'; skipping",
                        other,
                        c.id
                    );
                }
            }
        }

        tracing::debug!(
            "Pin assignment built: {} LEDs, {} buttons, masks B={:#04x} C={:#04x} D={:#04x}",
            b.table.leds.len(),
            b.table.buttons.len(),
            b.table.masks[0],
            b.table.masks[1],
            b.table.masks[2]
        );

        Ok(b.table)
    }

    pub fn role(&self, port: Port, bit: u8) -> Option<PinRole> {
        self.roles[port.index()].get(bit as usize).copied().flatten()
    }

    pub fn role_of_pin(&self, pin: u8) -> Option<PinRole> {
        let (port, bit) = Port::locate(pin)?;
        self.role(port, bit)
    }

    /// Bits of `port` that carry any role.
    pub fn mask(&self, port: Port) -> u8 {
        self.masks[port.index()]
    }

    pub fn leds(&self) -> &[LedPin] {
        &self.leds
    }

    /// Port and bit the wiring layer must drive when a button changes state.
    pub fn button_pin(&self, id: &str) -> Option<(Port, u8)> {
        self.buttons
            .iter()
            .find(|b| b.id == id)
            .and_then(|b| Port::locate(b.pin))
    }

    pub fn buzzer_pin(&self) -> Option<u8> {
        self.buzzer
    }

    pub fn matrix(&self) -> Option<MatrixConfig> {
        self.matrix
    }

    pub fn has_segment(&self) -> bool {
        self.segment
    }

    pub fn lcd_address(&self) -> Option<u8> {
        self.lcd_address
    }

    pub fn oled_address(&self) -> Option<u8> {
        self.oled_address
    }
}
