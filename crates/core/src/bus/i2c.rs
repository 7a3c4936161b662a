use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Write,
    Read,
}

/// A device listening at a fixed 7-bit address.
pub trait I2cDevice: std::fmt::Debug {
    /// Addressed by the controller. Returning false leaves the transfer unacknowledged.
    fn connect(&mut self, _addr: u8, _direction: Direction) -> bool {
        true
    }
    /// One byte from the controller. Returns the ACK bit.
    fn write_byte(&mut self, value: u8) -> bool;
    /// One byte to the controller; `ack` is the controller's ACK for the previous byte.
    fn read_byte(&mut self, _ack: bool) -> u8 {
        0xFF
    }
    /// STOP or repeated START ended the transfer.
    fn disconnect(&mut self) {}
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Framing events produced by the CPU's TWI engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum I2cEvent {
    Start,
    Address { addr: u8, direction: Direction },
    Write(u8),
    Read { ack: bool },
    Stop,
}

/// Completion value handed back to the TWI engine for each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cResponse {
    Done,
    Ack(bool),
    Data(u8),
}

#[derive(Debug, Clone, Copy)]
struct ActiveTransfer {
    addr: u8,
    direction: Direction,
}

#[derive(Debug, Default)]
pub struct I2cBus {
    devices: HashMap<u8, Box<dyn I2cDevice>>,
    active: Option<ActiveTransfer>,
}

impl I2cBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last registration at an address wins.
    pub fn register_device(&mut self, addr: u8, device: Box<dyn I2cDevice>) {
        let addr = addr & 0x7F;
        if self.devices.insert(addr, device).is_some() {
            tracing::debug!("I2C: device at {:#04x} replaced", addr);
        } else {
            tracing::info!("I2C: device registered at {:#04x}", addr);
        }
    }

    pub fn device<T: 'static>(&self, addr: u8) -> Option<&T> {
        self.devices
            .get(&(addr & 0x7F))
            .and_then(|d| d.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn device_mut<T: 'static>(&mut self, addr: u8) -> Option<&mut T> {
        self.devices
            .get_mut(&(addr & 0x7F))
            .and_then(|d| d.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    pub fn start(&mut self) {
        // Repeated START closes the running transfer first.
        self.release();
    }

    pub fn connect(&mut self, addr: u8, direction: Direction) -> bool {
        self.release();
        let addr = addr & 0x7F;
        let Some(device) = self.devices.get_mut(&addr) else {
            tracing::debug!("I2C: no device at {:#04x}, NACK", addr);
            return false;
        };
        if !device.connect(addr, direction) {
            tracing::debug!("I2C: device at {:#04x} refused {:?}", addr, direction);
            return false;
        }
        self.active = Some(ActiveTransfer { addr, direction });
        true
    }

    pub fn write_byte(&mut self, value: u8) -> bool {
        match self.active {
            Some(ActiveTransfer {
                addr,
                direction: Direction::Write,
            }) => match self.devices.get_mut(&addr) {
                Some(device) => {
                    tracing::trace!("I2C: {:#04x} <- {:#04x}", addr, value);
                    device.write_byte(value)
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn read_byte(&mut self, ack: bool) -> u8 {
        match self.active {
            Some(ActiveTransfer {
                addr,
                direction: Direction::Read,
            }) => self
                .devices
                .get_mut(&addr)
                .map(|device| device.read_byte(ack))
                .unwrap_or(0xFF),
            _ => 0xFF,
        }
    }

    pub fn stop(&mut self) {
        self.release();
    }

    pub fn dispatch(&mut self, event: I2cEvent) -> I2cResponse {
        match event {
            I2cEvent::Start => {
                self.start();
                I2cResponse::Done
            }
            I2cEvent::Address { addr, direction } => I2cResponse::Ack(self.connect(addr, direction)),
            I2cEvent::Write(value) => I2cResponse::Ack(self.write_byte(value)),
            I2cEvent::Read { ack } => I2cResponse::Data(self.read_byte(ack)),
            I2cEvent::Stop => {
                self.stop();
                I2cResponse::Done
            }
        }
    }

    fn release(&mut self) {
        if let Some(transfer) = self.active.take() {
            if let Some(device) = self.devices.get_mut(&transfer.addr) {
                device.disconnect();
            }
        }
    }
}
