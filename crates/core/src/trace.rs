//! Recorded engine callbacks, replayed against a driver in place of a live CPU.

use crate::bus::{Direction, I2cEvent, I2cResponse};
use crate::pins::Port;
use crate::ExecutionDriver;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Port { port: Port, value: u8, cycles: u64 },
    Tick { cycles: u64 },
    I2cStart,
    I2cConnect {
        address: u8,
        #[serde(default = "default_write")]
        write: bool,
    },
    I2cWrite { value: u8 },
    I2cRead {
        #[serde(default)]
        ack: bool,
    },
    I2cStop,
    Uart { value: u8 },
    Spi { value: u8 },
}

fn default_write() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub nacks: usize,
    pub spi_replies: Vec<u8>,
    pub i2c_reads: Vec<u8>,
}

/// Feeds `events` to the driver in order. Ticks sample the latest port bytes.
pub fn replay(driver: &mut ExecutionDriver, events: &[TraceEvent]) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for event in events {
        match *event {
            TraceEvent::Port {
                port,
                value,
                cycles,
            } => driver.on_port_changed(port, value, cycles),
            TraceEvent::Tick { cycles } => driver.tick_with_port_levels(cycles),
            TraceEvent::I2cStart => {
                driver.on_i2c(I2cEvent::Start);
            }
            TraceEvent::I2cConnect { address, write } => {
                let direction = if write {
                    Direction::Write
                } else {
                    Direction::Read
                };
                if driver.on_i2c(I2cEvent::Address {
                    addr: address,
                    direction,
                }) == I2cResponse::Ack(false)
                {
                    summary.nacks += 1;
                }
            }
            TraceEvent::I2cWrite { value } => {
                if driver.on_i2c(I2cEvent::Write(value)) == I2cResponse::Ack(false) {
                    summary.nacks += 1;
                }
            }
            TraceEvent::I2cRead { ack } => {
                if let I2cResponse::Data(byte) = driver.on_i2c(I2cEvent::Read { ack }) {
                    summary.i2c_reads.push(byte);
                }
            }
            TraceEvent::I2cStop => {
                driver.on_i2c(I2cEvent::Stop);
            }
            TraceEvent::Uart { value } => driver.on_uart_transmit(value),
            TraceEvent::Spi { value } => summary.spi_replies.push(driver.on_spi_transfer(value)),
        }
        summary.events += 1;
    }
    tracing::debug!(
        "Replayed {} events ({} NACKs)",
        summary.events,
        summary.nacks
    );
    summary
}

/// Expands a string into UART events, for hand-written traces.
pub fn uart_text(text: &str) -> Vec<TraceEvent> {
    text.bytes().map(|value| TraceEvent::Uart { value }).collect()
}

/// One complete I2C write transaction.
pub fn i2c_write(address: u8, bytes: &[u8]) -> Vec<TraceEvent> {
    let mut events = Vec::with_capacity(bytes.len() + 3);
    events.push(TraceEvent::I2cStart);
    events.push(TraceEvent::I2cConnect {
        address,
        write: true,
    });
    events.extend(bytes.iter().map(|&value| TraceEvent::I2cWrite { value }));
    events.push(TraceEvent::I2cStop);
    events
}
