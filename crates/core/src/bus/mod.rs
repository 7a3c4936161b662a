pub mod i2c;
pub mod ports;

pub use i2c::{Direction, I2cBus, I2cDevice, I2cEvent, I2cResponse};
pub use ports::DigitalPortBus;
