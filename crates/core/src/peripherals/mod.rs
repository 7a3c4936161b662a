//! Protocol decoders and byte-stream endpoints for the parts on the board.

pub mod lcd1602;
pub mod spi;
pub mod ssd1306;
pub mod uart;
pub mod ws2812;

pub use lcd1602::{Lcd1602Controller, LcdSnapshot};
pub use spi::{SpiDevice, SpiLoopback};
pub use ssd1306::{OledSnapshot, Ssd1306Controller};
pub use uart::Uart;
pub use ws2812::Ws2812Controller;
