/// Full-duplex byte exchange behind the SPI transfer hook. The returned byte
/// is shifted into the CPU's SPDR in the same tick.
pub trait SpiDevice: std::fmt::Debug + Send {
    fn transfer(&mut self, mosi: u8) -> u8;
}

/// Default SPI partner: echoes MOSI back on MISO and keeps a transcript.
#[derive(Debug, Default)]
pub struct SpiLoopback {
    transcript: Vec<u8>,
}

impl SpiLoopback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }
}

impl SpiDevice for SpiLoopback {
    fn transfer(&mut self, mosi: u8) -> u8 {
        tracing::debug!("SPI: {:#04x}", mosi);
        self.transcript.push(mosi);
        mosi
    }
}
