pub mod bus;
pub mod clock;
pub mod driver;
pub mod metrics;
pub mod peripherals;
pub mod pins;
pub mod snapshot;
pub mod trace;

pub use driver::ExecutionDriver;


/// Setup-time failures. Nothing in the per-tick path returns one of these:
/// protocol glitches are recovered locally by the decoders.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    #[error("Pin {0} does not exist on this board")]
    InvalidPin(u8),
    #[error("Pin {pin} is claimed by both '{first}' and '{second}'")]
    PinConflict {
        pin: u8,
        first: String,
        second: String,
    },
    #[error("Only one {kind} is supported; '{id}' is a second one")]
    DuplicatePeripheral { kind: &'static str, id: String },
    #[error("Component '{id}' is missing required field '{field}'")]
    MissingField { id: String, field: &'static str },
    #[error("Component '{id}' has invalid value for '{field}': {value}")]
    InvalidValue {
        id: String,
        field: &'static str,
        value: u64,
    },
}

pub type CircuitResult<T> = Result<T, CircuitError>;

/// Receives the decoder snapshots pulled on each tick. This is the seam the
/// rendering layer plugs into; every method defaults to a no-op.
pub trait CircuitObserver: std::fmt::Debug + Send + Sync {
    fn on_run_start(&self) {}
    fn on_run_stop(&self) {}
    fn on_matrix_frame(&self, _pixels: &[u32]) {}
    fn on_lcd(&self, _lcd: &peripherals::lcd1602::LcdSnapshot) {}
    fn on_oled(&self, _oled: &peripherals::ssd1306::OledSnapshot) {}
    fn on_speed(&self, _ratio: f64) {}
}
