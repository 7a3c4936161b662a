use crate::peripherals::ws2812::Ws2812Controller;
use crate::pins::{PinAssignment, PinRole, Port, PortLevels};

/// Fans port-changed notifications out to the pin-owning peripherals.
#[derive(Debug)]
pub struct DigitalPortBus {
    pins: PinAssignment,
    levels: PortLevels,
    leds: Vec<bool>,
    buzzer: bool,
    segments: [bool; 8],
}

impl DigitalPortBus {
    pub fn new(pins: PinAssignment) -> Self {
        let leds = vec![false; pins.leds().len()];
        Self {
            pins,
            levels: PortLevels::default(),
            leds,
            buzzer: false,
            segments: [false; 8],
        }
    }

    /// Handles a full-byte port update. The matrix data line, if it lives on
    /// this port, is forwarded to `matrix` stamped with `now_ns`.
    pub fn on_port_changed(
        &mut self,
        port: Port,
        value: u8,
        now_ns: u64,
        mut matrix: Option<&mut Ws2812Controller>,
    ) {
        let previous = self.levels.0[port.index()];
        self.levels.0[port.index()] = value;

        let mask = self.pins.mask(port);
        tracing::trace!(
            "Port {:?}: {:#04x} -> {:#04x} (changed {:#04x}, mapped {:#04x})",
            port,
            previous,
            value,
            previous ^ value,
            mask
        );
        if mask == 0 {
            return;
        }

        for bit in 0..8u8 {
            if mask & (1 << bit) == 0 {
                continue;
            }
            let high = value & (1 << bit) != 0;
            match self.pins.role(port, bit) {
                Some(PinRole::Led(index)) => self.leds[index] = high,
                Some(PinRole::BuzzerGate) => self.buzzer = high,
                Some(PinRole::SegmentLine(segment)) => self.segments[segment as usize] = high,
                Some(PinRole::MatrixData) => {
                    if let Some(m) = matrix.as_deref_mut() {
                        m.feed_value(high, now_ns);
                    }
                }
                Some(PinRole::Button(_)) | None => {}
            }
        }
    }

    pub fn levels(&self) -> PortLevels {
        self.levels
    }

    pub fn pins(&self) -> &PinAssignment {
        &self.pins
    }

    pub fn led_states(&self) -> &[bool] {
        &self.leds
    }

    pub fn led(&self, id: &str) -> Option<bool> {
        self.pins
            .leds()
            .iter()
            .position(|l| l.id == id)
            .map(|index| self.leds[index])
    }

    pub fn buzzer(&self) -> bool {
        self.buzzer
    }

    pub fn segments(&self) -> [bool; 8] {
        self.segments
    }
}
