use crate::bus::{DigitalPortBus, I2cBus, I2cEvent, I2cResponse};
use crate::clock::CycleClock;
use crate::metrics::CpuPerformance;
use crate::peripherals::{
    Lcd1602Controller, SpiDevice, SpiLoopback, Ssd1306Controller, Uart, Ws2812Controller,
};
use crate::pins::{MatrixConfig, PinAssignment, PinSampler, Port};
use crate::snapshot::{CircuitSnapshot, LedSnapshot};
use crate::CircuitObserver;
use anyhow::Context;
use std::sync::{Arc, Mutex};
use wirebench_config::CircuitDescriptor;

/// Everything one simulation run owns. The CPU engine calls in synchronously;
/// dropping the driver (or [`stop`](Self::stop)) ends the run.
#[derive(Debug)]
pub struct ExecutionDriver {
    clock: CycleClock,
    ports: DigitalPortBus,
    i2c: I2cBus,
    matrix: Option<(MatrixConfig, Ws2812Controller)>,
    lcd_addr: Option<u8>,
    oled_addr: Option<u8>,
    performance: CpuPerformance,
    uart: Uart,
    spi: Box<dyn SpiDevice>,
    observers: Vec<Arc<dyn CircuitObserver>>,
    cycles: u64,
    last_frame: Option<Vec<u32>>,
    speed: f64,
}

impl ExecutionDriver {
    pub fn new(pins: PinAssignment, frequency_hz: u64) -> Self {
        let matrix = pins
            .matrix()
            .map(|cfg| (cfg, Ws2812Controller::new(cfg.pixel_count(), cfg.channels)));

        let mut i2c = I2cBus::new();
        if let Some(addr) = pins.lcd_address() {
            i2c.register_device(addr, Box::new(Lcd1602Controller::new()));
        }
        if let Some(addr) = pins.oled_address() {
            i2c.register_device(addr, Box::new(Ssd1306Controller::new()));
        }

        let mut uart = Uart::new();
        uart.set_sink(Some(Arc::new(Mutex::new(Vec::new()))), false);

        Self {
            clock: CycleClock::new(frequency_hz),
            lcd_addr: pins.lcd_address(),
            oled_addr: pins.oled_address(),
            ports: DigitalPortBus::new(pins),
            i2c,
            matrix,
            performance: CpuPerformance::new(frequency_hz),
            uart,
            spi: Box::new(SpiLoopback::new()),
            observers: Vec::new(),
            cycles: 0,
            last_frame: None,
            speed: 0.0,
        }
    }

    pub fn from_config(circuit: &CircuitDescriptor) -> anyhow::Result<Self> {
        circuit.validate()?;
        let pins = PinAssignment::from_config(circuit)
            .with_context(|| format!("Failed to wire circuit '{}'", circuit.name))?;
        tracing::info!(
            "Circuit '{}' on {} at {} Hz: {} components",
            circuit.name,
            circuit.board,
            circuit.frequency,
            circuit.components.len()
        );
        Ok(Self::new(pins, circuit.frequency))
    }

    pub fn add_observer(&mut self, observer: Arc<dyn CircuitObserver>) {
        self.observers.push(observer);
    }

    /// Marks the beginning of a run for the attached observers.
    pub fn start(&mut self) {
        tracing::info!(
            "Run started at {} Hz, {} observers",
            self.clock.frequency(),
            self.observers.len()
        );
        for o in &self.observers {
            o.on_run_start();
        }
    }

    /// Replaces the default loopback partner on the SPI hook.
    pub fn set_spi_device(&mut self, device: Box<dyn SpiDevice>) {
        self.spi = device;
    }

    pub fn attach_uart_sink(&mut self, sink: Arc<Mutex<Vec<u8>>>, echo_stdout: bool) {
        self.uart.set_sink(Some(sink), echo_stdout);
    }

    /// Port-changed notification. `cycles` is the engine's counter at the write.
    pub fn on_port_changed(&mut self, port: Port, value: u8, cycles: u64) {
        self.cycles = self.cycles.max(cycles);
        let now = self.clock.nanos(cycles);
        let matrix = self.matrix.as_mut().map(|(_, m)| m);
        self.ports.on_port_changed(port, value, now, matrix);
    }

    pub fn on_i2c(&mut self, event: I2cEvent) -> I2cResponse {
        self.i2c.dispatch(event)
    }

    /// UART transmit hook. Never blocks.
    pub fn on_uart_transmit(&mut self, value: u8) {
        self.uart.transmit(value);
    }

    /// SPI transfer hook: one byte out, one byte back in the same tick.
    pub fn on_spi_transfer(&mut self, value: u8) -> u8 {
        self.spi.transfer(value)
    }

    /// Per-quantum callback from the engine.
    pub fn tick(&mut self, cycles: u64, pins: &dyn PinSampler) {
        self.cycles = self.cycles.max(cycles);
        let now = self.clock.nanos(self.cycles);

        if let Some((cfg, matrix)) = self.matrix.as_mut() {
            if let Some((port, bit)) = Port::locate(cfg.pin) {
                matrix.feed_value(pins.pin_level(port, bit), now);
            }
            if let Some(frame) = matrix.update(now) {
                for o in &self.observers {
                    o.on_matrix_frame(&frame);
                }
                self.last_frame = Some(frame);
            }
        }

        if let Some(addr) = self.lcd_addr {
            if let Some(lcd) = self.i2c.device_mut::<Lcd1602Controller>(addr) {
                let snapshot = lcd.update();
                for o in &self.observers {
                    o.on_lcd(&snapshot);
                }
            }
        }

        if let Some(addr) = self.oled_addr {
            if let Some(oled) = self.i2c.device::<Ssd1306Controller>(addr) {
                let snapshot = oled.update();
                for o in &self.observers {
                    o.on_oled(&snapshot);
                }
            }
        }

        self.speed = self.performance.update(self.cycles);
        for o in &self.observers {
            o.on_speed(self.speed);
        }
    }

    /// Tick using the last reported port bytes as the instantaneous pin levels.
    pub fn tick_with_port_levels(&mut self, cycles: u64) {
        let levels = self.ports.levels();
        self.tick(cycles, &levels);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn time_ns(&self) -> u64 {
        self.clock.nanos(self.cycles)
    }

    pub fn time_ms(&self) -> u64 {
        self.clock.millis(self.cycles)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn ports(&self) -> &DigitalPortBus {
        &self.ports
    }

    pub fn i2c(&self) -> &I2cBus {
        &self.i2c
    }

    /// For registering additional bus devices at setup.
    pub fn i2c_mut(&mut self) -> &mut I2cBus {
        &mut self.i2c
    }

    pub fn lcd(&self) -> Option<&Lcd1602Controller> {
        self.lcd_addr.and_then(|addr| self.i2c.device(addr))
    }

    pub fn oled(&self) -> Option<&Ssd1306Controller> {
        self.oled_addr.and_then(|addr| self.i2c.device(addr))
    }

    pub fn last_frame(&self) -> Option<&[u32]> {
        self.last_frame.as_deref()
    }

    pub fn uart_text(&self) -> String {
        self.uart.captured_text()
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let leds = self
            .ports
            .pins()
            .leds()
            .iter()
            .zip(self.ports.led_states())
            .map(|(led, on)| LedSnapshot {
                id: led.id.clone(),
                pin: led.pin,
                on: *on,
            })
            .collect();

        CircuitSnapshot {
            cycles: self.cycles,
            time_ns: self.time_ns(),
            leds,
            buzzer: self.ports.buzzer(),
            segments: self.ports.segments(),
            matrix: self.last_frame.clone(),
            lcd: self.lcd().map(|lcd| lcd.peek()),
            oled: self.oled().map(|oled| oled.update()),
            speed: self.speed,
            uart: self.uart_text(),
        }
    }

    /// Ends the run. Nothing is carried over to the next one.
    pub fn stop(self) -> CircuitSnapshot {
        let snapshot = self.snapshot();
        for o in &self.observers {
            o.on_run_stop();
        }
        tracing::info!("Run stopped at {} cycles ({} ms)", self.cycles, self.time_ms());
        snapshot
    }
}
