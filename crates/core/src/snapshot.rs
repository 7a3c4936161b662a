use crate::peripherals::{LcdSnapshot, OledSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CircuitSnapshot {
    pub cycles: u64,
    pub time_ns: u64,
    pub leds: Vec<LedSnapshot>,
    pub buzzer: bool,
    pub segments: [bool; 8],
    pub matrix: Option<Vec<u32>>,
    pub lcd: Option<LcdSnapshot>,
    pub oled: Option<OledSnapshot>,
    pub speed: f64,
    pub uart: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LedSnapshot {
    pub id: String,
    pub pin: u8,
    pub on: bool,
}

impl CircuitSnapshot {
    pub fn led(&self, id: &str) -> Option<bool> {
        self.leds.iter().find(|l| l.id == id).map(|l| l.on)
    }

    /// Both LCD rows joined by a newline, if an LCD is fitted.
    pub fn lcd_text(&self) -> Option<String> {
        self.lcd
            .as_ref()
            .map(|lcd| format!("{}\n{}", lcd.line(0), lcd.line(1)))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
