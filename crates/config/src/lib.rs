use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Arduino Uno core clock.
pub const DEFAULT_FREQUENCY_HZ: u64 = 16_000_000;

fn default_board() -> String {
    "uno".to_string()
}

fn default_frequency() -> u64 {
    DEFAULT_FREQUENCY_HZ
}

/// One part placed in the circuit, e.g. an LED on pin 13 or an OLED on the I2C bus.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ComponentConfig {
    pub id: String,
    pub r#type: String, // "led", "buzzer", "lcd1602", ...
    #[serde(default)]
    pub pin: Option<u8>,
    #[serde(default)]
    pub pins: Vec<u8>,
    #[serde(default)]
    pub config: HashMap<String, serde_yaml::Value>,
}

impl ComponentConfig {
    /// Reads an unsigned value from `config`. Accepts YAML integers and
    /// `"0x.."`/decimal strings, since I2C addresses are usually written in hex.
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        let value = self.config.get(key)?;
        if let Some(n) = value.as_u64() {
            return Some(n);
        }
        let text = value.as_str()?.trim();
        match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => text.parse().ok(),
        }
    }
}

/// Static description of the simulated board and everything wired to it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CircuitDescriptor {
    pub name: String,
    #[serde(default = "default_board")]
    pub board: String,
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl CircuitDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open circuit description at {:?}", path.as_ref()))?;
        let circuit: Self =
            serde_yaml::from_reader(f).context("Failed to parse Circuit Description")?;
        circuit.validate()?;
        Ok(circuit)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            anyhow::bail!("Circuit 'frequency' must be greater than zero");
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if component.id.trim().is_empty() {
                anyhow::bail!("Component of type '{}' has an empty id", component.r#type);
            }
            if !seen.insert(component.id.as_str()) {
                anyhow::bail!("Duplicate component id '{}'", component.id);
            }
        }

        Ok(())
    }

    /// Components of the given type, in declaration order.
    pub fn components_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a ComponentConfig> {
        self.components.iter().filter(move |c| c.r#type == kind)
    }

    pub fn has_component(&self, kind: &str) -> bool {
        self.components_of(kind).next().is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    pub circuit: String,
    pub trace: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LcdContainsAssertion {
    pub lcd_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LedOnAssertion {
    pub led_on: String,
    #[serde(default = "default_true")]
    pub expected: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    UartContains(UartContainsAssertion),
    LcdContains(LcdContainsAssertion),
    LedOn(LedOnAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    pub inputs: TestInputs,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.inputs.circuit.trim().is_empty() {
            anyhow::bail!("Input 'circuit' path cannot be empty");
        }

        if self.inputs.trace.trim().is_empty() {
            anyhow::bail!("Input 'trace' path cannot be empty");
        }

        Ok(())
    }
}
