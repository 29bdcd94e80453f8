use crate::error::{CellError, Result};
use crate::process::ProcessState;
use std::fmt;
use std::str::FromStr;

/// Bit-indexed inputs decoded from one digital panel frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalInputs {
    bits: u8,
}

impl DigitalInputs {
    pub const fn from_bits(bits: u8) -> Self {
        Self { bits }
    }

    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Positions beyond the 8-bit mask read as clear.
    pub const fn bit(&self, position: u32) -> bool {
        position < 8 && (self.bits >> position) & 1 == 1
    }
}

/// Button panel bit assignments.
pub mod buttons {
    pub const STOP: u32 = 0;
    pub const START: u32 = 1;
}

/// Enable/fault panel bit assignments.
pub mod permissives {
    pub const ENABLE: u32 = 0;
    pub const VOLTAGE_FAULT: u32 = 1;
    pub const CURRENT_FAULT: u32 = 2;
    pub const TEMPERATURE_FAULT: u32 = 3;
    pub const VIBRATION_FAULT: u32 = 4;
}

/// Scaled analogue panel values, rounded to two decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalogueReading {
    pub supply_voltage: f64,
    pub supply_current: f64,
    pub motor_temperature: f64,
    pub motor_vibration: f64,
}

/// Rounds half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeaconColour {
    Red,
    Amber,
    Green,
}

impl BeaconColour {
    pub const ALL: [BeaconColour; 3] = [BeaconColour::Red, BeaconColour::Amber, BeaconColour::Green];

    pub fn as_str(&self) -> &'static str {
        match self {
            BeaconColour::Red => "red",
            BeaconColour::Amber => "amber",
            BeaconColour::Green => "green",
        }
    }
}

impl fmt::Display for BeaconColour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BeaconColour {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(BeaconColour::Red),
            "amber" => Ok(BeaconColour::Amber),
            "green" => Ok(BeaconColour::Green),
            _ => Err(CellError::InvalidBeaconColour(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConveyorCommand {
    Stop,
    Run,
}

impl ConveyorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConveyorCommand::Stop => "stop",
            ConveyorCommand::Run => "run",
        }
    }
}

impl fmt::Display for ConveyorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConveyorCommand {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" => Ok(ConveyorCommand::Stop),
            "run" => Ok(ConveyorCommand::Run),
            _ => Err(CellError::InvalidConveyorState(s.to_string())),
        }
    }
}

/// Field I/O for one conveyor cell. Every call is one isolated transaction.
pub trait CellIO {
    fn read_button_panel(&mut self) -> Result<DigitalInputs>;
    fn read_enable_panel(&mut self) -> Result<DigitalInputs>;
    fn read_analogue_panel(&mut self) -> Result<AnalogueReading>;
    fn write_beacon(&mut self, colour: BeaconColour) -> Result<()>;
    fn write_conveyor(&mut self, command: ConveyorCommand) -> Result<()>;
}

/// Outbound telemetry. `sensors` is `None` when the analogue read failed
/// this cycle.
pub trait TelemetrySink {
    fn publish(&mut self, state: &ProcessState, sensors: Option<&AnalogueReading>) -> Result<()>;
}
