use crate::error::{CellError, Result};
use crate::hal::{
    buttons, permissives, round2, AnalogueReading, BeaconColour, CellIO, ConveyorCommand,
    DigitalInputs,
};

/// One actuator write as seen by the simulated cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputWrite {
    Beacon(BeaconColour),
    Conveyor(ConveyorCommand),
}

/// In-memory conveyor cell.
///
/// Inputs are set directly; any stage can be made to fail with a timeout.
/// With dynamics enabled the motor temperature follows the conveyor output.
#[derive(Debug, Clone)]
pub struct SimulatedCell {
    button_bits: u8,
    permissive_bits: u8,
    analogue: AnalogueReading,
    dynamics: bool,

    fail_buttons: bool,
    fail_enable: bool,
    fail_analogue: bool,
    fail_writes: bool,

    beacon: Option<BeaconColour>,
    conveyor: ConveyorCommand,
    writes: Vec<OutputWrite>,
}

const AMBIENT_TEMP_C: f64 = 20.0;
const RUNNING_TEMP_C: f64 = 45.0;

impl SimulatedCell {
    pub fn new() -> Self {
        Self {
            button_bits: 0,
            permissive_bits: 0,
            analogue: AnalogueReading {
                supply_voltage: 230.0,
                supply_current: 0.0,
                motor_temperature: AMBIENT_TEMP_C,
                motor_vibration: 0.0,
            },
            dynamics: false,
            fail_buttons: false,
            fail_enable: false,
            fail_analogue: false,
            fail_writes: false,
            beacon: None,
            conveyor: ConveyorCommand::Stop,
            writes: Vec::new(),
        }
    }

    /// Enable latched, start held, sensors following the conveyor.
    pub fn demo() -> Self {
        let mut cell = Self::new();
        cell.set_enabled(true);
        cell.press(false, true);
        cell.dynamics = true;
        cell
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.set_bit(permissives::ENABLE, enabled);
    }

    pub fn set_fault(&mut self, position: u32, active: bool) {
        self.set_bit(position, active);
    }

    fn set_bit(&mut self, position: u32, value: bool) {
        if value {
            self.permissive_bits |= 1 << position;
        } else {
            self.permissive_bits &= !(1 << position);
        }
    }

    pub fn press(&mut self, stop: bool, start: bool) {
        self.button_bits = (stop as u8) << buttons::STOP | (start as u8) << buttons::START;
    }

    pub fn set_analogue(&mut self, reading: AnalogueReading) {
        self.analogue = reading;
    }

    pub fn fail_button_reads(&mut self, fail: bool) {
        self.fail_buttons = fail;
    }

    pub fn fail_enable_reads(&mut self, fail: bool) {
        self.fail_enable = fail;
    }

    pub fn fail_analogue_reads(&mut self, fail: bool) {
        self.fail_analogue = fail;
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn beacon(&self) -> Option<BeaconColour> {
        self.beacon
    }

    pub fn conveyor(&self) -> ConveyorCommand {
        self.conveyor
    }

    pub fn take_writes(&mut self) -> Vec<OutputWrite> {
        std::mem::take(&mut self.writes)
    }

    fn step_dynamics(&mut self) {
        let (target_temp, current) = match self.conveyor {
            ConveyorCommand::Run => (RUNNING_TEMP_C, 4.2),
            ConveyorCommand::Stop => (AMBIENT_TEMP_C, 0.0),
        };
        let temp = self.analogue.motor_temperature;
        self.analogue.motor_temperature = round2(temp + (target_temp - temp) * 0.05);
        self.analogue.supply_current = current;
        self.analogue.motor_vibration = if current > 0.0 { 1.8 } else { 0.0 };
    }

    fn timeout(panel: &str) -> CellError {
        CellError::Timeout {
            addr: format!("sim:{panel}"),
            timeout_ms: 0,
        }
    }
}

impl Default for SimulatedCell {
    fn default() -> Self {
        Self::new()
    }
}

impl CellIO for SimulatedCell {
    fn read_button_panel(&mut self) -> Result<DigitalInputs> {
        if self.fail_buttons {
            return Err(Self::timeout("buttons"));
        }
        Ok(DigitalInputs::from_bits(self.button_bits))
    }

    fn read_enable_panel(&mut self) -> Result<DigitalInputs> {
        if self.fail_enable {
            return Err(Self::timeout("enable"));
        }
        Ok(DigitalInputs::from_bits(self.permissive_bits))
    }

    fn read_analogue_panel(&mut self) -> Result<AnalogueReading> {
        if self.fail_analogue {
            return Err(Self::timeout("analogue"));
        }
        if self.dynamics {
            self.step_dynamics();
        }
        Ok(self.analogue)
    }

    fn write_beacon(&mut self, colour: BeaconColour) -> Result<()> {
        self.writes.push(OutputWrite::Beacon(colour));
        if self.fail_writes {
            return Err(Self::timeout("beacon"));
        }
        self.beacon = Some(colour);
        Ok(())
    }

    fn write_conveyor(&mut self, command: ConveyorCommand) -> Result<()> {
        self.writes.push(OutputWrite::Conveyor(command));
        if self.fail_writes {
            return Err(Self::timeout("conveyor"));
        }
        self.conveyor = command;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_cell_heats_while_running() {
        let mut cell = SimulatedCell::demo();
        cell.write_conveyor(ConveyorCommand::Run).unwrap();
        let first = cell.read_analogue_panel().unwrap().motor_temperature;
        let second = cell.read_analogue_panel().unwrap().motor_temperature;
        assert!(second > first);
        assert!(second < RUNNING_TEMP_C);
    }

    #[test]
    fn failed_write_is_recorded_but_not_applied() {
        let mut cell = SimulatedCell::new();
        cell.fail_writes(true);
        assert!(cell.write_beacon(BeaconColour::Green).is_err());
        assert_eq!(cell.beacon(), None);
        assert_eq!(cell.take_writes(), vec![OutputWrite::Beacon(BeaconColour::Green)]);
    }
}
