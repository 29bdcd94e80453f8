use crate::codec::{
    decode_analogue_panel, decode_digital_panel, encode_beacon_sequence, encode_conveyor_command,
    ANALOGUE_FRAME_LEN, DIGITAL_FRAME_LEN, READ_ANALOGUE, READ_DIGITAL,
};
use crate::gateway::{request_response, send_command, send_sequence, DeviceAddress, COMMAND_GAP};
use crate::metrics::{DEVICE_FAILURES, FRAME_ERRORS};
use conveyor_spine::{
    AnalogueReading, BeaconColour, CellError, CellIO, ConveyorCommand, DigitalInputs, Result,
};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// The three field panels of one cell.
#[derive(Debug, Clone)]
pub struct PanelAddresses {
    /// Start/stop buttons; also carries the beacon outputs.
    pub button_panel: DeviceAddress,
    /// Enable and fault inputs; also carries the conveyor contactor output.
    pub enable_panel: DeviceAddress,
    pub analogue_panel: DeviceAddress,
}

/// Conveyor cell reached over the ASCII panel protocol.
pub struct AsciiCell {
    panels: PanelAddresses,
    command_gap: Duration,
    last_write: Option<Instant>,
}

impl AsciiCell {
    pub fn new(panels: PanelAddresses) -> Self {
        Self {
            panels,
            command_gap: COMMAND_GAP,
            last_write: None,
        }
    }

    /// Writes issued back to back (beacon then conveyor) keep the same
    /// turnaround gap as commands inside one sequence.
    fn wait_turnaround(&self) {
        if let Some(last) = self.last_write {
            let since = last.elapsed();
            if since < self.command_gap {
                thread::sleep(self.command_gap - since);
            }
        }
    }
}

fn counted<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_transport() {
            DEVICE_FAILURES.inc();
        } else if !matches!(e, CellError::InvalidAddress(_)) {
            FRAME_ERRORS.inc();
        }
    }
    result
}

fn read_digital(panel: &DeviceAddress) -> Result<DigitalInputs> {
    let frame = request_response(panel, READ_DIGITAL, DIGITAL_FRAME_LEN)?;
    decode_digital_panel(&frame)
}

impl CellIO for AsciiCell {
    fn read_button_panel(&mut self) -> Result<DigitalInputs> {
        counted(read_digital(&self.panels.button_panel))
    }

    fn read_enable_panel(&mut self) -> Result<DigitalInputs> {
        counted(read_digital(&self.panels.enable_panel))
    }

    fn read_analogue_panel(&mut self) -> Result<AnalogueReading> {
        counted(
            request_response(&self.panels.analogue_panel, READ_ANALOGUE, ANALOGUE_FRAME_LEN)
                .and_then(|frame| decode_analogue_panel(&frame)),
        )
    }

    fn write_beacon(&mut self, colour: BeaconColour) -> Result<()> {
        debug!(colour = %colour, panel = %self.panels.button_panel, "beacon write");
        let sequence = encode_beacon_sequence(colour);
        self.wait_turnaround();
        let result = send_sequence(&self.panels.button_panel, &sequence, self.command_gap);
        self.last_write = Some(Instant::now());
        counted(result)
    }

    fn write_conveyor(&mut self, command: ConveyorCommand) -> Result<()> {
        debug!(command = %command, panel = %self.panels.enable_panel, "conveyor write");
        self.wait_turnaround();
        let result = send_command(&self.panels.enable_panel, &encode_conveyor_command(command));
        self.last_write = Some(Instant::now());
        counted(result)
    }
}
