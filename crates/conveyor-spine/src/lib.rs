pub mod control_loop;
pub mod error;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod process;
mod process_proptest;
pub mod tags;
pub mod timebase;

pub use control_loop::{CellController, ControlConfig, CycleReport, CycleStats};
pub use error::{CellError, Result};
pub use hal::{AnalogueReading, BeaconColour, CellIO, ConveyorCommand, DigitalInputs, TelemetrySink};
#[cfg(feature = "simulation")]
pub use hal_sim::{OutputWrite, SimulatedCell};
pub use process::{Faults, ProcessState, Sequencer, Step};
pub use timebase::{Clock, ManualClock, TimeBase};
