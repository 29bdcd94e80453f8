//! Run/enable/step sequencing for the conveyor.
//!
//! The sequence is `Stopped -> Transitioning -> Running`. Step 0 is
//! re-entered whenever `running` drops, from whatever step was active.

use crate::hal::{
    buttons, permissives, BeaconColour, CellIO, ConveyorCommand, DigitalInputs,
};
use crate::timebase::Clock;
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_DWELL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    Stopped,
    Transitioning,
    Running,
}

/// A single actuator write performed when a step is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Beacon(BeaconColour),
    Conveyor(ConveyorCommand),
}

impl Step {
    pub fn ordinal(&self) -> u8 {
        match self {
            Step::Stopped => 0,
            Step::Transitioning => 1,
            Step::Running => 2,
        }
    }

    pub fn beacon(&self) -> BeaconColour {
        match self {
            Step::Stopped => BeaconColour::Red,
            Step::Transitioning => BeaconColour::Amber,
            Step::Running => BeaconColour::Green,
        }
    }

    /// Writes issued on entry, in order. The conveyor is stopped before the
    /// beacon goes red and started only after it goes green.
    pub fn actions(&self) -> &'static [Action] {
        match self {
            Step::Stopped => &[
                Action::Conveyor(ConveyorCommand::Stop),
                Action::Beacon(BeaconColour::Red),
            ],
            Step::Transitioning => &[Action::Beacon(BeaconColour::Amber)],
            Step::Running => &[
                Action::Beacon(BeaconColour::Green),
                Action::Conveyor(ConveyorCommand::Run),
            ],
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ordinal())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    pub voltage: bool,
    pub current: bool,
    pub temperature: bool,
    pub vibration: bool,
}

impl Faults {
    pub fn from_inputs(inputs: &DigitalInputs) -> Self {
        Self {
            voltage: inputs.bit(permissives::VOLTAGE_FAULT),
            current: inputs.bit(permissives::CURRENT_FAULT),
            temperature: inputs.bit(permissives::TEMPERATURE_FAULT),
            vibration: inputs.bit(permissives::VIBRATION_FAULT),
        }
    }

    pub fn any(&self) -> bool {
        self.voltage || self.current || self.temperature || self.vibration
    }
}

/// The only state carried between cycles.
///
/// `running` is never true while `enabled` is false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessState {
    pub enabled: bool,
    pub running: bool,
    pub step: Step,
    pub faults: Faults,
}

impl ProcessState {
    pub fn beacon(&self) -> BeaconColour {
        self.step.beacon()
    }

    pub fn conveyor(&self) -> ConveyorCommand {
        if self.running && self.step == Step::Running {
            ConveyorCommand::Run
        } else {
            ConveyorCommand::Stop
        }
    }
}

/// Definitive run request from the button panel. Both or neither pressed is
/// ambiguous and yields `None`.
pub fn run_request(inputs: &DigitalInputs) -> Option<bool> {
    match (inputs.bit(buttons::STOP), inputs.bit(buttons::START)) {
        (true, false) => Some(false),
        (false, true) => Some(true),
        _ => None,
    }
}

/// Failures seen during one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub read_failures: u32,
    pub write_failures: u32,
    pub transitioned: Option<Step>,
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    dwell: Duration,
    step_entered: Duration,
}

impl Sequencer {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            step_entered: Duration::ZERO,
        }
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Forces step 0 and executes its action. Called once before the first
    /// cycle.
    pub fn initialize<IO: CellIO>(
        &mut self,
        state: &mut ProcessState,
        io: &mut IO,
        clock: &dyn Clock,
    ) -> Evaluation {
        *state = ProcessState::default();
        let mut eval = Evaluation::default();
        self.enter(Step::Stopped, state, io, clock, &mut eval);
        eval
    }

    /// One pass of the run/enable/step rules.
    pub fn evaluate<IO: CellIO>(
        &mut self,
        state: &mut ProcessState,
        io: &mut IO,
        clock: &dyn Clock,
    ) -> Evaluation {
        let mut eval = Evaluation::default();
        let was_running = state.running;

        match io.read_enable_panel() {
            Ok(inputs) => {
                state.enabled = inputs.bit(permissives::ENABLE);
                state.faults = Faults::from_inputs(&inputs);
            }
            Err(e) => {
                eval.read_failures += 1;
                warn!("enable panel read failed, holding enabled={}: {}", state.enabled, e);
            }
        }

        if state.enabled {
            match io.read_button_panel() {
                Ok(inputs) => {
                    if let Some(run) = run_request(&inputs) {
                        state.running = run;
                    }
                }
                Err(e) => {
                    eval.read_failures += 1;
                    warn!("button panel read failed, holding running={}: {}", state.running, e);
                }
            }
        } else {
            state.running = false;
        }

        if was_running && !state.running {
            info!(
                "run dropped at step {} (enabled={}), resetting to step 0",
                state.step, state.enabled
            );
            self.enter(Step::Stopped, state, io, clock, &mut eval);
            return eval;
        }

        if !state.running {
            return eval;
        }

        match state.step {
            Step::Stopped => self.enter(Step::Transitioning, state, io, clock, &mut eval),
            Step::Transitioning => {
                let held = clock.now().saturating_sub(self.step_entered);
                if held >= self.dwell {
                    self.enter(Step::Running, state, io, clock, &mut eval);
                } else {
                    debug!("step 1 dwell {:?} of {:?}", held, self.dwell);
                }
            }
            Step::Running => {}
        }
        eval
    }

    fn enter<IO: CellIO>(
        &mut self,
        step: Step,
        state: &mut ProcessState,
        io: &mut IO,
        clock: &dyn Clock,
        eval: &mut Evaluation,
    ) {
        state.step = step;
        for action in step.actions() {
            let result = match *action {
                Action::Beacon(colour) => io.write_beacon(colour),
                Action::Conveyor(command) => io.write_conveyor(command),
            };
            if let Err(e) = result {
                eval.write_failures += 1;
                warn!("step {} action {:?} failed: {}", step, action, e);
            }
        }
        self.step_entered = clock.now();
        eval.transitioned = Some(step);
        info!("entered step {} (beacon {})", step, step.beacon());
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(DEFAULT_DWELL)
    }
}

#[cfg(all(test, feature = "simulation"))]
mod tests {
    use super::*;
    use crate::hal_sim::{OutputWrite, SimulatedCell};
    use crate::timebase::ManualClock;

    struct Rig {
        cell: SimulatedCell,
        clock: ManualClock,
        seq: Sequencer,
        state: ProcessState,
    }

    impl Rig {
        fn new() -> Self {
            let mut rig = Self {
                cell: SimulatedCell::new(),
                clock: ManualClock::new(),
                seq: Sequencer::default(),
                state: ProcessState::default(),
            };
            rig.seq.initialize(&mut rig.state, &mut rig.cell, &rig.clock);
            rig.cell.take_writes();
            rig
        }

        fn cycle(&mut self) -> Evaluation {
            self.seq.evaluate(&mut self.state, &mut self.cell, &self.clock)
        }

        fn start(&mut self) {
            self.cell.set_enabled(true);
            self.cell.press(false, true);
            self.cycle();
            self.cell.press(false, false);
        }
    }

    #[test]
    fn initialize_stops_conveyor_then_lights_red() {
        let mut cell = SimulatedCell::new();
        let clock = ManualClock::new();
        let mut state = ProcessState {
            enabled: true,
            running: true,
            step: Step::Running,
            faults: Faults::default(),
        };
        Sequencer::default().initialize(&mut state, &mut cell, &clock);
        assert_eq!(state, ProcessState::default());
        assert_eq!(
            cell.take_writes(),
            vec![
                OutputWrite::Conveyor(ConveyorCommand::Stop),
                OutputWrite::Beacon(BeaconColour::Red)
            ]
        );
    }

    #[test]
    fn start_edge_enters_step_one_immediately() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.state.running);
        assert_eq!(rig.state.step, Step::Transitioning);
        assert_eq!(rig.cell.take_writes(), vec![OutputWrite::Beacon(BeaconColour::Amber)]);
    }

    #[test]
    fn step_two_waits_for_full_dwell() {
        let mut rig = Rig::new();
        rig.start();
        rig.cell.take_writes();

        rig.clock.advance(Duration::from_millis(1999));
        rig.cycle();
        assert_eq!(rig.state.step, Step::Transitioning);
        assert!(rig.cell.take_writes().is_empty());

        rig.clock.advance(Duration::from_millis(1));
        rig.cycle();
        assert_eq!(rig.state.step, Step::Running);
        assert_eq!(rig.state.conveyor(), ConveyorCommand::Run);
        assert_eq!(
            rig.cell.take_writes(),
            vec![
                OutputWrite::Beacon(BeaconColour::Green),
                OutputWrite::Conveyor(ConveyorCommand::Run)
            ]
        );

        rig.clock.advance(Duration::from_secs(10));
        rig.cycle();
        assert_eq!(rig.state.step, Step::Running);
        assert!(rig.cell.take_writes().is_empty());
    }

    #[test]
    fn enable_drop_resets_from_step_two() {
        let mut rig = Rig::new();
        rig.start();
        rig.clock.advance(DEFAULT_DWELL);
        rig.cycle();
        assert_eq!(rig.state.step, Step::Running);
        rig.cell.take_writes();

        rig.cell.set_enabled(false);
        rig.cell.press(false, true);
        rig.cycle();
        assert!(!rig.state.enabled);
        assert!(!rig.state.running);
        assert_eq!(rig.state.step, Step::Stopped);
        assert_eq!(
            rig.cell.take_writes(),
            vec![
                OutputWrite::Conveyor(ConveyorCommand::Stop),
                OutputWrite::Beacon(BeaconColour::Red)
            ]
        );
    }

    #[test]
    fn held_stop_only_acts_once() {
        let mut rig = Rig::new();
        rig.start();
        rig.cell.take_writes();

        rig.cell.press(true, false);
        rig.cycle();
        assert_eq!(rig.state.step, Step::Stopped);
        assert_eq!(rig.cell.take_writes().len(), 2);

        for _ in 0..3 {
            let eval = rig.cycle();
            assert_eq!(eval.transitioned, None);
        }
        assert!(rig.cell.take_writes().is_empty());
    }

    #[test]
    fn ambiguous_buttons_change_nothing() {
        let mut rig = Rig::new();
        rig.cell.set_enabled(true);
        rig.cell.press(true, true);
        rig.cycle();
        assert!(!rig.state.running);

        rig.start();
        rig.cell.press(true, true);
        rig.cycle();
        assert!(rig.state.running);
        rig.cell.press(false, false);
        rig.cycle();
        assert!(rig.state.running);
    }

    #[test]
    fn enable_read_failure_holds_previous_values() {
        let mut rig = Rig::new();
        rig.start();
        rig.cell.take_writes();

        rig.cell.set_enabled(false);
        rig.cell.fail_enable_reads(true);
        let eval = rig.cycle();
        assert_eq!(eval.read_failures, 1);
        assert!(rig.state.enabled);
        assert!(rig.state.running);
        assert_eq!(rig.state.step, Step::Transitioning);
    }

    #[test]
    fn button_read_failure_holds_running() {
        let mut rig = Rig::new();
        rig.start();
        rig.cell.press(true, false);
        rig.cell.fail_button_reads(true);
        let eval = rig.cycle();
        assert_eq!(eval.read_failures, 1);
        assert!(rig.state.running);
    }

    #[test]
    fn failed_writes_still_advance() {
        let mut rig = Rig::new();
        rig.cell.fail_writes(true);
        rig.cell.set_enabled(true);
        rig.cell.press(false, true);
        let eval = rig.cycle();
        assert_eq!(eval.write_failures, 1);
        assert_eq!(rig.state.step, Step::Transitioning);
        assert_eq!(rig.cell.beacon(), Some(BeaconColour::Red));
    }

    #[test]
    fn faults_follow_enable_panel() {
        let mut rig = Rig::new();
        rig.cell.set_enabled(true);
        rig.cell.set_fault(permissives::TEMPERATURE_FAULT, true);
        rig.cycle();
        assert!(rig.state.faults.temperature);
        assert!(!rig.state.faults.voltage);
        assert!(rig.state.faults.any());
    }

    #[test]
    fn conveyor_runs_only_in_step_two() {
        let mut state = ProcessState {
            enabled: true,
            running: true,
            step: Step::Transitioning,
            faults: Faults::default(),
        };
        assert_eq!(state.conveyor(), ConveyorCommand::Stop);
        assert_eq!(state.beacon(), BeaconColour::Amber);
        state.step = Step::Running;
        assert_eq!(state.conveyor(), ConveyorCommand::Run);
    }
}
