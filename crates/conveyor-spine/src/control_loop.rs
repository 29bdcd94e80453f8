use crate::hal::{AnalogueReading, CellIO, TelemetrySink};
use crate::process::{ProcessState, Sequencer, Step, DEFAULT_DWELL};
use crate::timebase::{Clock, TimeBase};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct ControlConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub cycle_time: Duration,
    pub dwell: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_time: Duration::from_millis(500),
            dwell: DEFAULT_DWELL,
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct CycleStats {
    pub cycles_executed: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub publish_failures: u64,
    pub last_cycle_us: u64,
    pub max_cycle_us: u64,
}

/// What one cycle observed, for callers that want to react per cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub state: ProcessState,
    pub sensors: Option<AnalogueReading>,
    pub transitioned: Option<Step>,
    pub published: bool,
}

/// Owns the process state and runs read -> decide -> act -> publish passes
/// strictly in sequence.
pub struct CellController<IO: CellIO, T: TelemetrySink> {
    io: IO,
    telemetry: T,
    config: ControlConfig,
    sequencer: Sequencer,
    state: ProcessState,
    clock: Box<dyn Clock>,
    stats: CycleStats,
}

impl<IO: CellIO, T: TelemetrySink> CellController<IO, T> {
    pub fn new(io: IO, telemetry: T, config: ControlConfig) -> Self {
        Self::with_clock(io, telemetry, config, Box::new(TimeBase::new()))
    }

    pub fn with_clock(io: IO, telemetry: T, config: ControlConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            io,
            telemetry,
            sequencer: Sequencer::new(config.dwell),
            config,
            state: ProcessState::default(),
            clock,
            stats: CycleStats::default(),
        }
    }

    /// Drives the outputs to step 0 before the first cycle.
    pub fn initialize(&mut self) {
        let eval = self
            .sequencer
            .initialize(&mut self.state, &mut self.io, self.clock.as_ref());
        self.stats.write_failures += u64::from(eval.write_failures);
    }

    pub fn run_cycle(&mut self) -> CycleReport {
        let cycle_start = Instant::now();

        let eval = self
            .sequencer
            .evaluate(&mut self.state, &mut self.io, self.clock.as_ref());
        self.stats.read_failures += u64::from(eval.read_failures);
        self.stats.write_failures += u64::from(eval.write_failures);

        let sensors = match self.io.read_analogue_panel() {
            Ok(reading) => Some(reading),
            Err(e) => {
                self.stats.read_failures += 1;
                warn!("analogue panel read failed, sensors not published this cycle: {}", e);
                None
            }
        };

        let published = match self.telemetry.publish(&self.state, sensors.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                self.stats.publish_failures += 1;
                warn!("telemetry publish failed: {}", e);
                false
            }
        };

        let cycle_us = cycle_start.elapsed().as_micros() as u64;
        self.stats.last_cycle_us = cycle_us;
        self.stats.max_cycle_us = self.stats.max_cycle_us.max(cycle_us);
        self.stats.cycles_executed += 1;

        CycleReport {
            state: self.state,
            sensors,
            transitioned: eval.transitioned,
            published,
        }
    }

    /// Initializes, then cycles until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            "cycle loop starting: period {:?}, dwell {:?}",
            self.config.cycle_time,
            self.sequencer.dwell()
        );
        self.initialize();

        while !stop.load(Ordering::Relaxed) {
            self.run_cycle();
            thread::sleep(self.config.cycle_time);
        }

        info!("cycle loop stopped after {} cycles", self.stats.cycles_executed);
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }
}

#[cfg(all(test, feature = "simulation"))]
mod tests {
    use super::*;
    use crate::error::{CellError, Result};
    use crate::hal_sim::SimulatedCell;
    use crate::timebase::ManualClock;

    #[derive(Default)]
    struct RecordingSink {
        published: Vec<(ProcessState, Option<AnalogueReading>)>,
        fail: bool,
    }

    impl TelemetrySink for RecordingSink {
        fn publish(&mut self, state: &ProcessState, sensors: Option<&AnalogueReading>) -> Result<()> {
            if self.fail {
                return Err(CellError::PublishFailure("broker down".into()));
            }
            self.published.push((*state, sensors.copied()));
            Ok(())
        }
    }

    fn controller() -> (CellController<SimulatedCell, RecordingSink>, ManualClock) {
        let clock = ManualClock::new();
        let mut ctl = CellController::with_clock(
            SimulatedCell::new(),
            RecordingSink::default(),
            ControlConfig::default(),
            Box::new(clock.clone()),
        );
        ctl.initialize();
        (ctl, clock)
    }

    #[test]
    fn enable_timeout_still_reads_sensors_and_publishes() {
        let (mut ctl, _clock) = controller();
        ctl.io_mut().set_enabled(true);
        ctl.io_mut().press(false, true);
        ctl.run_cycle();
        let before = *ctl.state();

        ctl.io_mut().fail_enable_reads(true);
        let report = ctl.run_cycle();
        assert_eq!(report.state.enabled, before.enabled);
        assert_eq!(report.state.running, before.running);
        assert!(report.sensors.is_some());
        assert!(report.published);
        assert_eq!(ctl.telemetry().published.len(), 2);
        assert_eq!(ctl.stats().read_failures, 1);
    }

    #[test]
    fn sensor_failure_publishes_state_only() {
        let (mut ctl, _clock) = controller();
        ctl.io_mut().fail_analogue_reads(true);
        let report = ctl.run_cycle();
        assert!(report.sensors.is_none());
        let (_, sensors) = ctl.telemetry().published[0];
        assert!(sensors.is_none());
    }

    #[test]
    fn sensor_snapshot_is_published_with_state() {
        let (mut ctl, _clock) = controller();
        let reading = AnalogueReading {
            supply_voltage: 370.35,
            supply_current: 4.2,
            motor_temperature: 41.2,
            motor_vibration: 1.5,
        };
        ctl.io_mut().set_analogue(reading);
        ctl.run_cycle();
        let (state, sensors) = ctl.telemetry().published[0];
        assert_eq!(state.step, Step::Stopped);
        assert_eq!(sensors, Some(reading));
    }

    #[test]
    fn publish_failure_does_not_roll_back_state() {
        let (mut ctl, _clock) = controller();
        ctl.telemetry.fail = true;
        ctl.io_mut().set_enabled(true);
        ctl.io_mut().press(false, true);
        let report = ctl.run_cycle();
        assert!(!report.published);
        assert_eq!(report.state.step, Step::Transitioning);
        assert_eq!(ctl.stats().publish_failures, 1);
    }

    #[test]
    fn full_sequence_reaches_running() {
        let (mut ctl, clock) = controller();
        ctl.io_mut().set_enabled(true);
        ctl.io_mut().press(false, true);
        assert_eq!(ctl.run_cycle().transitioned, Some(Step::Transitioning));
        clock.advance(Duration::from_secs(1));
        assert_eq!(ctl.run_cycle().transitioned, None);
        clock.advance(Duration::from_secs(1));
        assert_eq!(ctl.run_cycle().transitioned, Some(Step::Running));
        assert_eq!(ctl.io().conveyor(), crate::hal::ConveyorCommand::Run);
        assert_eq!(ctl.stats().cycles_executed, 3);
    }
}
