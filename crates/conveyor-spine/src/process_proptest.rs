#[cfg(all(test, feature = "simulation"))]
mod proptest_process {
    use crate::hal::ConveyorCommand;
    use crate::hal_sim::SimulatedCell;
    use crate::process::*;
    use crate::timebase::{Clock, ManualClock};
    use proptest::prelude::*;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Tick {
        enabled: bool,
        stop: bool,
        start: bool,
        enable_read_fails: bool,
        button_read_fails: bool,
        advance_ms: u64,
    }

    fn tick() -> impl Strategy<Value = Tick> {
        (
            prop::bool::weighted(0.8),
            any::<bool>(),
            any::<bool>(),
            prop::bool::weighted(0.1),
            prop::bool::weighted(0.1),
            0u64..1500,
        )
            .prop_map(
                |(enabled, stop, start, enable_read_fails, button_read_fails, advance_ms)| Tick {
                    enabled,
                    stop,
                    start,
                    enable_read_fails,
                    button_read_fails,
                    advance_ms,
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        // Property: over any input history the state and outputs stay coherent
        #[test]
        fn sequence_invariants_hold(ticks in prop::collection::vec(tick(), 1..60)) {
            let mut cell = SimulatedCell::new();
            let clock = ManualClock::new();
            let mut seq = Sequencer::default();
            let mut state = ProcessState::default();
            seq.initialize(&mut state, &mut cell, &clock);
            let mut step_one_entered = Duration::ZERO;

            for t in ticks {
                clock.advance(Duration::from_millis(t.advance_ms));
                cell.set_enabled(t.enabled);
                cell.press(t.stop, t.start);
                cell.fail_enable_reads(t.enable_read_fails);
                cell.fail_button_reads(t.button_read_fails);

                let before = state;
                seq.evaluate(&mut state, &mut cell, &clock);

                prop_assert!(!state.running || state.enabled, "running without enable: {:?}", state);

                // Forward by one, unchanged, or reset to 0.
                let (from, to) = (before.step.ordinal(), state.step.ordinal());
                prop_assert!(to == 0 || to == from || to == from + 1, "step {} -> {}", from, to);

                if state.step == Step::Transitioning && before.step != Step::Transitioning {
                    step_one_entered = clock.now();
                }
                if state.step == Step::Running && before.step == Step::Transitioning {
                    prop_assert!(clock.now() - step_one_entered >= DEFAULT_DWELL);
                }

                prop_assert_eq!(cell.beacon(), Some(state.beacon()));
                prop_assert_eq!(cell.conveyor(), state.conveyor());
                if state.step != Step::Running {
                    prop_assert_eq!(cell.conveyor(), ConveyorCommand::Stop);
                }
            }
        }

        // Property: a read failure on the enable panel never changes enable or run
        #[test]
        fn enable_read_failure_freezes_state(
            history in prop::collection::vec(tick(), 0..20),
            enabled in any::<bool>(),
            stop in any::<bool>(),
            start in any::<bool>(),
        ) {
            let mut cell = SimulatedCell::new();
            let clock = ManualClock::new();
            let mut seq = Sequencer::default();
            let mut state = ProcessState::default();
            seq.initialize(&mut state, &mut cell, &clock);
            for t in history {
                clock.advance(Duration::from_millis(t.advance_ms));
                cell.set_enabled(t.enabled);
                cell.press(t.stop, t.start);
                seq.evaluate(&mut state, &mut cell, &clock);
            }

            let before = state;
            cell.set_enabled(enabled);
            cell.press(stop, start);
            cell.fail_enable_reads(true);
            cell.fail_button_reads(true);
            seq.evaluate(&mut state, &mut cell, &clock);

            prop_assert_eq!(state.enabled, before.enabled);
            prop_assert_eq!(state.running, before.running);
        }
    }
}
