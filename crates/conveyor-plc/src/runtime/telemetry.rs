use conveyor_io::metrics::{
    init_metrics, serve_metrics, CURRENT_FAULT, CYCLES_EXECUTED, ENABLED, MOTOR_TEMPERATURE,
    MOTOR_VIBRATION, RUNNING, STEP, SUPPLY_CURRENT, SUPPLY_VOLTAGE, TEMPERATURE_FAULT,
    VIBRATION_FAULT, VOLTAGE_FAULT,
};
use conveyor_spine::{AnalogueReading, ProcessState, Result, TelemetrySink};
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Mirrors every published cycle into the Prometheus gauges before handing
/// it to the wrapped sink.
pub struct MetricsSink<S: TelemetrySink> {
    inner: S,
}

impl<S: TelemetrySink> MetricsSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: TelemetrySink> TelemetrySink for MetricsSink<S> {
    fn publish(&mut self, state: &ProcessState, sensors: Option<&AnalogueReading>) -> Result<()> {
        CYCLES_EXECUTED.inc();
        ENABLED.set(flag(state.enabled));
        RUNNING.set(flag(state.running));
        STEP.set(f64::from(state.step.ordinal()));
        VOLTAGE_FAULT.set(flag(state.faults.voltage));
        CURRENT_FAULT.set(flag(state.faults.current));
        TEMPERATURE_FAULT.set(flag(state.faults.temperature));
        VIBRATION_FAULT.set(flag(state.faults.vibration));
        if let Some(reading) = sensors {
            SUPPLY_VOLTAGE.set(reading.supply_voltage);
            SUPPLY_CURRENT.set(reading.supply_current);
            MOTOR_TEMPERATURE.set(reading.motor_temperature);
            MOTOR_VIBRATION.set(reading.motor_vibration);
        }
        self.inner.publish(state, sensors)
    }
}
