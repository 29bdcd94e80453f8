use crate::runtime::config::{ConfigError, RuntimeConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry::{self, MetricsSink};
use conveyor_io::{AsciiCell, LogClient, MqttClient, OutboundMessage, PubSubClient, Publisher};
use conveyor_spine::{
    AnalogueReading, BeaconColour, CellController, CellError, CellIO, ConveyorCommand,
    DigitalInputs, Result, SimulatedCell,
};
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("telemetry client: {0}")]
    Telemetry(#[from] CellError),

    #[error("control thread panicked")]
    ControlThread,
}

enum ConveyorCell {
    Simulated(SimulatedCell),
    Ascii(AsciiCell),
}

impl CellIO for ConveyorCell {
    fn read_button_panel(&mut self) -> Result<DigitalInputs> {
        match self {
            Self::Simulated(c) => c.read_button_panel(),
            Self::Ascii(c) => c.read_button_panel(),
        }
    }

    fn read_enable_panel(&mut self) -> Result<DigitalInputs> {
        match self {
            Self::Simulated(c) => c.read_enable_panel(),
            Self::Ascii(c) => c.read_enable_panel(),
        }
    }

    fn read_analogue_panel(&mut self) -> Result<AnalogueReading> {
        match self {
            Self::Simulated(c) => c.read_analogue_panel(),
            Self::Ascii(c) => c.read_analogue_panel(),
        }
    }

    fn write_beacon(&mut self, colour: BeaconColour) -> Result<()> {
        match self {
            Self::Simulated(c) => c.write_beacon(colour),
            Self::Ascii(c) => c.write_beacon(colour),
        }
    }

    fn write_conveyor(&mut self, command: ConveyorCommand) -> Result<()> {
        match self {
            Self::Simulated(c) => c.write_conveyor(command),
            Self::Ascii(c) => c.write_conveyor(command),
        }
    }
}

enum BrokerClient {
    Mqtt(MqttClient),
    Log(LogClient),
}

impl PubSubClient for BrokerClient {
    fn publish_batch(&mut self, messages: &[OutboundMessage]) -> Result<()> {
        match self {
            Self::Mqtt(c) => c.publish_batch(messages),
            Self::Log(c) => c.publish_batch(messages),
        }
    }
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("conveyor-plc: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Controller stopped");
            ExitCode::FAILURE
        }
    }
}

/// Runs the controller until `--run-seconds` elapses, or forever. Tracing
/// must already be initialized.
pub fn run(config: RuntimeConfig) -> std::result::Result<(), RuntimeError> {
    // Addresses are validated before anything starts.
    let cell = if config.simulate {
        info!("Using simulated conveyor cell");
        ConveyorCell::Simulated(SimulatedCell::demo())
    } else {
        let panels = config.panels()?;
        info!(
            button_panel = %panels.button_panel,
            enable_panel = %panels.enable_panel,
            analogue_panel = %panels.analogue_panel,
            timeout_ms = config.device_timeout_ms,
            "Using ASCII panels"
        );
        ConveyorCell::Ascii(AsciiCell::new(panels))
    };
    let client = match config.broker_address()? {
        Some(broker) => {
            info!(
                broker = %broker,
                client_id = %config.client_id,
                qos = config.qos,
                retain = config.retain,
                "Publishing telemetry over MQTT"
            );
            BrokerClient::Mqtt(MqttClient::connect(&broker, &config.client_id)?)
        }
        None => {
            info!("No broker configured; telemetry goes to the debug log");
            BrokerClient::Log(LogClient)
        }
    };

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let control_config = config.control_config();
    let sink = MetricsSink::new(Publisher::new(client, config.topics()));
    let stop = Arc::new(AtomicBool::new(false));
    let stop_control = Arc::clone(&stop);

    info!(
        cycle_ms = config.cycle_ms,
        dwell_ms = config.dwell_ms,
        "Starting conveyor control loop"
    );

    let control_handle = thread::spawn(move || {
        let mut controller = CellController::new(cell, sink, control_config);
        controller.run(&stop_control);
        controller.stats().clone()
    });

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    let stats = control_handle
        .join()
        .map_err(|_| RuntimeError::ControlThread)?;
    info!(
        cycles_executed = stats.cycles_executed,
        read_failures = stats.read_failures,
        write_failures = stats.write_failures,
        publish_failures = stats.publish_failures,
        max_cycle_us = stats.max_cycle_us,
        "Run complete"
    );
    Ok(())
}
