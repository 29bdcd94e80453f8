use conveyor_io::{DeviceAddress, PanelAddresses, TopicConfig};
use conveyor_spine::{CellError, ControlConfig};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("option {0} needs a value")]
    MissingValue(String),

    #[error("invalid value {value:?} for {option}")]
    InvalidValue { option: String, value: String },

    #[error("unknown option {0}")]
    UnknownOption(String),

    #[error(transparent)]
    Device(#[from] CellError),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub simulate: bool,
    pub button_panel: String,
    pub enable_panel: String,
    pub analogue_panel: String,
    pub device_timeout_ms: u64,
    pub cycle_ms: u64,
    pub dwell_ms: u64,
    pub broker: Option<String>,
    pub state_topic: String,
    pub sensors_topic: String,
    pub qos: u8,
    pub retain: bool,
    pub client_id: String,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let topics = TopicConfig::default();
        Self {
            show_help: false,
            run_seconds: None,
            simulate: false,
            button_panel: "192.168.1.10:1025".to_string(),
            enable_panel: "192.168.1.11:1025".to_string(),
            analogue_panel: "192.168.1.12:1025".to_string(),
            device_timeout_ms: 1000,
            cycle_ms: 500,
            dwell_ms: 2000,
            broker: None,
            state_topic: topics.state_topic,
            sensors_topic: topics.sensors_topic,
            qos: topics.qos,
            retain: topics.retain,
            client_id: "conveyor-plc".to_string(),
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
        }
    }
}

fn number(option: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(option, value))
}

fn invalid(option: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

fn qos_level(option: &str, value: &str) -> Result<u8, ConfigError> {
    match value {
        "0" => Ok(0),
        "1" => Ok(1),
        "2" => Ok(2),
        _ => Err(invalid(option, value)),
    }
}

/// MQTT client ids must be non-empty and may not start with a space.
fn client_id(option: &str, value: String) -> Result<String, ConfigError> {
    if value.is_empty() || value.starts_with(' ') {
        return Err(invalid(option, &value));
    }
    Ok(value)
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let option = arg.as_str();
            let mut value = || {
                iter.next()
                    .cloned()
                    .ok_or_else(|| ConfigError::MissingValue(option.to_string()))
            };
            match option {
                "--run-seconds" => cfg.run_seconds = Some(number(option, &value()?)?),
                "--simulate" => cfg.simulate = true,
                "--button-panel" => cfg.button_panel = value()?,
                "--enable-panel" => cfg.enable_panel = value()?,
                "--analogue-panel" => cfg.analogue_panel = value()?,
                "--device-timeout-ms" => cfg.device_timeout_ms = number(option, &value()?)?,
                "--cycle-ms" => cfg.cycle_ms = number(option, &value()?)?,
                "--dwell-ms" => cfg.dwell_ms = number(option, &value()?)?,
                "--broker" => cfg.broker = Some(value()?),
                "--state-topic" => cfg.state_topic = value()?,
                "--sensors-topic" => cfg.sensors_topic = value()?,
                "--qos" => cfg.qos = qos_level(option, &value()?)?,
                "--retain" => cfg.retain = true,
                "--client-id" => cfg.client_id = client_id(option, value()?)?,
                "--json-logs" => cfg.json_logs = true,
                "--log-dir" => cfg.log_dir = Some(PathBuf::from(value()?)),
                "--metrics-addr" => cfg.metrics_addr = Some(value()?),
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
        }
        Ok(cfg)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    /// Parses all three panel addresses. Any bad address is fatal.
    pub fn panels(&self) -> Result<PanelAddresses, ConfigError> {
        let timeout = self.device_timeout();
        Ok(PanelAddresses {
            button_panel: DeviceAddress::parse(&self.button_panel, timeout)?,
            enable_panel: DeviceAddress::parse(&self.enable_panel, timeout)?,
            analogue_panel: DeviceAddress::parse(&self.analogue_panel, timeout)?,
        })
    }

    pub fn broker_address(&self) -> Result<Option<DeviceAddress>, ConfigError> {
        self.broker
            .as_deref()
            .map(|addr| DeviceAddress::parse(addr, self.device_timeout()))
            .transpose()
            .map_err(ConfigError::from)
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            cycle_time: Duration::from_millis(self.cycle_ms),
            dwell: Duration::from_millis(self.dwell_ms),
        }
    }

    pub fn topics(&self) -> TopicConfig {
        TopicConfig {
            state_topic: self.state_topic.clone(),
            sensors_topic: self.sensors_topic.clone(),
            qos: self.qos,
            retain: self.retain,
        }
    }

    pub fn print_help() {
        println!(
            r#"conveyor-plc - Conveyor cell sequencing controller

USAGE:
    conveyor-plc [OPTIONS]

OPTIONS:
    --button-panel <ADDR>     Start/stop button + beacon panel [default: 192.168.1.10:1025]
    --enable-panel <ADDR>     Enable/fault + conveyor contactor panel [default: 192.168.1.11:1025]
    --analogue-panel <ADDR>   Analogue transducer panel [default: 192.168.1.12:1025]
    --device-timeout-ms <MS>  Connect/response timeout per device transaction [default: 1000]
    --cycle-ms <MS>           Sleep between cycles [default: 500]
    --dwell-ms <MS>           Minimum hold of the amber step before running [default: 2000]
    --broker <ADDR>           MQTT broker for telemetry; logs telemetry if omitted
    --state-topic <TOPIC>     Topic for state messages [default: conveyor/state]
    --sensors-topic <TOPIC>   Topic for sensor messages [default: conveyor/sensors]
    --qos <0|1|2>             MQTT QoS for telemetry [default: 0]
    --retain                  Publish telemetry with the retain flag set
    --client-id <ID>          MQTT client id [default: conveyor-plc]
    --simulate                Run against an in-memory cell instead of the panels
    --run-seconds <SECS>      Run for a fixed duration then exit
    --json-logs               Output logs in JSON format (for log aggregation)
    --log-dir <DIR>           Also write JSON logs to a daily rolling file in DIR
    --metrics-addr <ADDR>     Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log filter (e.g., RUST_LOG=debug,conveyor_io=trace)

EXAMPLES:
    # Bench run against the simulated cell
    conveyor-plc --simulate --run-seconds 10

    # Production run with MQTT telemetry and metrics
    conveyor-plc --broker 10.0.0.5:1883 --metrics-addr 0.0.0.0:9090 --json-logs
"#
        );
    }
}
