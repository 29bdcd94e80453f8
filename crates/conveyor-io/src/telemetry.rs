use crate::gateway::DeviceAddress;
use crate::metrics::PUBLISH_FAILURES;
use conveyor_spine::{AnalogueReading, CellError, ProcessState, Result, TelemetrySink};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Publishes queued ahead of the MQTT event loop before `publish_batch`
/// starts failing.
const OUTGOING_CAPACITY: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateMsg {
    pub enable_state: bool,
    pub run_state: bool,
    pub step: u8,
    pub voltage_fault: bool,
    pub current_fault: bool,
    pub temperature_fault: bool,
    pub vibration_fault: bool,
}

impl From<&ProcessState> for StateMsg {
    fn from(state: &ProcessState) -> Self {
        Self {
            enable_state: state.enabled,
            run_state: state.running,
            step: state.step.ordinal(),
            voltage_fault: state.faults.voltage,
            current_fault: state.faults.current,
            temperature_fault: state.faults.temperature,
            vibration_fault: state.faults.vibration,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SensorMsg {
    pub supply_voltage: f64,
    pub supply_current: f64,
    pub motor_temperature: f64,
    pub motor_vibration: f64,
}

impl From<&AnalogueReading> for SensorMsg {
    fn from(reading: &AnalogueReading) -> Self {
        Self {
            supply_voltage: reading.supply_voltage,
            supply_current: reading.supply_current,
            motor_temperature: reading.motor_temperature,
            motor_vibration: reading.motor_vibration,
        }
    }
}

/// One entry of a publish batch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

/// Best-effort batch publish to a broker.
pub trait PubSubClient {
    fn publish_batch(&mut self, messages: &[OutboundMessage]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub state_topic: String,
    pub sensors_topic: String,
    pub qos: u8,
    pub retain: bool,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            state_topic: "conveyor/state".to_string(),
            sensors_topic: "conveyor/sensors".to_string(),
            qos: 0,
            retain: false,
        }
    }
}

/// Turns each cycle's state and sensor snapshot into one publish batch.
pub struct Publisher<C: PubSubClient> {
    client: C,
    topics: TopicConfig,
}

impl<C: PubSubClient> Publisher<C> {
    pub fn new(client: C, topics: TopicConfig) -> Self {
        Self { client, topics }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn message<T: Serialize>(&self, topic: &str, body: &T) -> Result<OutboundMessage> {
        let payload =
            serde_json::to_string(body).map_err(|e| CellError::PublishFailure(e.to_string()))?;
        Ok(OutboundMessage {
            topic: topic.to_string(),
            payload,
            qos: self.topics.qos,
            retain: self.topics.retain,
        })
    }

    /// State message always; sensor message only when a reading exists.
    pub fn build_batch(
        &self,
        state: &ProcessState,
        sensors: Option<&AnalogueReading>,
    ) -> Result<Vec<OutboundMessage>> {
        let mut batch = vec![self.message(&self.topics.state_topic, &StateMsg::from(state))?];
        if let Some(reading) = sensors {
            batch.push(self.message(&self.topics.sensors_topic, &SensorMsg::from(reading))?);
        }
        Ok(batch)
    }
}

impl<C: PubSubClient> TelemetrySink for Publisher<C> {
    fn publish(&mut self, state: &ProcessState, sensors: Option<&AnalogueReading>) -> Result<()> {
        let batch = self.build_batch(state, sensors)?;
        self.client.publish_batch(&batch).inspect_err(|_| PUBLISH_FAILURES.inc())
    }
}

/// Maps a configured QoS level onto the MQTT delivery guarantee.
pub fn qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(CellError::PublishFailure(format!("unsupported QoS level {other}"))),
    }
}

/// MQTT 3.1.1 publisher.
///
/// The network event loop runs on its own thread and reconnects after
/// errors. Publishing only queues the message, so a slow or absent broker
/// never stalls the control cycle; a full queue is reported as a publish
/// failure.
pub struct MqttClient {
    client: Client,
    broker: String,
}

impl MqttClient {
    pub fn connect(broker: &DeviceAddress, client_id: &str) -> Result<Self> {
        let mut options = MqttOptions::new(client_id, broker.host(), broker.port());
        options.set_keep_alive(KEEP_ALIVE);
        let (client, mut connection) = Client::new(options, OUTGOING_CAPACITY);

        let name = broker.to_string();
        thread::Builder::new()
            .name("mqtt-event-loop".into())
            .spawn(move || {
                for event in connection.iter() {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(broker = %name, "Connected to MQTT broker")
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(broker = %name, error = %e, "MQTT connection error, retrying");
                            thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
                debug!(broker = %name, "MQTT event loop finished");
            })
            .map_err(|e| CellError::PublishFailure(format!("mqtt event loop: {e}")))?;

        Ok(Self {
            client,
            broker: broker.to_string(),
        })
    }
}

impl PubSubClient for MqttClient {
    fn publish_batch(&mut self, messages: &[OutboundMessage]) -> Result<()> {
        for msg in messages {
            self.client
                .try_publish(
                    msg.topic.as_str(),
                    qos(msg.qos)?,
                    msg.retain,
                    msg.payload.as_bytes(),
                )
                .map_err(|e| CellError::PublishFailure(format!("broker {}: {}", self.broker, e)))?;
        }
        Ok(())
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        let _ = self.client.disconnect();
    }
}

/// Logs messages instead of sending them. Used when no broker is configured.
#[derive(Debug, Default)]
pub struct LogClient;

impl PubSubClient for LogClient {
    fn publish_batch(&mut self, messages: &[OutboundMessage]) -> Result<()> {
        for msg in messages {
            debug!(topic = %msg.topic, payload = %msg.payload, "telemetry");
        }
        Ok(())
    }
}
