pub mod codec;
pub mod gateway;
pub mod hal_ascii;
pub mod metrics;
pub mod telemetry;

pub use gateway::{request_response, send_command, send_sequence, with_connection, DeviceAddress};
pub use hal_ascii::{AsciiCell, PanelAddresses};
pub use metrics::{init_metrics, serve_metrics};
pub use telemetry::{
    LogClient, MqttClient, OutboundMessage, PubSubClient, Publisher, SensorMsg, StateMsg,
    TopicConfig,
};
