use thiserror::Error;

/// Every failure a cycle stage can report.
///
/// Device and publish errors are never fatal: the scheduler logs them and
/// falls back to the last known value for that stage.
#[derive(Debug, Error)]
pub enum CellError {
    #[error("could not connect to {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no response from {addr} within {timeout_ms} ms")]
    Timeout { addr: String, timeout_ms: u64 },

    #[error("{addr} closed the connection without responding")]
    EmptyResponse { addr: String },

    #[error("unexpected frame length: expected {expected} bytes, got {actual}")]
    UnexpectedFrameLength { expected: usize, actual: usize },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("could not parse {channel} field {raw:?}")]
    NumericParseError { channel: &'static str, raw: String },

    #[error("invalid beacon colour {0:?}")]
    InvalidBeaconColour(String),

    #[error("invalid conveyor state {0:?}")]
    InvalidConveyorState(String),

    #[error("telemetry publish failed: {0}")]
    PublishFailure(String),

    #[error("invalid device address {0:?}")]
    InvalidAddress(String),
}

impl CellError {
    /// Transport-level failures, as opposed to decode failures on a frame
    /// that did arrive.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CellError::ConnectFailure { .. } | CellError::Timeout { .. } | CellError::EmptyResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CellError>;
