use thiserror::Error;

/// Failure to build a streamer from its settings. Runtime faults never
/// surface as errors; streamers report them through their callbacks.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Config file {path} is malformed: {reason}")]
    MalformedConfig { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecoderError {
    #[error("No decoder available for codec {codec}")]
    Unsupported { codec: String },

    #[error("Platform has no video decode capability")]
    CapabilityMissing,

    #[error("Failed to decode frame: {reason}")]
    DecodeFailed { reason: String },

    #[error("Decoder not configured")]
    NotConfigured,

    #[error("GStreamer pipeline error: {0}")]
    GStreamerPipeline(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Connect failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },

    #[error("Malformed message: {reason}")]
    Malformed { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("orientation must be 0, 90, 180 or 270 (got {degrees})")]
    InvalidOrientation { degrees: u16 },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("{field} is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
