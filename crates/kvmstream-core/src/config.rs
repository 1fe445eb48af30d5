use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::Orientation;

/// Tunables shared by both streamer strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// WebSocket endpoint of the media (H.264) transport.
    #[serde(alias = "mediaUrl")]
    pub media_url: String,
    /// Path of the multipart JPEG resource.
    #[serde(alias = "streamPath")]
    pub stream_path: String,
    /// Neutral image shown while the polling streamer is idle.
    pub placeholder: String,
    /// Cookie the server sets to `<key>/<clientId>`.
    #[serde(alias = "cookieName")]
    pub cookie_name: String,
    #[serde(alias = "heartbeatIntervalMs")]
    pub heartbeat_interval_ms: u64,
    /// Missed pongs before the connection is declared dead.
    #[serde(alias = "heartbeatMissLimit")]
    pub heartbeat_miss_limit: u32,
    #[serde(alias = "reconnectDelayMs")]
    pub reconnect_delay_ms: u64,
    /// Longest wait for the socket and its handshake to open.
    #[serde(alias = "connectTimeoutMs")]
    pub connect_timeout_ms: u64,
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    /// Polling ticks allowed before the stream resource is re-requested.
    #[serde(alias = "pollRetryBudget")]
    pub poll_retry_budget: u32,
    pub orientation: Orientation,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            media_url: "ws://localhost/api/media/ws".into(),
            stream_path: "/streamer/stream".into(),
            placeholder: "/share/png/blank-stream.png".into(),
            cookie_name: "stream_client".into(),
            heartbeat_interval_ms: 1_000,
            heartbeat_miss_limit: 5,
            reconnect_delay_ms: 1_000,
            connect_timeout_ms: 5_000,
            poll_interval_ms: 100,
            poll_retry_budget: 10,
            orientation: Orientation::Deg0,
        }
    }
}

impl StreamerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "heartbeat_interval_ms" });
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "reconnect_delay_ms" });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "connect_timeout_ms" });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "poll_interval_ms" });
        }
        if self.heartbeat_miss_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "heartbeat_miss_limit",
                reason: "must allow at least one missed beat".into(),
            });
        }
        if !(self.media_url.starts_with("ws://") || self.media_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                field: "media_url",
                reason: format!("expected ws:// or wss:// scheme, got {}", self.media_url),
            });
        }
        Ok(())
    }
}
