use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// MARK: - Orientation

/// Fixed rotation applied to decoded frames before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Orientation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    pub const ALL: [Self; 4] = [Self::Deg0, Self::Deg90, Self::Deg180, Self::Deg270];

    pub fn from_degrees(degrees: u16) -> Result<Self, ConfigError> {
        match degrees {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            other => Err(ConfigError::InvalidOrientation { degrees: other }),
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn radians(&self) -> f64 {
        f64::from(self.degrees()).to_radians()
    }

    /// True when width and height trade places on screen.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl TryFrom<u16> for Orientation {
    type Error = ConfigError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees)
    }
}

impl From<Orientation> for u16 {
    fn from(orientation: Orientation) -> Self {
        orientation.degrees()
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

// MARK: - StreamerMode

/// Transport tag reported by `Streamer::mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamerMode {
    /// WebSocket binary transport with client-side H.264 decoding.
    #[serde(rename = "media")]
    Binary,
    /// HTTP multipart JPEG transport.
    #[serde(rename = "mjpeg")]
    Polling,
}

impl StreamerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "media",
            Self::Polling => "mjpeg",
        }
    }
}

impl std::fmt::Display for StreamerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// MARK: - ResolutionInfo

/// Media size versus laid-out size of the active surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionInfo {
    pub real_width: u32,
    pub real_height: u32,
    pub view_width: u32,
    pub view_height: u32,
}

impl ResolutionInfo {
    pub fn new(real: (u32, u32), view: (u32, u32)) -> Self {
        Self {
            real_width: real.0,
            real_height: real.1,
            view_width: view.0,
            view_height: view.1,
        }
    }
}

impl std::fmt::Display for ResolutionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}×{} (view {}×{})",
            self.real_width, self.real_height, self.view_width, self.view_height
        )
    }
}

// MARK: - ExternalStreamSnapshot

/// Per-client statistics reported by the stream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    /// Frames per second delivered to this client, `-1` when unknown.
    pub fps: i32,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self { fps: -1 }
    }
}

/// Periodic state pushed by the collaborator that watches the stream server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExternalStreamSnapshot {
    #[serde(alias = "online")]
    pub source_online: bool,
    #[serde(default)]
    pub clients: HashMap<String, ClientStats>,
}

impl ExternalStreamSnapshot {
    pub fn online() -> Self {
        Self { source_online: true, clients: HashMap::new() }
    }

    pub fn with_client(mut self, client_id: impl Into<String>, fps: i32) -> Self {
        self.clients.insert(client_id.into(), ClientStats { fps });
        self
    }

    pub fn client(&self, client_id: &str) -> Option<&ClientStats> {
        self.clients.get(client_id)
    }
}
