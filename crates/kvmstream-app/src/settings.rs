use kvmstream_core::{ConfigError, Orientation, StreamError, StreamerConfig, StreamerMode};

/// Runtime settings for the command-line client.
///
/// `KVMSTREAM_CONFIG` names an optional JSON file with [`StreamerConfig`]
/// fields. `KVMSTREAM_URL`, `KVMSTREAM_ORIENTATION` and `KVMSTREAM_MODE`
/// (`media` or `mjpeg`) override it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: StreamerConfig,
    pub mode: StreamerMode,
}

impl Settings {
    pub fn from_env() -> Result<Self, StreamError> {
        let base = match std::env::var("KVMSTREAM_CONFIG") {
            Ok(path) => load_file(&path)?,
            Err(_) => StreamerConfig::default(),
        };
        Self::resolve(base, |key| std::env::var(key).ok())
    }

    fn resolve(
        mut config: StreamerConfig,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StreamError> {
        if let Some(url) = var("KVMSTREAM_URL") {
            config.media_url = url;
        }
        if let Some(degrees) = var("KVMSTREAM_ORIENTATION") {
            let degrees: u16 = degrees.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "KVMSTREAM_ORIENTATION",
                reason: format!("expected degrees, got {degrees:?}"),
            })?;
            config.orientation = Orientation::from_degrees(degrees)?;
        }
        let mode = match var("KVMSTREAM_MODE").as_deref().map(str::trim) {
            None | Some("media") => StreamerMode::Binary,
            Some("mjpeg") => StreamerMode::Polling,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "KVMSTREAM_MODE",
                    reason: format!("expected media or mjpeg, got {other:?}"),
                }
                .into())
            }
        };
        config.validate()?;
        Ok(Self { config, mode })
    }
}

fn load_file(path: &str) -> Result<StreamerConfig, StreamError> {
    let text = std::fs::read_to_string(path)?;
    parse_config(path, &text)
}

fn parse_config(path: &str, text: &str) -> Result<StreamerConfig, StreamError> {
    serde_json::from_str(text).map_err(|e| StreamError::MalformedConfig {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
