pub mod callbacks;
pub mod config;
pub mod errors;
pub mod types;

pub use callbacks::{NativeCapabilities, PlatformCapabilities, StreamerCallbacks};
pub use config::StreamerConfig;
pub use errors::{ConfigError, DecoderError, StreamError, TransportError};
pub use types::*;
