//! kvmstream-streamer
//!
//! Two interchangeable strategies for keeping a remote display on screen:
//!
//! - [`BinaryStreamer`]: H.264 over the media WebSocket, decoded locally.
//! - [`PollingStreamer`]: multipart JPEG over HTTP, supervised by matching a
//!   session key against server-reported client statistics.
//!
//! Both are sans-IO state machines: every entry point returns the list of
//! [`Command`]s the caller must execute. The drivers in [`driver`] do that on
//! a single tokio task, so events only interleave between handler calls.

pub mod binary;
pub mod command;
pub mod driver;
pub mod polling;

#[cfg(test)]
pub(crate) mod testing;

use kvmstream_core::{ExternalStreamSnapshot, Orientation, ResolutionInfo, StreamerMode};

pub use binary::{BinaryStreamer, ConnectionState, DecoderOutputReceiver};
pub use command::Command;
pub use driver::{BinaryDriver, Control, PollingDriver, StreamerControl, Vsync};
pub use polling::{CookieJar, ImageSurface, PollingSession, PollingState, PollingStreamer};

// MARK: - Streamer contract

/// Control surface shared by both strategies.
pub trait Streamer {
    /// Drives connect/poll/activate from the latest external state.
    /// Repeated calls with unchanged state are no-ops.
    fn ensure_stream(&mut self, snapshot: Option<&ExternalStreamSnapshot>) -> Vec<Command>;

    /// Releases every resource and shows a neutral picture. Idempotent.
    fn stop_stream(&mut self) -> Vec<Command>;

    fn name(&self) -> &'static str;

    fn mode(&self) -> StreamerMode;

    fn resolution(&self) -> ResolutionInfo;
}

// MARK: - StreamerHandle

/// One streamer per display surface, chosen at construction.
pub enum StreamerHandle {
    Binary(BinaryStreamer),
    Polling(PollingStreamer),
}

impl StreamerHandle {
    /// Fixed rotation of the binary strategy; polling streams are never rotated.
    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            Self::Binary(s) => Some(s.orientation()),
            Self::Polling(_) => None,
        }
    }
}

impl Streamer for StreamerHandle {
    fn ensure_stream(&mut self, snapshot: Option<&ExternalStreamSnapshot>) -> Vec<Command> {
        match self {
            Self::Binary(s) => s.ensure_stream(snapshot),
            Self::Polling(s) => s.ensure_stream(snapshot),
        }
    }

    fn stop_stream(&mut self) -> Vec<Command> {
        match self {
            Self::Binary(s) => s.stop_stream(),
            Self::Polling(s) => s.stop_stream(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Binary(s) => s.name(),
            Self::Polling(s) => s.name(),
        }
    }

    fn mode(&self) -> StreamerMode {
        match self {
            Self::Binary(s) => s.mode(),
            Self::Polling(s) => s.mode(),
        }
    }

    fn resolution(&self) -> ResolutionInfo {
        match self {
            Self::Binary(s) => s.resolution(),
            Self::Polling(s) => s.resolution(),
        }
    }
}

impl From<BinaryStreamer> for StreamerHandle {
    fn from(streamer: BinaryStreamer) -> Self {
        Self::Binary(streamer)
    }
}

impl From<PollingStreamer> for StreamerHandle {
    fn from(streamer: PollingStreamer) -> Self {
        Self::Polling(streamer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvmstream_core::StreamerConfig;

    use super::*;
    use crate::testing::*;

    fn handles() -> (StreamerHandle, StreamerHandle) {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let config = StreamerConfig { orientation: Orientation::Deg90, ..Default::default() };
        let (binary, _decoder_rx) = BinaryStreamer::new(
            config.clone(),
            callbacks.clone(),
            Arc::new(FakeCapabilities::default()),
            Arc::new(FakeDecoderFactory::default()),
            Box::new(FakeSurface::default()),
        );
        let polling = PollingStreamer::new(
            config,
            callbacks,
            Arc::new(FakeCapabilities::default()),
            Box::new(FakeCookies::default()),
            Box::new(FakeImage::default()),
        );
        (binary.into(), polling.into())
    }

    #[test]
    fn handle_dispatches_to_the_chosen_strategy() {
        let (mut binary, mut polling) = handles();
        assert_eq!(binary.mode(), StreamerMode::Binary);
        assert_eq!(polling.mode(), StreamerMode::Polling);
        assert_eq!(binary.orientation(), Some(Orientation::Deg90));
        assert_eq!(polling.orientation(), None);
        assert_eq!(polling.resolution().real_width, 1280);

        let snapshot = ExternalStreamSnapshot::online();
        assert!(matches!(binary.ensure_stream(Some(&snapshot)).as_slice(), [Command::Connect { .. }]));
        assert!(matches!(polling.ensure_stream(Some(&snapshot)).as_slice(), [Command::StartPolling { .. }]));
        assert!(matches!(polling.stop_stream().as_slice(), [Command::StopPolling]));
        assert!(polling.stop_stream().is_empty());
    }
}
