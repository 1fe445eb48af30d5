//! kvmstream-decoder
//!
//! Client-side H.264 decoding for the binary media transport.
//!
//! # Lifecycle
//! ```text
//! media offer ─► CodecId ─► (keyframe) ─► create + configure ─► decode …
//!                   ▲                                                │
//!                   └──────── reset_decoder (error / restart) ◄──────┘
//! ```
//! Decoders are asynchronous: `decode` only submits. Frames and errors come
//! back through a [`DecoderOutputSink`] tagged with the session generation
//! they were produced for, so output from a closed session can be dropped.

pub mod codec;
pub mod frame;
pub mod null;
pub mod session;
pub mod timestamp;

#[cfg(feature = "gstreamer")]
pub mod gst;

use bytes::Bytes;
use kvmstream_core::DecoderError;
use tokio::sync::mpsc;

pub use codec::CodecId;
pub use frame::{FrameSlot, Offer, PixelFormat, VideoFrame};
pub use null::NullDecoderFactory;
pub use session::{CodecSession, DecoderState, Submit};
pub use timestamp::TimestampSynth;

// MARK: - EncodedChunk

/// One coded access unit as received from the transport.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub data: Bytes,
    pub timestamp_us: u64,
    pub is_keyframe: bool,
}

// MARK: - Decoder output

#[derive(Debug)]
pub enum DecoderEvent {
    Frame(VideoFrame),
    Error(DecoderError),
}

/// Output of a decoder, stamped with the session generation that produced it.
#[derive(Debug)]
pub struct DecoderOutput {
    pub generation: u64,
    pub event: DecoderEvent,
}

/// Where a decoder delivers its frames and errors.
#[derive(Debug, Clone)]
pub struct DecoderOutputSink {
    generation: u64,
    tx: mpsc::UnboundedSender<DecoderOutput>,
}

impl DecoderOutputSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<DecoderOutput>) -> Self {
        Self { generation, tx }
    }

    /// Returns `false` once the receiving streamer is gone.
    pub fn frame(&self, frame: VideoFrame) -> bool {
        self.send(DecoderEvent::Frame(frame))
    }

    pub fn error(&self, error: DecoderError) -> bool {
        self.send(DecoderEvent::Error(error))
    }

    fn send(&self, event: DecoderEvent) -> bool {
        self.tx
            .send(DecoderOutput { generation: self.generation, event })
            .is_ok()
    }
}

// MARK: - Decoder traits

/// A stateful, externally owned video decoder.
pub trait VideoDecoder: Send {
    /// Prepares the decoder for `codec`. Must be called before `decode`.
    fn configure(&mut self, codec: &CodecId) -> Result<(), DecoderError>;

    /// Submits one chunk. Decoded frames arrive later through the sink.
    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), DecoderError>;

    /// Releases decoder resources. Further calls to `decode` fail.
    fn close(&mut self);
}

/// Creates decoders and answers codec support queries.
pub trait DecoderFactory: Send + Sync {
    fn is_supported(&self, codec: &CodecId) -> bool;

    fn create(&self, output: DecoderOutputSink) -> Result<Box<dyn VideoDecoder>, DecoderError>;
}
