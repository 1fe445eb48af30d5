use bytes::Bytes;
use kvmstream_core::DecoderError;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    CodecId, DecoderFactory, DecoderOutput, DecoderOutputSink, EncodedChunk, TimestampSynth,
    VideoDecoder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No decoder exists yet for the negotiated codec.
    Unconfigured,
    /// A decoder is configured and accepting chunks.
    Configured,
    /// The last decoder was closed; the next keyframe creates a new one.
    Closed,
}

/// What happened to a submitted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    /// No codec has been negotiated; the chunk was dropped.
    NoCodec,
    /// No decoder exists and the chunk is not a keyframe; dropped.
    AwaitingKeyframe,
    /// A keyframe created and configured a fresh decoder, then was submitted.
    Configured,
    /// Submitted to the running decoder.
    Decoded,
}

/// Codec identity plus the decoder built for it.
///
/// The codec id survives [`CodecSession::reset_decoder`], so a decoder lost
/// to an error or restart comes back on the next keyframe without a new
/// format offer from the server. Only [`CodecSession::teardown`] forgets it.
pub struct CodecSession {
    codec: Option<CodecId>,
    decoder: Option<Box<dyn VideoDecoder>>,
    state: DecoderState,
    generation: u64,
    timestamps: TimestampSynth,
}

impl Default for CodecSession {
    fn default() -> Self {
        Self {
            codec: None,
            decoder: None,
            state: DecoderState::Unconfigured,
            generation: 0,
            timestamps: TimestampSynth::default(),
        }
    }
}

impl CodecSession {
    pub fn codec(&self) -> Option<&CodecId> {
        self.codec.as_ref()
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        self.state == DecoderState::Configured
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when output stamped with `generation` belongs to the live decoder.
    pub fn accepts(&self, generation: u64) -> bool {
        self.decoder.is_some() && generation == self.generation
    }

    /// Records the negotiated codec. A changed codec closes the old decoder.
    /// Returns `true` when the codec changed.
    pub fn negotiate(&mut self, codec: CodecId) -> bool {
        if self.codec.as_ref() == Some(&codec) {
            return false;
        }
        self.reset_decoder();
        info!(codec = %codec, "Codec negotiated");
        self.codec = Some(codec);
        self.state = DecoderState::Unconfigured;
        true
    }

    /// Submits a coded frame, creating the decoder lazily on the first keyframe.
    pub fn submit(
        &mut self,
        factory: &dyn DecoderFactory,
        output: &mpsc::UnboundedSender<DecoderOutput>,
        keyframe: bool,
        payload: Bytes,
        now_us: u64,
    ) -> Result<Submit, DecoderError> {
        let Some(codec) = self.codec.clone() else {
            return Ok(Submit::NoCodec);
        };

        let mut outcome = Submit::Decoded;
        if self.decoder.is_none() {
            if !keyframe {
                return Ok(Submit::AwaitingKeyframe);
            }
            let sink = DecoderOutputSink::new(self.generation, output.clone());
            let mut decoder = factory.create(sink)?;
            if let Err(e) = decoder.configure(&codec) {
                decoder.close();
                self.state = DecoderState::Closed;
                return Err(e);
            }
            debug!(codec = %codec, generation = self.generation, "Decoder configured");
            self.decoder = Some(decoder);
            self.state = DecoderState::Configured;
            outcome = Submit::Configured;
        }

        let chunk = EncodedChunk {
            data: payload,
            timestamp_us: self.timestamps.next(now_us),
            is_keyframe: keyframe,
        };
        match self.decoder.as_mut() {
            Some(decoder) => decoder.decode(chunk).map(|()| outcome),
            None => Err(DecoderError::NotConfigured),
        }
    }

    /// Closes the decoder but keeps the codec id for a later restart.
    pub fn reset_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
            self.generation += 1;
            self.state = DecoderState::Closed;
            debug!(generation = self.generation, "Decoder closed");
        }
    }

    /// Closes the decoder, then forgets the codec.
    pub fn teardown(&mut self) {
        self.reset_decoder();
        self.codec = None;
        self.state = DecoderState::Unconfigured;
    }
}
