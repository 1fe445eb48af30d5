use kvmstream_core::DecoderError;

use crate::{CodecId, DecoderFactory, DecoderOutputSink, VideoDecoder};

/// Factory for hosts without any H.264 decoder.
///
/// Rejects every codec so negotiation reports the capability gap instead of
/// silently streaming into nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDecoderFactory;

impl DecoderFactory for NullDecoderFactory {
    fn is_supported(&self, _codec: &CodecId) -> bool {
        false
    }

    fn create(&self, _output: DecoderOutputSink) -> Result<Box<dyn VideoDecoder>, DecoderError> {
        Err(DecoderError::CapabilityMissing)
    }
}
