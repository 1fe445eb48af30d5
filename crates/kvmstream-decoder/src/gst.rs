//! GStreamer-backed H.264 decoder.
//!
//! # Decoder priority
//! 1. `vaapih264dec`: AMD/Intel VA-API
//! 2. `nvh264dec`: NVIDIA NVDEC
//! 3. `avdec_h264`: software libavcodec, last resort
//!
//! # Pipeline
//! ```text
//! appsrc → h264parse → [decoder] → videoconvert → video/x-raw,format=BGRA → appsink
//! ```

use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSrc};
use gstreamer_video as gst_video;
use kvmstream_core::DecoderError;
use tracing::{info, warn};

use crate::{CodecId, DecoderFactory, DecoderOutputSink, EncodedChunk, PixelFormat, VideoDecoder, VideoFrame};

static DECODER_PRIORITY: &[(&str, &str)] = &[
    ("vaapih264dec", "AMD/Intel VA-API H.264"),
    ("nvh264dec",    "NVIDIA NVDEC H.264"),
    ("avdec_h264",   "Software libavcodec (last resort)"),
];

// ── Probe ─────────────────────────────────────────────────────────────────────

/// Returns the highest-priority GStreamer H.264 decoder installed.
pub fn probe_best_decoder() -> Option<&'static str> {
    if gst::init().is_err() {
        return None;
    }
    for (element, label) in DECODER_PRIORITY {
        if gst::ElementFactory::find(element).is_some() {
            info!("Selected decoder: {} ({})", element, label);
            return Some(element);
        }
        warn!("Decoder '{}' not found, trying next", element);
    }
    None
}

// ── GstDecoderFactory ─────────────────────────────────────────────────────────

pub struct GstDecoderFactory {
    element: Option<&'static str>,
}

impl GstDecoderFactory {
    pub fn probe() -> Self {
        Self { element: probe_best_decoder() }
    }
}

impl DecoderFactory for GstDecoderFactory {
    fn is_supported(&self, codec: &CodecId) -> bool {
        // h264parse handles every profile the sources emit.
        self.element.is_some() && codec.as_str().starts_with("avc1.")
    }

    fn create(&self, output: DecoderOutputSink) -> Result<Box<dyn VideoDecoder>, DecoderError> {
        let element = self.element.ok_or(DecoderError::CapabilityMissing)?;
        Ok(Box::new(GstDecoder { element, pipeline: None, output }))
    }
}

// ── GstDecoder ────────────────────────────────────────────────────────────────

struct Pipeline {
    pipeline: gst::Pipeline,
    appsrc:   AppSrc,
    appsink:  AppSink,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Decoder that pushes chunks into `appsrc` and drains whatever `appsink`
/// has ready without blocking.
pub struct GstDecoder {
    element:  &'static str,
    pipeline: Option<Pipeline>,
    output:   DecoderOutputSink,
}

impl GstDecoder {
    fn build(&self) -> Result<Pipeline, DecoderError> {
        let element = self.element;
        let pipeline_str = format!(
            "appsrc name=src format=time is-live=true \
             ! h264parse \
             ! {element} \
             ! videoconvert \
             ! video/x-raw,format=BGRA \
             ! appsink name=sink sync=false max-buffers=2 drop=false"
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| DecoderError::GStreamerPipeline(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| DecoderError::GStreamerPipeline("Not a pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.downcast::<AppSrc>().ok())
            .ok_or_else(|| DecoderError::GStreamerPipeline("No appsrc".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| DecoderError::GStreamerPipeline("No appsink".into()))?;

        let src_caps = gst::Caps::builder("video/x-h264")
            .field("stream-format", "byte-stream")
            .field("alignment", "au")
            .build();
        appsrc.set_caps(Some(&src_caps));

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| DecoderError::GStreamerPipeline("Failed to start pipeline".into()))?;

        Ok(Pipeline { pipeline, appsrc, appsink })
    }

    fn drain(&self, pipeline: &Pipeline) -> Result<(), DecoderError> {
        while let Some(sample) = pipeline.appsink.try_pull_sample(gst::ClockTime::ZERO) {
            let info = sample
                .caps()
                .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok())
                .ok_or_else(|| DecoderError::DecodeFailed { reason: "sample without video caps".into() })?;
            let buffer = sample
                .buffer()
                .ok_or_else(|| DecoderError::DecodeFailed { reason: "no buffer in sample".into() })?;
            let map = buffer
                .map_readable()
                .map_err(|_| DecoderError::DecodeFailed { reason: "read map failed".into() })?;
            let pts = buffer.pts().map(|t| t.useconds()).unwrap_or_default();
            let frame = VideoFrame::new(
                Bytes::copy_from_slice(map.as_slice()),
                info.width(),
                info.height(),
                pts,
                PixelFormat::Bgra,
            );
            if !self.output.frame(frame) {
                break;
            }
        }
        Ok(())
    }
}

impl VideoDecoder for GstDecoder {
    fn configure(&mut self, codec: &CodecId) -> Result<(), DecoderError> {
        let pipeline = self.build()?;
        info!("GstDecoder({}) configured for {}", self.element, codec);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), DecoderError> {
        let pipeline = self.pipeline.as_ref().ok_or(DecoderError::NotConfigured)?;

        let mut buffer = gst::Buffer::from_slice(chunk.data);
        buffer
            .get_mut()
            .ok_or_else(|| DecoderError::DecodeFailed { reason: "buffer not writable".into() })?
            .set_pts(gst::ClockTime::from_useconds(chunk.timestamp_us));

        pipeline
            .appsrc
            .push_buffer(buffer)
            .map_err(|_| DecoderError::DecodeFailed { reason: "appsrc push failed".into() })?;

        self.drain(pipeline)
    }

    fn close(&mut self) {
        self.pipeline = None;
    }
}
