//! Recording fakes for the collaborator traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use kvmstream_core::{DecoderError, PlatformCapabilities, StreamerCallbacks};
use kvmstream_decoder::{
    CodecId, DecoderFactory, DecoderOutputSink, EncodedChunk, PixelFormat, VideoDecoder, VideoFrame,
};
use kvmstream_renderer::{DisplaySurface, RendererError};

use crate::polling::{CookieJar, ImageSurface};

// ── Callbacks ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Active,
    Inactive,
    Info { streaming: bool, online: bool, message: String },
    Organize,
}

#[derive(Default)]
pub struct RecordingCallbacks {
    seen: Mutex<Vec<Seen>>,
}

impl RecordingCallbacks {
    pub fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }

    pub fn last_info(&self) -> Option<(bool, bool, String)> {
        self.seen.lock().unwrap().iter().rev().find_map(|s| match s {
            Seen::Info { streaming, online, message } => Some((*streaming, *online, message.clone())),
            _ => None,
        })
    }

    pub fn count(&self, wanted: &Seen) -> usize {
        self.seen.lock().unwrap().iter().filter(|s| *s == wanted).count()
    }
}

impl StreamerCallbacks for RecordingCallbacks {
    fn on_active(&self) {
        self.seen.lock().unwrap().push(Seen::Active);
    }
    fn on_inactive(&self) {
        self.seen.lock().unwrap().push(Seen::Inactive);
    }
    fn on_info(&self, is_streaming: bool, source_online: bool, message: &str) {
        self.seen.lock().unwrap().push(Seen::Info {
            streaming: is_streaming,
            online: source_online,
            message: message.to_string(),
        });
    }
    fn on_organize(&self) {
        self.seen.lock().unwrap().push(Seen::Organize);
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct FakeCapabilities {
    pub secure: bool,
    pub decoder: bool,
    pub advance_headers: bool,
    pub dual_final_frames: bool,
}

impl Default for FakeCapabilities {
    fn default() -> Self {
        Self { secure: true, decoder: true, advance_headers: false, dual_final_frames: false }
    }
}

impl PlatformCapabilities for FakeCapabilities {
    fn is_secure_context(&self) -> bool {
        self.secure
    }
    fn has_video_decoder(&self) -> bool {
        self.decoder
    }
    fn needs_advance_headers(&self) -> bool {
        self.advance_headers
    }
    fn needs_dual_final_frames(&self) -> bool {
        self.dual_final_frames
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct DecoderLog {
    pub created: usize,
    pub configured: Vec<String>,
    pub decoded: usize,
    pub closed: usize,
    /// Next `decode` call fails synchronously.
    pub fail_next_decode: bool,
}

/// Decoder that turns every chunk into a 640×480 frame immediately.
#[derive(Clone, Default)]
pub struct FakeDecoderFactory {
    pub log: Arc<Mutex<DecoderLog>>,
    pub releases: Arc<AtomicUsize>,
    pub reject: bool,
}

impl FakeDecoderFactory {
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for FakeDecoderFactory {
    fn is_supported(&self, _codec: &CodecId) -> bool {
        !self.reject
    }

    fn create(&self, output: DecoderOutputSink) -> Result<Box<dyn VideoDecoder>, DecoderError> {
        self.log.lock().unwrap().created += 1;
        Ok(Box::new(FakeDecoder {
            log: Arc::clone(&self.log),
            releases: Arc::clone(&self.releases),
            output,
        }))
    }
}

struct FakeDecoder {
    log: Arc<Mutex<DecoderLog>>,
    releases: Arc<AtomicUsize>,
    output: DecoderOutputSink,
}

impl VideoDecoder for FakeDecoder {
    fn configure(&mut self, codec: &CodecId) -> Result<(), DecoderError> {
        self.log.lock().unwrap().configured.push(codec.to_string());
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), DecoderError> {
        {
            let mut log = self.log.lock().unwrap();
            if std::mem::take(&mut log.fail_next_decode) {
                return Err(DecoderError::DecodeFailed { reason: "corrupt slice".into() });
            }
            log.decoded += 1;
        }
        let releases = Arc::clone(&self.releases);
        let frame = VideoFrame::new(Bytes::new(), 640, 480, chunk.timestamp_us, PixelFormat::Bgra)
            .with_release(move || {
                releases.fetch_add(1, Ordering::SeqCst);
            });
        self.output.frame(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed += 1;
    }
}

// ── Surfaces ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SurfaceState {
    pub size: (u32, u32),
    pub draws: usize,
    pub depth: i32,
    pub fail_draw: bool,
}

#[derive(Clone, Default)]
pub struct FakeSurface(pub Arc<Mutex<SurfaceState>>);

impl DisplaySurface for FakeSurface {
    fn size(&self) -> (u32, u32) {
        self.0.lock().unwrap().size
    }
    fn view_size(&self) -> (u32, u32) {
        let (w, h) = self.size();
        (w / 2, h / 2)
    }
    fn resize(&mut self, width: u32, height: u32) {
        self.0.lock().unwrap().size = (width, height);
    }
    fn save(&mut self) {
        self.0.lock().unwrap().depth += 1;
    }
    fn restore(&mut self) {
        self.0.lock().unwrap().depth -= 1;
    }
    fn translate(&mut self, _x: f64, _y: f64) {}
    fn rotate(&mut self, _radians: f64) {}
    fn draw_frame(&mut self, _frame: &VideoFrame) -> Result<(), RendererError> {
        let mut state = self.0.lock().unwrap();
        if state.fail_draw {
            return Err(RendererError::DrawFailed("lost context".into()));
        }
        state.draws += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct ImageState {
    pub source: String,
    pub requests: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeImage(pub Arc<Mutex<ImageState>>);

impl ImageSurface for FakeImage {
    fn source(&self) -> String {
        self.0.lock().unwrap().source.clone()
    }
    fn set_source(&mut self, url: &str) {
        let mut state = self.0.lock().unwrap();
        state.source = url.to_string();
        state.requests.push(url.to_string());
    }
    fn natural_size(&self) -> (u32, u32) {
        (1280, 720)
    }
    fn view_size(&self) -> (u32, u32) {
        (640, 360)
    }
}

#[derive(Clone, Default)]
pub struct FakeCookies(pub Arc<Mutex<Option<String>>>);

impl FakeCookies {
    pub fn set(&self, value: &str) {
        *self.0.lock().unwrap() = Some(value.to_string());
    }
}

impl CookieJar for FakeCookies {
    fn get(&self, name: &str) -> Option<String> {
        assert_eq!(name, "stream_client");
        self.0.lock().unwrap().clone()
    }
}
