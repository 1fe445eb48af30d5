use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kvmstream_core::{
    ExternalStreamSnapshot, NativeCapabilities, StreamerCallbacks, StreamerConfig, StreamerMode,
};
use kvmstream_decoder::DecoderFactory;
use kvmstream_renderer::HeadlessSurface;
use kvmstream_streamer::{
    BinaryDriver, BinaryStreamer, CookieJar, ImageSurface, PollingDriver, PollingStreamer,
    Streamer, StreamerControl, Vsync,
};
use kvmstream_transport::WsConnector;
use tracing::{info, warn};

use crate::settings::Settings;

/// Runs one streamer until ctrl-c.
///
/// # Flow
/// 1. Load settings from the environment
/// 2. Build the streamer for the selected mode with headless collaborators
/// 3. Feed it an "online" snapshot every second, as a KVM web UI would
/// 4. On ctrl-c, shut the driver down and report what was streamed
pub async fn run() -> Result<()> {
    let Settings { config, mode } = Settings::from_env()?;
    let callbacks: Arc<dyn StreamerCallbacks> = Arc::new(LogCallbacks);
    info!(mode = %mode, "Starting streamer");

    let (control, task) = match mode {
        StreamerMode::Binary => spawn_binary(config, callbacks),
        StreamerMode::Polling => spawn_polling(config, callbacks),
    };

    let snapshot = ExternalStreamSnapshot::online();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !control.ensure_stream(Some(snapshot.clone())) {
                    warn!("Streamer driver exited unexpectedly");
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    control.shutdown();
    let summary = task.await.context("streamer driver panicked")?;
    info!("{}", summary);
    Ok(())
}

type DriverTask = tokio::task::JoinHandle<String>;

fn spawn_binary(config: StreamerConfig, callbacks: Arc<dyn StreamerCallbacks>) -> (StreamerControl, DriverTask) {
    let (streamer, decoder_rx) = BinaryStreamer::new(
        config,
        callbacks,
        Arc::new(NativeCapabilities),
        decoder_factory(),
        Box::new(HeadlessSurface::default()),
    );
    let (driver, control) = BinaryDriver::new(
        streamer,
        decoder_rx,
        Arc::new(WsConnector),
        Vsync::Interval(Duration::from_millis(16)),
    );
    let task = tokio::spawn(async move {
        let streamer = driver.run().await;
        format!("{} stopped at {}", streamer.name(), streamer.resolution())
    });
    (control, task)
}

fn spawn_polling(config: StreamerConfig, callbacks: Arc<dyn StreamerCallbacks>) -> (StreamerControl, DriverTask) {
    let streamer = PollingStreamer::new(
        config,
        callbacks,
        Arc::new(NativeCapabilities),
        Box::new(NoCookies),
        Box::new(LogImage::default()),
    );
    let (driver, control) = PollingDriver::new(streamer);
    let task = tokio::spawn(async move {
        let streamer = driver.run().await;
        format!("{} stopped after {} stream request(s)", streamer.name(), streamer.requests())
    });
    (control, task)
}

#[cfg(feature = "gstreamer")]
fn decoder_factory() -> Arc<dyn DecoderFactory> {
    Arc::new(kvmstream_decoder::gst::GstDecoderFactory::probe())
}

#[cfg(not(feature = "gstreamer"))]
fn decoder_factory() -> Arc<dyn DecoderFactory> {
    warn!("Built without the gstreamer feature; H.264 decode is unavailable");
    Arc::new(kvmstream_decoder::NullDecoderFactory)
}

// ── Headless collaborators ───────────────────────────────────────────────────

struct LogCallbacks;

impl StreamerCallbacks for LogCallbacks {
    fn on_active(&self) {
        info!("Stream active");
    }

    fn on_inactive(&self) {
        info!("Stream inactive");
    }

    fn on_info(&self, is_streaming: bool, source_online: bool, message: &str) {
        if !message.is_empty() {
            info!(streaming = is_streaming, online = source_online, "{}", message);
        }
    }

    fn on_organize(&self) {
        info!("Stream geometry changed");
    }
}

/// Without a browser nothing ever sets the correlation cookie.
struct NoCookies;

impl CookieJar for NoCookies {
    fn get(&self, _name: &str) -> Option<String> {
        None
    }
}

#[derive(Default)]
struct LogImage {
    source: String,
}

impl ImageSurface for LogImage {
    fn source(&self) -> String {
        self.source.clone()
    }

    fn set_source(&mut self, url: &str) {
        info!(url, "Image source changed");
        self.source = url.to_string();
    }

    fn natural_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn view_size(&self) -> (u32, u32) {
        (0, 0)
    }
}
