//! H.264-over-WebSocket streamer.
//!
//! # Flow
//!
//! ```text
//! ensure_stream ─► Connect ─► Opened ─► heartbeat every 1s (ping 0x00, expect 0xFF)
//!                                 │
//!                    media offer ─┴─► negotiate codec ─► send "start"
//!                                                          │
//!  0x01 video ─► CodecSession (lazy decoder on keyframe) ─► DecoderOutput
//!                                                          │
//!                      FrameSlot (oldest wins) ─► RequestRefresh ─► draw
//! ```
//!
//! Any transport failure tears the media pipeline down and schedules exactly
//! one reconnect. Nothing is ever returned to the caller as an error.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use kvmstream_core::{
    ExternalStreamSnapshot, Orientation, PlatformCapabilities, ResolutionInfo, StreamerCallbacks,
    StreamerConfig, StreamerMode,
};
use kvmstream_decoder::{
    timestamp::wall_clock_us, CodecId, CodecSession, DecoderEvent, DecoderFactory, DecoderOutput,
    FrameSlot, Offer, Submit,
};
use kvmstream_renderer::{DisplaySurface, RenderScheduler};
use kvmstream_transport::{
    BinaryMessage, ClientEvent, ConnectionId, Frame, LinkEvent, MediaOffer, ServerEvent,
    SocketEvent, PING,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::{Command, Streamer};

pub type DecoderOutputReceiver = mpsc::UnboundedReceiver<DecoderOutput>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Closed locally; waiting for the worker to confirm.
    Closing,
}

pub struct BinaryStreamer {
    config: StreamerConfig,
    callbacks: Arc<dyn StreamerCallbacks>,
    capabilities: Arc<dyn PlatformCapabilities>,
    factory: Arc<dyn DecoderFactory>,
    surface: Box<dyn DisplaySurface>,
    decoder_tx: mpsc::UnboundedSender<DecoderOutput>,

    state: ConnectionState,
    conn: Option<ConnectionId>,
    last_conn: ConnectionId,
    stopped: bool,
    reconnect_pending: bool,
    heartbeat_running: bool,
    missed_beats: u32,
    source_online: bool,
    snapshot: Option<ExternalStreamSnapshot>,
    /// Snapshot in force when the last negotiation failed; no retry until it changes.
    format_failed: Option<Option<ExternalStreamSnapshot>>,

    codec: CodecSession,
    slot: FrameSlot,
    render: RenderScheduler,
    frames_since_tick: u32,
    announced_active: bool,
}

impl BinaryStreamer {
    pub fn new(
        config: StreamerConfig,
        callbacks: Arc<dyn StreamerCallbacks>,
        capabilities: Arc<dyn PlatformCapabilities>,
        factory: Arc<dyn DecoderFactory>,
        surface: Box<dyn DisplaySurface>,
    ) -> (Self, DecoderOutputReceiver) {
        let (decoder_tx, decoder_rx) = mpsc::unbounded_channel();
        let render = RenderScheduler::new(config.orientation);
        let streamer = Self {
            config,
            callbacks,
            capabilities,
            factory,
            surface,
            decoder_tx,
            state: ConnectionState::Disconnected,
            conn: None,
            last_conn: ConnectionId::default(),
            stopped: true,
            reconnect_pending: false,
            heartbeat_running: false,
            missed_beats: 0,
            source_online: false,
            snapshot: None,
            format_failed: None,
            codec: CodecSession::default(),
            slot: FrameSlot::default(),
            render,
            frames_since_tick: 0,
            announced_active: false,
        };
        (streamer, decoder_rx)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn orientation(&self) -> Orientation {
        self.render.orientation()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.conn
    }

    pub fn missed_beats(&self) -> u32 {
        self.missed_beats
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn codec_session(&self) -> &CodecSession {
        &self.codec
    }

    pub fn has_pending_frame(&self) -> bool {
        self.slot.is_occupied()
    }

    pub fn media_url(&self) -> &str {
        &self.config.media_url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.config.connect_timeout()
    }

    // ── Events ───────────────────────────────────────────────────────────────

    pub fn on_socket_event(&mut self, event: SocketEvent) -> Vec<Command> {
        if self.conn != Some(event.conn) {
            trace!(conn = %event.conn, "Ignoring event from stale connection");
            return Vec::new();
        }
        if self.state == ConnectionState::Closing {
            return match event.event {
                LinkEvent::Closed { .. } => self.on_closing_done(),
                _ => Vec::new(),
            };
        }
        match event.event {
            LinkEvent::Opened => self.on_open(),
            LinkEvent::Frame(Frame::Text(text)) => self.on_text(&text),
            LinkEvent::Frame(Frame::Binary(data)) => self.on_binary(data),
            LinkEvent::Closed { reason } => {
                let reason = reason.unwrap_or_else(|| "closed".into());
                info!(conn = %event.conn, "Media connection lost: {}", reason);
                self.connection_lost()
            }
        }
    }

    pub fn on_heartbeat_tick(&mut self) -> Vec<Command> {
        if self.state != ConnectionState::Open {
            return Vec::new();
        }
        let Some(conn) = self.conn else {
            return Vec::new();
        };

        self.missed_beats += 1;
        if self.missed_beats >= self.config.heartbeat_miss_limit {
            warn!(conn = %conn, missed = self.missed_beats, "Heartbeat missed, dropping connection");
            let mut commands = vec![Command::Disconnect { conn }];
            commands.extend(self.connection_lost());
            return commands;
        }

        if self.codec.is_configured() {
            let fps = std::mem::take(&mut self.frames_since_tick);
            let message = self.streaming_info(fps);
            self.callbacks.on_info(true, self.source_online, &message);
        }
        vec![Command::Send { conn, frame: Frame::Binary(Bytes::from_static(&PING)) }]
    }

    pub fn on_reconnect_timer(&mut self) -> Vec<Command> {
        self.reconnect_pending = false;
        if self.stopped || self.state != ConnectionState::Disconnected {
            return Vec::new();
        }
        self.connect()
    }

    pub fn on_decoder_output(&mut self, output: DecoderOutput) -> Vec<Command> {
        if !self.codec.accepts(output.generation) {
            trace!(generation = output.generation, "Dropping output of a closed decoder");
            return Vec::new();
        }
        match output.event {
            DecoderEvent::Error(e) => {
                warn!("Decoder error: {}", e);
                self.reset_decoder();
                Vec::new()
            }
            DecoderEvent::Frame(frame) => match self.slot.offer(frame) {
                Offer::Accepted if self.render.request_refresh() => vec![Command::RequestRefresh],
                Offer::Accepted => Vec::new(),
                Offer::Dropped => {
                    trace!(dropped = self.slot.dropped(), "Renderer busy, frame dropped");
                    Vec::new()
                }
            },
        }
    }

    /// Display refresh callback requested by [`Command::RequestRefresh`].
    pub fn on_refresh(&mut self) -> Vec<Command> {
        self.render.refresh_delivered();
        let Some(frame) = self.slot.take() else {
            return Vec::new();
        };
        match self.render.draw(&mut *self.surface, frame) {
            Ok(report) => {
                self.frames_since_tick += 1;
                if report.resized {
                    self.callbacks.on_organize();
                }
                if !self.announced_active {
                    self.announced_active = true;
                    self.callbacks.on_active();
                }
            }
            Err(e) => warn!("Frame draw failed: {}", e),
        }
        Vec::new()
    }

    // ── Connection lifecycle ─────────────────────────────────────────────────

    fn connect(&mut self) -> Vec<Command> {
        let conn = self.last_conn.next();
        self.last_conn = conn;
        self.conn = Some(conn);
        self.state = ConnectionState::Connecting;
        debug!(conn = %conn, url = %self.config.media_url, "Connecting media socket");
        self.callbacks.on_info(false, self.source_online, "Connecting…");
        vec![Command::Connect { conn }]
    }

    fn on_open(&mut self) -> Vec<Command> {
        self.state = ConnectionState::Open;
        self.missed_beats = 0;
        self.frames_since_tick = 0;
        self.heartbeat_running = true;
        self.callbacks.on_info(false, self.source_online, "Waiting for media…");
        vec![Command::StartHeartbeat { period: self.config.heartbeat_interval() }]
    }

    fn on_closing_done(&mut self) -> Vec<Command> {
        self.conn = None;
        self.state = ConnectionState::Disconnected;
        if self.stopped {
            Vec::new()
        } else {
            self.connect()
        }
    }

    /// Transport failure: tear down and retry once after the delay.
    fn connection_lost(&mut self) -> Vec<Command> {
        let mut commands = self.release_connection();
        self.callbacks.on_inactive();
        if self.stopped {
            self.callbacks.on_info(false, self.source_online, "");
            return commands;
        }
        self.callbacks.on_info(false, self.source_online, "Connection lost, reconnecting…");
        if !self.reconnect_pending {
            self.reconnect_pending = true;
            commands.push(Command::ScheduleReconnect { delay: self.config.reconnect_delay() });
        }
        commands
    }

    /// Stops the heartbeat, tears media down and forgets the connection.
    fn release_connection(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        if std::mem::take(&mut self.heartbeat_running) {
            commands.push(Command::StopHeartbeat);
        }
        self.teardown_media();
        self.missed_beats = 0;
        self.conn = None;
        self.state = ConnectionState::Disconnected;
        commands
    }

    // ── Media pipeline ───────────────────────────────────────────────────────

    fn on_text(&mut self, text: &str) -> Vec<Command> {
        match ServerEvent::parse(text) {
            Ok(ServerEvent::Media(offer)) => self.negotiate(&offer),
            Ok(ServerEvent::Other(kind)) => {
                trace!(kind, "Ignoring control event");
                Vec::new()
            }
            Err(e) => {
                warn!("Bad control message: {}", e);
                Vec::new()
            }
        }
    }

    fn negotiate(&mut self, offer: &MediaOffer) -> Vec<Command> {
        let Some(h264) = offer.h264() else {
            return self.format_failure("No H.264 stream offered by the server".into());
        };
        if !self.capabilities.has_video_decoder() {
            let message = if self.capabilities.is_secure_context() {
                "Your platform can't decode H.264 video"
            } else {
                "Media streaming requires a secure (HTTPS) context"
            };
            return self.format_failure(message.into());
        }
        let codec = match CodecId::from_profile_level_id(&h264.profile_level_id) {
            Ok(codec) => codec,
            Err(_) => {
                return self.format_failure(format!(
                    "Invalid H.264 profile {:?} offered by the server",
                    h264.profile_level_id
                ))
            }
        };
        if !self.factory.is_supported(&codec) {
            return self.format_failure(format!("H.264 profile {codec} is not supported"));
        }

        if self.codec.negotiate(codec) {
            self.slot.clear();
        }
        self.callbacks.on_info(false, self.source_online, "Waiting for keyframe…");

        let Some(conn) = self.conn else {
            return Vec::new();
        };
        match ClientEvent::start_h264().to_json() {
            Ok(json) => vec![Command::Send { conn, frame: Frame::Text(json) }],
            Err(e) => {
                warn!("Can't encode start request: {}", e);
                Vec::new()
            }
        }
    }

    /// Format or capability failure. The connection is closed and no retry is
    /// scheduled; the next `ensure_stream` with different state tries again.
    fn format_failure(&mut self, message: String) -> Vec<Command> {
        warn!("{}", message);
        let mut commands = Vec::new();
        if let Some(conn) = self.conn {
            commands.push(Command::Disconnect { conn });
        }
        commands.extend(self.release_connection());
        self.callbacks.on_inactive();
        self.callbacks.on_info(false, self.source_online, &message);
        self.format_failed = Some(self.snapshot.clone());
        commands
    }

    fn on_binary(&mut self, data: Bytes) -> Vec<Command> {
        match BinaryMessage::parse(data) {
            Ok(BinaryMessage::Pong) => self.missed_beats = 0,
            Ok(BinaryMessage::Video { keyframe, payload }) => self.submit(keyframe, payload),
            Err(e) => debug!("Ignoring binary message: {}", e),
        }
        Vec::new()
    }

    fn submit(&mut self, keyframe: bool, payload: Bytes) {
        match self.codec.submit(&*self.factory, &self.decoder_tx, keyframe, payload, wall_clock_us()) {
            Ok(Submit::Configured) => {
                if let Some(codec) = self.codec.codec() {
                    info!(codec = %codec, "Decoder configured on keyframe");
                }
            }
            Ok(Submit::AwaitingKeyframe) => trace!("Waiting for keyframe"),
            Ok(Submit::NoCodec) => trace!("Video before media negotiation"),
            Ok(Submit::Decoded) => {}
            Err(e) => {
                warn!("Decoder error: {}", e);
                self.reset_decoder();
            }
        }
    }

    /// Closes the decoder and drops the pending frame; the codec id is kept
    /// so the next keyframe restarts decoding.
    fn reset_decoder(&mut self) {
        self.slot.clear();
        self.codec.reset_decoder();
    }

    /// Full teardown: decoder and pending frame first, then the codec id.
    fn teardown_media(&mut self) {
        self.slot.clear();
        self.codec.teardown();
        self.frames_since_tick = 0;
        self.announced_active = false;
    }

    fn streaming_info(&self, fps: u32) -> String {
        match self.codec.codec() {
            Some(codec) => match codec.level() {
                Some((major, minor)) => {
                    format!("H.264 {} {}.{}, {} fps", codec.profile_name(), major, minor, fps)
                }
                None => format!("H.264, {fps} fps"),
            },
            None => format!("{fps} fps"),
        }
    }
}

impl Streamer for BinaryStreamer {
    fn ensure_stream(&mut self, snapshot: Option<&ExternalStreamSnapshot>) -> Vec<Command> {
        self.source_online = snapshot.map_or(false, |s| s.source_online);
        self.snapshot = snapshot.cloned();
        self.stopped = false;

        if let Some(failed_for) = &self.format_failed {
            if failed_for.as_ref() == snapshot {
                return Vec::new();
            }
            self.format_failed = None;
        }

        if self.state != ConnectionState::Disconnected || self.reconnect_pending {
            return Vec::new();
        }
        self.connect()
    }

    fn stop_stream(&mut self) -> Vec<Command> {
        self.stopped = true;
        self.reconnect_pending = false;
        self.format_failed = None;

        let mut commands = Vec::new();
        match (self.state, self.conn) {
            (ConnectionState::Connecting | ConnectionState::Open, Some(conn)) => {
                commands.push(Command::Disconnect { conn });
                commands.extend(self.release_connection());
                // Keep the id until the worker confirms the close.
                self.conn = Some(conn);
                self.state = ConnectionState::Closing;
            }
            _ => self.teardown_media(),
        }

        self.callbacks.on_inactive();
        self.callbacks.on_info(false, self.source_online, "");
        commands
    }

    fn name(&self) -> &'static str {
        "H.264 Media"
    }

    fn mode(&self) -> StreamerMode {
        StreamerMode::Binary
    }

    fn resolution(&self) -> ResolutionInfo {
        ResolutionInfo::new(self.surface.size(), self.surface.view_size())
    }
}
