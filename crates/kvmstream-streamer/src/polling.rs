//! Multipart JPEG streamer.
//!
//! The image element fetches `stream_path?key=<session key>`. The server
//! answers with a `stream_client` cookie of the form `<key>/<client id>` and
//! later reports per-client statistics in the external snapshot. The stream
//! counts as alive once the cookie's client id shows up in those statistics.
//!
//! ```text
//! Idle ──ensure──► Checking ──client seen──► Active
//!   ▲                 │ budget exhausted
//!   └── new key, re-request stream ◄┘
//! ```

use std::sync::Arc;

use kvmstream_core::{
    ExternalStreamSnapshot, PlatformCapabilities, ResolutionInfo, StreamerCallbacks,
    StreamerConfig, StreamerMode,
};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::{Command, Streamer};

/// Read access to the cookies set by the stream server.
pub trait CookieJar: Send {
    fn get(&self, name: &str) -> Option<String>;
}

/// The element that displays the MJPEG stream.
pub trait ImageSurface: Send {
    fn source(&self) -> String;
    /// Assigning a new URL restarts the HTTP request.
    fn set_source(&mut self, url: &str);
    fn natural_size(&self) -> (u32, u32);
    fn view_size(&self) -> (u32, u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Idle,
    Checking,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingSession {
    pub session_key: String,
    pub client_id: Option<String>,
    /// Last reported rate, `-1` when unknown.
    pub fps: i32,
    pub retries_left: u32,
}

impl PollingSession {
    fn new() -> Self {
        Self { session_key: new_session_key(), client_id: None, fps: -1, retries_left: 0 }
    }

    fn rekey(&mut self) {
        self.session_key = new_session_key();
        self.client_id = None;
        self.fps = -1;
    }
}

fn new_session_key() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct PollingStreamer {
    config: StreamerConfig,
    callbacks: Arc<dyn StreamerCallbacks>,
    capabilities: Arc<dyn PlatformCapabilities>,
    cookies: Box<dyn CookieJar>,
    image: Box<dyn ImageSurface>,

    state: PollingState,
    session: PollingSession,
    polling: bool,
    snapshot: Option<ExternalStreamSnapshot>,
    requests: u64,
}

impl PollingStreamer {
    pub fn new(
        config: StreamerConfig,
        callbacks: Arc<dyn StreamerCallbacks>,
        capabilities: Arc<dyn PlatformCapabilities>,
        cookies: Box<dyn CookieJar>,
        image: Box<dyn ImageSurface>,
    ) -> Self {
        Self {
            config,
            callbacks,
            capabilities,
            cookies,
            image,
            state: PollingState::Idle,
            session: PollingSession::new(),
            polling: false,
            snapshot: None,
            requests: 0,
        }
    }

    pub fn state(&self) -> PollingState {
        self.state
    }

    pub fn session(&self) -> &PollingSession {
        &self.session
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Number of stream (re-)requests issued so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// URL the image element should load for the current session key.
    pub fn stream_url(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("key", &self.session.session_key);
        if self.capabilities.needs_advance_headers() {
            query.append_pair("advance_headers", "1");
        }
        if self.capabilities.needs_dual_final_frames() {
            query.append_pair("dual_final_frames", "1");
        }
        format!("{}?{}", self.config.stream_path, query.finish())
    }

    pub fn on_poll_tick(&mut self) -> Vec<Command> {
        if !self.polling {
            trace!("Ignoring poll tick after stop");
            return Vec::new();
        }
        if let Some(fps) = self.resolve() {
            return self.activate(fps);
        }
        if self.session.retries_left > 0 {
            self.session.retries_left -= 1;
            return Vec::new();
        }
        self.fail()
    }

    /// Client id from the session cookie, if it was issued for the current key.
    fn resolve_client_id(&self) -> Option<String> {
        let cookie = self.cookies.get(&self.config.cookie_name)?;
        let (key, client_id) = cookie.split_once('/')?;
        (key == self.session.session_key && !client_id.is_empty()).then(|| client_id.to_string())
    }

    /// Fps of this client when the server reports it in the current snapshot.
    fn resolve(&mut self) -> Option<i32> {
        let client_id = self.resolve_client_id()?;
        let fps = self.snapshot.as_ref()?.client(&client_id)?.fps;
        self.session.client_id = Some(client_id);
        Some(fps)
    }

    fn source_online(&self) -> bool {
        self.snapshot.as_ref().map_or(false, |s| s.source_online)
    }

    fn activate(&mut self, fps: i32) -> Vec<Command> {
        let mut commands = Vec::new();
        if std::mem::take(&mut self.polling) {
            commands.push(Command::StopPolling);
        }
        self.session.fps = fps;
        if self.state != PollingState::Active {
            self.state = PollingState::Active;
            info!(client = ?self.session.client_id, "MJPEG stream active");
            self.callbacks.on_active();
            self.callbacks.on_organize();
        }
        self.callbacks.on_info(true, self.source_online(), &format!("{fps} fps"));
        commands
    }

    /// Retry budget exhausted: re-request the stream under a fresh key.
    fn fail(&mut self) -> Vec<Command> {
        self.polling = false;
        self.state = PollingState::Idle;
        self.session.rekey();
        let url = self.stream_url();
        debug!(url, "Stream not confirmed, re-requesting");
        self.image.set_source(&url);
        self.requests += 1;
        vec![Command::StopPolling]
    }

    fn start_checking(&mut self) -> Vec<Command> {
        self.polling = true;
        self.state = PollingState::Checking;
        self.session.retries_left = self.config.poll_retry_budget;
        vec![Command::StartPolling { interval: self.config.poll_interval() }]
    }
}

impl Streamer for PollingStreamer {
    fn ensure_stream(&mut self, snapshot: Option<&ExternalStreamSnapshot>) -> Vec<Command> {
        let Some(snapshot) = snapshot else {
            return self.stop_stream();
        };
        self.snapshot = Some(snapshot.clone());

        if let Some(fps) = self.resolve() {
            return self.activate(fps);
        }
        if self.state == PollingState::Active {
            info!("MJPEG client no longer reported");
            self.state = PollingState::Checking;
            self.callbacks.on_inactive();
        }
        if self.polling {
            Vec::new()
        } else {
            self.start_checking()
        }
    }

    fn stop_stream(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        let was_running = self.polling || self.state != PollingState::Idle;
        if std::mem::take(&mut self.polling) {
            commands.push(Command::StopPolling);
        }
        self.state = PollingState::Idle;
        if self.image.source() != self.config.placeholder {
            self.image.set_source(&self.config.placeholder);
        }
        if was_running {
            self.session.rekey();
        }
        self.callbacks.on_inactive();
        self.callbacks.on_info(false, false, "");
        commands
    }

    fn name(&self) -> &'static str {
        "MJPEG"
    }

    fn mode(&self) -> StreamerMode {
        StreamerMode::Polling
    }

    fn resolution(&self) -> ResolutionInfo {
        ResolutionInfo::new(self.image.natural_size(), self.image.view_size())
    }
}
