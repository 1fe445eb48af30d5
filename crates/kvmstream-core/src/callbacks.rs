//! Collaborator interfaces injected into every streamer at construction.
//!
//! Streamers never surface errors to their caller. Everything the outside
//! world learns about stream health goes through [`StreamerCallbacks`].

// MARK: - StreamerCallbacks

/// Status sink implemented by the UI layer.
pub trait StreamerCallbacks: Send + Sync {
    /// The stream is live and frames are reaching the surface.
    fn on_active(&self);

    /// The stream stopped, failed, or is (re)connecting.
    fn on_inactive(&self);

    /// Human-readable health line.
    fn on_info(&self, is_streaming: bool, source_online: bool, message: &str);

    /// The display surface changed size; the layout manager should re-flow.
    fn on_organize(&self);
}

// MARK: - PlatformCapabilities

/// Feature detection answered by the host platform.
pub trait PlatformCapabilities: Send + Sync {
    /// Whether the page/app runs in a secure (HTTPS) context. Some decode
    /// APIs are only exposed there.
    fn is_secure_context(&self) -> bool;

    /// Whether a video decoder API exists at all.
    fn has_video_decoder(&self) -> bool;

    /// Rendering engine that needs the server to send multipart headers ahead
    /// of each JPEG.
    fn needs_advance_headers(&self) -> bool {
        false
    }

    /// Rendering engine that only shows the second-to-last part of a
    /// multipart stream, so the server must send each final frame twice.
    fn needs_dual_final_frames(&self) -> bool {
        false
    }
}

/// Capabilities of a native desktop host: always secure, decoder present.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCapabilities;

impl PlatformCapabilities for NativeCapabilities {
    fn is_secure_context(&self) -> bool {
        true
    }

    fn has_video_decoder(&self) -> bool {
        true
    }
}
