use bytes::Bytes;

// MARK: - VideoFrame

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Nv12,
    Rgba,
    Bgra,
}

/// Decoded frame ready for rendering.
///
/// A frame may hold decoder-owned memory. The release hook runs exactly once,
/// when the frame is dropped, whichever path drops it (drawn, evicted by
/// backpressure, discarded on teardown).
pub struct VideoFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    pub format: PixelFormat,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl VideoFrame {
    pub fn new(data: Bytes, width: u32, height: u32, timestamp_us: u64, format: PixelFormat) -> Self {
        Self { data, width, height, timestamp_us, format, release: None }
    }

    /// Attaches the hook that returns the frame's resources to its decoder.
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for VideoFrame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_us", &self.timestamp_us)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// MARK: - FrameSlot

/// Result of offering a freshly decoded frame to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The slot was empty; the frame is now pending and a refresh is needed.
    Accepted,
    /// A frame was already pending; the new one was released.
    Dropped,
}

/// Single-slot buffer between the decoder and the renderer.
///
/// Keeps the oldest undrawn frame and drops newer ones, so the renderer
/// always makes forward progress instead of chasing the newest frame.
#[derive(Debug, Default)]
pub struct FrameSlot {
    pending: Option<VideoFrame>,
    dropped: u64,
}

impl FrameSlot {
    pub fn offer(&mut self, frame: VideoFrame) -> Offer {
        if self.pending.is_some() {
            self.dropped += 1;
            drop(frame);
            Offer::Dropped
        } else {
            self.pending = Some(frame);
            Offer::Accepted
        }
    }

    /// Moves the pending frame out to the renderer.
    pub fn take(&mut self) -> Option<VideoFrame> {
        self.pending.take()
    }

    /// Releases the pending frame, if any.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_occupied(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&VideoFrame> {
        self.pending.as_ref()
    }

    /// Frames evicted by backpressure since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
