use kvmstream_decoder::VideoFrame;
use tracing::{debug, info};

use crate::{DisplaySurface, RendererError};

/// Surface with no pixels behind it. Tracks size and draw count only.
///
/// Used by the command-line client to exercise the full pipeline without a
/// window system.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    size: (u32, u32),
    depth: usize,
    frames_drawn: u64,
}

impl DisplaySurface for HeadlessSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn view_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        info!("Headless surface resized to {}×{}", width, height);
        self.size = (width, height);
    }

    fn save(&mut self) {
        self.depth += 1;
    }

    fn restore(&mut self) {
        debug_assert!(self.depth > 0, "restore without matching save");
        self.depth = self.depth.saturating_sub(1);
    }

    fn translate(&mut self, _x: f64, _y: f64) {}

    fn rotate(&mut self, _radians: f64) {}

    fn draw_frame(&mut self, frame: &VideoFrame) -> Result<(), RendererError> {
        if self.depth == 0 {
            return Err(RendererError::DrawFailed("draw outside save/restore".into()));
        }
        self.frames_drawn += 1;
        if self.frames_drawn % 300 == 1 {
            debug!(?frame, total = self.frames_drawn, "Headless draw");
        }
        Ok(())
    }
}
