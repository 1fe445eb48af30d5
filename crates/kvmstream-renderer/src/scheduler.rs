use std::ops::{Deref, DerefMut};

use kvmstream_core::Orientation;
use kvmstream_decoder::VideoFrame;
use tracing::debug;

use crate::{DisplaySurface, RendererError};

/// On-screen size of a `width`×`height` frame under `orientation`.
pub fn display_size(orientation: Orientation, width: u32, height: u32) -> (u32, u32) {
    if orientation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawReport {
    /// The surface was resized to fit the frame; layout must be notified.
    pub resized: bool,
}

// ── TransformGuard ────────────────────────────────────────────────────────────

/// Saves the surface transform on creation and restores it on drop.
struct TransformGuard<'a, S: DisplaySurface + ?Sized> {
    surface: &'a mut S,
}

impl<'a, S: DisplaySurface + ?Sized> TransformGuard<'a, S> {
    fn new(surface: &'a mut S) -> Self {
        surface.save();
        Self { surface }
    }
}

impl<S: DisplaySurface + ?Sized> Deref for TransformGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: DisplaySurface + ?Sized> DerefMut for TransformGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: DisplaySurface + ?Sized> Drop for TransformGuard<'_, S> {
    fn drop(&mut self) {
        self.surface.restore();
    }
}

// ── RenderScheduler ───────────────────────────────────────────────────────────

/// Draws the pending frame once per display refresh.
///
/// The scheduler only tracks whether a refresh callback is outstanding. The
/// host calls back on its own frame cadence; there is no timer here.
#[derive(Debug, Clone)]
pub struct RenderScheduler {
    orientation: Orientation,
    refresh_requested: bool,
}

impl RenderScheduler {
    pub fn new(orientation: Orientation) -> Self {
        Self { orientation, refresh_requested: false }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Marks a refresh as wanted. Returns `true` if the host must be asked
    /// for one, `false` if a request is already outstanding.
    pub fn request_refresh(&mut self) -> bool {
        !std::mem::replace(&mut self.refresh_requested, true)
    }

    /// The host delivered the refresh callback.
    pub fn refresh_delivered(&mut self) {
        self.refresh_requested = false;
    }

    /// Draws `frame` onto `surface`, rotating by the fixed orientation.
    ///
    /// The frame is consumed: it is released when this returns, whether the
    /// draw succeeded or not. The surface transform is restored on every path.
    pub fn draw<S: DisplaySurface + ?Sized>(
        &self,
        surface: &mut S,
        frame: VideoFrame,
    ) -> Result<DrawReport, RendererError> {
        let (width, height) = display_size(self.orientation, frame.width, frame.height);
        let resized = surface.size() != (width, height);
        if resized {
            debug!(width, height, orientation = %self.orientation, "Resizing surface");
            surface.resize(width, height);
        }

        let mut guard = TransformGuard::new(surface);
        let (w, h) = (f64::from(width), f64::from(height));
        match self.orientation {
            Orientation::Deg0 => {}
            Orientation::Deg90 => {
                guard.translate(w, 0.0);
                guard.rotate(self.orientation.radians());
            }
            Orientation::Deg180 => {
                guard.translate(w, h);
                guard.rotate(self.orientation.radians());
            }
            Orientation::Deg270 => {
                guard.translate(0.0, h);
                guard.rotate(self.orientation.radians());
            }
        }
        guard.draw_frame(&frame)?;
        Ok(DrawReport { resized })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use kvmstream_decoder::PixelFormat;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Resize(u32, u32),
        Save,
        Restore,
        Translate(f64, f64),
        Rotate(u16),
        Draw,
    }

    #[derive(Default)]
    struct RecordingSurface {
        size: (u32, u32),
        ops: Vec<Op>,
        fail_draw: bool,
    }

    impl DisplaySurface for RecordingSurface {
        fn size(&self) -> (u32, u32) {
            self.size
        }
        fn view_size(&self) -> (u32, u32) {
            self.size
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.size = (width, height);
            self.ops.push(Op::Resize(width, height));
        }
        fn save(&mut self) {
            self.ops.push(Op::Save);
        }
        fn restore(&mut self) {
            self.ops.push(Op::Restore);
        }
        fn translate(&mut self, x: f64, y: f64) {
            self.ops.push(Op::Translate(x, y));
        }
        fn rotate(&mut self, radians: f64) {
            self.ops.push(Op::Rotate(radians.to_degrees().round() as u16));
        }
        fn draw_frame(&mut self, _frame: &VideoFrame) -> Result<(), RendererError> {
            if self.fail_draw {
                return Err(RendererError::DrawFailed("boom".into()));
            }
            self.ops.push(Op::Draw);
            Ok(())
        }
    }

    fn frame(width: u32, height: u32, releases: &Arc<AtomicUsize>) -> VideoFrame {
        let releases = Arc::clone(releases);
        VideoFrame::new(Bytes::new(), width, height, 0, PixelFormat::Bgra).with_release(move || {
            releases.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn display_size_matches_orientation_mapping() {
        for orientation in Orientation::ALL {
            let (w, h) = display_size(orientation, 1920, 1080);
            if orientation.swaps_axes() {
                assert_eq!((w, h), (1080, 1920), "{orientation}");
            } else {
                assert_eq!((w, h), (1920, 1080), "{orientation}");
            }
        }
    }

    #[test]
    fn surface_takes_oriented_size_for_every_orientation() {
        let releases = Arc::new(AtomicUsize::new(0));
        for orientation in Orientation::ALL {
            let scheduler = RenderScheduler::new(orientation);
            let mut surface = RecordingSurface::default();
            let report = scheduler.draw(&mut surface, frame(800, 600, &releases)).unwrap();
            assert!(report.resized);
            assert_eq!(surface.size, display_size(orientation, 800, 600));
        }
        assert_eq!(releases.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn quarter_turn_translates_then_rotates() {
        let releases = Arc::new(AtomicUsize::new(0));
        let scheduler = RenderScheduler::new(Orientation::Deg90);
        let mut surface = RecordingSurface { size: (600, 800), ..Default::default() };

        let report = scheduler.draw(&mut surface, frame(800, 600, &releases)).unwrap();
        assert!(!report.resized);
        assert_eq!(
            surface.ops,
            vec![Op::Save, Op::Translate(600.0, 0.0), Op::Rotate(90), Op::Draw, Op::Restore]
        );
    }

    #[test]
    fn identity_orientation_applies_no_transform() {
        let releases = Arc::new(AtomicUsize::new(0));
        let scheduler = RenderScheduler::new(Orientation::Deg0);
        let mut surface = RecordingSurface { size: (800, 600), ..Default::default() };
        scheduler.draw(&mut surface, frame(800, 600, &releases)).unwrap();
        assert_eq!(surface.ops, vec![Op::Save, Op::Draw, Op::Restore]);
    }

    #[test]
    fn failed_draw_restores_transform_and_releases_frame() {
        let releases = Arc::new(AtomicUsize::new(0));
        let scheduler = RenderScheduler::new(Orientation::Deg180);
        let mut surface = RecordingSurface { size: (800, 600), fail_draw: true, ..Default::default() };

        assert!(scheduler.draw(&mut surface, frame(800, 600, &releases)).is_err());
        assert_eq!(surface.ops.last(), Some(&Op::Restore));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refresh_requested_once_until_delivered() {
        let mut scheduler = RenderScheduler::new(Orientation::Deg0);
        assert!(scheduler.request_refresh());
        assert!(!scheduler.request_refresh());
        scheduler.refresh_delivered();
        assert!(scheduler.request_refresh());
    }
}
