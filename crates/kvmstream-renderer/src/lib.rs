pub mod headless;
pub mod scheduler;

use kvmstream_decoder::VideoFrame;
use thiserror::Error;

pub use headless::HeadlessSurface;
pub use scheduler::{display_size, DrawReport, RenderScheduler};

// MARK: - DisplaySurface trait

/// 2D drawing target owned by the host (a canvas, a window, a texture).
///
/// The transform calls follow canvas semantics: `save`/`restore` bracket a
/// transform stack, and `translate`/`rotate` compose onto the current state.
pub trait DisplaySurface: Send {
    /// Backing-store size in pixels.
    fn size(&self) -> (u32, u32);

    /// Size the surface occupies in the layout.
    fn view_size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    fn save(&mut self);

    fn restore(&mut self);

    fn translate(&mut self, x: f64, y: f64);

    fn rotate(&mut self, radians: f64);

    /// Draws `frame` at the origin of the current transform.
    fn draw_frame(&mut self, frame: &VideoFrame) -> Result<(), RendererError>;
}

// MARK: - RendererError

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RendererError {
    #[error("Failed to draw frame: {0}")]
    DrawFailed(String),
}
