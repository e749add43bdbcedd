/// Host-side contracts: the mount point and the drawing surface
///
/// The core never calls a platform API. A host (terminal, browser) implements
/// `Mount` for the place the page reserves for the viewer and `Surface` for
/// the drawing surface created inside it for one session.

use crate::projection::Camera;
use crate::scene::Scene;

/// Pixel dimensions of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero
    pub fn is_drawable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// How the modal occupies the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Normal,
    Fullscreen,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Normal => DisplayMode::Fullscreen,
            DisplayMode::Fullscreen => DisplayMode::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Normal => "normal",
            DisplayMode::Fullscreen => "fullscreen",
        }
    }
}

/// Handle of one scheduled display-refresh callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Drawing surface owned by one render context
pub trait Surface {
    /// Current size of the container the surface fills
    fn container_size(&self) -> SurfaceSize;

    /// Resize the drawing buffer
    fn set_size(&mut self, size: SurfaceSize);

    /// Apply the display mode to the container (layout only)
    fn set_display_mode(&mut self, mode: DisplayMode);

    /// Draw the scene through the camera
    fn draw(&mut self, scene: &Scene, camera: &Camera);

    /// Ask for a callback on the next display refresh
    fn request_frame(&mut self) -> FrameId;

    /// Cancel a pending frame; unknown ids are ignored
    fn cancel_frame(&mut self, id: FrameId);

    /// Start delivering pointer and wheel events
    fn bind_input(&mut self);

    /// Stop delivering pointer and wheel events
    fn unbind_input(&mut self);

    /// Detach from the mount point and free every buffer
    fn release(&mut self);
}

/// The place the embedding page reserves for the viewer
pub trait Mount {
    type Surface: Surface;

    /// Create a fresh surface for a new session
    fn attach(&mut self, mode: DisplayMode) -> Self::Surface;

    /// Host clock in milliseconds, on the same timeline as frame timestamps
    fn now_ms(&self) -> f64;
}
