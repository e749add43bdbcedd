/// Terminal surface: presents the software framebuffer as character cells
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use crossterm::{
    cursor,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    QueueableCommand,
};
use mv3d_core::{
    Camera, DisplayMode, FrameId, Framebuffer, Mount, Scene, Surface, SurfaceSize,
};

use crate::config::RenderStyle;

/// Character luminosity ramp for shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Upper half block; foreground is the top pixel, background the bottom one
const HALF_BLOCK: char = '▀';

/// Share of the terminal the modal covers in normal mode
const NORMAL_FRACTION: (u32, u32) = (4, 5);

/// A rectangle of terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellRect {
    pub col: u16,
    pub row: u16,
    pub cols: u16,
    pub rows: u16,
}

impl CellRect {
    /// Region the modal occupies for `mode` on a `cols`x`rows` terminal
    pub fn modal(mode: DisplayMode, cols: u16, rows: u16) -> Self {
        match mode {
            DisplayMode::Fullscreen => Self {
                col: 0,
                row: 0,
                cols,
                rows,
            },
            DisplayMode::Normal => {
                let (num, den) = NORMAL_FRACTION;
                let w = (cols as u32 * num / den) as u16;
                let h = (rows as u32 * num / den) as u16;
                Self {
                    col: (cols - w) / 2,
                    row: (rows - h) / 2,
                    cols: w,
                    rows: h,
                }
            }
        }
    }

    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.col && col < self.col + self.cols && row >= self.row && row < self.row + self.rows
    }
}

/// State the event loop and the live surface share
#[derive(Debug, Default)]
pub struct HostState {
    pub terminal_size: (u16, u16),
    /// Cells covered by the live surface
    pub region: Option<CellRect>,
    pub input_bound: bool,
    /// The screen must be wiped before the next present
    pub needs_clear: bool,
    scheduled: Option<FrameId>,
    next_frame_id: u64,
    output: Vec<u8>,
}

pub type SharedHost = Rc<RefCell<HostState>>;

impl HostState {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            terminal_size: (cols, rows),
            needs_clear: true,
            ..Default::default()
        }
    }

    pub fn scheduled(&self) -> Option<FrameId> {
        self.scheduled
    }

    /// Claim the frame due on this refresh
    pub fn take_scheduled(&mut self) -> Option<FrameId> {
        self.scheduled.take()
    }

    /// Commands queued by the last draw
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Framebuffer coordinates of a cell relative to the live surface
    pub fn to_pixel(&self, col: u16, row: u16) -> Option<(f32, f32)> {
        let region = self.region?;
        let x = col as f32 - region.col as f32 + 0.5;
        let y = (row as f32 - region.row as f32) * 2.0 + 1.0;
        Some((x, y))
    }
}

/// Ramp character for a luminance in [0, 1]
pub fn ramp_char(luminance: f32) -> char {
    let index = (luminance.clamp(0.0, 1.0) * (LUMINOSITY_RAMP.len() - 1) as f32) as usize;
    LUMINOSITY_RAMP[index.min(LUMINOSITY_RAMP.len() - 1)]
}

fn ramp_color(c: char) -> Color {
    match c {
        ' ' | '.' | ':' => Color::DarkGrey,
        '-' | '=' => Color::Grey,
        '+' | '*' => Color::White,
        '#' | '%' | '@' => Color::Cyan,
        _ => Color::White,
    }
}

fn rgb(color: mv3d_core::Color) -> Color {
    let [r, g, b] = color.to_rgb8();
    Color::Rgb { r, g, b }
}

/// Queue the framebuffer into `region`, two pixel rows per cell row
pub fn present<W: Write>(
    framebuffer: &Framebuffer,
    region: CellRect,
    style: RenderStyle,
    writer: &mut W,
) -> io::Result<()> {
    let cols = (region.cols as u32).min(framebuffer.width());
    let rows = (region.rows as u32).min(framebuffer.height() / 2);

    for row in 0..rows {
        writer.queue(cursor::MoveTo(region.col, region.row + row as u16))?;
        let mut last: Option<(Color, Color)> = None;

        for col in 0..cols {
            let top = framebuffer.pixel(col, row * 2);
            let bottom = framebuffer.pixel(col, row * 2 + 1);

            let (glyph, fg, bg) = match style {
                RenderStyle::HalfBlock => (HALF_BLOCK, rgb(top), rgb(bottom)),
                RenderStyle::Ascii => {
                    let c = ramp_char((top.luminance() + bottom.luminance()) * 0.5);
                    (c, ramp_color(c), Color::Black)
                }
            };

            if last != Some((fg, bg)) {
                writer.queue(SetForegroundColor(fg))?;
                writer.queue(SetBackgroundColor(bg))?;
                last = Some((fg, bg));
            }
            writer.queue(Print(glyph))?;
        }
    }
    writer.queue(ResetColor)?;
    Ok(())
}

pub struct TerminalSurface {
    host: SharedHost,
    style: RenderStyle,
    mode: DisplayMode,
    framebuffer: Framebuffer,
}

impl TerminalSurface {
    fn modal(&self) -> CellRect {
        let (cols, rows) = self.host.borrow().terminal_size;
        CellRect::modal(self.mode, cols, rows)
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }
}

impl Surface for TerminalSurface {
    fn container_size(&self) -> SurfaceSize {
        let region = self.modal();
        SurfaceSize::new(region.cols as u32, region.rows as u32 * 2)
    }

    fn set_size(&mut self, size: SurfaceSize) {
        self.framebuffer.resize(size.width, size.height);
        let region = self.modal();
        let mut host = self.host.borrow_mut();
        host.region = Some(region);
        host.needs_clear = true;
    }

    fn set_display_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
        let region = self.modal();
        let mut host = self.host.borrow_mut();
        if host.region.is_some() {
            host.region = Some(region);
        }
        host.needs_clear = true;
    }

    fn draw(&mut self, scene: &Scene, camera: &Camera) {
        self.framebuffer.render_scene(scene, camera);

        let mut host = self.host.borrow_mut();
        let Some(region) = host.region else {
            return;
        };
        host.output.clear();
        if let Err(e) = present(&self.framebuffer, region, self.style, &mut host.output) {
            log::warn!("failed to encode frame: {}", e);
        }
    }

    fn request_frame(&mut self) -> FrameId {
        let mut host = self.host.borrow_mut();
        host.next_frame_id += 1;
        let id = FrameId(host.next_frame_id);
        host.scheduled = Some(id);
        id
    }

    fn cancel_frame(&mut self, id: FrameId) {
        let mut host = self.host.borrow_mut();
        if host.scheduled == Some(id) {
            host.scheduled = None;
        }
    }

    fn bind_input(&mut self) {
        self.host.borrow_mut().input_bound = true;
    }

    fn unbind_input(&mut self) {
        self.host.borrow_mut().input_bound = false;
    }

    fn release(&mut self) {
        self.framebuffer.release();
        let mut host = self.host.borrow_mut();
        host.region = None;
        host.output.clear();
        host.needs_clear = true;
    }
}

/// The terminal screen; hands out one surface per session
pub struct TerminalMount {
    host: SharedHost,
    style: RenderStyle,
    started: Instant,
}

impl TerminalMount {
    pub fn new(host: SharedHost, style: RenderStyle) -> Self {
        Self {
            host,
            style,
            started: Instant::now(),
        }
    }
}

impl Mount for TerminalMount {
    type Surface = TerminalSurface;

    fn attach(&mut self, mode: DisplayMode) -> TerminalSurface {
        self.host.borrow_mut().needs_clear = true;
        TerminalSurface {
            host: Rc::clone(&self.host),
            style: self.style,
            mode,
            framebuffer: Framebuffer::new(0, 0),
        }
    }

    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mv3d_core::context::bootstrap;

    fn shared(cols: u16, rows: u16) -> SharedHost {
        Rc::new(RefCell::new(HostState::new(cols, rows)))
    }

    #[test]
    fn test_modal_layout() {
        let normal = CellRect::modal(DisplayMode::Normal, 100, 50);
        assert_eq!(normal, CellRect { col: 10, row: 5, cols: 80, rows: 40 });

        let full = CellRect::modal(DisplayMode::Fullscreen, 100, 50);
        assert_eq!(full, CellRect { col: 0, row: 0, cols: 100, rows: 50 });

        assert!(normal.contains(10, 5));
        assert!(!normal.contains(90, 20));
        assert_eq!(CellRect::modal(DisplayMode::Normal, 0, 0).cols, 0);
    }

    #[test]
    fn test_ramp_char_bounds() {
        assert_eq!(ramp_char(0.0), ' ');
        assert_eq!(ramp_char(1.0), '@');
        assert_eq!(ramp_char(7.5), '@');
        assert_eq!(ramp_char(-1.0), ' ');
    }

    #[test]
    fn test_surface_size_follows_mode() {
        let host = shared(100, 50);
        let mut mount = TerminalMount::new(Rc::clone(&host), RenderStyle::HalfBlock);
        let mut surface = mount.attach(DisplayMode::Normal);
        assert_eq!(surface.container_size(), SurfaceSize::new(80, 80));

        surface.set_display_mode(DisplayMode::Fullscreen);
        assert_eq!(surface.container_size(), SurfaceSize::new(100, 100));
    }

    #[test]
    fn test_frame_scheduling() {
        let host = shared(40, 20);
        let mut surface = TerminalMount::new(Rc::clone(&host), RenderStyle::Ascii).attach(DisplayMode::Normal);

        let first = surface.request_frame();
        assert_eq!(host.borrow().scheduled(), Some(first));

        let second = surface.request_frame();
        surface.cancel_frame(first);
        assert_eq!(host.borrow().scheduled(), Some(second));

        surface.cancel_frame(second);
        assert_eq!(host.borrow().scheduled(), None);
    }

    #[test]
    fn test_draw_fills_region() {
        let host = shared(20, 10);
        let mut surface = TerminalMount::new(Rc::clone(&host), RenderStyle::HalfBlock).attach(DisplayMode::Fullscreen);
        let size = surface.container_size();
        surface.set_size(size);

        let (scene, camera) = bootstrap(size).unwrap();
        surface.draw(&scene, &camera);

        let output = String::from_utf8(host.borrow_mut().take_output()).unwrap();
        assert_eq!(output.matches(HALF_BLOCK).count(), 20 * 10);
    }

    #[test]
    fn test_pixel_mapping_and_release() {
        let host = shared(100, 50);
        let mut surface = TerminalMount::new(Rc::clone(&host), RenderStyle::HalfBlock).attach(DisplayMode::Normal);
        assert_eq!(host.borrow().to_pixel(10, 5), None);

        surface.set_size(surface.container_size());
        assert_eq!(host.borrow().to_pixel(10, 5), Some((0.5, 1.0)));
        assert_eq!(host.borrow().to_pixel(12, 7), Some((2.5, 5.0)));

        surface.release();
        assert_eq!(host.borrow().region, None);
        assert_eq!(surface.framebuffer().width(), 0);
    }
}
