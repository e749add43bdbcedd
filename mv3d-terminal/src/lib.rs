/// Terminal host for the model viewer
use crossterm::{
    cursor,
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use mv3d_core::{
    DisplayMode, LoadState, LoadTicket, Mount, PointerButton, PointerEvent, Viewer,
};
use std::cell::{Ref, RefCell};
use std::io::{self, stdout, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub mod config;
pub mod fetch;
pub mod renderer;

pub use config::{RenderStyle, TerminalConfig};
pub use renderer::{CellRect, HostState, SharedHost, TerminalMount, TerminalSurface};

const INSTRUCTIONS: &str = "Click and drag to rotate • Scroll to zoom • Right click to pan";
const CONTROLS: &str = "[f] fullscreen  [n/p] model  [c] close  [q] quit";

/// One model the user can cycle through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub reference: String,
    pub name: String,
}

impl ModelEntry {
    /// Parse `REFERENCE[=Display Name]`; the name defaults to the file stem
    pub fn parse(arg: &str) -> Self {
        if let Some((reference, name)) = arg.rsplit_once('=') {
            let is_name = !reference.is_empty()
                && !name.is_empty()
                && !reference.contains('?')
                && !name.contains(['/', '&']);
            if is_name {
                return Self {
                    reference: reference.to_string(),
                    name: name.to_string(),
                };
            }
        }

        let name = Path::new(arg.trim_end_matches('/'))
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(arg)
            .to_string();
        Self {
            reference: arg.to_string(),
            name,
        }
    }
}

/// Main application struct for the terminal viewer
pub struct TerminalApp {
    viewer: Rc<RefCell<Viewer<TerminalMount>>>,
    host: SharedHost,
    pool: LocalPool,
    models: Vec<ModelEntry>,
    current: usize,
    frame_time: Duration,
    running: bool,
}

impl TerminalApp {
    pub fn new(models: Vec<ModelEntry>, config: TerminalConfig) -> io::Result<Self> {
        let (cols, rows) = terminal::size()?;
        Self::with_size(models, config, cols, rows)
    }

    /// Build the app for a terminal of known size
    pub fn with_size(
        models: Vec<ModelEntry>,
        config: TerminalConfig,
        cols: u16,
        rows: u16,
    ) -> io::Result<Self> {
        if models.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no model given"));
        }

        let host: SharedHost = Rc::new(RefCell::new(HostState::new(cols, rows)));
        let mount = TerminalMount::new(Rc::clone(&host), config.style);
        let viewer = Viewer::new(mount, config.viewer);

        Ok(Self {
            viewer: Rc::new(RefCell::new(viewer)),
            host,
            pool: LocalPool::new(),
            models,
            current: 0,
            frame_time: Duration::from_secs_f64(1.0 / config.frame_rate.max(1) as f64),
            running: true,
        })
    }

    pub fn viewer(&self) -> Ref<'_, Viewer<TerminalMount>> {
        self.viewer.borrow()
    }

    pub fn current_model(&self) -> &ModelEntry {
        &self.models[self.current]
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Open the selected model, starting its load if it is not already open
    pub fn open_current(&mut self) -> io::Result<()> {
        let entry = self.models[self.current].clone();
        let ticket = self
            .viewer
            .borrow_mut()
            .open(&entry.reference, &entry.name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        match ticket {
            Some(ticket) => self.spawn_load(ticket),
            None => Ok(()),
        }
    }

    fn spawn_load(&self, ticket: LoadTicket) -> io::Result<()> {
        let viewer = Rc::downgrade(&self.viewer);
        self.pool
            .spawner()
            .spawn_local(async move {
                if ticket.is_cancelled() {
                    return;
                }
                let fetched = fetch::fetch(ticket.reference().to_string()).await;
                let Some(viewer) = viewer.upgrade() else {
                    return;
                };
                // Superseded loads come back as Cancelled and are already logged
                let _ = viewer.borrow_mut().complete_load(&ticket, fetched);
            })
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    pub fn select(&mut self, index: usize) -> io::Result<()> {
        self.current = index % self.models.len();
        self.open_current()
    }

    pub fn next_model(&mut self) -> io::Result<()> {
        self.select(self.current + 1)
    }

    pub fn previous_model(&mut self) -> io::Result<()> {
        self.select(self.current + self.models.len() - 1)
    }

    pub fn run(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            stdout(),
            terminal::EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide
        )?;

        let result = self.open_current().and_then(|_| self.main_loop());

        // Cleanup
        self.viewer.borrow_mut().close();
        execute!(
            stdout(),
            DisableMouseCapture,
            terminal::LeaveAlternateScreen,
            cursor::Show
        )?;
        terminal::disable_raw_mode()?;

        result
    }

    fn main_loop(&mut self) -> io::Result<()> {
        let mut stdout = stdout();

        while self.running {
            // Input until the next display refresh
            let deadline = Instant::now() + self.frame_time;
            loop {
                let now = Instant::now();
                if now >= deadline || !event::poll(deadline - now)? {
                    break;
                }
                let event = event::read()?;
                self.handle_event(event)?;
                if !self.running {
                    return Ok(());
                }
            }

            self.pool.run_until_stalled();
            self.fire_frame();
            self.present(&mut stdout)?;
        }

        Ok(())
    }

    /// Run the frame the live surface scheduled, if any
    fn fire_frame(&mut self) {
        let mut viewer = self.viewer.borrow_mut();
        let now_ms = viewer.mount().now_ms();
        // A session still waiting for a size gets no frames to time out from
        viewer.poll_timeout(now_ms);

        let scheduled = self.host.borrow_mut().take_scheduled();
        if let Some(id) = scheduled {
            // Stale ids are rejected and logged by the viewer
            let _ = viewer.frame(id, now_ms);
        }
    }

    pub fn handle_event(&mut self, event: Event) -> io::Result<()> {
        match event {
            Event::Key(key) => self.handle_key(key)?,
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(cols, rows) => {
                {
                    let mut host = self.host.borrow_mut();
                    host.terminal_size = (cols, rows);
                    host.needs_clear = true;
                }
                let mut viewer = self.viewer.borrow_mut();
                viewer.resize();
                // The modal can move without changing size
                let modal = CellRect::modal(viewer.display_mode(), cols, rows);
                let mut host = self.host.borrow_mut();
                if host.region.is_some() {
                    host.region = Some(modal);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> io::Result<()> {
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.running = false;
            return Ok(());
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char('f') => {
                let mode = self.viewer.borrow_mut().toggle_fullscreen();
                log::debug!("toggled to {}", mode.as_str());
            }
            KeyCode::Char('n') | KeyCode::Tab => self.next_model()?,
            KeyCode::Char('p') | KeyCode::BackTab => self.previous_model()?,
            KeyCode::Char('c') => self.viewer.borrow_mut().close(),
            KeyCode::Char('o') => self.open_current()?,
            _ => {}
        }
        Ok(())
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let (pixel, inside) = {
            let host = self.host.borrow();
            if !host.input_bound {
                return;
            }
            let inside = host
                .region
                .map_or(false, |r| r.contains(mouse.column, mouse.row));
            (host.to_pixel(mouse.column, mouse.row), inside)
        };
        let Some((x, y)) = pixel else {
            return;
        };

        // Presses and scrolls must land on the surface; moves and releases
        // are delivered anywhere so a drag can end outside it
        let starts_gesture = matches!(
            mouse.kind,
            MouseEventKind::Down(_) | MouseEventKind::ScrollUp | MouseEventKind::ScrollDown
        );
        if starts_gesture && !inside {
            return;
        }

        if let Some(event) = pointer_event(mouse.kind, x, y) {
            self.viewer.borrow_mut().handle_input(event);
        }
    }

    /// Write the last frame and the chrome around it
    fn present<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let (clear, frame) = {
            let mut host = self.host.borrow_mut();
            (std::mem::take(&mut host.needs_clear), host.take_output())
        };
        if clear {
            queue!(out, ResetColor, Clear(ClearType::All))?;
        }
        out.write_all(&frame)?;
        self.draw_chrome(out)?;
        out.flush()
    }

    fn draw_chrome<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let viewer = self.viewer.borrow();
        let (cols, rows) = self.host.borrow().terminal_size;

        if !viewer.is_open() {
            let message = format!(
                "Viewer closed. Press o to open {}, q to quit",
                self.current_model().name
            );
            return centered(out, &message, CellRect::modal(DisplayMode::Fullscreen, cols, rows), rows / 2, Color::Grey);
        }

        let modal = CellRect::modal(viewer.display_mode(), cols, rows);
        if modal.cols == 0 || modal.rows == 0 {
            return Ok(());
        }
        let width = modal.cols as usize;

        // Title bar
        let title = format!(" {} ", viewer.display_name().unwrap_or_default());
        let title = truncate(&title, width);
        queue!(
            out,
            cursor::MoveTo(modal.col, modal.row),
            SetAttribute(Attribute::Bold),
            SetForegroundColor(Color::White),
            Print(&title),
            SetAttribute(Attribute::Reset)
        )?;
        let used = title.chars().count();
        if used + CONTROLS.len() + 1 < width {
            queue!(
                out,
                cursor::MoveTo(modal.col + (width - CONTROLS.len() - 1) as u16, modal.row),
                SetForegroundColor(Color::DarkGrey),
                Print(CONTROLS)
            )?;
        }

        let middle = modal.row + modal.rows / 2;
        match viewer.load_state() {
            LoadState::Loading => centered(out, "Loading model...", modal, middle, Color::Cyan)?,
            LoadState::Failed => {
                let reason = viewer.last_error().unwrap_or("unknown error");
                centered(out, &format!("Failed to load model: {}", reason), modal, middle, Color::Red)?;
            }
            LoadState::Idle | LoadState::Loaded => {}
        }

        if modal.rows > 2 {
            centered(out, INSTRUCTIONS, modal, modal.row + modal.rows - 1, Color::Grey)?;
        }
        queue!(out, ResetColor)
    }
}

/// Translate a terminal mouse event at framebuffer position (x, y)
pub fn pointer_event(kind: MouseEventKind, x: f32, y: f32) -> Option<PointerEvent> {
    let button = |b: MouseButton| match b {
        MouseButton::Left => PointerButton::Primary,
        MouseButton::Right => PointerButton::Secondary,
        MouseButton::Middle => PointerButton::Middle,
    };

    match kind {
        MouseEventKind::Down(b) => Some(PointerEvent::Down { button: button(b), x, y }),
        MouseEventKind::Up(b) => Some(PointerEvent::Up { button: button(b) }),
        MouseEventKind::Drag(_) | MouseEventKind::Moved => Some(PointerEvent::Move { x, y }),
        MouseEventKind::ScrollDown => Some(PointerEvent::Wheel { delta_y: 1.0 }),
        MouseEventKind::ScrollUp => Some(PointerEvent::Wheel { delta_y: -1.0 }),
        _ => None,
    }
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn centered<W: Write>(out: &mut W, text: &str, area: CellRect, row: u16, color: Color) -> io::Result<()> {
    let text = truncate(text, area.cols as usize);
    let len = text.chars().count() as u16;
    let col = area.col + (area.cols.saturating_sub(len)) / 2;
    queue!(
        out,
        cursor::MoveTo(col, row),
        SetForegroundColor(color),
        Print(text),
        ResetColor
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mv3d_core::ViewerConfig;
    use std::io::Write as _;

    fn key(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn cube_stl() -> tempfile::NamedTempFile {
        let mesh = mv3d_core::Mesh::cuboid(
            nalgebra::Point3::new(1.0, 2.0, 3.0),
            nalgebra::Vector3::new(2.0, 4.0, 1.0),
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "solid cube").unwrap();
        for t in &mesh.triangles {
            writeln!(file, "facet normal 0 0 0\nouter loop").unwrap();
            for v in &t.vertices {
                writeln!(file, "vertex {} {} {}", v.position.x, v.position.y, v.position.z).unwrap();
            }
            writeln!(file, "endloop\nendfacet").unwrap();
        }
        writeln!(file, "endsolid cube").unwrap();
        file
    }

    fn app(models: &[&str]) -> TerminalApp {
        let models = models.iter().map(|m| ModelEntry::parse(m)).collect();
        TerminalApp::with_size(models, TerminalConfig::default(), 100, 50).unwrap()
    }

    #[test]
    fn test_model_entry_parse() {
        assert_eq!(
            ModelEntry::parse("models/shoe.glb=Air Runner"),
            ModelEntry { reference: "models/shoe.glb".into(), name: "Air Runner".into() }
        );
        assert_eq!(ModelEntry::parse("models/shoe.glb").name, "shoe");
        let url = ModelEntry::parse("https://cdn.example.com/a.glb?v=2");
        assert_eq!(url.reference, "https://cdn.example.com/a.glb?v=2");
    }

    #[test]
    fn test_requires_a_model() {
        assert!(TerminalApp::with_size(Vec::new(), TerminalConfig::default(), 80, 24).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let file = cube_stl();
        let mut app = app(&[file.path().to_str().unwrap()]);
        app.open_current().unwrap();
        assert_eq!(app.viewer().load_state(), LoadState::Loading);

        app.pool.run();
        let viewer = app.viewer();
        assert_eq!(viewer.load_state(), LoadState::Loaded);
        let asset = viewer.context().unwrap().scene().asset().unwrap();
        assert!((asset.transform.scale - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.glb");
        let mut app = app(&[missing.to_str().unwrap()]);
        app.open_current().unwrap();
        app.pool.run();

        assert_eq!(app.viewer().load_state(), LoadState::Failed);
        assert!(app.viewer().last_error().is_some());
    }

    #[test]
    fn test_switching_models_discards_first_load() {
        let first = cube_stl();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.glb");
        let mut app = app(&[first.path().to_str().unwrap(), missing.to_str().unwrap()]);

        app.open_current().unwrap();
        app.handle_event(key('n')).unwrap();
        app.pool.run();

        let viewer = app.viewer();
        assert_eq!(viewer.asset_reference(), missing.to_str());
        assert_eq!(viewer.load_state(), LoadState::Failed);
        assert!(viewer.context().unwrap().scene().is_empty());
    }

    #[test]
    fn test_frames_fire_and_present() {
        let file = cube_stl();
        let mut app = app(&[file.path().to_str().unwrap()]);
        app.open_current().unwrap();
        app.pool.run();

        app.fire_frame();
        let mut out = Vec::new();
        app.present(&mut out).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains('▀'));
        assert!(text.contains(INSTRUCTIONS));
        assert!(app.host.borrow().scheduled().is_some());
    }

    #[test]
    fn test_loading_overlay() {
        let mut app = app(&["never-fetched.glb=Shoe"]);
        app.viewer.borrow_mut().open("never-fetched.glb", "Shoe").unwrap();

        let mut out = Vec::new();
        app.present(&mut out).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Loading model..."));
        assert!(text.contains(" Shoe "));
    }

    #[test]
    fn test_keys_drive_session() {
        let file = cube_stl();
        let mut app = app(&[file.path().to_str().unwrap()]);
        app.open_current().unwrap();

        app.handle_event(key('f')).unwrap();
        assert_eq!(app.viewer().display_mode(), DisplayMode::Fullscreen);
        assert_eq!(app.host.borrow().region, Some(CellRect { col: 0, row: 0, cols: 100, rows: 50 }));

        app.handle_event(key('c')).unwrap();
        assert!(!app.viewer().is_open());
        assert!(!app.host.borrow().input_bound);
        assert_eq!(app.host.borrow().scheduled(), None);

        app.handle_event(key('o')).unwrap();
        assert!(app.viewer().is_open());

        app.handle_event(key('q')).unwrap();
        assert!(!app.is_running());
    }

    #[test]
    fn test_mouse_outside_surface_is_ignored() {
        let file = cube_stl();
        let mut app = app(&[file.path().to_str().unwrap()]);
        app.open_current().unwrap();

        app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), 0, 0)).unwrap();
        app.handle_event(mouse(MouseEventKind::Drag(MouseButton::Left), 40, 20)).unwrap();
        assert!(app.viewer().context().unwrap().controls().is_settled());

        app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), 20, 20)).unwrap();
        app.handle_event(mouse(MouseEventKind::Drag(MouseButton::Left), 40, 20)).unwrap();
        assert!(!app.viewer().context().unwrap().controls().is_settled());
    }

    #[test]
    fn test_resize_event_updates_aspect() {
        let file = cube_stl();
        let mut app = app(&[file.path().to_str().unwrap()]);
        app.open_current().unwrap();

        app.handle_event(Event::Resize(60, 20)).unwrap();
        let viewer = app.viewer();
        let camera = viewer.context().unwrap().camera();
        assert_eq!(camera.aspect, 48.0 / 32.0);
    }

    #[test]
    fn test_resize_that_moves_modal_moves_region() {
        let file = cube_stl();
        let models = vec![ModelEntry::parse(file.path().to_str().unwrap())];
        let mut app = TerminalApp::with_size(models, TerminalConfig::default(), 105, 50).unwrap();
        app.open_current().unwrap();
        assert_eq!(app.host.borrow().region.map(|r| r.col), Some(10));

        // 105 and 106 columns give the same modal width at a different offset
        app.handle_event(Event::Resize(106, 50)).unwrap();
        let expected = CellRect::modal(DisplayMode::Normal, 106, 50);
        assert_eq!(expected.col, 11);
        assert_eq!(app.host.borrow().region, Some(expected));
        assert_eq!(app.host.borrow().to_pixel(11, 5), Some((0.5, 1.0)));
    }

    #[test]
    fn test_timeout_fires_without_frames() {
        let config = TerminalConfig {
            viewer: ViewerConfig { load_timeout_ms: Some(0), ..Default::default() },
            ..Default::default()
        };
        let models = vec![ModelEntry::parse("never-fetched.glb")];
        // A zero-size terminal never bootstraps, so no frame is scheduled
        let mut app = TerminalApp::with_size(models, config, 0, 0).unwrap();
        app.viewer.borrow_mut().open("never-fetched.glb", "Never").unwrap();
        assert_eq!(app.host.borrow().scheduled(), None);

        app.fire_frame();
        assert_eq!(app.viewer().load_state(), LoadState::Failed);
        assert!(app.viewer().last_error().unwrap().contains("did not load"));
    }

    #[test]
    fn test_pointer_event_mapping() {
        assert_eq!(
            pointer_event(MouseEventKind::Down(MouseButton::Right), 1.0, 2.0),
            Some(PointerEvent::Down { button: PointerButton::Secondary, x: 1.0, y: 2.0 })
        );
        assert_eq!(
            pointer_event(MouseEventKind::ScrollUp, 0.0, 0.0),
            Some(PointerEvent::Wheel { delta_y: -1.0 })
        );
        assert_eq!(pointer_event(MouseEventKind::ScrollLeft, 0.0, 0.0), None);
    }

    #[test]
    fn test_config_reaches_viewer() {
        let config = TerminalConfig {
            viewer: ViewerConfig { load_timeout_ms: Some(10), ..Default::default() },
            ..Default::default()
        };
        let app = TerminalApp::with_size(vec![ModelEntry::parse("a.glb")], config, 80, 24).unwrap();
        assert_eq!(app.viewer().load_timeout(), Some(Duration::from_millis(10)));
    }
}
