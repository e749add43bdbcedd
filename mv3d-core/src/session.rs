/// Session controller: the viewer's open/close state machine
///
/// `Viewer` holds at most one session. Opening a different reference tears
/// the current one down first; every teardown bumps a generation counter that
/// outstanding `LoadTicket`s compare against, so a completion that arrives
/// after its session ended is discarded instead of touching the new scene.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::config::ViewerConfig;
use crate::context::{Bootstrap, RenderContext};
use crate::decode::decode_asset;
use crate::error::{FetchError, ViewerError, ViewerResult};
use crate::orbit::PointerEvent;
use crate::scene::LoadedAsset;
use crate::surface::{DisplayMode, FrameId, Mount, Surface};
use crate::transform::REFERENCE_SIZE;

/// Progress of the asset load for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

impl LoadState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::Failed => "failed",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cancellation token for one asset load.
///
/// The host fetches `reference()` and hands the bytes back through
/// `Viewer::complete_load`. Long-running hosts can poll `is_cancelled` to
/// abandon work early.
#[derive(Clone)]
pub struct LoadTicket {
    reference: String,
    generation: u64,
    current: Rc<Cell<u64>>,
}

impl LoadTicket {
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The session this ticket was issued for has ended or moved on
    pub fn is_cancelled(&self) -> bool {
        self.current.get() != self.generation
    }
}

impl fmt::Debug for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadTicket")
            .field("reference", &self.reference)
            .field("generation", &self.generation)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

enum Stage<S: Surface> {
    /// Surface exists but its container has no size yet
    AwaitingSize(S),
    Live(RenderContext<S>),
}

struct Session<S: Surface> {
    reference: String,
    display_name: String,
    stage: Option<Stage<S>>,
    /// Asset that resolved before the context could be bootstrapped
    pending_asset: Option<LoadedAsset>,
    load_started_ms: f64,
}

impl<S: Surface> Session<S> {
    fn context(&self) -> Option<&RenderContext<S>> {
        match &self.stage {
            Some(Stage::Live(ctx)) => Some(ctx),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut RenderContext<S>> {
        match &mut self.stage {
            Some(Stage::Live(ctx)) => Some(ctx),
            _ => None,
        }
    }

    /// Build the render context if the container now has a size
    fn try_bootstrap(&mut self, config: &ViewerConfig) -> bool {
        let surface = match self.stage.take() {
            Some(Stage::AwaitingSize(surface)) => surface,
            other => {
                self.stage = other;
                return false;
            }
        };

        match RenderContext::bootstrap(surface, config) {
            Bootstrap::Ready(mut ctx) => {
                if let Some(asset) = self.pending_asset.take() {
                    ctx.attach(asset);
                }
                self.stage = Some(Stage::Live(ctx));
                true
            }
            Bootstrap::NotReady(surface) => {
                log::debug!("{}: {}", self.reference, ViewerError::NotReady);
                self.stage = Some(Stage::AwaitingSize(surface));
                false
            }
        }
    }

    fn attach(&mut self, asset: LoadedAsset) {
        match self.context_mut() {
            Some(ctx) => ctx.attach(asset),
            None => self.pending_asset = Some(asset),
        }
    }

    fn dispose(&mut self) {
        match self.stage.take() {
            Some(Stage::Live(mut ctx)) => ctx.dispose(),
            Some(Stage::AwaitingSize(mut surface)) => {
                surface.unbind_input();
                surface.release();
            }
            None => {}
        }
        self.pending_asset = None;
    }
}

/// The model viewer: one mount point, at most one open session
pub struct Viewer<M: Mount> {
    mount: M,
    config: ViewerConfig,
    session: Option<Session<M::Surface>>,
    display_mode: DisplayMode,
    load_state: LoadState,
    last_error: Option<String>,
    generation: Rc<Cell<u64>>,
}

impl<M: Mount> Viewer<M> {
    pub fn new(mount: M, config: ViewerConfig) -> Self {
        Self {
            mount,
            config,
            session: None,
            display_mode: DisplayMode::Normal,
            load_state: LoadState::Idle,
            last_error: None,
            generation: Rc::new(Cell::new(0)),
        }
    }

    pub fn mount(&self) -> &M {
        &self.mount
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.display_name.as_str())
    }

    pub fn asset_reference(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.reference.as_str())
    }

    /// The live render context, once bootstrapped
    pub fn context(&self) -> Option<&RenderContext<M::Surface>> {
        self.session.as_ref().and_then(|s| s.context())
    }

    /// Open a session for `reference`.
    ///
    /// Returns the ticket of the load the host must start, or `None` when the
    /// same reference is already open.
    pub fn open(&mut self, reference: &str, display_name: &str) -> ViewerResult<Option<LoadTicket>> {
        if reference.trim().is_empty() {
            return Err(ViewerError::EmptyReference);
        }

        if let Some(session) = self.session.as_mut() {
            if session.reference == reference {
                session.display_name = display_name.to_string();
                return Ok(None);
            }
            log::info!("replacing {} with {}", session.reference, reference);
            self.teardown();
        }

        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let surface = self.mount.attach(self.display_mode);
        let mut session = Session {
            reference: reference.to_string(),
            display_name: display_name.to_string(),
            stage: Some(Stage::AwaitingSize(surface)),
            pending_asset: None,
            load_started_ms: self.mount.now_ms(),
        };
        session.try_bootstrap(&self.config);
        self.session = Some(session);

        self.load_state = LoadState::Loading;
        self.last_error = None;
        log::info!("opened {} ({})", display_name, reference);

        Ok(Some(LoadTicket {
            reference: reference.to_string(),
            generation,
            current: Rc::clone(&self.generation),
        }))
    }

    /// Close the session and release everything it owns; no-op when closed
    pub fn close(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.teardown();
        self.load_state = LoadState::Idle;
        log::info!("viewer closed");
    }

    fn teardown(&mut self) {
        // Invalidate outstanding tickets before anything is released
        self.generation.set(self.generation.get() + 1);
        if let Some(mut session) = self.session.take() {
            session.dispose();
        }
    }

    /// Switch between normal and fullscreen; load state and asset are kept
    pub fn toggle_fullscreen(&mut self) -> DisplayMode {
        self.display_mode = self.display_mode.toggled();
        let mode = self.display_mode;

        if let Some(session) = self.session.as_mut() {
            match session.stage.as_mut() {
                Some(Stage::Live(ctx)) => ctx.set_display_mode(mode),
                Some(Stage::AwaitingSize(surface)) => {
                    surface.set_display_mode(mode);
                    session.try_bootstrap(&self.config);
                }
                None => {}
            }
        }
        log::debug!("display mode {}", mode.as_str());
        mode
    }

    /// The host observed a size change of the container
    pub fn resize(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.context_mut() {
            Some(ctx) => ctx.resize(),
            None => session.try_bootstrap(&self.config),
        }
    }

    /// Deliver the fetched bytes (or fetch failure) for `ticket`.
    ///
    /// Returns the resulting load state, or `Cancelled` when the ticket was
    /// superseded; a cancelled completion changes nothing.
    pub fn complete_load(
        &mut self,
        ticket: &LoadTicket,
        fetched: Result<Vec<u8>, FetchError>,
    ) -> ViewerResult<LoadState> {
        if ticket.is_cancelled() || self.load_state != LoadState::Loading {
            log::debug!("discarding completion for {}", ticket.reference);
            return Err(ViewerError::Cancelled);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ViewerError::Cancelled);
        };

        let asset = fetched.map_err(ViewerError::from).and_then(|bytes| {
            let mesh = decode_asset(&bytes)?;
            Ok(LoadedAsset::normalize(mesh, REFERENCE_SIZE)?)
        });

        match asset {
            Ok(asset) => {
                log::info!(
                    "loaded {}: {} triangles, scale {:.4}",
                    ticket.reference,
                    asset.mesh.triangles.len(),
                    asset.transform.scale
                );
                session.attach(asset);
                self.load_state = LoadState::Loaded;
            }
            Err(e) => self.fail(e),
        }
        Ok(self.load_state)
    }

    fn fail(&mut self, error: ViewerError) {
        log::warn!(
            "failed to load {}: {}",
            self.asset_reference().unwrap_or_default(),
            error
        );
        self.load_state = LoadState::Failed;
        self.last_error = Some(error.to_string());
    }

    /// Fail the current load if it has been pending longer than the configured timeout.
    ///
    /// Called from every frame; hosts also call it from their own timers so a
    /// session that never got a frame still times out.
    pub fn poll_timeout(&mut self, now_ms: f64) -> bool {
        let Some(timeout) = self.config.load_timeout() else {
            return false;
        };
        if self.load_state != LoadState::Loading {
            return false;
        }
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if now_ms - session.load_started_ms < timeout.as_secs_f64() * 1000.0 {
            return false;
        }

        // Cancel the ticket so the late completion is discarded
        self.generation.set(self.generation.get() + 1);
        self.fail(ViewerError::LoadTimeout(timeout));
        true
    }

    /// Display-refresh callback for frame `id` at host time `now_ms`
    pub fn frame(&mut self, id: FrameId, now_ms: f64) -> ViewerResult<()> {
        self.poll_timeout(now_ms);

        let result = match self.session.as_mut().and_then(|s| s.context_mut()) {
            Some(ctx) => ctx.tick(id),
            None => Err(ViewerError::DisposedContextAccess),
        };
        if let Err(e) = &result {
            log::debug!("frame {:?} ignored: {}", id, e);
        }
        result
    }

    /// Route a pointer event to the orbit binding; ignored when nothing is bound
    pub fn handle_input(&mut self, event: PointerEvent) -> bool {
        match self.session.as_mut().and_then(|s| s.context_mut()) {
            Some(ctx) => ctx.handle_input(event),
            None => false,
        }
    }

    /// Elapsed load time budget, if a timeout is configured
    pub fn load_timeout(&self) -> Option<Duration> {
        self.config.load_timeout()
    }
}

impl<M: Mount> Drop for Viewer<M> {
    fn drop(&mut self) {
        self.teardown();
    }
}
