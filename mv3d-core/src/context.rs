/// Scene bootstrap and the per-session render context
///
/// A `RenderContext` exclusively owns the surface, scene graph, camera and
/// orbit controls of one open session. Its frame loop is a chain of scheduled
/// display-refresh callbacks; `dispose` cancels the pending one, unbinds
/// input, then releases the surface, in that order.

use nalgebra::{Point3, Vector3};

use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::orbit::{OrbitControls, OrbitInputBinding, PointerEvent};
use crate::projection::Camera;
use crate::scene::{Color, Light, LoadedAsset, Scene};
use crate::surface::{DisplayMode, FrameId, Surface, SurfaceSize};

pub const BACKGROUND: Color = Color::BLACK;
pub const AMBIENT_INTENSITY: f32 = 0.5;
pub const DIRECTIONAL_INTENSITY: f32 = 1.0;
/// The directional light sits here and shines at the origin
pub const DIRECTIONAL_POSITION: [f32; 3] = [5.0, 5.0, 5.0];

/// Build camera and scene for a surface of `size`.
///
/// Pure construction; the only failure is a zero-size surface, reported as
/// `NotReady` so the caller can retry once the container has a size.
pub fn bootstrap(size: SurfaceSize) -> ViewerResult<(Scene, Camera)> {
    if !size.is_drawable() {
        return Err(ViewerError::NotReady);
    }

    let camera = Camera::new(size.width, size.height);

    let mut scene = Scene::new(BACKGROUND);
    scene.add_light(Light::ambient(AMBIENT_INTENSITY));
    scene.add_light(Light::directional_from(
        Vector3::from(DIRECTIONAL_POSITION),
        DIRECTIONAL_INTENSITY,
    ));

    Ok((scene, camera))
}

/// Outcome of trying to build a context on a surface
pub enum Bootstrap<S: Surface> {
    Ready(RenderContext<S>),
    /// The surface is zero-sized; it is handed back untouched
    NotReady(S),
}

pub struct RenderContext<S: Surface> {
    surface: S,
    scene: Scene,
    camera: Camera,
    controls: OrbitControls,
    input: OrbitInputBinding,
    size: SurfaceSize,
    next_frame: Option<FrameId>,
    disposed: bool,
}

impl<S: Surface> RenderContext<S> {
    /// Bootstrap on `surface`, bind input and schedule the first frame
    pub fn bootstrap(mut surface: S, config: &ViewerConfig) -> Bootstrap<S> {
        let size = surface.container_size();
        let (scene, camera) = match bootstrap(size) {
            Ok(parts) => parts,
            Err(_) => return Bootstrap::NotReady(surface),
        };

        surface.set_size(size);
        surface.bind_input();
        let mut input = OrbitInputBinding::new();
        input.bind();
        let next_frame = Some(surface.request_frame());

        log::debug!("render context bootstrapped at {}x{}", size.width, size.height);
        Bootstrap::Ready(Self {
            surface,
            scene,
            controls: OrbitControls::new(Point3::origin(), config.orbit),
            camera,
            input,
            size,
            next_frame,
            disposed: false,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    /// Insert a normalized asset into the scene graph
    pub fn attach(&mut self, asset: LoadedAsset) {
        if self.disposed {
            log::debug!("dropping asset for disposed context");
            return;
        }
        self.scene.attach(asset);
    }

    /// Run the frame `id`: integrate controls, draw, schedule the next one.
    ///
    /// Anything but the currently scheduled id is stale and rejected without
    /// touching the surface.
    pub fn tick(&mut self, id: FrameId) -> ViewerResult<()> {
        if self.disposed || self.next_frame != Some(id) {
            return Err(ViewerError::DisposedContextAccess);
        }

        self.controls.update(&mut self.camera);
        self.surface.draw(&self.scene, &self.camera);
        self.next_frame = Some(self.surface.request_frame());
        Ok(())
    }

    /// Re-read the container size; on change update aspect and buffer size in place
    pub fn resize(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let size = self.surface.container_size();
        if !size.is_drawable() || size == self.size {
            return false;
        }

        self.camera.set_aspect(size.width, size.height);
        self.surface.set_size(size);
        self.size = size;
        log::debug!("surface resized to {}x{}", size.width, size.height);
        true
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        if self.disposed {
            return;
        }
        self.surface.set_display_mode(mode);
        self.resize();
    }

    pub fn handle_input(&mut self, event: PointerEvent) -> bool {
        if self.disposed {
            return false;
        }
        self.input
            .handle(event, &mut self.controls, &self.camera, self.size.height)
    }

    /// Cancel the pending frame, unbind input, clear the scene and release the surface
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(id) = self.next_frame.take() {
            self.surface.cancel_frame(id);
        }
        self.input.unbind();
        self.surface.unbind_input();
        self.scene.clear();
        self.surface.release();
        self.disposed = true;
        log::debug!("render context disposed");
    }
}

impl<S: Surface> Drop for RenderContext<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
