/// Canvas surface: a `<canvas>` inside the page's container element
///
/// Frames are paced with `requestAnimationFrame`; pointer, wheel and size
/// watchers call back into the viewer through a weak handle, so a callback
/// that outlives its session finds nothing to act on.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use mv3d_core::{
    Camera, DisplayMode, FrameId, Framebuffer, Mount, PointerButton, PointerEvent, Scene, Surface,
    SurfaceSize, Viewer,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{
    AddEventListenerOptions, CanvasRenderingContext2d, EventTarget, HtmlCanvasElement, HtmlElement,
    ImageData, ResizeObserver, Window,
};

pub type ViewerHandle = Weak<RefCell<Viewer<CanvasMount>>>;

/// Container class set while the viewer is maximized
pub const FULLSCREEN_CLASS: &str = "mv3d-fullscreen";

/// Inline style properties the display mode controls on the container
const MODE_PROPERTIES: &[&str] = &["position", "inset", "width", "height", "z-index"];

/// Inline container style for a display mode
pub fn mode_style(mode: DisplayMode) -> &'static [(&'static str, &'static str)] {
    match mode {
        DisplayMode::Normal => &[("position", "relative"), ("width", "800px"), ("height", "600px")],
        DisplayMode::Fullscreen => &[
            ("position", "fixed"),
            ("inset", "0"),
            ("width", "100vw"),
            ("height", "100vh"),
            ("z-index", "50"),
        ],
    }
}

/// DOM `MouseEvent.button` to the binding's buttons
pub fn button_from_dom(button: i16) -> Option<PointerButton> {
    match button {
        0 => Some(PointerButton::Primary),
        1 => Some(PointerButton::Middle),
        2 => Some(PointerButton::Secondary),
        _ => None,
    }
}

/// Run `f` on the viewer unless it is gone or already borrowed
fn with_viewer<R>(viewer: &ViewerHandle, f: impl FnOnce(&mut Viewer<CanvasMount>) -> R) -> Option<R> {
    let viewer = viewer.upgrade()?;
    let mut viewer = viewer.try_borrow_mut().ok()?;
    Some(f(&mut viewer))
}

/// An installed event listener; dropping it removes it
struct Listener {
    target: EventTarget,
    kind: &'static str,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

impl Listener {
    fn install(
        target: &EventTarget,
        kind: &'static str,
        passive: bool,
        handler: impl FnMut(web_sys::Event) + 'static,
    ) -> Result<Self, JsValue> {
        let closure = Closure::<dyn FnMut(web_sys::Event)>::new(handler);
        let options = AddEventListenerOptions::new();
        options.set_passive(passive);
        target.add_event_listener_with_callback_and_add_event_listener_options(
            kind,
            closure.as_ref().unchecked_ref(),
            &options,
        )?;
        Ok(Self {
            target: target.clone(),
            kind,
            closure,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.closure.as_ref().unchecked_ref());
    }
}

/// Container size watcher; catches layout changes no window event reports,
/// such as a hidden modal being revealed. Dropping it disconnects.
struct SizeWatch {
    observer: ResizeObserver,
    _callback: Closure<dyn FnMut(js_sys::Array)>,
}

impl SizeWatch {
    fn observe(container: &HtmlElement, viewer: ViewerHandle) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(js_sys::Array)>::new(move |_entries: js_sys::Array| {
            with_viewer(&viewer, |viewer| viewer.resize());
        });
        let observer = ResizeObserver::new(callback.as_ref().unchecked_ref())?;
        observer.observe(container);
        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for SizeWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

/// Current time on the `requestAnimationFrame` timeline
pub fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map_or(0.0, |p| p.now())
}

/// `requestAnimationFrame` driver; one callback outstanding at a time
struct FrameLoop {
    window: Window,
    scheduled: Rc<Cell<Option<FrameId>>>,
    callback: Closure<dyn FnMut(f64)>,
}

impl FrameLoop {
    fn new(window: Window, viewer: ViewerHandle) -> Self {
        let scheduled = Rc::new(Cell::new(None));
        let due = Rc::clone(&scheduled);
        let callback = Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
            let Some(id) = due.take() else {
                return;
            };
            // Stale ids are rejected and logged by the viewer
            with_viewer(&viewer, |viewer| viewer.frame(id, timestamp));
        });
        Self {
            window,
            scheduled,
            callback,
        }
    }

    fn request(&mut self) -> FrameId {
        match self
            .window
            .request_animation_frame(self.callback.as_ref().unchecked_ref())
        {
            Ok(handle) => {
                let id = FrameId(handle as u64);
                self.scheduled.set(Some(id));
                id
            }
            Err(e) => {
                log::error!("requestAnimationFrame failed: {:?}", e);
                FrameId(0)
            }
        }
    }

    fn cancel(&mut self, id: FrameId) {
        if self.scheduled.get() == Some(id) {
            let _ = self.window.cancel_animation_frame(id.0 as i32);
            self.scheduled.set(None);
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if let Some(id) = self.scheduled.get() {
            self.cancel(id);
        }
    }
}

struct Canvas {
    element: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl Canvas {
    fn create(container: &HtmlElement) -> Result<Self, JsValue> {
        let document = container
            .owner_document()
            .ok_or_else(|| JsValue::from_str("container is not in a document"))?;
        let element = document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()?;
        let style = element.style();
        style.set_property("display", "block")?;
        style.set_property("width", "100%")?;
        style.set_property("height", "100%")?;

        let context = element
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        container.append_child(&element)?;
        Ok(Self { element, context })
    }
}

pub struct CanvasSurface {
    container: HtmlElement,
    viewer: ViewerHandle,
    canvas: Option<Canvas>,
    framebuffer: Framebuffer,
    frames: Option<FrameLoop>,
    input: Vec<Listener>,
    window_resize: Option<Listener>,
    size_watch: Option<SizeWatch>,
}

impl CanvasSurface {
    fn new(container: HtmlElement, viewer: ViewerHandle, mode: DisplayMode) -> Self {
        let window = web_sys::window();
        let mut surface = Self {
            frames: window.clone().map(|w| FrameLoop::new(w, viewer.clone())),
            container,
            viewer,
            canvas: None,
            framebuffer: Framebuffer::new(0, 0),
            input: Vec::new(),
            window_resize: None,
            size_watch: None,
        };
        surface.set_display_mode(mode);

        match Canvas::create(&surface.container) {
            Ok(canvas) => surface.canvas = Some(canvas),
            Err(e) => log::error!("failed to create canvas: {:?}", e),
        }

        if let Some(window) = window {
            let viewer = surface.viewer.clone();
            match Listener::install(&window, "resize", true, move |_| {
                with_viewer(&viewer, |viewer| viewer.resize());
            }) {
                Ok(listener) => surface.window_resize = Some(listener),
                Err(e) => log::warn!("failed to watch window size: {:?}", e),
            }
        }
        match SizeWatch::observe(&surface.container, surface.viewer.clone()) {
            Ok(watch) => surface.size_watch = Some(watch),
            Err(e) => log::warn!("failed to watch container size: {:?}", e),
        }
        surface
    }

    fn install_input(&mut self) -> Result<(), JsValue> {
        let Some(canvas) = self.canvas.as_ref() else {
            return Ok(());
        };
        let target: &EventTarget = canvas.element.as_ref();

        let viewer = self.viewer.clone();
        let element = canvas.element.clone();
        self.input.push(Listener::install(target, "pointerdown", true, move |event| {
            let Some(event) = event.dyn_ref::<web_sys::PointerEvent>() else {
                return;
            };
            let Some(button) = button_from_dom(event.button()) else {
                return;
            };
            let _ = element.set_pointer_capture(event.pointer_id());
            with_viewer(&viewer, |viewer| {
                viewer.handle_input(PointerEvent::Down {
                    button,
                    x: event.offset_x() as f32,
                    y: event.offset_y() as f32,
                })
            });
        })?);

        let viewer = self.viewer.clone();
        self.input.push(Listener::install(target, "pointermove", true, move |event| {
            let Some(event) = event.dyn_ref::<web_sys::PointerEvent>() else {
                return;
            };
            with_viewer(&viewer, |viewer| {
                viewer.handle_input(PointerEvent::Move {
                    x: event.offset_x() as f32,
                    y: event.offset_y() as f32,
                })
            });
        })?);

        let viewer = self.viewer.clone();
        self.input.push(Listener::install(target, "pointerup", true, move |event| {
            let Some(button) = event
                .dyn_ref::<web_sys::PointerEvent>()
                .and_then(|e| button_from_dom(e.button()))
            else {
                return;
            };
            with_viewer(&viewer, |viewer| viewer.handle_input(PointerEvent::Up { button }));
        })?);

        let viewer = self.viewer.clone();
        self.input.push(Listener::install(target, "wheel", false, move |event| {
            let Some(wheel) = event.dyn_ref::<web_sys::WheelEvent>() else {
                return;
            };
            event.prevent_default();
            with_viewer(&viewer, |viewer| {
                viewer.handle_input(PointerEvent::Wheel {
                    delta_y: wheel.delta_y() as f32,
                })
            });
        })?);

        // Right drag pans; keep the browser menu out of the way
        self.input.push(Listener::install(target, "contextmenu", false, |event| {
            event.prevent_default();
        })?);

        Ok(())
    }
}

impl Surface for CanvasSurface {
    fn container_size(&self) -> SurfaceSize {
        SurfaceSize::new(
            self.container.client_width().max(0) as u32,
            self.container.client_height().max(0) as u32,
        )
    }

    fn set_size(&mut self, size: SurfaceSize) {
        self.framebuffer.resize(size.width, size.height);
        if let Some(canvas) = &self.canvas {
            canvas.element.set_width(size.width);
            canvas.element.set_height(size.height);
        }
    }

    fn set_display_mode(&mut self, mode: DisplayMode) {
        let style = self.container.style();
        for property in MODE_PROPERTIES {
            let _ = style.remove_property(property);
        }
        for (property, value) in mode_style(mode) {
            if let Err(e) = style.set_property(property, value) {
                log::warn!("failed to set {}: {:?}", property, e);
            }
        }
        let _ = self
            .container
            .class_list()
            .toggle_with_force(FULLSCREEN_CLASS, mode == DisplayMode::Fullscreen);
    }

    fn draw(&mut self, scene: &Scene, camera: &Camera) {
        self.framebuffer.render_scene(scene, camera);
        let Some(canvas) = &self.canvas else {
            return;
        };
        let (width, height) = (self.framebuffer.width(), self.framebuffer.height());
        if width == 0 || height == 0 {
            return;
        }

        let rgba = self.framebuffer.to_rgba8();
        let result = ImageData::new_with_u8_clamped_array_and_sh(Clamped(rgba.as_slice()), width, height)
            .and_then(|image| canvas.context.put_image_data(&image, 0.0, 0.0));
        if let Err(e) = result {
            log::warn!("failed to present frame: {:?}", e);
        }
    }

    fn request_frame(&mut self) -> FrameId {
        match self.frames.as_mut() {
            Some(frames) => frames.request(),
            None => FrameId(0),
        }
    }

    fn cancel_frame(&mut self, id: FrameId) {
        if let Some(frames) = self.frames.as_mut() {
            frames.cancel(id);
        }
    }

    fn bind_input(&mut self) {
        if let Err(e) = self.install_input() {
            log::error!("failed to bind input: {:?}", e);
            self.input.clear();
        }
    }

    fn unbind_input(&mut self) {
        self.input.clear();
    }

    fn release(&mut self) {
        self.frames = None;
        self.input.clear();
        self.window_resize = None;
        self.size_watch = None;
        self.framebuffer.release();
        if let Some(canvas) = self.canvas.take() {
            canvas.element.remove();
        }

        let style = self.container.style();
        for property in MODE_PROPERTIES {
            let _ = style.remove_property(property);
        }
        let _ = self.container.class_list().remove_1(FULLSCREEN_CLASS);
    }
}

/// The page's container element
pub struct CanvasMount {
    container: HtmlElement,
    viewer: ViewerHandle,
}

impl CanvasMount {
    pub fn new(container: HtmlElement, viewer: ViewerHandle) -> Self {
        Self { container, viewer }
    }
}

impl Mount for CanvasMount {
    type Surface = CanvasSurface;

    fn attach(&mut self, mode: DisplayMode) -> CanvasSurface {
        CanvasSurface::new(self.container.clone(), self.viewer.clone(), mode)
    }

    fn now_ms(&self) -> f64 {
        now_ms()
    }
}
