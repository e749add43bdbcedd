/// MV3D Web - WASM host for the model viewer
///
/// Mounts a `<canvas>` into a container element of the page and drives the
/// shared viewer session from browser callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use mv3d_core::{LoadTicket, Viewer, ViewerConfig};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlElement;

pub mod canvas;
pub mod fetch;

pub use canvas::{CanvasMount, CanvasSurface};

/// Parse the optional JSON configuration passed from the page
pub fn parse_config(json: Option<&str>) -> Result<ViewerConfig, String> {
    match json {
        Some(text) if !text.trim().is_empty() => {
            serde_json::from_str(text).map_err(|e| format!("invalid viewer config: {}", e))
        }
        _ => Ok(ViewerConfig::default()),
    }
}

#[wasm_bindgen]
pub struct ModelViewer {
    viewer: Rc<RefCell<Viewer<CanvasMount>>>,
}

#[wasm_bindgen]
impl ModelViewer {
    #[wasm_bindgen(constructor)]
    pub fn new(container_id: &str, config: Option<String>) -> Result<ModelViewer, JsValue> {
        let config = parse_config(config.as_deref()).map_err(|e| JsValue::from_str(&e))?;

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let container = document
            .get_element_by_id(container_id)
            .ok_or_else(|| JsValue::from_str(&format!("container #{} not found", container_id)))?
            .dyn_into::<HtmlElement>()?;

        let viewer = Rc::new_cyclic(|handle| {
            RefCell::new(Viewer::new(CanvasMount::new(container, handle.clone()), config))
        });
        log::info!("model viewer mounted on #{}", container_id);
        Ok(ModelViewer { viewer })
    }

    /// Open `asset_reference` under `display_name`; no-op if it is already open
    pub fn open(&self, asset_reference: &str, display_name: &str) -> Result<(), JsValue> {
        let ticket = self
            .viewer
            .borrow_mut()
            .open(asset_reference, display_name)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        if let Some(ticket) = ticket {
            self.arm_timeout(ticket.clone());
            self.spawn_load(ticket);
        }
        Ok(())
    }

    fn spawn_load(&self, ticket: LoadTicket) {
        let viewer = Rc::downgrade(&self.viewer);
        wasm_bindgen_futures::spawn_local(async move {
            if ticket.is_cancelled() {
                return;
            }
            let fetched = fetch::fetch_bytes(ticket.reference()).await;
            let Some(viewer) = viewer.upgrade() else {
                return;
            };
            // Superseded loads come back as Cancelled and are already logged
            let _ = viewer.borrow_mut().complete_load(&ticket, fetched);
        });
    }

    /// Arm a timer for the load timeout; a session that never gets a frame
    /// would otherwise wait forever
    fn arm_timeout(&self, ticket: LoadTicket) {
        let Some(timeout) = self.viewer.borrow().load_timeout() else {
            return;
        };
        let Some(window) = web_sys::window() else {
            return;
        };

        let viewer = Rc::downgrade(&self.viewer);
        let expire = Closure::once_into_js(move || {
            if ticket.is_cancelled() {
                return;
            }
            if let Some(viewer) = viewer.upgrade() {
                if let Ok(mut viewer) = viewer.try_borrow_mut() {
                    viewer.poll_timeout(canvas::now_ms());
                }
            }
        });
        // One extra millisecond so the timer never lands just short of the deadline
        let delay = timeout.as_millis().saturating_add(1).min(i32::MAX as u128) as i32;
        if let Err(e) = window
            .set_timeout_with_callback_and_timeout_and_arguments_0(expire.unchecked_ref(), delay)
        {
            log::warn!("failed to arm load timeout: {:?}", e);
        }
    }

    pub fn close(&self) {
        self.viewer.borrow_mut().close();
    }

    /// Returns the new display mode, "normal" or "fullscreen"
    #[wasm_bindgen(js_name = toggleFullscreen)]
    pub fn toggle_fullscreen(&self) -> String {
        self.viewer.borrow_mut().toggle_fullscreen().as_str().to_string()
    }

    /// Re-read the container size, e.g. after a layout change
    pub fn resize(&self) -> bool {
        self.viewer.borrow_mut().resize()
    }

    #[wasm_bindgen(getter, js_name = isOpen)]
    pub fn is_open(&self) -> bool {
        self.viewer.borrow().is_open()
    }

    #[wasm_bindgen(getter, js_name = loadState)]
    pub fn load_state(&self) -> String {
        self.viewer.borrow().load_state().as_str().to_string()
    }

    #[wasm_bindgen(getter, js_name = displayMode)]
    pub fn display_mode(&self) -> String {
        self.viewer.borrow().display_mode().as_str().to_string()
    }

    #[wasm_bindgen(getter, js_name = lastError)]
    pub fn last_error(&self) -> Option<String> {
        self.viewer.borrow().last_error().map(str::to_string)
    }

    #[wasm_bindgen(getter, js_name = displayName)]
    pub fn display_name(&self) -> Option<String> {
        self.viewer.borrow().display_name().map(str::to_string)
    }
}

#[wasm_bindgen(start)]
pub fn main() -> Result<(), JsValue> {
    // Setup panic hook for better error messages in browser console
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_defaults() {
        assert_eq!(parse_config(None).unwrap(), ViewerConfig::default());
        assert_eq!(parse_config(Some("  ")).unwrap(), ViewerConfig::default());
    }

    #[test]
    fn test_parse_config_json() {
        let config = parse_config(Some(r#"{"load_timeout_ms": 15000, "orbit": {"min_distance": 2.0}}"#)).unwrap();
        assert_eq!(config.load_timeout_ms, Some(15000));
        assert_eq!(config.orbit.min_distance, 2.0);
        assert_eq!(config.orbit.max_distance, 100.0);
    }

    #[test]
    fn test_parse_config_rejects_garbage() {
        assert!(parse_config(Some("{not json")).is_err());
    }
}
