/// Browser `fetch()` for asset references
use mv3d_core::FetchError;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

fn js_error(context: &str, value: JsValue) -> FetchError {
    let detail = value
        .as_string()
        .or_else(|| js_sys::JSON::stringify(&value).ok().and_then(|s| s.as_string()))
        .unwrap_or_else(|| format!("{:?}", value));
    FetchError::Http(format!("{}: {}", context, detail))
}

/// Fetch the asset bytes; the reference is resolved against the page URL
pub async fn fetch_bytes(reference: &str) -> Result<Vec<u8>, FetchError> {
    let window = web_sys::window()
        .ok_or_else(|| FetchError::UnsupportedReference("no window to fetch from".into()))?;

    let init = RequestInit::new();
    init.set_method("GET");
    init.set_mode(RequestMode::Cors);
    let request = Request::new_with_str_and_init(reference, &init)
        .map_err(|e| js_error("invalid request", e))?;

    let response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| js_error("network error", e))?
        .dyn_into::<Response>()
        .map_err(|e| js_error("unexpected response", e))?;

    if !response.ok() {
        return Err(FetchError::Http(format!(
            "{} {} for {}",
            response.status(),
            response.status_text(),
            reference
        )));
    }

    let buffer = response
        .array_buffer()
        .map_err(|e| js_error("unreadable body", e))?;
    let buffer = JsFuture::from(buffer)
        .await
        .map_err(|e| js_error("unreadable body", e))?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    log::debug!("fetched {} bytes from {}", bytes.len(), reference);
    Ok(bytes)
}
