/// Asset fetching for the terminal host: local files and http(s) URLs
use std::fs;
use std::future::Future;
use std::io::{self, Read};
use std::path::Path;
use std::thread;

use futures::channel::oneshot;
use mv3d_core::FetchError;

/// Largest body accepted from an HTTP response
const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

fn is_http(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Read the asset synchronously; call from a worker thread
pub fn fetch_blocking(reference: &str) -> Result<Vec<u8>, FetchError> {
    if is_http(reference) {
        return fetch_http(reference);
    }
    if let Some(path) = reference.strip_prefix("file://") {
        return Ok(fs::read(Path::new(path))?);
    }
    if let Some((scheme, _)) = reference.split_once("://") {
        return Err(FetchError::UnsupportedReference(format!("{}://", scheme)));
    }
    Ok(fs::read(Path::new(reference))?)
}

fn fetch_http(url: &str) -> Result<Vec<u8>, FetchError> {
    let response = ureq::get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, response) => {
            FetchError::Http(format!("{} {} for {}", code, response.status_text(), url))
        }
        ureq::Error::Transport(transport) => FetchError::Http(transport.to_string()),
    })?;

    let bytes = read_body(response.into_reader(), MAX_BODY_BYTES, url)?;
    log::debug!("fetched {} bytes from {}", bytes.len(), url);
    Ok(bytes)
}

/// Read at most `limit` bytes; a longer body is an error, not a truncation
fn read_body(reader: impl Read, limit: u64, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    reader.take(limit + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(FetchError::Http(format!(
            "response from {} exceeds {} bytes",
            url, limit
        )));
    }
    Ok(bytes)
}

/// Fetch on a short-lived worker thread; the future resolves on the caller's executor
pub fn fetch(reference: String) -> impl Future<Output = Result<Vec<u8>, FetchError>> {
    let (sender, receiver) = oneshot::channel();

    let spawned = thread::Builder::new()
        .name("mv3d-fetch".into())
        .spawn(move || {
            let result = fetch_blocking(&reference);
            // The receiver is gone when the load was abandoned
            let _ = sender.send(result);
        });

    async move {
        if let Err(e) = spawned {
            return Err(FetchError::Io(e));
        }
        match receiver.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(FetchError::Io(io::Error::new(
                io::ErrorKind::Interrupted,
                "fetch worker exited without a result",
            ))),
        }
    }
}
