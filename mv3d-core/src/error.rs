/// Error types for the model viewer
///
/// `ViewerError` is the taxonomy the session reports to its host. Decode and
/// fetch failures have their own enums so the hosts can build them without
/// knowing about session state.

use std::time::Duration;

/// Failure to turn asset bytes into a mesh
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("STL error: {0}")]
    Stl(String),

    #[error("malformed geometry: {0}")]
    Malformed(String),

    #[error("unsupported asset format")]
    UnsupportedFormat,

    #[error("asset contains no triangle geometry")]
    Empty,
}

/// Failure to retrieve asset bytes from wherever the reference points
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unsupported asset reference: {0}")]
    UnsupportedReference(String),
}

/// Errors surfaced by the viewer session
#[derive(thiserror::Error, Debug)]
pub enum ViewerError {
    #[error("surface has zero size, bootstrap deferred")]
    NotReady,

    #[error("failed to load asset: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to decode asset: {0}")]
    Decode(#[from] DecodeError),

    #[error("load was cancelled")]
    Cancelled,

    #[error("callback fired against a disposed render context")]
    DisposedContextAccess,

    #[error("asset did not load within {0:?}")]
    LoadTimeout(Duration),

    #[error("asset reference is empty")]
    EmptyReference,
}

/// Result type alias for viewer operations
pub type ViewerResult<T> = Result<T, ViewerError>;
