/// MV3D Core Library - Model viewer session, scene and asset logic
///
/// This library holds everything the viewer does that is independent of where
/// it is drawn: the session state machine, scene bootstrap, asset decoding
/// and normalization, orbit controls and a software rasterizer. Hosts plug in
/// through the `Mount` and `Surface` traits.

pub mod config;
pub mod context;
pub mod decode;
pub mod error;
pub mod geometry;
pub mod gltf_read;
pub mod orbit;
pub mod projection;
pub mod raster;
pub mod scene;
pub mod session;
pub mod stl;
pub mod surface;
pub mod transform;

// Re-export commonly used types
pub use config::ViewerConfig;
pub use context::{Bootstrap, RenderContext};
pub use decode::{decode_asset, AssetFormat};
pub use error::{DecodeError, FetchError, ViewerError, ViewerResult};
pub use geometry::{Aabb, Mesh, Triangle, Vertex};
pub use orbit::{OrbitControls, OrbitSettings, PointerButton, PointerEvent};
pub use projection::Camera;
pub use raster::Framebuffer;
pub use scene::{Color, Light, LoadedAsset, Scene};
pub use session::{LoadState, LoadTicket, Viewer};
pub use surface::{DisplayMode, FrameId, Mount, Surface, SurfaceSize};
pub use transform::{ObjectTransform, Transform, REFERENCE_SIZE};
