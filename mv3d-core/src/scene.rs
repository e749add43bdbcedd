/// Scene graph: background, lights and the (at most one) attached asset
use nalgebra::{Matrix4, Vector3};

use crate::error::DecodeError;
use crate::geometry::{Aabb, Mesh};
use crate::transform::ObjectTransform;

/// Linear RGB colour with components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_array(c: [f32; 3]) -> Self {
        Self::rgb(c[0], c[1], c[2])
    }

    /// 8-bit channels, clamped
    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    pub fn luminance(self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }
}

/// Scene lighting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient {
        color: Color,
        intensity: f32,
    },
    /// `direction` points from the light towards the scene
    Directional {
        color: Color,
        intensity: f32,
        direction: Vector3<f32>,
    },
}

impl Light {
    pub fn ambient(intensity: f32) -> Self {
        Light::Ambient {
            color: Color::WHITE,
            intensity,
        }
    }

    /// Directional light placed at `position`, shining at the origin
    pub fn directional_from(position: Vector3<f32>, intensity: f32) -> Self {
        Light::Directional {
            color: Color::WHITE,
            intensity,
            direction: (-position).try_normalize(1e-12).unwrap_or_else(|| -Vector3::y()),
        }
    }
}

/// A decoded mesh placed at the origin at reference scale
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub mesh: Mesh,
    pub transform: ObjectTransform,
    /// Bounds of the mesh in its native units
    pub native_bounds: Aabb,
}

impl LoadedAsset {
    /// Compute bounds, centre and scale a decoded mesh
    pub fn normalize(mesh: Mesh, reference_size: f32) -> Result<Self, DecodeError> {
        let native_bounds = mesh.bounding_box().ok_or(DecodeError::Empty)?;
        let transform = ObjectTransform::fit(&native_bounds, reference_size);
        Ok(Self {
            mesh,
            transform,
            native_bounds,
        })
    }

    pub fn model_matrix(&self) -> Matrix4<f32> {
        self.transform.model_matrix()
    }

    /// Bounds as placed in the scene
    pub fn world_bounds(&self) -> Aabb {
        self.native_bounds.transformed(&self.model_matrix())
    }
}

/// Root of the scene graph owned by one render context
#[derive(Debug, Clone)]
pub struct Scene {
    pub background: Color,
    pub lights: Vec<Light>,
    asset: Option<LoadedAsset>,
}

impl Scene {
    pub fn new(background: Color) -> Self {
        Self {
            background,
            lights: Vec::new(),
            asset: None,
        }
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    /// Insert the asset in one step, replacing any previous one
    pub fn attach(&mut self, asset: LoadedAsset) {
        self.asset = Some(asset);
    }

    pub fn detach(&mut self) -> Option<LoadedAsset> {
        self.asset.take()
    }

    pub fn asset(&self) -> Option<&LoadedAsset> {
        self.asset.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.asset.is_none()
    }

    /// Drop everything the scene holds
    pub fn clear(&mut self) {
        self.asset = None;
        self.lights.clear();
    }

    /// Light reaching a surface with normal `normal`, per channel
    pub fn irradiance(&self, normal: &Vector3<f32>) -> Color {
        let mut total = Color::BLACK;
        for light in &self.lights {
            let (color, amount) = match *light {
                Light::Ambient { color, intensity } => (color, intensity),
                Light::Directional {
                    color,
                    intensity,
                    direction,
                } => (color, intensity * normal.dot(&-direction).max(0.0)),
            };
            total.r += color.r * amount;
            total.g += color.g * amount;
            total.b += color.b * amount;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::REFERENCE_SIZE;
    use nalgebra::Point3;

    #[test]
    fn test_normalize_reference_scenario() {
        let mesh = Mesh::cuboid(Point3::new(7.0, -3.0, 2.0), Vector3::new(2.0, 4.0, 1.0));
        let asset = LoadedAsset::normalize(mesh, REFERENCE_SIZE).unwrap();
        assert!((asset.transform.scale - 0.75).abs() < 1e-6);

        let bounds = asset.world_bounds();
        assert!(bounds.center().coords.norm() < 1e-5);
        assert!((bounds.max_extent() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_empty_mesh_fails() {
        assert!(matches!(
            LoadedAsset::normalize(Mesh::new(), REFERENCE_SIZE),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn test_attach_and_detach() {
        let mut scene = Scene::new(Color::BLACK);
        assert!(scene.is_empty());
        scene.attach(LoadedAsset::normalize(Mesh::cube(1.0), REFERENCE_SIZE).unwrap());
        assert!(!scene.is_empty());
        assert!(scene.detach().is_some());
        assert!(scene.is_empty());
    }

    #[test]
    fn test_irradiance_combines_lights() {
        let mut scene = Scene::new(Color::BLACK);
        scene.add_light(Light::ambient(0.5));
        scene.add_light(Light::directional_from(Vector3::new(0.0, 0.0, 1.0), 1.0));

        let facing = scene.irradiance(&Vector3::z());
        assert!((facing.r - 1.5).abs() < 1e-6);
        let away = scene.irradiance(&-Vector3::z());
        assert!((away.r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_color_quantization_clamps() {
        assert_eq!(Color::rgb(2.0, -1.0, 0.5).to_rgb8(), [255, 0, 128]);
    }
}
