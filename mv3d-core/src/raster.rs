/// Software rasterizer shared by the terminal and canvas surfaces
use nalgebra::Matrix4;

use crate::geometry::{Triangle, Vertex};
use crate::projection::{Camera, ScreenPoint};
use crate::scene::{Color, Scene};

/// Colour and depth buffers for one surface
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    depth_buffer: Vec<f32>,
    color_buffer: Vec<Color>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            depth_buffer: vec![f32::INFINITY; size],
            color_buffer: vec![Color::BLACK; size],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reallocate for a new size; contents are discarded
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            *self = Self::new(width, height);
        }
    }

    /// Free both buffers
    pub fn release(&mut self) {
        *self = Self::new(0, 0);
    }

    pub fn clear(&mut self, background: Color) {
        self.depth_buffer.fill(f32::INFINITY);
        self.color_buffer.fill(background);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.color_buffer[y as usize * self.width as usize + x as usize]
    }

    /// Row-major RGBA bytes, alpha always opaque
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.color_buffer.len() * 4);
        for color in &self.color_buffer {
            let [r, g, b] = color.to_rgb8();
            out.extend_from_slice(&[r, g, b, 255]);
        }
        out
    }

    /// Clear to the scene background and draw the attached asset, if any
    pub fn render_scene(&mut self, scene: &Scene, camera: &Camera) {
        self.clear(scene.background);
        let Some(asset) = scene.asset() else {
            return;
        };
        if self.width == 0 || self.height == 0 {
            return;
        }

        let model = asset.model_matrix();
        let mvp = camera.view_projection() * model;
        for triangle in &asset.mesh.triangles {
            self.render_triangle(triangle, &model, &mvp, scene);
        }
    }

    fn render_triangle(
        &mut self,
        triangle: &Triangle,
        model: &Matrix4<f32>,
        mvp: &Matrix4<f32>,
        scene: &Scene,
    ) {
        let mut screen = [ScreenPoint { x: 0.0, y: 0.0, depth: 0.0 }; 3];
        for (slot, vertex) in screen.iter_mut().zip(&triangle.vertices) {
            match Camera::project_with(mvp, &vertex.position, self.width, self.height) {
                Some(p) => *slot = p,
                None => return, // Behind the near plane
            }
        }

        // Flat shading from the face normal in world space
        let world = Triangle::new(
            transform_vertex(model, &triangle.vertices[0]),
            transform_vertex(model, &triangle.vertices[1]),
            transform_vertex(model, &triangle.vertices[2]),
        );
        let Some(normal) = world.calculate_normal() else {
            return;
        };
        let light = scene.irradiance(&normal);
        let shaded = Color::rgb(
            triangle.color[0] * light.r,
            triangle.color[1] * light.g,
            triangle.color[2] * light.b,
        );

        self.rasterize_triangle(&screen, shaded);
    }

    fn rasterize_triangle(&mut self, coords: &[ScreenPoint; 3], color: Color) {
        let [v0, v1, v2] = *coords;

        // Bounding box, clipped to the buffer
        let min_x = v0.x.min(v1.x).min(v2.x).floor().max(0.0) as i64;
        let max_x = v0.x.max(v1.x).max(v2.x).ceil().min(self.width as f32 - 1.0) as i64;
        let min_y = v0.y.min(v1.y).min(v2.y).floor().max(0.0) as i64;
        let max_y = v0.y.max(v1.y).max(v2.y).ceil().min(self.height as f32 - 1.0) as i64;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                let Some((w0, w1, w2)) =
                    barycentric((v0.x, v0.y), (v1.x, v1.y), (v2.x, v2.y), (px, py))
                else {
                    continue;
                };
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * v0.depth + w1 * v1.depth + w2 * v2.depth;
                if depth > 1.0 {
                    continue; // Past the far plane
                }
                let idx = y as usize * self.width as usize + x as usize;
                if depth < self.depth_buffer[idx] {
                    self.depth_buffer[idx] = depth;
                    self.color_buffer[idx] = color;
                }
            }
        }
    }
}

fn transform_vertex(model: &Matrix4<f32>, vertex: &Vertex) -> Vertex {
    Vertex::at(model.transform_point(&vertex.position))
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Mesh;
    use crate::scene::{Light, LoadedAsset};
    use crate::transform::REFERENCE_SIZE;
    use nalgebra::Vector3;

    fn lit_scene() -> Scene {
        let mut scene = Scene::new(Color::BLACK);
        scene.add_light(Light::ambient(0.5));
        scene.add_light(Light::directional_from(Vector3::new(5.0, 5.0, 5.0), 1.0));
        scene
    }

    #[test]
    fn test_empty_scene_is_background() {
        let mut fb = Framebuffer::new(16, 8);
        let scene = Scene::new(Color::rgb(0.1, 0.2, 0.3));
        fb.render_scene(&scene, &Camera::new(16, 8));
        assert_eq!(fb.pixel(0, 0), Color::rgb(0.1, 0.2, 0.3));
        assert_eq!(fb.pixel(15, 7), Color::rgb(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_cube_covers_centre_pixel() {
        let mut fb = Framebuffer::new(64, 48);
        let mut scene = lit_scene();
        scene.attach(LoadedAsset::normalize(Mesh::cube(1.0), REFERENCE_SIZE).unwrap());
        fb.render_scene(&scene, &Camera::new(64, 48));

        let centre = fb.pixel(32, 24);
        assert_ne!(centre, Color::BLACK);
        assert_eq!(fb.pixel(0, 0), Color::BLACK);
    }

    #[test]
    fn test_rgba_export_is_opaque() {
        let fb = Framebuffer::new(2, 2);
        let rgba = fb.to_rgba8();
        assert_eq!(rgba.len(), 16);
        assert!(rgba.chunks(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_release_frees_buffers() {
        let mut fb = Framebuffer::new(32, 32);
        fb.release();
        assert_eq!((fb.width(), fb.height()), (0, 0));
        assert!(fb.to_rgba8().is_empty());
    }

    #[test]
    fn test_barycentric_degenerate() {
        assert!(barycentric((0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.5, 0.5)).is_none());
    }
}
