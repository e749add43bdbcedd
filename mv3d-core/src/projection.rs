/// Camera and projection utilities
use nalgebra::{Matrix4, Point3, Vector3};

/// Vertical field of view of the viewer camera
pub const FOV_DEGREES: f32 = 75.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 1000.0;
/// Initial distance from the origin along the viewing axis
pub const INITIAL_DISTANCE: f32 = 5.0;

/// A point after projection: pixel coordinates plus NDC depth in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
    pub depth: f32,
}

/// Perspective camera looking at a target point
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in radians
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Viewer camera for a surface of the given pixel size.
    ///
    /// Callers must reject zero sizes first; see `context::bootstrap`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, INITIAL_DISTANCE),
            target: Point3::origin(),
            up: Vector3::y(),
            fov: FOV_DEGREES.to_radians(),
            aspect: width as f32 / height as f32,
            near: NEAR_PLANE,
            far: FAR_PLANE,
        }
    }

    /// Update the aspect ratio in place, keeping position and target
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn distance(&self) -> f32 {
        (self.position - self.target).norm()
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// Create the projection matrix
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Project a point through a combined model-view-projection matrix.
    ///
    /// Returns `None` for points behind the near plane. Points outside the
    /// viewport are still returned so triangles can be clipped by the
    /// rasterizer rather than dropped.
    pub fn project_with(
        mvp: &Matrix4<f32>,
        point: &Point3<f32>,
        width: u32,
        height: u32,
    ) -> Option<ScreenPoint> {
        let clip = mvp * point.to_homogeneous();

        if clip.w <= 1e-6 {
            return None;
        }

        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        let depth = clip.z / clip.w;

        if depth < -1.0 {
            return None;
        }

        Some(ScreenPoint {
            x: (ndc_x + 1.0) * 0.5 * width as f32,
            y: (1.0 - ndc_y) * 0.5 * height as f32,
            depth,
        })
    }
}
