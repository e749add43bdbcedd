/// Object placement and the fit-to-origin normalization
use nalgebra::{Matrix4, Point3, Vector3};

use crate::geometry::Aabb;

/// Largest dimension every loaded asset is scaled to
pub const REFERENCE_SIZE: f32 = 3.0;

/// Placement of an object in the scene: uniform scale, then translation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectTransform {
    pub translation: Vector3<f32>,
    pub scale: f32,
}

impl ObjectTransform {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Centre `bounds` on the origin and scale its largest side to `reference_size`.
    ///
    /// Translation is expressed in the scaled frame, i.e. a point `p` ends up at
    /// `scale * (p - center)`. A degenerate box keeps its native size and is
    /// only centred.
    pub fn fit(bounds: &Aabb, reference_size: f32) -> Self {
        let max_extent = bounds.max_extent();
        // Only a zero-size box is degenerate; tiny extents still scale up
        let scale = Some(reference_size / max_extent)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(1.0);

        Self {
            translation: -bounds.center().coords * scale,
            scale,
        }
    }

    /// Model matrix for this placement
    pub fn model_matrix(&self) -> Matrix4<f32> {
        Transform::translation_matrix(self.translation.x, self.translation.y, self.translation.z)
            * Transform::scale_matrix(self.scale)
    }

    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        Point3::from(point.coords * self.scale + self.translation)
    }
}

impl Default for ObjectTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// Create a translation matrix
    pub fn translation_matrix(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// Create a uniform scale matrix
    pub fn scale_matrix(s: f32) -> Matrix4<f32> {
        Matrix4::new_scaling(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min: [f32; 3], max: [f32; 3]) -> Aabb {
        Aabb {
            min: Point3::from(min),
            max: Point3::from(max),
        }
    }

    #[test]
    fn test_fit_scales_largest_side() {
        let b = bounds([0.0, 0.0, 0.0], [2.0, 4.0, 1.0]);
        let fit = ObjectTransform::fit(&b, REFERENCE_SIZE);
        assert!((fit.scale - 0.75).abs() < 1e-6);

        let fitted = b.transformed(&fit.model_matrix());
        assert!(fitted.center().coords.norm() < 1e-5);
        assert!((fitted.max_extent() - REFERENCE_SIZE).abs() < 1e-5);
    }

    #[test]
    fn test_fit_centres_off_origin_box() {
        let b = bounds([10.0, -20.0, 5.0], [110.0, 30.0, 25.0]);
        let fit = ObjectTransform::fit(&b, REFERENCE_SIZE);

        let center = fit.transform_point(&b.center());
        assert!(center.coords.norm() < 1e-4);
        let fitted = b.transformed(&fit.model_matrix());
        assert!((fitted.max_extent() - REFERENCE_SIZE).abs() < 1e-4);
    }

    #[test]
    fn test_fit_degenerate_box_keeps_native_size() {
        let b = bounds([1.0, 2.0, 3.0], [1.0, 2.0, 3.0]);
        let fit = ObjectTransform::fit(&b, REFERENCE_SIZE);
        assert_eq!(fit.scale, 1.0);
        assert!(fit.transform_point(&b.center()).coords.norm() < 1e-6);
    }

    #[test]
    fn test_fit_tiny_box_still_scales() {
        let b = bounds([0.0, 0.0, 0.0], [1e-7, 5e-8, 0.0]);
        let fit = ObjectTransform::fit(&b, REFERENCE_SIZE);
        assert!((fit.scale - 3e7).abs() / 3e7 < 1e-4);

        let fitted = b.transformed(&fit.model_matrix());
        assert!((fitted.max_extent() - REFERENCE_SIZE).abs() < 1e-3);
    }

    #[test]
    fn test_identity_model_matrix() {
        let matrix = ObjectTransform::identity().model_matrix();
        assert!((matrix - Matrix4::identity()).norm() < 1e-6);
    }
}
