/// Geometry primitives for loaded assets
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Base colour used when an asset carries no material information
pub const DEFAULT_COLOR: [f32; 3] = [0.8, 0.8, 0.8];

/// A 3D vertex with position and normal
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32, nx: f32, ny: f32, nz: f32) -> Self {
        Self {
            position: Point3::new(x, y, z),
            normal: Vector3::new(nx, ny, nz),
        }
    }

    pub fn at(position: Point3<f32>) -> Self {
        Self {
            position,
            normal: Vector3::zeros(),
        }
    }
}

/// A triangle face defined by three vertices and a flat base colour
#[derive(Debug, Clone)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
    pub color: [f32; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
            color: DEFAULT_COLOR,
        }
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Face normal from the winding order, `None` for zero-area triangles
    pub fn calculate_normal(&self) -> Option<Vector3<f32>> {
        let v0 = self.vertices[0].position;
        let v1 = self.vertices[1].position;
        let v2 = self.vertices[2].position;

        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        edge1.cross(&edge2).try_normalize(1e-12)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Smallest box enclosing every point, `None` when there are no finite points
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3<f32>>,
    {
        let mut bounds: Option<Aabb> = None;
        for p in points {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                continue;
            }
            bounds = Some(match bounds {
                None => Aabb { min: *p, max: *p },
                Some(b) => Aabb {
                    min: b.min.inf(p),
                    max: b.max.sup(p),
                },
            });
        }
        bounds
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Largest of the three side lengths
    pub fn max_extent(&self) -> f32 {
        self.size().max()
    }

    /// Bounds of this box after an affine transform (all eight corners)
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Aabb {
        let corners: Vec<Point3<f32>> = (0..8)
            .map(|i| {
                Point3::new(
                    if i & 1 == 0 { self.min.x } else { self.max.x },
                    if i & 2 == 0 { self.min.y } else { self.max.y },
                    if i & 4 == 0 { self.min.z } else { self.max.z },
                )
            })
            .map(|p| matrix.transform_point(&p))
            .collect();
        // Eight finite corners always produce a box
        Aabb::from_points(&corners).unwrap_or(*self)
    }
}

/// A 3D mesh composed of triangles
#[derive(Debug, Clone)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            triangles: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triangles: Vec::with_capacity(capacity),
        }
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Move every triangle of `other` into this mesh
    pub fn extend(&mut self, other: Mesh) {
        self.triangles.extend(other.triangles);
    }

    /// Bounding box over all vertex positions
    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.triangles
                .iter()
                .flat_map(|t| t.vertices.iter().map(|v| &v.position)),
        )
    }

    /// Bake an affine transform into positions and normals
    pub fn apply_matrix(&mut self, matrix: &Matrix4<f32>) {
        let linear: Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear
            .try_inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(linear);

        for triangle in &mut self.triangles {
            for vertex in &mut triangle.vertices {
                vertex.position = matrix.transform_point(&vertex.position);
                vertex.normal = (normal_matrix * vertex.normal)
                    .try_normalize(1e-12)
                    .unwrap_or_else(Vector3::zeros);
            }
        }
    }

    /// Axis-aligned box with the given side lengths, centred at `center`
    pub fn cuboid(center: Point3<f32>, size: Vector3<f32>) -> Self {
        let h = size / 2.0;
        let c = center;
        let corner = |sx: f32, sy: f32, sz: f32| {
            Vertex::at(Point3::new(c.x + sx * h.x, c.y + sy * h.y, c.z + sz * h.z))
        };
        // Two triangles per face, counter-clockwise seen from outside
        let faces: [[(f32, f32, f32); 4]; 6] = [
            [(-1., -1., 1.), (1., -1., 1.), (1., 1., 1.), (-1., 1., 1.)],
            [(1., -1., -1.), (-1., -1., -1.), (-1., 1., -1.), (1., 1., -1.)],
            [(-1., 1., 1.), (1., 1., 1.), (1., 1., -1.), (-1., 1., -1.)],
            [(-1., -1., -1.), (1., -1., -1.), (1., -1., 1.), (-1., -1., 1.)],
            [(1., -1., 1.), (1., -1., -1.), (1., 1., -1.), (1., 1., 1.)],
            [(-1., -1., -1.), (-1., -1., 1.), (-1., 1., 1.), (-1., 1., -1.)],
        ];

        let mut mesh = Self::with_capacity(12);
        for face in faces.iter() {
            let [a, b, cc, d] = face.map(|(x, y, z)| corner(x, y, z));
            mesh.add_triangle(Triangle::new(a, b, cc));
            mesh.add_triangle(Triangle::new(a, cc, d));
        }
        for triangle in &mut mesh.triangles {
            if let Some(n) = triangle.calculate_normal() {
                for v in &mut triangle.vertices {
                    v.normal = n;
                }
            }
        }
        mesh
    }

    /// Cube of the given edge length centred at the origin
    pub fn cube(size: f32) -> Self {
        Self::cuboid(Point3::origin(), Vector3::new(size, size, size))
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_bounds() {
        let mesh = Mesh::cuboid(Point3::new(1.0, 2.0, 3.0), Vector3::new(2.0, 4.0, 1.0));
        assert_eq!(mesh.triangles.len(), 12);

        let bounds = mesh.bounding_box().unwrap();
        assert!((bounds.center() - Point3::new(1.0, 2.0, 3.0)).norm() < 1e-6);
        assert!((bounds.size() - Vector3::new(2.0, 4.0, 1.0)).norm() < 1e-6);
        assert!((bounds.max_extent() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_cube_normals_point_outward() {
        let mesh = Mesh::cube(2.0);
        for triangle in &mesh.triangles {
            let normal = triangle.calculate_normal().unwrap();
            let centroid = triangle
                .vertices
                .iter()
                .fold(Vector3::zeros(), |acc, v| acc + v.position.coords)
                / 3.0;
            assert!(normal.dot(&centroid) > 0.0);
        }
    }

    #[test]
    fn test_empty_mesh_has_no_bounds() {
        assert!(Mesh::new().bounding_box().is_none());
    }

    #[test]
    fn test_degenerate_triangle_has_no_normal() {
        let v = Vertex::at(Point3::new(1.0, 1.0, 1.0));
        assert!(Triangle::new(v, v, v).calculate_normal().is_none());
    }

    #[test]
    fn test_apply_matrix_translates_bounds() {
        let mut mesh = Mesh::cube(1.0);
        mesh.apply_matrix(&Matrix4::new_translation(&Vector3::new(0.0, 5.0, 0.0)));
        let bounds = mesh.bounding_box().unwrap();
        assert!((bounds.center() - Point3::new(0.0, 5.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let points = [Point3::new(f32::NAN, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)];
        let bounds = Aabb::from_points(&points).unwrap();
        assert_eq!(bounds.min, bounds.max);
    }
}
