/// glTF 2.0 importer: flattens every triangle primitive of the default scene
/// into one world-space mesh. Buffers may be the GLB binary chunk or data
/// URIs; images are never decoded.

use nalgebra::{Matrix4, Point3};

use crate::error::DecodeError;
use crate::geometry::{Mesh, Triangle, Vertex};

pub fn parse_gltf(data: &[u8]) -> Result<Mesh, DecodeError> {
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(data)?;
    let buffers = gltf::import_buffers(&document, None, blob)?;

    let mut mesh = Mesh::new();
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                collect_node(&node, &Matrix4::identity(), &buffers, &mut mesh)?;
            }
        }
        // Scene-less files still get their meshes shown untransformed
        None => {
            for source in document.meshes() {
                collect_mesh(&source, &Matrix4::identity(), &buffers, &mut mesh)?;
            }
        }
    }

    if mesh.is_empty() {
        return Err(DecodeError::Empty);
    }
    log::debug!("glTF decoded: {} triangles", mesh.triangles.len());
    Ok(mesh)
}

fn collect_node(
    node: &gltf::Node,
    parent: &Matrix4<f32>,
    buffers: &[gltf::buffer::Data],
    out: &mut Mesh,
) -> Result<(), DecodeError> {
    let world = parent * Matrix4::from(node.transform().matrix());

    if let Some(source) = node.mesh() {
        collect_mesh(&source, &world, buffers, out)?;
    }
    for child in node.children() {
        collect_node(&child, &world, buffers, out)?;
    }
    Ok(())
}

fn collect_mesh(
    source: &gltf::Mesh,
    world: &Matrix4<f32>,
    buffers: &[gltf::buffer::Data],
    out: &mut Mesh,
) -> Result<(), DecodeError> {
    for primitive in source.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::debug!("skipping {:?} primitive in mesh {}", primitive.mode(), source.index());
            continue;
        }

        let Some(position_accessor) = primitive.get(&gltf::Semantic::Positions) else {
            continue;
        };
        check_accessor(&position_accessor, buffers)?;
        if let Some(index_accessor) = primitive.indices() {
            check_accessor(&index_accessor, buffers)?;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let positions = reader.read_positions().ok_or_else(|| {
            DecodeError::Malformed(format!("unreadable positions in mesh {}", source.index()))
        })?;
        let positions: Vec<Point3<f32>> = positions.map(Point3::from).collect();

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        let [r, g, b, _] = primitive.material().pbr_metallic_roughness().base_color_factor();

        let mut part = Mesh::with_capacity(indices.len() / 3);
        for corner in indices.chunks_exact(3) {
            let vertex = |i: u32| {
                positions.get(i as usize).copied().map(Vertex::at).ok_or_else(|| {
                    DecodeError::Malformed(format!(
                        "index {} out of range for {} positions",
                        i,
                        positions.len()
                    ))
                })
            };
            let mut triangle =
                Triangle::new(vertex(corner[0])?, vertex(corner[1])?, vertex(corner[2])?)
                    .with_color([r, g, b]);
            if let Some(n) = triangle.calculate_normal() {
                for v in &mut triangle.vertices {
                    v.normal = n;
                }
            }
            part.add_triangle(triangle);
        }
        part.apply_matrix(world);
        out.extend(part);
    }
    Ok(())
}

/// Reject accessors the reader would choke on: empty ones and ones that
/// run past their buffer view or buffer
fn check_accessor(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<(), DecodeError> {
    let count = accessor.count();
    if count == 0 {
        return Err(DecodeError::Malformed(format!(
            "accessor {} has no elements",
            accessor.index()
        )));
    }

    // Sparse-only accessors have no view to check
    let Some(view) = accessor.view() else {
        return Ok(());
    };
    let stride = view.stride().unwrap_or_else(|| accessor.size());
    let needed = stride
        .checked_mul(count - 1)
        .and_then(|n| n.checked_add(accessor.offset()))
        .and_then(|n| n.checked_add(accessor.size()));
    if needed.map_or(true, |n| n > view.length()) {
        return Err(DecodeError::Malformed(format!(
            "accessor {} needs more than the {} bytes of buffer view {}",
            accessor.index(),
            view.length(),
            view.index()
        )));
    }

    let buffer_len = buffers.get(view.buffer().index()).map_or(0, |d| d.0.len());
    if view.offset() + view.length() > buffer_len {
        return Err(DecodeError::Malformed(format!(
            "buffer view {} runs past the end of buffer {}",
            view.index(),
            view.buffer().index()
        )));
    }
    Ok(())
}
