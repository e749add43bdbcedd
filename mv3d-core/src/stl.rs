/// STL parser for binary and ASCII formats
use nom::{
    bytes::complete::{tag, take},
    character::complete::{multispace0, multispace1, not_line_ending},
    combinator::all_consuming,
    multi::{count, many0},
    number::complete::{float, le_f32, le_u16, le_u32},
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::DecodeError;
use crate::geometry::{Mesh, Triangle, Vertex};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Whether `data` has the exact length of a binary STL with its declared facet count
pub fn looks_like_binary_stl(data: &[u8]) -> bool {
    if data.len() < HEADER_LEN + 4 {
        return false;
    }
    let count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    count
        .checked_mul(FACET_LEN)
        .and_then(|n| n.checked_add(HEADER_LEN + 4))
        .is_some_and(|expected| expected == data.len())
}

/// Parse a binary STL file
pub fn parse_binary_stl(data: &[u8]) -> Result<Mesh, DecodeError> {
    let header: IResult<&[u8], u32> = preceded(take(HEADER_LEN), le_u32)(data);
    let (body, facet_count) =
        header.map_err(|_| DecodeError::Stl("file too small to be a valid STL".to_string()))?;

    let facet_count = facet_count as usize;
    if body.len() / FACET_LEN < facet_count {
        return Err(DecodeError::Stl(format!(
            "truncated file: header declares {} facets, found {}",
            facet_count,
            body.len() / FACET_LEN
        )));
    }

    let (_, triangles) = count(binary_facet, facet_count)(body)
        .map_err(|e| DecodeError::Stl(format!("malformed facet: {:?}", e)))?;

    Ok(into_mesh(triangles))
}

fn binary_facet(input: &[u8]) -> IResult<&[u8], Triangle> {
    let (input, normal) = le_vec3(input)?;
    let (input, (a, b, c)) = tuple((le_vec3, le_vec3, le_vec3))(input)?;
    // Attribute byte count, unused
    let (input, _) = le_u16(input)?;
    Ok((input, facet(normal, [a, b, c])))
}

fn le_vec3(input: &[u8]) -> IResult<&[u8], [f32; 3]> {
    let (input, (x, y, z)) = tuple((le_f32, le_f32, le_f32))(input)?;
    Ok((input, [x, y, z]))
}

/// Parse an ASCII STL file
pub fn parse_ascii_stl(input: &str) -> Result<Mesh, DecodeError> {
    match all_consuming(ascii_solid)(input) {
        Ok((_, triangles)) => Ok(into_mesh(triangles)),
        Err(e) => Err(DecodeError::Stl(format!("failed to parse ASCII STL: {:?}", e))),
    }
}

fn ascii_solid(input: &str) -> IResult<&str, Vec<Triangle>> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    let (input, _) = not_line_ending(input)?; // Optional name
    let (input, triangles) = many0(parse_facet)(input)?;
    let (input, _) = preceded(multispace0, tag("endsolid"))(input)?;
    let (input, _) = not_line_ending(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, triangles))
}

fn parse_facet(input: &str) -> IResult<&str, Triangle> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, normal) = parse_vector3(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, v1) = parse_vertex(input)?;
    let (input, v2) = parse_vertex(input)?;
    let (input, v3) = parse_vertex(input)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;

    Ok((input, facet(normal, [v1, v2, v3])))
}

fn parse_vertex(input: &str) -> IResult<&str, [f32; 3]> {
    preceded(preceded(multispace0, tag("vertex")), parse_vector3)(input)
}

fn parse_vector3(input: &str) -> IResult<&str, [f32; 3]> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, [x, y, z]))
}

/// Build a triangle, falling back to the winding normal when the file's is zero
fn facet(normal: [f32; 3], positions: [[f32; 3]; 3]) -> Triangle {
    let [nx, ny, nz] = normal;
    let vertex = |p: [f32; 3]| Vertex::new(p[0], p[1], p[2], nx, ny, nz);
    let mut triangle = Triangle::new(vertex(positions[0]), vertex(positions[1]), vertex(positions[2]));

    if nx == 0.0 && ny == 0.0 && nz == 0.0 {
        if let Some(n) = triangle.calculate_normal() {
            for v in &mut triangle.vertices {
                v.normal = n;
            }
        }
    }
    triangle
}

fn into_mesh(triangles: Vec<Triangle>) -> Mesh {
    let mut mesh = Mesh::with_capacity(triangles.len());
    for triangle in triangles {
        mesh.add_triangle(triangle);
    }
    mesh
}

/// Detect and parse STL file (binary or ASCII)
pub fn parse_stl(data: &[u8]) -> Result<Mesh, DecodeError> {
    // Binary files may also start with "solid", so fall back on failure
    if data.starts_with(b"solid") {
        if let Ok(text) = std::str::from_utf8(data) {
            if let Ok(mesh) = parse_ascii_stl(text) {
                return Ok(mesh);
            }
        }
    }

    parse_binary_stl(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_triangle() -> Vec<u8> {
        let mut data = vec![0u8; 80];
        data.extend_from_slice(&1u32.to_le_bytes());
        let floats = [
            0.0f32, 0.0, 1.0, // normal
            0.0, 0.0, 0.0, // v0
            1.0, 0.0, 0.0, // v1
            0.0, 2.0, 0.0, // v2
        ];
        for f in floats {
            data.extend_from_slice(&f.to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_binary_header() {
        let mut data = vec![0u8; 84];
        // Set triangle count to 0
        data[80..84].copy_from_slice(&0u32.to_le_bytes());

        let mesh = parse_binary_stl(&data).unwrap();
        assert_eq!(mesh.triangles.len(), 0);
    }

    #[test]
    fn test_parse_binary_triangle() {
        let data = binary_triangle();
        assert!(looks_like_binary_stl(&data));

        let mesh = parse_binary_stl(&data).unwrap();
        assert_eq!(mesh.triangles.len(), 1);
        let bounds = mesh.bounding_box().unwrap();
        assert!((bounds.size().y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_truncated_binary_is_rejected() {
        let mut data = binary_triangle();
        data[80..84].copy_from_slice(&3u32.to_le_bytes());
        assert!(!looks_like_binary_stl(&data));
        assert!(matches!(parse_binary_stl(&data), Err(DecodeError::Stl(_))));
        assert!(parse_binary_stl(&data[..40]).is_err());
    }

    #[test]
    fn test_parse_ascii() {
        let text = "solid cube_part
  facet normal 0 0 0
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid cube_part
";
        let mesh = parse_stl(text.as_bytes()).unwrap();
        assert_eq!(mesh.triangles.len(), 1);
        // Zero normal replaced by the winding normal
        let n = mesh.triangles[0].vertices[0].normal;
        assert!((n.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_malformed_ascii_is_rejected() {
        let text = "solid broken\n  facet normal 0 0 1\n    outer loop\n      vertex 0 0\n";
        assert!(parse_ascii_stl(text).is_err());
    }
}
