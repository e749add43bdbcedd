/// Content-based format detection for asset bytes
use crate::error::DecodeError;
use crate::geometry::Mesh;
use crate::{gltf_read, stl};

/// Formats the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    /// Binary glTF container
    Glb,
    /// glTF JSON with embedded buffers
    GltfJson,
    AsciiStl,
    BinaryStl,
}

impl AssetFormat {
    /// Sniff the format from the first bytes; the reference string is never consulted
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"glTF") {
            return Some(AssetFormat::Glb);
        }
        if stl::looks_like_binary_stl(data) {
            return Some(AssetFormat::BinaryStl);
        }
        let trimmed = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|start| &data[start..])
            .unwrap_or(&[]);
        if trimmed.starts_with(b"{") {
            return Some(AssetFormat::GltfJson);
        }
        if trimmed.starts_with(b"solid") {
            return Some(AssetFormat::AsciiStl);
        }
        None
    }
}

/// Decode asset bytes into a mesh in the asset's native units
pub fn decode_asset(data: &[u8]) -> Result<Mesh, DecodeError> {
    let format = AssetFormat::detect(data).ok_or(DecodeError::UnsupportedFormat)?;
    log::debug!("decoding {} bytes as {:?}", data.len(), format);

    let mesh = match format {
        AssetFormat::Glb | AssetFormat::GltfJson => gltf_read::parse_gltf(data)?,
        AssetFormat::AsciiStl | AssetFormat::BinaryStl => stl::parse_stl(data)?,
    };

    if mesh.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_formats() {
        assert_eq!(AssetFormat::detect(b"glTF\x02\x00\x00\x00"), Some(AssetFormat::Glb));
        assert_eq!(AssetFormat::detect(b"  {\"asset\":{}}"), Some(AssetFormat::GltfJson));
        assert_eq!(AssetFormat::detect(b"solid x\nendsolid x\n"), Some(AssetFormat::AsciiStl));

        let mut binary = vec![0u8; 84];
        binary[80..84].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(AssetFormat::detect(&binary), Some(AssetFormat::BinaryStl));

        assert_eq!(AssetFormat::detect(b"\x89PNG\r\n"), None);
        assert_eq!(AssetFormat::detect(b""), None);
    }

    #[test]
    fn test_unsupported_bytes() {
        assert!(matches!(
            decode_asset(b"not a model"),
            Err(DecodeError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_empty_stl_is_rejected() {
        assert!(matches!(
            decode_asset(b"solid empty\nendsolid empty\n"),
            Err(DecodeError::Empty)
        ));
    }
}
