pub mod common;
pub mod error;
pub mod header;
pub mod mesh;
pub mod reader;
mod structures;
pub mod transform;
pub mod writer;

use std::path::Path;

pub use error::{ErrorKind, SplatError};
pub use mesh::{FaceAttribute, FaceChannels, QuadMesh, RenderMesh};
pub use reader::{parse_ply, read_ply, read_ply_bytes, PlyFile};
pub use structures::{
    ByteOrder, ElementGroup, Encoding, FileHeader, ImportOptions, ParsedElement, PropertyData,
    PropertyDecl, PropertyKind, ScalarColumn, ScalarType, SplatRecord,
};
pub use transform::{transform, transform_with, SplatFields};
pub use writer::write_render_mesh;

/// Turns decoded elements into a render mesh, using the element named by
/// `options.point_element`.
pub fn build_render_mesh(
    elements: &[ParsedElement],
    options: &ImportOptions,
) -> Result<RenderMesh, SplatError> {
    let points = elements
        .iter()
        .find(|e| e.name == options.point_element)
        .ok_or_else(|| SplatError::MissingElement(options.point_element.clone()))?;

    let records = transform_with(points, options)?;
    let render = RenderMesh::new(records, options.quad_half_extent)?;

    tracing::info!(
        points = render.point_count(),
        faces = render.face_count(),
        "built splat render mesh"
    );
    Ok(render)
}

pub fn load_from_bytes(raw_data: &[u8], options: &ImportOptions) -> Result<RenderMesh, SplatError> {
    let elements = read_ply_bytes(raw_data)?;
    build_render_mesh(&elements, options)
}

/// Reads a splat PLY file and converts it into a render mesh.
pub fn load(path: impl AsRef<Path>, options: &ImportOptions) -> Result<RenderMesh, SplatError> {
    let elements = read_ply(path)?;
    build_render_mesh(&elements, options)
}

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    #[inline(never)]
    pub async fn read_ply_async(path: impl AsRef<Path>) -> Result<Vec<ParsedElement>, SplatError> {
        let raw_data = tokio::fs::read(path.as_ref()).await?;
        read_ply_bytes(&raw_data)
    }

    #[inline(never)]
    pub async fn load_async(
        path: impl AsRef<Path>,
        options: &ImportOptions,
    ) -> Result<RenderMesh, SplatError> {
        let elements = read_ply_async(path).await?;
        build_render_mesh(&elements, options)
    }
}
}
