use std::io::Write;

use crate::error::SplatError;
use crate::mesh::{RenderMesh, VRK};

#[inline]
fn put_f32s(output: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        output.extend_from_slice(&v.to_le_bytes());
    }
}

/// Writes the quad mesh and its per-face channels as a binary little-endian
/// PLY with a `vertex` and a `face` element.
pub fn write_render_mesh(render: &RenderMesh, output: &mut Vec<u8>) -> Result<(), SplatError> {
    let mesh = &render.mesh;

    output.clear();
    output.extend_from_slice(b"ply\nformat binary_little_endian 1.0\n");
    output.extend_from_slice(b"comment quad splat mesh, z of each vertex is its point index\n");
    writeln!(output, "element vertex {}", mesh.vertices.len())?;
    output.extend_from_slice(b"property float x\nproperty float y\nproperty float z\n");
    writeln!(output, "element face {}", mesh.faces.len())?;
    output.extend_from_slice(
        b"property list uchar uint vertex_indices\n\
          property uint point_index\n\
          property float center_x\nproperty float center_y\nproperty float center_z\n\
          property float color_r\nproperty float color_g\n\
          property float color_b\nproperty float color_a\n",
    );
    for name in VRK {
        writeln!(output, "property float {}", name)?;
    }
    output.extend_from_slice(b"end_header\n");

    // Estimate and reserve the required space
    let face_size = 1 + 3 * 4 + 4 + (3 + 4 + 6) * 4;
    output.reserve(mesh.vertices.len() * 3 * 4 + mesh.faces.len() * face_size);

    for vertex in &mesh.vertices {
        put_f32s(output, vertex);
    }

    for ((face, &point), record) in mesh
        .faces
        .iter()
        .zip(&mesh.face_point)
        .zip(render.face_records())
    {
        output.push(3);
        for index in face {
            output.extend_from_slice(&index.to_le_bytes());
        }
        output.extend_from_slice(&point.to_le_bytes());
        put_f32s(output, &record.center);
        put_f32s(output, &record.color);
        put_f32s(output, &record.vrk);
    }

    tracing::debug!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        bytes = output.len(),
        "serialized render mesh"
    );
    Ok(())
}
