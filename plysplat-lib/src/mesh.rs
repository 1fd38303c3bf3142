use crate::common::{FACES_PER_POINT, VERTICES_PER_POINT};
use crate::error::SplatError;
use crate::structures::SplatRecord;

pub const CENTER: &str = "center";
pub const COLOR: &str = "color";
pub const VRK: [&str; 6] = ["Vrk_1", "Vrk_2", "Vrk_3", "Vrk_4", "Vrk_5", "Vrk_6"];

/// One camera-facing quad per point, two triangles each.
///
/// Every vertex of point `i` has `z = i`; the renderer recovers the point
/// index from the geometry. `face_point` carries the same mapping explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadMesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
    pub face_point: Vec<u32>,
}

impl QuadMesh {
    pub fn for_points(count: usize, half_extent: f32) -> Result<Self, SplatError> {
        let vertex_count = count
            .checked_mul(VERTICES_PER_POINT)
            .filter(|&n| u32::try_from(n).is_ok())
            .ok_or(SplatError::TooManyPoints(count))?;

        let h = half_extent;
        let mut vertices = Vec::with_capacity(vertex_count);
        let mut faces = Vec::with_capacity(count * FACES_PER_POINT);
        let mut face_point = Vec::with_capacity(count * FACES_PER_POINT);

        for i in 0..count as u32 {
            let z = i as f32;
            vertices.extend_from_slice(&[[-h, -h, z], [h, -h, z], [h, h, z], [-h, h, z]]);

            let b = i * VERTICES_PER_POINT as u32;
            faces.push([b, b + 1, b + 2]);
            faces.push([b, b + 2, b + 3]);
            face_point.extend_from_slice(&[i, i]);
        }

        Ok(QuadMesh {
            vertices,
            faces,
            face_point,
        })
    }
}

/// A borrowed per-face attribute channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceAttribute<'a> {
    Vector(&'a [[f32; 3]]),
    Color(&'a [[f32; 4]]),
    Float(&'a [f32]),
}

/// Per-face channels, two consecutive entries per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceChannels {
    pub center: Vec<[f32; 3]>,
    pub color: Vec<[f32; 4]>,
    pub vrk: [Vec<f32>; 6],
}

impl FaceChannels {
    pub fn from_records(records: &[SplatRecord]) -> Self {
        let faces = records.len() * FACES_PER_POINT;
        let mut channels = FaceChannels {
            center: Vec::with_capacity(faces),
            color: Vec::with_capacity(faces),
            vrk: std::array::from_fn(|_| Vec::with_capacity(faces)),
        };
        for record in records {
            for _ in 0..FACES_PER_POINT {
                channels.center.push(record.center);
                channels.color.push(record.color);
                for (channel, &value) in channels.vrk.iter_mut().zip(&record.vrk) {
                    channel.push(value);
                }
            }
        }
        channels
    }

    pub fn get(&self, name: &str) -> Option<FaceAttribute<'_>> {
        match name {
            CENTER => Some(FaceAttribute::Vector(&self.center)),
            COLOR => Some(FaceAttribute::Color(&self.color)),
            _ => VRK
                .iter()
                .position(|&n| n == name)
                .map(|k| FaceAttribute::Float(&self.vrk[k])),
        }
    }

    /// Channel names in output order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        [CENTER, COLOR].into_iter().chain(VRK)
    }
}

/// Geometry plus per-point records: everything a host needs to draw the splats.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderMesh {
    pub mesh: QuadMesh,
    pub records: Vec<SplatRecord>,
}

impl RenderMesh {
    pub fn new(records: Vec<SplatRecord>, half_extent: f32) -> Result<Self, SplatError> {
        let mesh = QuadMesh::for_points(records.len(), half_extent)?;
        Ok(RenderMesh { mesh, records })
    }

    pub fn point_count(&self) -> usize {
        self.records.len()
    }

    pub fn face_count(&self) -> usize {
        self.mesh.faces.len()
    }

    /// Both faces of point `i` share its record.
    pub fn face_record(&self, face: usize) -> Option<&SplatRecord> {
        self.records.get(face / FACES_PER_POINT)
    }

    pub fn face_records(&self) -> impl Iterator<Item = &SplatRecord> {
        self.records.iter().flat_map(|r| [r; FACES_PER_POINT])
    }

    pub fn channels(&self) -> FaceChannels {
        FaceChannels::from_records(&self.records)
    }

    /// Records as raw bytes, one `SplatRecord` per point.
    pub fn record_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }
}
