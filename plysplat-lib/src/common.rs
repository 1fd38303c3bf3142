/// Zeroth-order real spherical harmonic, `1 / (2 * sqrt(pi))`.
pub const SH_C0: f32 = 0.282_094_791_773_878_14;

/// Log-odds used for every point when the file carries no `opacity`.
pub const DEFAULT_LOG_OPACITY: f32 = 1.0;

pub const DEFAULT_QUAD_HALF_EXTENT: f32 = 2.0;

pub const POINT_ELEMENT: &str = "vertex";

/// Faces emitted per point: the two triangles of its quad.
pub const FACES_PER_POINT: usize = 2;

pub const VERTICES_PER_POINT: usize = 4;

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub(crate) fn decode_dc(f_dc: f32) -> f32 {
    f_dc * SH_C0 + 0.5
}

/// Returns the next `\n`-terminated line without the terminator (or a
/// trailing `\r`), advancing `offset` past it.
#[inline]
pub(crate) fn next_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Option<&'b [u8]> {
    if *offset >= buffer.len() {
        return None;
    }
    let start = *offset;

    let line = match memchr::memchr(b'\n', &buffer[start..]) {
        Some(pos) => {
            *offset = start + pos + 1;
            &buffer[start..start + pos]
        }
        None => {
            *offset = buffer.len();
            &buffer[start..]
        }
    };
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}
