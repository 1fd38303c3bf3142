use std::path::Path;

use crate::common::next_line;
use crate::error::SplatError;
use crate::header::parse_header;
use crate::structures::{
    decode_count, parse_count, ByteOrder, ElementGroup, Encoding, FileHeader, ParsedElement,
    PropertyData, ScalarColumn,
};

/// A fully decoded PLY file.
#[derive(Debug, Clone)]
pub struct PlyFile {
    pub header: FileHeader,
    /// One entry per declared element group, in declaration order.
    pub elements: Vec<ParsedElement>,
}

impl PlyFile {
    pub fn element(&self, name: &str) -> Option<&ParsedElement> {
        self.elements.iter().find(|e| e.name == name)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    #[inline]
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let bytes = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(bytes)
    }

    fn position(&self) -> usize {
        self.base + self.offset
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

fn truncated(group: &ElementGroup, property: usize, instance: usize, offset: usize) -> SplatError {
    SplatError::TruncatedPayload {
        element: group.name.clone(),
        property: group
            .properties
            .get(property)
            .map(|p| p.name.clone())
            .unwrap_or_default(),
        instance,
        offset,
    }
}

/// Columns for `group`, reserved for at most as many instances as `payload_len`
/// bytes can hold when each instance takes at least `min_stride` bytes.
fn empty_columns(
    group: &ElementGroup,
    payload_len: usize,
    min_stride: usize,
) -> Vec<PropertyData> {
    let capacity = group.count.min(payload_len / min_stride.max(1));
    group
        .properties
        .iter()
        .map(|p| PropertyData::for_decl(p.kind, capacity))
        .collect()
}

fn finish(group: &ElementGroup, columns: Vec<PropertyData>) -> ParsedElement {
    let properties = group
        .properties
        .iter()
        .map(|p| p.name.clone())
        .zip(columns)
        .collect();
    ParsedElement::new(group.name.clone(), group.count, properties)
}

fn decode_binary(
    header: &FileHeader,
    payload: &[u8],
    base: usize,
    order: ByteOrder,
) -> Result<Vec<ParsedElement>, SplatError> {
    let mut cursor = Cursor {
        data: payload,
        offset: 0,
        base,
    };
    let mut elements = Vec::with_capacity(header.elements.len());

    for group in &header.elements {
        let mut columns = empty_columns(group, cursor.remaining(), group.min_stride());

        let count = if group.properties.is_empty() { 0 } else { group.count };
        for instance in 0..count {
            for (p, column) in columns.iter_mut().enumerate() {
                match column {
                    PropertyData::Scalar(col) => {
                        let size = col.scalar_type().size();
                        let at = cursor.position();
                        let bytes = cursor
                            .take(size)
                            .ok_or_else(|| truncated(group, p, instance, at))?;
                        col.push_bytes(bytes, order);
                    }
                    PropertyData::List {
                        count_type,
                        item_type,
                        rows,
                    } => {
                        let at = cursor.position();
                        let prefix = cursor
                            .take(count_type.size())
                            .ok_or_else(|| truncated(group, p, instance, at))?;
                        let len = decode_count(*count_type, prefix, order).ok_or_else(|| {
                            SplatError::format(format!(
                                "Negative list length for '{}' in element '{}' at byte {}",
                                group.properties[p].name, group.name, at
                            ))
                        })?;

                        let mut row =
                            ScalarColumn::with_capacity(*item_type, len.min(cursor.remaining()));
                        for _ in 0..len {
                            let at = cursor.position();
                            let bytes = cursor
                                .take(item_type.size())
                                .ok_or_else(|| truncated(group, p, instance, at))?;
                            row.push_bytes(bytes, order);
                        }
                        rows.push(row);
                    }
                }
            }
        }

        tracing::debug!(element = %group.name, count = group.count, "decoded binary element");
        elements.push(finish(group, columns));
    }

    if cursor.remaining() > 0 {
        tracing::warn!(
            trailing_bytes = cursor.remaining(),
            "ignoring data after the last declared element"
        );
    }

    Ok(elements)
}

fn next_token<'t>(
    tokens: &mut impl Iterator<Item = &'t str>,
    group: &ElementGroup,
    property: usize,
    instance: usize,
    line_start: usize,
) -> Result<&'t str, SplatError> {
    tokens
        .next()
        .ok_or_else(|| truncated(group, property, instance, line_start))
}

fn push_ascii(
    column: &mut ScalarColumn,
    token: &str,
    group: &ElementGroup,
    property: usize,
    line_start: usize,
) -> Result<(), SplatError> {
    column.push_token(token).map_err(|e| {
        SplatError::format(format!(
            "Bad value for '{}' in element '{}' (line at byte {}): {}",
            group.properties[property].name, group.name, line_start, e
        ))
    })
}

/// Next non-empty line of an ASCII payload with its absolute byte offset.
fn next_record<'p>(
    payload: &'p [u8],
    base: usize,
    offset: &mut usize,
) -> Result<Option<(usize, &'p str)>, SplatError> {
    loop {
        let start = base + *offset;
        let Some(raw) = next_line(payload, offset) else {
            return Ok(None);
        };
        let line = std::str::from_utf8(raw).map_err(|e| {
            SplatError::format(format!("UTF-8 error in ASCII payload at byte {}: {}", start, e))
        })?;
        if !line.trim().is_empty() {
            return Ok(Some((start, line)));
        }
    }
}

fn decode_ascii(
    header: &FileHeader,
    payload: &[u8],
    base: usize,
) -> Result<Vec<ParsedElement>, SplatError> {
    let mut offset = 0;
    let mut elements = Vec::with_capacity(header.elements.len());

    for group in &header.elements {
        // Each ASCII value takes at least one digit and one separator.
        let mut columns = empty_columns(group, payload.len() - offset, 2 * group.properties.len());

        let count = if group.properties.is_empty() { 0 } else { group.count };
        for instance in 0..count {
            let Some((line_start, line)) = next_record(payload, base, &mut offset)? else {
                return Err(truncated(group, 0, instance, base + offset));
            };
            let mut tokens = line.split_ascii_whitespace();

            for (p, column) in columns.iter_mut().enumerate() {
                match column {
                    PropertyData::Scalar(col) => {
                        let token = next_token(&mut tokens, group, p, instance, line_start)?;
                        push_ascii(col, token, group, p, line_start)?;
                    }
                    PropertyData::List {
                        count_type,
                        item_type,
                        rows,
                    } => {
                        let token = next_token(&mut tokens, group, p, instance, line_start)?;
                        let len = parse_count(*count_type, token).ok_or_else(|| {
                            SplatError::format(format!(
                                "Bad list length '{}' for '{}' in element '{}' (declared {})",
                                token,
                                group.properties[p].name,
                                group.name,
                                count_type.name()
                            ))
                        })?;
                        let mut row = ScalarColumn::with_capacity(*item_type, len.min(line.len()));
                        for _ in 0..len {
                            let token = next_token(&mut tokens, group, p, instance, line_start)?;
                            push_ascii(&mut row, token, group, p, line_start)?;
                        }
                        rows.push(row);
                    }
                }
            }

            if tokens.next().is_some() {
                return Err(SplatError::format(format!(
                    "Too many values for instance {} of element '{}' (line at byte {})",
                    instance, group.name, line_start
                )));
            }
        }

        tracing::debug!(element = %group.name, count = group.count, "decoded ascii element");
        elements.push(finish(group, columns));
    }

    if next_record(payload, base, &mut offset)?.is_some() {
        tracing::warn!("ignoring lines after the last declared element");
    }

    Ok(elements)
}

/// Parses a complete PLY file held in memory.
pub fn parse_ply(raw_data: &[u8]) -> Result<PlyFile, SplatError> {
    let (header, payload_offset) = parse_header(raw_data)?;
    let payload = &raw_data[payload_offset..];

    let elements = match header.encoding {
        Encoding::Ascii => decode_ascii(&header, payload, payload_offset)?,
        Encoding::Binary(order) => decode_binary(&header, payload, payload_offset, order)?,
    };

    Ok(PlyFile { header, elements })
}

/// Decodes every element group of an in-memory PLY file, in declaration order.
pub fn read_ply_bytes(raw_data: &[u8]) -> Result<Vec<ParsedElement>, SplatError> {
    parse_ply(raw_data).map(|file| file.elements)
}

pub fn read_ply(path: impl AsRef<Path>) -> Result<Vec<ParsedElement>, SplatError> {
    let path = path.as_ref();
    let raw_data = std::fs::read(path)?;
    tracing::debug!(path = %path.display(), bytes = raw_data.len(), "read PLY file");
    read_ply_bytes(&raw_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::structures::ScalarType;
    use std::io::Write;

    fn header(format: &str, body: &str) -> Vec<u8> {
        format!("ply\nformat {} 1.0\n{}end_header\n", format, body).into_bytes()
    }

    #[test]
    fn test_empty_element() {
        let data = header("binary_little_endian", "element vertex 0\nproperty float x\n");
        let elements = read_ply_bytes(&data).expect("empty element should parse");
        assert_eq!(elements.len(), 1);
        assert!(elements[0].is_empty());
        assert_eq!(elements[0].scalar("x").map(|c| c.len()), Some(0));
    }

    #[test]
    fn test_binary_little_endian_roundtrip() {
        let mut data = header(
            "binary_little_endian",
            "element vertex 2\nproperty float x\nproperty double y\nproperty short z\n",
        );
        let xs = [1.5f32, f32::MIN_POSITIVE];
        let ys = [std::f64::consts::PI, -1e300];
        let zs = [-32768i16, 7];
        for i in 0..2 {
            data.extend_from_slice(&xs[i].to_le_bytes());
            data.extend_from_slice(&ys[i].to_le_bytes());
            data.extend_from_slice(&zs[i].to_le_bytes());
        }

        let elements = read_ply_bytes(&data).expect("binary payload should parse");
        let vertex = &elements[0];
        assert_eq!(vertex.scalar("x"), Some(&ScalarColumn::Float32(xs.to_vec())));
        assert_eq!(vertex.scalar("y"), Some(&ScalarColumn::Float64(ys.to_vec())));
        assert_eq!(vertex.scalar("z"), Some(&ScalarColumn::Int16(zs.to_vec())));
    }

    #[test]
    fn test_binary_big_endian_with_lists() {
        let mut data = header(
            "binary_big_endian",
            "element vertex 1\nproperty float x\nproperty double y\n\
             element face 2\nproperty list uchar uint vertex_indices\nproperty uint8 flag\n",
        );
        let y = -std::f64::consts::E * 1e-200;
        data.extend_from_slice(&(-2.25f32).to_be_bytes());
        data.extend_from_slice(&y.to_be_bytes());
        data.push(3);
        for i in [0u32, 1, 70000] {
            data.extend_from_slice(&i.to_be_bytes());
        }
        data.push(9);
        data.push(0);
        data.push(4);

        let file = parse_ply(&data).expect("big endian payload should parse");
        assert_eq!(file.header.encoding, Encoding::Binary(ByteOrder::Big));
        let vertex = file.element("vertex").expect("vertex element");
        assert_eq!(vertex.scalar("x"), Some(&ScalarColumn::Float32(vec![-2.25])));
        assert_eq!(vertex.scalar("y"), Some(&ScalarColumn::Float64(vec![y])));

        let face = file.element("face").expect("face element");
        assert_eq!(face.len(), 2);
        match face.get("vertex_indices") {
            Some(PropertyData::List {
                count_type, rows, ..
            }) => {
                assert_eq!(*count_type, ScalarType::UInt8);
                assert_eq!(rows[0], ScalarColumn::UInt32(vec![0, 1, 70000]));
                assert_eq!(rows[1], ScalarColumn::UInt32(vec![]));
            }
            other => panic!("unexpected vertex_indices column: {:?}", other),
        }
        assert_eq!(face.scalar("flag"), Some(&ScalarColumn::UInt8(vec![9, 4])));
    }

    #[test]
    fn test_ascii_payload() {
        let mut data = header(
            "ascii",
            "element vertex 2\nproperty float x\nproperty int y\n\
             element face 1\nproperty list uchar int vertex_indices\n",
        );
        data.extend_from_slice(b"0.5 -3\n\n  1e3 12  \n3 0 1 2\n");

        let elements = read_ply_bytes(&data).expect("ascii payload should parse");
        assert_eq!(elements[0].scalar("x"), Some(&ScalarColumn::Float32(vec![0.5, 1000.0])));
        assert_eq!(elements[0].scalar("y"), Some(&ScalarColumn::Int32(vec![-3, 12])));
        match elements[1].get("vertex_indices") {
            Some(PropertyData::List { rows, .. }) => {
                assert_eq!(rows, &vec![ScalarColumn::Int32(vec![0, 1, 2])]);
            }
            other => panic!("unexpected vertex_indices column: {:?}", other),
        }
    }

    #[test]
    fn test_ascii_errors() {
        let body = "element vertex 2\nproperty float x\nproperty float y\n";
        let cases: [&[u8]; 4] = [b"1 2\n", b"1 2\n3\n", b"1 2\n3 4 5\n", b"1 two\n3 4\n"];
        for payload in cases {
            let mut data = header("ascii", body);
            data.extend_from_slice(payload);
            let err = read_ply_bytes(&data).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "{}", err);
        }

        // List lengths must fit the declared count type.
        let body = "element face 1\nproperty list uchar int idx\n";
        let mut long_row = String::from("300");
        for i in 0..300 {
            long_row.push_str(&format!(" {}", i));
        }
        long_row.push('\n');
        let cases = [long_row.as_str(), "-1\n", "2.0 0 1\n"];
        for payload in cases {
            let mut data = header("ascii", body);
            data.extend_from_slice(payload.as_bytes());
            let err = read_ply_bytes(&data).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "{}", err);
        }

        let mut data = header("ascii", "element face 1\nproperty list char int idx\n");
        data.extend_from_slice(b"-1\n");
        assert!(read_ply_bytes(&data).is_err());
    }

    #[test]
    fn test_forged_count_reserves_within_payload() {
        let file_header = parse_header(&header(
            "binary_little_endian",
            "element vertex 1000000000\nproperty float x\nproperty double y\n",
        ))
        .unwrap()
        .0;
        let group = &file_header.elements[0];

        for column in empty_columns(group, 120, group.min_stride()) {
            match column {
                PropertyData::Scalar(ScalarColumn::Float32(v)) => assert!(v.capacity() <= 10),
                PropertyData::Scalar(ScalarColumn::Float64(v)) => assert!(v.capacity() <= 10),
                other => panic!("unexpected column: {:?}", other),
            }
        }
    }

    #[test]
    fn test_truncated_binary_reports_position() {
        let mut data = header(
            "binary_little_endian",
            "element vertex 2\nproperty float x\nproperty float y\n",
        );
        let payload_start = data.len();
        for v in [1.0f32, 2.0, 3.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }

        match read_ply_bytes(&data) {
            Err(SplatError::TruncatedPayload {
                element,
                property,
                instance,
                offset,
            }) => {
                assert_eq!(element, "vertex");
                assert_eq!(property, "y");
                assert_eq!(instance, 1);
                assert_eq!(offset, payload_start + 12);
            }
            other => panic!("expected truncation error, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_declared_count_fails_cleanly() {
        let data = header(
            "binary_little_endian",
            "element vertex 18446744073709551615\nproperty float x\n",
        );
        let err = read_ply_bytes(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_read_ply_from_path() {
        let mut data = header("binary_little_endian", "element vertex 1\nproperty uchar v\n");
        data.push(42);

        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(&data).expect("write temp file");

        let elements = read_ply(file.path()).expect("read from path");
        assert_eq!(elements[0].scalar("v"), Some(&ScalarColumn::UInt8(vec![42])));

        let missing = read_ply(file.path().with_extension("missing")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Io);
    }
}
