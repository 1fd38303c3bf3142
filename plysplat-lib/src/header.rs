use crate::common::next_line;
use crate::error::SplatError;
use crate::structures::{
    ByteOrder, ElementGroup, Encoding, FileHeader, PropertyDecl, PropertyKind, ScalarType,
};

const MAGIC: &[u8] = b"ply";
const END_HEADER: &str = "end_header";
const VERSION: &str = "1.0";

fn parse_type(name: &str, line_no: usize) -> Result<ScalarType, SplatError> {
    ScalarType::from_name(name).ok_or_else(|| {
        SplatError::format(format!("Unknown property type '{}' on header line {}", name, line_no))
    })
}

fn parse_property(
    tokens: &[&str],
    line_no: usize,
    group: &ElementGroup,
) -> Result<PropertyDecl, SplatError> {
    let decl = match tokens {
        ["list", count, item, name] => {
            let count = parse_type(count, line_no)?;
            if !count.is_integer() {
                return Err(SplatError::format(format!(
                    "List property '{}' has non-integer count type '{}'",
                    name,
                    count.name()
                )));
            }
            PropertyDecl {
                name: name.to_string(),
                kind: PropertyKind::List {
                    count,
                    item: parse_type(item, line_no)?,
                },
            }
        }
        [ty, name] => PropertyDecl {
            name: name.to_string(),
            kind: PropertyKind::Scalar(parse_type(ty, line_no)?),
        },
        _ => {
            return Err(SplatError::format(format!(
                "Malformed property declaration on header line {}",
                line_no
            )))
        }
    };

    if group.properties.iter().any(|p| p.name == decl.name) {
        return Err(SplatError::format(format!(
            "Duplicate property '{}' in element '{}'",
            decl.name, group.name
        )));
    }
    Ok(decl)
}

fn parse_encoding(tokens: &[&str], line_no: usize) -> Result<Encoding, SplatError> {
    let [keyword, version] = tokens else {
        return Err(SplatError::format(format!(
            "Malformed format declaration on header line {}",
            line_no
        )));
    };
    if *version != VERSION {
        return Err(SplatError::format(format!("Unsupported PLY version '{}'", version)));
    }
    match *keyword {
        "ascii" => Ok(Encoding::Ascii),
        "binary_little_endian" => Ok(Encoding::Binary(ByteOrder::Little)),
        "binary_big_endian" => Ok(Encoding::Binary(ByteOrder::Big)),
        other => Err(SplatError::format(format!("Unsupported PLY encoding '{}'", other))),
    }
}

/// Parses the text header and returns it together with the byte offset of
/// the first payload byte.
pub fn parse_header(raw_data: &[u8]) -> Result<(FileHeader, usize), SplatError> {
    let mut offset = 0;

    let magic = next_line(raw_data, &mut offset)
        .ok_or_else(|| SplatError::format("Empty input, no 'ply' line"))?;
    if magic.trim_ascii() != MAGIC {
        return Err(SplatError::format("Not a .ply file (missing 'ply' header)"));
    }

    let mut encoding = None;
    let mut elements: Vec<ElementGroup> = Vec::new();
    let mut comments = Vec::new();
    let mut line_no = 1;

    loop {
        let Some(raw_line) = next_line(raw_data, &mut offset) else {
            return Err(SplatError::format(
                "No 'end_header' found before EOF (header is not terminated)",
            ));
        };
        line_no += 1;

        let line = std::str::from_utf8(raw_line).map_err(|e| {
            SplatError::format(format!("UTF-8 error on header line {}: {}", line_no, e))
        })?;
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        let Some((&keyword, rest)) = tokens.split_first() else {
            continue;
        };

        match keyword {
            END_HEADER => break,
            "comment" | "obj_info" => {
                comments.push(line.trim_start()[keyword.len()..].trim().to_string());
            }
            "format" => {
                if encoding.is_some() {
                    return Err(SplatError::format("Duplicate format declaration"));
                }
                encoding = Some(parse_encoding(rest, line_no)?);
            }
            "element" => {
                let [name, count] = rest else {
                    return Err(SplatError::format(format!(
                        "Malformed element declaration on header line {}",
                        line_no
                    )));
                };
                let count: usize = count.parse().map_err(|e| {
                    SplatError::format(format!("Invalid count for element '{}': {}", name, e))
                })?;
                elements.push(ElementGroup {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            "property" => {
                let group = elements.last_mut().ok_or_else(|| {
                    SplatError::format(format!(
                        "Property declared before any element on header line {}",
                        line_no
                    ))
                })?;
                let decl = parse_property(rest, line_no, group)?;
                group.properties.push(decl);
            }
            other => {
                return Err(SplatError::format(format!(
                    "Unrecognized header keyword '{}' on line {}",
                    other, line_no
                )));
            }
        }
    }

    let encoding = encoding.ok_or_else(|| SplatError::format("Missing format line"))?;

    tracing::debug!(
        encoding = encoding.keyword(),
        elements = elements.len(),
        payload_offset = offset,
        "parsed PLY header"
    );

    Ok((
        FileHeader {
            encoding,
            elements,
            comments,
        },
        offset,
    ))
}
