use bytemuck::{Pod, Zeroable};
use foldhash::HashMap;
use foldhash::HashMapExt;

use crate::common::{DEFAULT_LOG_OPACITY, DEFAULT_QUAD_HALF_EXTENT, POINT_ELEMENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Binary(ByteOrder),
}

impl Encoding {
    pub const fn keyword(self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Binary(ByteOrder::Little) => "binary_little_endian",
            Encoding::Binary(ByteOrder::Big) => "binary_big_endian",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl ScalarType {
    /// Accepts both the classic PLY names and the sized aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "char" | "int8" => ScalarType::Int8,
            "uchar" | "uint8" => ScalarType::UInt8,
            "short" | "int16" => ScalarType::Int16,
            "ushort" | "uint16" => ScalarType::UInt16,
            "int" | "int32" => ScalarType::Int32,
            "uint" | "uint32" => ScalarType::UInt32,
            "int64" => ScalarType::Int64,
            "uint64" => ScalarType::UInt64,
            "float" | "float32" => ScalarType::Float32,
            "double" | "float64" => ScalarType::Float64,
            _ => return None,
        };
        Some(ty)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::Int8 => "char",
            ScalarType::UInt8 => "uchar",
            ScalarType::Int16 => "short",
            ScalarType::UInt16 => "ushort",
            ScalarType::Int32 => "int",
            ScalarType::UInt32 => "uint",
            ScalarType::Int64 => "int64",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float32 => "float",
            ScalarType::Float64 => "double",
        }
    }

    /// Width in bytes of one value in a binary payload.
    pub const fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 8,
        }
    }

    pub const fn is_integer(self) -> bool {
        !matches!(self, ScalarType::Float32 | ScalarType::Float64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(ScalarType),
    List { count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDecl {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementGroup {
    pub name: String,
    pub count: usize,
    pub properties: Vec<PropertyDecl>,
}

impl ElementGroup {
    /// Byte stride of one instance, if the group has no list properties.
    pub fn fixed_stride(&self) -> Option<usize> {
        self.properties.iter().try_fold(0, |acc, p| match p.kind {
            PropertyKind::Scalar(ty) => Some(acc + ty.size()),
            PropertyKind::List { .. } => None,
        })
    }

    /// Smallest binary size of one instance; an empty list still has its length prefix.
    pub fn min_stride(&self) -> usize {
        self.properties
            .iter()
            .map(|p| match p.kind {
                PropertyKind::Scalar(ty) => ty.size(),
                PropertyKind::List { count, .. } => count.size(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub encoding: Encoding,
    pub elements: Vec<ElementGroup>,
    pub comments: Vec<String>,
}

macro_rules! decode_as {
    ($t:ty, $bytes:expr, $order:expr) => {{
        let mut buf = [0u8; std::mem::size_of::<$t>()];
        buf.copy_from_slice($bytes);
        match $order {
            ByteOrder::Little => <$t>::from_le_bytes(buf),
            ByteOrder::Big => <$t>::from_be_bytes(buf),
        }
    }};
}

macro_rules! each_column {
    ($col:expr, $v:ident => $body:expr) => {
        match $col {
            ScalarColumn::Int8($v) => $body,
            ScalarColumn::UInt8($v) => $body,
            ScalarColumn::Int16($v) => $body,
            ScalarColumn::UInt16($v) => $body,
            ScalarColumn::Int32($v) => $body,
            ScalarColumn::UInt32($v) => $body,
            ScalarColumn::Int64($v) => $body,
            ScalarColumn::UInt64($v) => $body,
            ScalarColumn::Float32($v) => $body,
            ScalarColumn::Float64($v) => $body,
        }
    };
}

/// Values of one scalar property, stored with exactly the declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarColumn {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl ScalarColumn {
    pub fn with_capacity(ty: ScalarType, capacity: usize) -> Self {
        match ty {
            ScalarType::Int8 => ScalarColumn::Int8(Vec::with_capacity(capacity)),
            ScalarType::UInt8 => ScalarColumn::UInt8(Vec::with_capacity(capacity)),
            ScalarType::Int16 => ScalarColumn::Int16(Vec::with_capacity(capacity)),
            ScalarType::UInt16 => ScalarColumn::UInt16(Vec::with_capacity(capacity)),
            ScalarType::Int32 => ScalarColumn::Int32(Vec::with_capacity(capacity)),
            ScalarType::UInt32 => ScalarColumn::UInt32(Vec::with_capacity(capacity)),
            ScalarType::Int64 => ScalarColumn::Int64(Vec::with_capacity(capacity)),
            ScalarType::UInt64 => ScalarColumn::UInt64(Vec::with_capacity(capacity)),
            ScalarType::Float32 => ScalarColumn::Float32(Vec::with_capacity(capacity)),
            ScalarType::Float64 => ScalarColumn::Float64(Vec::with_capacity(capacity)),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarColumn::Int8(_) => ScalarType::Int8,
            ScalarColumn::UInt8(_) => ScalarType::UInt8,
            ScalarColumn::Int16(_) => ScalarType::Int16,
            ScalarColumn::UInt16(_) => ScalarType::UInt16,
            ScalarColumn::Int32(_) => ScalarType::Int32,
            ScalarColumn::UInt32(_) => ScalarType::UInt32,
            ScalarColumn::Int64(_) => ScalarType::Int64,
            ScalarColumn::UInt64(_) => ScalarType::UInt64,
            ScalarColumn::Float32(_) => ScalarType::Float32,
            ScalarColumn::Float64(_) => ScalarType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        each_column!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            ScalarColumn::Float32(v) => Some(v),
            _ => None,
        }
    }

    /// Lossy conversion used when a consumer works in `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        each_column!(self, v => v.iter().map(|&x| x as f32).collect())
    }

    /// `bytes` must be exactly `self.scalar_type().size()` long.
    pub(crate) fn push_bytes(&mut self, bytes: &[u8], order: ByteOrder) {
        match self {
            ScalarColumn::Int8(v) => v.push(decode_as!(i8, bytes, order)),
            ScalarColumn::UInt8(v) => v.push(decode_as!(u8, bytes, order)),
            ScalarColumn::Int16(v) => v.push(decode_as!(i16, bytes, order)),
            ScalarColumn::UInt16(v) => v.push(decode_as!(u16, bytes, order)),
            ScalarColumn::Int32(v) => v.push(decode_as!(i32, bytes, order)),
            ScalarColumn::UInt32(v) => v.push(decode_as!(u32, bytes, order)),
            ScalarColumn::Int64(v) => v.push(decode_as!(i64, bytes, order)),
            ScalarColumn::UInt64(v) => v.push(decode_as!(u64, bytes, order)),
            ScalarColumn::Float32(v) => v.push(decode_as!(f32, bytes, order)),
            ScalarColumn::Float64(v) => v.push(decode_as!(f64, bytes, order)),
        }
    }

    pub(crate) fn push_token(&mut self, token: &str) -> Result<(), String> {
        each_column!(self, v => {
            let value = token.parse().map_err(|e| format!("'{}': {}", token, e))?;
            v.push(value);
            Ok(())
        })
    }
}

/// Reads a list length prefix. Returns `None` for negative counts.
pub(crate) fn decode_count(ty: ScalarType, bytes: &[u8], order: ByteOrder) -> Option<usize> {
    let value: i128 = match ty {
        ScalarType::Int8 => decode_as!(i8, bytes, order) as i128,
        ScalarType::UInt8 => decode_as!(u8, bytes, order) as i128,
        ScalarType::Int16 => decode_as!(i16, bytes, order) as i128,
        ScalarType::UInt16 => decode_as!(u16, bytes, order) as i128,
        ScalarType::Int32 => decode_as!(i32, bytes, order) as i128,
        ScalarType::UInt32 => decode_as!(u32, bytes, order) as i128,
        ScalarType::Int64 => decode_as!(i64, bytes, order) as i128,
        ScalarType::UInt64 => decode_as!(u64, bytes, order) as i128,
        ScalarType::Float32 | ScalarType::Float64 => return None,
    };
    usize::try_from(value).ok()
}

/// ASCII counterpart of [`decode_count`]: the token must fit the declared count type.
pub(crate) fn parse_count(ty: ScalarType, token: &str) -> Option<usize> {
    let value: i128 = match ty {
        ScalarType::Int8 => token.parse::<i8>().ok()?.into(),
        ScalarType::UInt8 => token.parse::<u8>().ok()?.into(),
        ScalarType::Int16 => token.parse::<i16>().ok()?.into(),
        ScalarType::UInt16 => token.parse::<u16>().ok()?.into(),
        ScalarType::Int32 => token.parse::<i32>().ok()?.into(),
        ScalarType::UInt32 => token.parse::<u32>().ok()?.into(),
        ScalarType::Int64 => token.parse::<i64>().ok()?.into(),
        ScalarType::UInt64 => token.parse::<u64>().ok()?.into(),
        ScalarType::Float32 | ScalarType::Float64 => return None,
    };
    usize::try_from(value).ok()
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyData {
    Scalar(ScalarColumn),
    /// One sub-sequence per instance, each typed as the list's item type.
    List {
        count_type: ScalarType,
        item_type: ScalarType,
        rows: Vec<ScalarColumn>,
    },
}

impl PropertyData {
    pub(crate) fn for_decl(kind: PropertyKind, capacity: usize) -> Self {
        match kind {
            PropertyKind::Scalar(ty) => {
                PropertyData::Scalar(ScalarColumn::with_capacity(ty, capacity))
            }
            PropertyKind::List { count, item } => PropertyData::List {
                count_type: count,
                item_type: item,
                rows: Vec::with_capacity(capacity),
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PropertyData::Scalar(col) => col.len(),
            PropertyData::List { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded values of one element group, keyed by property name.
#[derive(Debug, Clone)]
pub struct ParsedElement {
    pub name: String,
    count: usize,
    properties: Vec<(String, PropertyData)>,
    index: HashMap<String, usize>,
}

impl ParsedElement {
    pub(crate) fn new(name: String, count: usize, properties: Vec<(String, PropertyData)>) -> Self {
        let mut index = HashMap::with_capacity(properties.len());
        for (i, (prop, _)) in properties.iter().enumerate() {
            index.insert(prop.clone(), i);
        }
        ParsedElement {
            name,
            count,
            properties,
            index,
        }
    }

    /// Number of instances, equal to the declared count.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, property: &str) -> Option<&PropertyData> {
        self.index.get(property).map(|&i| &self.properties[i].1)
    }

    pub fn scalar(&self, property: &str) -> Option<&ScalarColumn> {
        match self.get(property)? {
            PropertyData::Scalar(col) => Some(col),
            PropertyData::List { .. } => None,
        }
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyData)> {
        self.properties.iter().map(|(name, data)| (name.as_str(), data))
    }
}

/// Render attributes of one splat, shared by both faces of its quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SplatRecord {
    pub center: [f32; 3],
    pub color: [f32; 4],
    /// Upper triangle of the 3D covariance, row-major:
    /// (0,0) (0,1) (0,2) (1,1) (1,2) (2,2).
    pub vrk: [f32; 6],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    pub point_element: String,
    pub default_log_opacity: f32,
    pub quad_half_extent: f32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            point_element: POINT_ELEMENT.to_string(),
            default_log_opacity: DEFAULT_LOG_OPACITY,
            quad_half_extent: DEFAULT_QUAD_HALF_EXTENT,
        }
    }
}

impl ImportOptions {
    pub fn with_point_element(mut self, name: impl Into<String>) -> Self {
        self.point_element = name.into();
        self
    }

    pub fn with_default_log_opacity(mut self, log_opacity: f32) -> Self {
        self.default_log_opacity = log_opacity;
        self
    }

    pub fn with_quad_half_extent(mut self, half_extent: f32) -> Self {
        self.quad_half_extent = half_extent;
        self
    }
}
