use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplatError {
    #[error("Malformed PLY file: {0}")]
    Format(String),

    #[error(
        "PLY payload is truncated: element '{element}', property '{property}', \
         instance {instance} needs data at byte {offset}"
    )]
    TruncatedPayload {
        element: String,
        property: String,
        instance: usize,
        offset: usize,
    },

    #[error("Element '{0}' is not declared in the PLY header")]
    MissingElement(String),

    #[error("Element '{element}' is missing required property '{property}'")]
    MissingProperty { element: String, property: String },

    #[error("Property '{property}' of element '{element}' is a list, expected a scalar")]
    NotScalar { element: String, property: String },

    #[error("Point {point} has a degenerate rotation quaternion: {reason}")]
    DegenerateQuaternion { point: usize, reason: String },

    #[error("{0} points do not fit into 32-bit quad mesh indices")]
    TooManyPoints(usize),

    #[error("An I/O error occurred: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of a [`SplatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes do not form a valid PLY file, or declare more points than
    /// the mesh can index.
    Format,
    /// The file is valid PLY but lacks the splat fields.
    Schema,
    /// A rotation quaternion cannot be normalized.
    Numeric,
    Io,
}

impl SplatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplatError::Format(_)
            | SplatError::TruncatedPayload { .. }
            | SplatError::TooManyPoints(_) => ErrorKind::Format,
            SplatError::MissingElement(_)
            | SplatError::MissingProperty { .. }
            | SplatError::NotScalar { .. } => ErrorKind::Schema,
            SplatError::DegenerateQuaternion { .. } => ErrorKind::Numeric,
            SplatError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SplatError::Format(msg.into())
    }
}
