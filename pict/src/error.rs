use std::{error, fmt};
use tensor::udim;

/// A malformed weight container.
#[derive(Debug)]
pub enum FormatError {
    /// A length prefix or a segment runs past the end of the buffer.
    Truncated {
        segment: usize,
        needed: usize,
        available: usize,
    },
    /// The buffer ended before all three segments were read.
    MissingSegment { found: usize },
    /// The shape manifest is not UTF-8 JSON of the expected form.
    Manifest(serde_json::Error),
    /// The dictionary segment is not a whole number of `f32`.
    Dictionary { bytes: usize },
    /// A dictionary built for encoding must hold 1 to 256 values.
    DictionarySize { len: usize },
    /// A code indexes past the end of the dictionary.
    CodeOutOfRange { offset: usize, code: u8, len: usize },
    /// The code stream ran out before the manifest did.
    Exhausted {
        name: String,
        needed: usize,
        available: usize,
    },
    InvalidShape { name: String, shape: Vec<udim> },
    DuplicateName(String),
    /// A segment does not fit a 32-bit length prefix.
    Oversized { segment: usize, len: usize },
}

impl error::Error for FormatError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Manifest(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Truncated {
                segment,
                needed,
                available,
            } => write!(
                f,
                "segment {segment} needs {needed} bytes but only {available} remain"
            ),
            Self::MissingSegment { found } => {
                write!(f, "container holds {found} segments, expected 3")
            }
            Self::Manifest(e) => write!(f, "invalid shape manifest: {e}"),
            Self::Dictionary { bytes } => {
                write!(f, "dictionary of {bytes} bytes is not a sequence of f32")
            }
            Self::DictionarySize { len } => {
                write!(f, "dictionary must hold 1 to 256 values, got {len}")
            }
            Self::CodeOutOfRange { offset, code, len } => write!(
                f,
                "code {code} at offset {offset} is outside a dictionary of {len} values"
            ),
            Self::Exhausted {
                name,
                needed,
                available,
            } => write!(
                f,
                "\"{name}\" needs {needed} values but only {available} remain"
            ),
            Self::InvalidShape { name, shape } => write!(f, "\"{name}\" has invalid shape {shape:?}"),
            Self::DuplicateName(name) => write!(f, "\"{name}\" appears twice in the manifest"),
            Self::Oversized { segment, len } => {
                write!(f, "segment {segment} of {len} bytes exceeds the u32 length prefix")
            }
        }
    }
}
