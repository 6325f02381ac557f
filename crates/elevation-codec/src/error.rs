//! Error types for elevation encoding and decoding.

use thiserror::Error;
use tile_common::CacheError;

/// Errors that can occur while encoding or decoding an elevation tile.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unrecognized tile encoding (leading bytes {0:02x?})")]
    UnknownFormat(Vec<u8>),

    #[error("Unsupported pixel layout: {0}")]
    UnsupportedPixelType(String),

    #[error("Sample count {actual} does not match a {width}x{height} raster")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },

    #[error("Datatype '{datatype}' cannot be encoded from {samples} samples")]
    DatatypeMismatch {
        datatype: &'static str,
        samples: &'static str,
    },

    #[error("PNG encoding failed: {0}")]
    PngEncode(String),

    #[error("PNG decoding failed: {0}")]
    PngDecode(String),

    #[error("TIFF encoding failed: {0}")]
    TiffEncode(String),

    #[error("TIFF decoding failed: {0}")]
    TiffDecode(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

impl From<CodecError> for CacheError {
    fn from(err: CodecError) -> Self {
        CacheError::Codec(err.to_string())
    }
}
