//! Elevation tile codec.
//!
//! Integer coverages are stored as 16-bit grayscale PNG and float coverages
//! as 32-bit float TIFF. [`decode`] recognises either by its leading bytes.

pub mod error;
pub mod png16;
pub mod raster;
pub mod tiff32;

pub use error::{CodecError, CodecResult};
pub use raster::{
    compute_stats, CoverageDatatype, CoverageEncoding, ElevationRaster, GriddedStats,
    SampleBuffer, TileScale,
};

use tile_common::ImageFormat;

/// Encode raw samples for a coverage of `datatype`.
///
/// The buffer kind must match the datatype: `Short` for integer coverages,
/// `Float` for float coverages.
pub fn encode(
    samples: &SampleBuffer,
    width: u32,
    height: u32,
    datatype: CoverageDatatype,
) -> CodecResult<Vec<u8>> {
    ElevationRaster::check_datatype(samples, datatype)?;
    match samples {
        SampleBuffer::Short(v) => png16::encode(v, width, height),
        SampleBuffer::Float(v) => tiff32::encode(v, width, height),
    }
}

/// Decode a tile blob into its raw samples, `(width, height, samples)`.
pub fn decode_samples(blob: &[u8]) -> CodecResult<(u32, u32, SampleBuffer)> {
    match ImageFormat::from_magic(blob) {
        Some(ImageFormat::Png) => {
            let (width, height, samples) = png16::decode(blob)?;
            Ok((width, height, SampleBuffer::Short(samples)))
        }
        Some(ImageFormat::Tiff) => tiff32::decode(blob),
        _ => Err(CodecError::UnknownFormat(
            blob.iter().take(8).copied().collect(),
        )),
    }
}

/// Decode a tile blob and attach the transform that turns samples into
/// heights.
///
/// # Arguments
/// * `blob` - PNG16 or TIFF32 tile bytes
/// * `tile_scale` - Per-tile scale and offset
/// * `encoding` - Coverage-wide scale, offset and null sentinel
pub fn decode(
    blob: &[u8],
    tile_scale: TileScale,
    encoding: &CoverageEncoding,
) -> CodecResult<ElevationRaster> {
    let (width, height, samples) = decode_samples(blob)?;
    tracing::trace!(
        width,
        height,
        datatype = %samples.datatype(),
        "Decoded elevation tile"
    );
    ElevationRaster::new(width, height, samples, tile_scale, *encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_refuses_mismatched_datatype() {
        let samples = SampleBuffer::Float(vec![1.0; 4]);
        assert!(matches!(
            encode(&samples, 2, 2, CoverageDatatype::Integer),
            Err(CodecError::DatatypeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_detects_format() {
        let png = encode(&SampleBuffer::Short(vec![1, 2, 3, 4]), 2, 2, CoverageDatatype::Integer)
            .unwrap();
        let tiff = encode(
            &SampleBuffer::Float(vec![1.0, 2.0, 3.0, 4.0]),
            2,
            2,
            CoverageDatatype::Float,
        )
        .unwrap();

        let from_png = decode(&png, TileScale::default(), &CoverageEncoding::integer()).unwrap();
        assert_eq!(from_png.samples.datatype(), CoverageDatatype::Integer);

        let from_tiff = decode(&tiff, TileScale::default(), &CoverageEncoding::float()).unwrap();
        assert_eq!(from_tiff.height(1, 1), Some(4.0));
    }

    #[test]
    fn test_decode_unknown_format() {
        let err = decode_samples(b"<ServiceExceptionReport/>").unwrap_err();
        assert!(matches!(err, CodecError::UnknownFormat(_)));
    }
}
