//! 32-bit float TIFF for floating point elevation tiles.

use crate::error::{CodecError, CodecResult};
use crate::raster::SampleBuffer;
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

/// Encode float samples as a single-band 32-bit float TIFF.
pub fn encode(samples: &[f32], width: u32, height: u32) -> CodecResult<Vec<u8>> {
    if width == 0 || height == 0 || samples.len() != (width as usize) * (height as usize) {
        return Err(CodecError::SizeMismatch {
            width,
            height,
            actual: samples.len(),
        });
    }

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder =
            TiffEncoder::new(&mut cursor).map_err(|e| CodecError::TiffEncode(e.to_string()))?;
        encoder
            .write_image::<colortype::Gray32Float>(width, height, samples)
            .map_err(|e| CodecError::TiffEncode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Decode a single-band TIFF.
///
/// 16-bit signed rasters stay integer; every other numeric sample type is
/// widened or narrowed to `f32`.
pub fn decode(blob: &[u8]) -> CodecResult<(u32, u32, SampleBuffer)> {
    let mut decoder =
        Decoder::new(Cursor::new(blob)).map_err(|e| CodecError::TiffDecode(e.to_string()))?;

    let color = decoder
        .colortype()
        .map_err(|e| CodecError::TiffDecode(e.to_string()))?;
    if !matches!(color, tiff::ColorType::Gray(_)) {
        return Err(CodecError::UnsupportedPixelType(format!(
            "expected single band TIFF, found {:?}",
            color
        )));
    }

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| CodecError::TiffDecode(e.to_string()))?;
    let image = decoder
        .read_image()
        .map_err(|e| CodecError::TiffDecode(e.to_string()))?;

    let samples = match image {
        DecodingResult::F32(v) => SampleBuffer::Float(v),
        DecodingResult::I16(v) => SampleBuffer::Short(v),
        DecodingResult::F64(v) => SampleBuffer::Float(v.into_iter().map(|x| x as f32).collect()),
        DecodingResult::I32(v) => SampleBuffer::Float(v.into_iter().map(|x| x as f32).collect()),
        DecodingResult::U16(v) => SampleBuffer::Float(v.into_iter().map(f32::from).collect()),
        DecodingResult::I8(v) => SampleBuffer::Short(v.into_iter().map(i16::from).collect()),
        DecodingResult::U8(v) => SampleBuffer::Short(v.into_iter().map(i16::from).collect()),
        _ => {
            return Err(CodecError::UnsupportedPixelType(
                "64-bit integer TIFF samples".to_string(),
            ))
        }
    };

    if samples.len() != (width as usize) * (height as usize) {
        return Err(CodecError::SizeMismatch {
            width,
            height,
            actual: samples.len(),
        });
    }

    Ok((width, height, samples))
}
