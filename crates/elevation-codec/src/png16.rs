//! 16-bit grayscale PNG for integer elevation tiles.
//!
//! Samples are signed 16-bit values stored by bit pattern in the PNG's
//! unsigned 16-bit channel, so the full `i16` range survives a round trip.
//! Encoding writes the PNG directly; decoding goes through the `image` crate.

use crate::error::{CodecError, CodecResult};
use std::io::Write;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Encode signed samples as a single-channel 16-bit PNG.
///
/// # Arguments
/// * `samples` - Row-major samples, top row first
/// * `width` - Raster width in pixels
/// * `height` - Raster height in pixels
pub fn encode(samples: &[i16], width: u32, height: u32) -> CodecResult<Vec<u8>> {
    if width == 0 || height == 0 || samples.len() != (width as usize) * (height as usize) {
        return Err(CodecError::SizeMismatch {
            width,
            height,
            actual: samples.len(),
        });
    }

    let mut png = Vec::new();
    png.extend_from_slice(&PNG_SIGNATURE);

    // IHDR chunk
    let mut ihdr_data = Vec::with_capacity(13);
    ihdr_data.extend_from_slice(&width.to_be_bytes());
    ihdr_data.extend_from_slice(&height.to_be_bytes());
    ihdr_data.push(16); // bit depth
    ihdr_data.push(0); // color type 0 = grayscale
    ihdr_data.push(0); // compression method
    ihdr_data.push(0); // filter method
    ihdr_data.push(0); // interlace method
    write_chunk(&mut png, b"IHDR", &ihdr_data);

    let idat_data = deflate_idat_gray16(samples, width as usize, height as usize)
        .map_err(|e| CodecError::PngEncode(format!("IDAT compression failed: {}", e)))?;
    write_chunk(&mut png, b"IDAT", &idat_data);

    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Decode a 16-bit grayscale PNG into signed samples.
///
/// Returns `(width, height, samples)`. Any other pixel layout is rejected
/// because its values would not be elevation samples.
pub fn decode(blob: &[u8]) -> CodecResult<(u32, u32, Vec<i16>)> {
    let decoded = image::load_from_memory_with_format(blob, image::ImageFormat::Png)
        .map_err(|e| CodecError::PngDecode(e.to_string()))?;

    match decoded {
        image::DynamicImage::ImageLuma16(buffer) => {
            let (width, height) = buffer.dimensions();
            let samples = buffer.into_raw().into_iter().map(|v| v as i16).collect();
            Ok((width, height, samples))
        }
        other => Err(CodecError::UnsupportedPixelType(format!(
            "expected 16-bit grayscale PNG, found {:?}",
            other.color()
        ))),
    }
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Deflate 16-bit samples for the IDAT chunk, big-endian per PNG.
fn deflate_idat_gray16(
    samples: &[i16],
    width: usize,
    height: usize,
) -> Result<Vec<u8>, std::io::Error> {
    // Each scanline is a filter byte followed by two bytes per sample.
    let mut uncompressed = Vec::with_capacity(height * (1 + width * 2));
    for row in samples.chunks_exact(width) {
        uncompressed.push(0); // filter type: none
        for &sample in row {
            uncompressed.extend_from_slice(&(sample as u16).to_be_bytes());
        }
    }

    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&uncompressed)?;
    encoder.finish()
}
