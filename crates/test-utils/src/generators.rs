//! Test data generators for synthetic elevation tiles.
//!
//! These generators create predictable, verifiable patterns that can be
//! used across the test suite.

/// Creates a grid with predictable heights.
///
/// Each cell value is `col * 10 + row`, so a value identifies its position.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
///
/// # Returns
///
/// A `Vec<f32>` in row-major order (row 0 first, then row 1, etc.)
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 10.0);  // col=1, row=0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 10 + row) as f32);
        }
    }
    data
}

/// Creates terrain-like heights from below sea level up to a summit.
///
/// Values range from about -400 m in the south-west corner to about 8800 m
/// in the north-east corner with a ripple on top.
pub fn create_terrain_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x = col as f32 / width.max(1) as f32;
            let y = 1.0 - row as f32 / height.max(1) as f32;
            let ripple = (x * 12.0).sin() * (y * 9.0).cos() * 150.0;
            data.push(-400.0 + (x + y) * 4600.0 + ripple);
        }
    }
    data
}

/// Creates signed 16-bit samples spanning the full `i16` range.
pub fn create_short_ramp(width: usize, height: usize) -> Vec<i16> {
    let count = (width * height).max(1);
    (0..width * height)
        .map(|i| {
            let t = i as f64 / (count - 1).max(1) as f64;
            (i16::MIN as f64 + t * (i16::MAX as f64 - i16::MIN as f64)).round() as i16
        })
        .collect()
}

/// Replaces every `stride`-th height with `None` to model voids.
pub fn with_voids(values: &[f32], stride: usize) -> Vec<Option<f32>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if stride > 0 && i % stride == 0 {
                None
            } else {
                Some(*v)
            }
        })
        .collect()
}

/// Bytes that start like a PNG file, tagged so distinct tiles differ.
///
/// Only the signature is valid; use it where tiles are stored as opaque
/// blobs.
pub fn fake_png_bytes(tag: u8) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(b"tile");
    bytes.push(tag);
    bytes
}

/// Bytes that start like a JPEG file.
pub fn fake_jpeg_bytes(tag: u8) -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, tag, 0xFF, 0xD9]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(3, 2);
        assert_eq!(grid, vec![0.0, 10.0, 20.0, 1.0, 11.0, 21.0]);
    }

    #[test]
    fn test_short_ramp_covers_range() {
        let ramp = create_short_ramp(16, 16);
        assert_eq!(ramp[0], i16::MIN);
        assert_eq!(ramp[255], i16::MAX);
    }

    #[test]
    fn test_terrain_grid_range() {
        let grid = create_terrain_grid(64, 64);
        let min = grid.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = grid.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(min < 0.0);
        assert!(max > 8000.0);
    }

    #[test]
    fn test_with_voids() {
        let voids = with_voids(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(voids, vec![None, Some(2.0), None, Some(4.0)]);
    }

    #[test]
    fn test_fake_images_are_distinct() {
        assert_ne!(fake_png_bytes(1), fake_png_bytes(2));
        assert_eq!(&fake_jpeg_bytes(0)[..3], &[0xFF, 0xD8, 0xFF]);
    }
}
