//! Decoded elevation rasters and the value transform that applies to them.
//!
//! A stored sample becomes a height through two affine steps: the per-tile
//! `scale`/`offset`, then the coverage-wide `data_scale`/`data_offset`.
//! Samples equal to the null sentinel have no height.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage datatype of a gridded coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoverageDatatype {
    /// 16-bit signed samples in PNG tiles
    Integer,
    /// 32-bit float samples in TIFF tiles
    Float,
}

impl CoverageDatatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageDatatype::Integer => "integer",
            CoverageDatatype::Float => "float",
        }
    }
}

impl fmt::Display for CoverageDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverageDatatype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(CoverageDatatype::Integer),
            "float" => Ok(CoverageDatatype::Float),
            other => Err(format!("unknown coverage datatype '{}'", other)),
        }
    }
}

/// Coverage-wide encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageEncoding {
    pub datatype: CoverageDatatype,
    pub data_scale: f64,
    pub data_offset: f64,
    /// Stored value meaning "no data". Defaults by datatype when absent.
    pub data_null: Option<f64>,
}

impl CoverageEncoding {
    /// Integer coverage with identity transform and `i16::MIN` as null.
    pub fn integer() -> Self {
        Self {
            datatype: CoverageDatatype::Integer,
            data_scale: 1.0,
            data_offset: 0.0,
            data_null: Some(i16::MIN as f64),
        }
    }

    /// Float coverage with identity transform and `f32::MAX` as null.
    pub fn float() -> Self {
        Self {
            datatype: CoverageDatatype::Float,
            data_scale: 1.0,
            data_offset: 0.0,
            data_null: Some(f32::MAX as f64),
        }
    }

    /// Identity encoding for the given datatype.
    pub fn for_datatype(datatype: CoverageDatatype) -> Self {
        match datatype {
            CoverageDatatype::Integer => Self::integer(),
            CoverageDatatype::Float => Self::float(),
        }
    }

    fn short_null(&self) -> i16 {
        match self.data_null {
            Some(v) if self.datatype == CoverageDatatype::Integer => {
                v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
            }
            _ => i16::MIN,
        }
    }

    fn float_null(&self) -> f32 {
        match self.data_null {
            Some(v) if self.datatype == CoverageDatatype::Float => v as f32,
            _ => f32::MAX,
        }
    }
}

/// Per-tile affine adjustment applied before the coverage transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileScale {
    pub scale: f64,
    pub offset: f64,
}

impl Default for TileScale {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

/// Raw samples as stored in a tile blob.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    Short(Vec<i16>),
    Float(Vec<f32>),
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::Short(v) => v.len(),
            SampleBuffer::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Datatype a buffer of this kind is stored as.
    pub fn datatype(&self) -> CoverageDatatype {
        match self {
            SampleBuffer::Short(_) => CoverageDatatype::Integer,
            SampleBuffer::Float(_) => CoverageDatatype::Float,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            SampleBuffer::Short(_) => "16-bit integer",
            SampleBuffer::Float(_) => "32-bit float",
        }
    }

    /// Store heights in the layout `encoding` calls for.
    ///
    /// Missing heights become the null sentinel. Integer values are rounded
    /// and clamped, and a value that would land on the sentinel is moved one
    /// step away from it so real data never reads back as null.
    pub fn from_heights(
        heights: &[Option<f32>],
        tile: TileScale,
        encoding: &CoverageEncoding,
    ) -> Self {
        let to_raw = |h: f32| {
            ((h as f64 - encoding.data_offset) / encoding.data_scale - tile.offset) / tile.scale
        };

        match encoding.datatype {
            CoverageDatatype::Integer => {
                let null = encoding.short_null();
                let samples = heights
                    .iter()
                    .map(|h| match h {
                        None => null,
                        Some(h) => {
                            let raw = to_raw(*h).round().clamp(i16::MIN as f64, i16::MAX as f64)
                                as i16;
                            if raw != null {
                                raw
                            } else if null == i16::MAX {
                                raw - 1
                            } else {
                                raw + 1
                            }
                        }
                    })
                    .collect();
                SampleBuffer::Short(samples)
            }
            CoverageDatatype::Float => {
                let null = encoding.float_null();
                let samples = heights
                    .iter()
                    .map(|h| match h {
                        None => null,
                        Some(h) => to_raw(*h) as f32,
                    })
                    .collect();
                SampleBuffer::Float(samples)
            }
        }
    }
}

/// Summary statistics over the non-null heights of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GriddedStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// A decoded elevation tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationRaster {
    pub width: u32,
    pub height: u32,
    pub samples: SampleBuffer,
    pub tile_scale: TileScale,
    pub encoding: CoverageEncoding,
}

impl ElevationRaster {
    pub fn new(
        width: u32,
        height: u32,
        samples: SampleBuffer,
        tile_scale: TileScale,
        encoding: CoverageEncoding,
    ) -> CodecResult<Self> {
        if samples.len() != (width as usize) * (height as usize) {
            return Err(CodecError::SizeMismatch {
                width,
                height,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
            tile_scale,
            encoding,
        })
    }

    /// Height of the sample at `index` in row-major order.
    pub fn height_at(&self, index: usize) -> Option<f32> {
        let raw = match &self.samples {
            SampleBuffer::Short(v) => {
                let raw = *v.get(index)?;
                if raw == self.encoding.short_null() {
                    return None;
                }
                raw as f64
            }
            SampleBuffer::Float(v) => {
                let raw = *v.get(index)?;
                if raw.is_nan() || raw == self.encoding.float_null() {
                    return None;
                }
                raw as f64
            }
        };

        let value = (raw * self.tile_scale.scale + self.tile_scale.offset)
            * self.encoding.data_scale
            + self.encoding.data_offset;
        Some(value as f32)
    }

    /// Height at column `x`, row `y` counted from the top.
    pub fn height(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.height_at((y as usize) * (self.width as usize) + x as usize)
    }

    /// All heights in row-major order.
    pub fn heights(&self) -> Vec<Option<f32>> {
        (0..self.samples.len()).map(|i| self.height_at(i)).collect()
    }

    /// Statistics over non-null heights, `None` when every sample is null.
    pub fn stats(&self) -> Option<GriddedStats> {
        compute_stats(self.heights().into_iter().flatten())
    }

    /// Encode the stored samples in this raster's datatype.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        crate::encode(&self.samples, self.width, self.height, self.encoding.datatype)
    }

    pub(crate) fn check_datatype(
        samples: &SampleBuffer,
        datatype: CoverageDatatype,
    ) -> CodecResult<()> {
        if samples.datatype() != datatype {
            return Err(CodecError::DatatypeMismatch {
                datatype: datatype.as_str(),
                samples: samples.kind_name(),
            });
        }
        Ok(())
    }
}

/// Population statistics over a stream of heights.
pub fn compute_stats(values: impl IntoIterator<Item = f32>) -> Option<GriddedStats> {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for v in values {
        let v = v as f64;
        count += 1;
        sum += v;
        sum_sq += v * v;
        min = min.min(v);
        max = max.max(v);
    }

    if count == 0 {
        return None;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    Some(GriddedStats {
        min,
        max,
        mean,
        std_dev: variance.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_transform_composes() {
        let encoding = CoverageEncoding {
            datatype: CoverageDatatype::Integer,
            data_scale: 0.5,
            data_offset: 100.0,
            data_null: Some(-32768.0),
        };
        let tile = TileScale {
            scale: 2.0,
            offset: 10.0,
        };
        let raster =
            ElevationRaster::new(2, 1, SampleBuffer::Short(vec![20, -32768]), tile, encoding)
                .unwrap();
        // (20 * 2 + 10) * 0.5 + 100
        assert_eq!(raster.height(0, 0), Some(125.0));
        assert_eq!(raster.height(1, 0), None);
        assert_eq!(raster.height(2, 0), None);
    }

    #[test]
    fn test_float_null_is_max() {
        let raster = ElevationRaster::new(
            3,
            1,
            SampleBuffer::Float(vec![1.5, f32::MAX, f32::NAN]),
            TileScale::default(),
            CoverageEncoding::float(),
        )
        .unwrap();
        assert_eq!(raster.heights(), vec![Some(1.5), None, None]);
    }

    #[test]
    fn test_from_heights_avoids_sentinel() {
        let encoding = CoverageEncoding::integer();
        let buffer = SampleBuffer::from_heights(
            &[Some(-40000.0), None, Some(40000.0), Some(12.4)],
            TileScale::default(),
            &encoding,
        );
        assert_eq!(
            buffer,
            SampleBuffer::Short(vec![i16::MIN + 1, i16::MIN, i16::MAX, 12])
        );
    }

    #[test]
    fn test_from_heights_inverts_transform() {
        let encoding = CoverageEncoding {
            datatype: CoverageDatatype::Integer,
            data_scale: 0.1,
            data_offset: -500.0,
            data_null: None,
        };
        let tile = TileScale::default();
        let heights = [Some(-500.0), Some(0.0), Some(1234.5)];
        let buffer = SampleBuffer::from_heights(&heights, tile, &encoding);
        let raster = ElevationRaster::new(3, 1, buffer, tile, encoding).unwrap();
        for (expected, actual) in heights.iter().zip(raster.heights()) {
            assert!((expected.unwrap() - actual.unwrap()).abs() < 0.051);
        }
    }

    #[test]
    fn test_stats() {
        let stats = compute_stats([1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.mean - 2.5).abs() < 1e-9);
        assert!((stats.std_dev - 1.118_033_988).abs() < 1e-6);
        assert!(compute_stats(std::iter::empty()).is_none());
    }

    #[test]
    fn test_datatype_names() {
        assert_eq!("integer".parse::<CoverageDatatype>(), Ok(CoverageDatatype::Integer));
        assert_eq!(CoverageDatatype::Float.to_string(), "float");
        assert!("int16".parse::<CoverageDatatype>().is_err());
    }
}
