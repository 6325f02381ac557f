//! Round trips through the public codec API with realistic tiles.

use elevation_codec::{
    decode, encode, CoverageDatatype, CoverageEncoding, SampleBuffer, TileScale,
};
use test_utils::{assert_approx_eq, create_short_ramp, create_terrain_grid, with_voids};

// ============================================================================
// Integer coverages
// ============================================================================

#[test]
fn test_integer_tile_is_lossless() {
    let samples = create_short_ramp(256, 256);
    let blob = encode(
        &SampleBuffer::Short(samples.clone()),
        256,
        256,
        CoverageDatatype::Integer,
    )
    .unwrap();

    let raster = decode(&blob, TileScale::default(), &CoverageEncoding::integer()).unwrap();
    assert_eq!((raster.width, raster.height), (256, 256));
    assert_eq!(raster.samples, SampleBuffer::Short(samples));
    // The first sample is the sentinel and reads as no data.
    assert_eq!(raster.height_at(0), None);
    assert_eq!(raster.height_at(256 * 256 - 1), Some(i16::MAX as f32));
}

#[test]
fn test_integer_heights_within_quantisation_step() {
    let encoding = CoverageEncoding {
        datatype: CoverageDatatype::Integer,
        data_scale: 0.5,
        data_offset: 0.0,
        data_null: None,
    };
    let tile = TileScale::default();
    let heights = with_voids(&create_terrain_grid(64, 64), 97);

    let samples = SampleBuffer::from_heights(&heights, tile, &encoding);
    let blob = encode(&samples, 64, 64, CoverageDatatype::Integer).unwrap();
    let raster = decode(&blob, tile, &encoding).unwrap();

    for (expected, actual) in heights.iter().zip(raster.heights()) {
        match (expected, actual) {
            (None, None) => {}
            (Some(e), Some(a)) => assert_approx_eq!(*e, a, 0.25 + 1e-3),
            other => panic!("null mismatch: {:?}", other),
        }
    }
}

// ============================================================================
// Float coverages
// ============================================================================

#[test]
fn test_float_tile_preserves_values_and_voids() {
    let encoding = CoverageEncoding::float();
    let tile = TileScale::default();
    let heights = with_voids(&create_terrain_grid(32, 16), 5);

    let samples = SampleBuffer::from_heights(&heights, tile, &encoding);
    let blob = encode(&samples, 32, 16, CoverageDatatype::Float).unwrap();
    let raster = decode(&blob, tile, &encoding).unwrap();

    assert_eq!(raster.heights(), heights);
    let stats = raster.stats().unwrap();
    assert!(stats.min < stats.mean && stats.mean < stats.max);
}

#[test]
fn test_float_samples_cannot_be_stored_as_integer() {
    let samples = SampleBuffer::Float(create_terrain_grid(4, 4));
    assert!(encode(&samples, 4, 4, CoverageDatatype::Integer).is_err());
}
