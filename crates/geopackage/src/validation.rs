//! Compatibility checks between stored content and a requested pyramid.
//!
//! Existing content is reused only when its coordinate system, tile
//! origin, first level delta, tile size and encoding all match what the
//! caller would have created.

use crate::container::{
    fetch_content, fetch_extensions, fetch_first_tile_matrix, fetch_gridded_coverage, fetch_srs,
    fetch_tile_matrix_set, GeoPackage,
};
use crate::model::{
    Content, DataType, Extension, GriddedCoverage, SpatialReferenceSystem, TileMatrix,
    TileMatrixSet,
};
use elevation_codec::CoverageEncoding;
use sqlx::SqliteConnection;
use tile_common::{CacheError, CacheResult, ImageFormat, LevelSet, COMPAT_TOLERANCE};

/// Everything stored about one pyramid that compatibility depends on.
#[derive(Debug, Clone)]
pub struct StoredPyramid {
    pub content: Content,
    pub tile_matrix_set: Option<TileMatrixSet>,
    pub srs: Option<SpatialReferenceSystem>,
    pub first_matrix: Option<TileMatrix>,
    pub extensions: Vec<Extension>,
    pub coverage: Option<GriddedCoverage>,
}

/// What the caller wants to store in a pyramid.
#[derive(Debug, Clone, Copy)]
pub enum ContentRequirement<'a> {
    Tiles(ImageFormat),
    GriddedCoverage(&'a CoverageEncoding),
}

impl ContentRequirement<'_> {
    pub fn data_type(&self) -> DataType {
        match self {
            ContentRequirement::Tiles(_) => DataType::Tiles,
            ContentRequirement::GriddedCoverage(_) => DataType::GriddedCoverage,
        }
    }
}

/// Load the stored pyramid for `table_name`, `None` when there is no
/// content row.
pub(crate) async fn load_stored_pyramid(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> CacheResult<Option<StoredPyramid>> {
    let Some(content) = fetch_content(conn, table_name).await? else {
        return Ok(None);
    };
    let tile_matrix_set = fetch_tile_matrix_set(conn, table_name).await?;
    let srs = match &tile_matrix_set {
        Some(tms) => fetch_srs(conn, tms.srs_id).await?,
        None => None,
    };
    let first_matrix = fetch_first_tile_matrix(conn, table_name).await?;
    let extensions = fetch_extensions(conn, table_name).await?;
    let coverage = fetch_gridded_coverage(conn, table_name).await?;

    Ok(Some(StoredPyramid {
        content,
        tile_matrix_set,
        srs,
        first_matrix,
        extensions,
        coverage,
    }))
}

/// Check a stored pyramid against a requested level set.
///
/// Returns a description of the first mismatch found.
pub fn check_compatibility(
    stored: &StoredPyramid,
    level_set: &LevelSet,
    requirement: ContentRequirement<'_>,
) -> Result<(), String> {
    let expected_type = requirement.data_type();
    if stored.content.kind() != Some(expected_type) {
        return Err(format!(
            "data type is '{}', expected '{}'",
            stored.content.data_type,
            expected_type.as_str()
        ));
    }

    let tms = stored
        .tile_matrix_set
        .as_ref()
        .ok_or_else(|| "no tile matrix set".to_string())?;

    match &stored.srs {
        Some(srs)
            if srs.organization.eq_ignore_ascii_case("EPSG")
                && srs.organization_coordsys_id == 4326 => {}
        Some(srs) => {
            return Err(format!(
                "coordinate system is {}:{}, expected EPSG:4326",
                srs.organization, srs.organization_coordsys_id
            ))
        }
        None => return Err(format!("unknown srs_id {}", tms.srs_id)),
    }

    let origin = tms.bounding_box();
    if !origin.approx_eq(&level_set.tile_origin, COMPAT_TOLERANCE) {
        return Err(format!(
            "tile origin is {}, expected {}",
            origin, level_set.tile_origin
        ));
    }

    let first = stored
        .first_matrix
        .as_ref()
        .ok_or_else(|| "no zoom level 0".to_string())?;

    if first.tile_width != level_set.tile_width as i64
        || first.tile_height != level_set.tile_height as i64
    {
        return Err(format!(
            "tile size is {}x{}, expected {}x{}",
            first.tile_width, first.tile_height, level_set.tile_width, level_set.tile_height
        ));
    }

    let delta_lat = first.pixel_y_size * first.tile_height as f64;
    let delta_lon = first.pixel_x_size * first.tile_width as f64;
    if (delta_lat - level_set.first_level_delta.lat).abs() > COMPAT_TOLERANCE
        || (delta_lon - level_set.first_level_delta.lon).abs() > COMPAT_TOLERANCE
    {
        return Err(format!(
            "first level delta is {}x{} degrees, expected {}x{}",
            delta_lat,
            delta_lon,
            level_set.first_level_delta.lat,
            level_set.first_level_delta.lon
        ));
    }

    match requirement {
        ContentRequirement::Tiles(format) => {
            if let Some(extension) = format.required_extension() {
                let present = stored
                    .extensions
                    .iter()
                    .any(|e| e.extension_name == extension);
                if !present {
                    return Err(format!("missing {} extension", extension));
                }
            }
        }
        ContentRequirement::GriddedCoverage(encoding) => {
            let coverage = stored
                .coverage
                .as_ref()
                .ok_or_else(|| "no gridded coverage metadata".to_string())?;
            if coverage.datatype() != Some(encoding.datatype) {
                return Err(format!(
                    "datatype is '{}', expected '{}'",
                    coverage.datatype, encoding.datatype
                ));
            }
            let stored_encoding = coverage
                .encoding()
                .ok_or_else(|| format!("unknown datatype '{}'", coverage.datatype))?;
            let requested_null = encoding
                .data_null
                .or(CoverageEncoding::for_datatype(encoding.datatype).data_null);
            if !same_value(stored_encoding.data_scale, encoding.data_scale)
                || !same_value(stored_encoding.data_offset, encoding.data_offset)
            {
                return Err(format!(
                    "scale and offset are {} and {}, expected {} and {}",
                    stored_encoding.data_scale,
                    stored_encoding.data_offset,
                    encoding.data_scale,
                    encoding.data_offset
                ));
            }
            let nulls_match = match (stored_encoding.data_null, requested_null) {
                (Some(a), Some(b)) => same_value(a, b),
                (None, None) => true,
                _ => false,
            };
            if !nulls_match {
                return Err(format!(
                    "null value is {:?}, expected {:?}",
                    stored_encoding.data_null, requested_null
                ));
            }
        }
    }

    Ok(())
}

fn same_value(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
}

impl GeoPackage {
    /// Check that existing tiles content can be reused for `level_set`.
    ///
    /// Fails with `NotFound` when there is no such content and with
    /// `Incompatible` on any mismatch.
    pub async fn validate_tiles_content(
        &self,
        table_name: &str,
        level_set: &LevelSet,
        format: ImageFormat,
    ) -> CacheResult<()> {
        self.validate_content(table_name, level_set, ContentRequirement::Tiles(format))
            .await
    }

    /// Check that an existing gridded coverage can be reused.
    pub async fn validate_gridded_coverage_content(
        &self,
        table_name: &str,
        level_set: &LevelSet,
        encoding: &CoverageEncoding,
    ) -> CacheResult<()> {
        self.validate_content(
            table_name,
            level_set,
            ContentRequirement::GriddedCoverage(encoding),
        )
        .await
    }

    async fn validate_content(
        &self,
        table_name: &str,
        level_set: &LevelSet,
        requirement: ContentRequirement<'_>,
    ) -> CacheResult<()> {
        let mut conn = self.read_connection().await?;
        let stored = load_stored_pyramid(&mut conn, table_name)
            .await?
            .ok_or_else(|| CacheError::NotFound(format!("content '{}'", table_name)))?;
        check_compatibility(&stored, level_set, requirement)
            .map_err(|message| CacheError::incompatible(table_name, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use elevation_codec::CoverageDatatype;
    use tile_common::BoundingBox;

    fn level_set() -> LevelSet {
        LevelSet::from_tile_pyramid(BoundingBox::global(), 2, 1, 5, 256, 256).unwrap()
    }

    fn stored(data_type: DataType) -> StoredPyramid {
        let set = level_set();
        let first = set.first_level();
        StoredPyramid {
            content: Content {
                table_name: "t".into(),
                data_type: data_type.as_str().into(),
                identifier: Some("t".into()),
                description: None,
                last_change: "2026-01-01T00:00:00.000Z".into(),
                min_x: Some(-180.0),
                min_y: Some(-90.0),
                max_x: Some(180.0),
                max_y: Some(90.0),
                srs_id: Some(schema::WGS84_SRS_ID),
            },
            tile_matrix_set: Some(TileMatrixSet {
                table_name: "t".into(),
                srs_id: schema::WGS84_SRS_ID,
                min_x: -180.0,
                min_y: -90.0,
                max_x: 180.0,
                max_y: 90.0,
            }),
            srs: Some(SpatialReferenceSystem {
                srs_name: "WGS 84 geodetic".into(),
                srs_id: 4326,
                organization: "EPSG".into(),
                organization_coordsys_id: 4326,
                definition: "undefined".into(),
                description: None,
            }),
            first_matrix: Some(TileMatrix {
                table_name: "t".into(),
                zoom_level: 0,
                matrix_width: 2,
                matrix_height: 1,
                tile_width: 256,
                tile_height: 256,
                pixel_x_size: first.pixel_x_size(),
                pixel_y_size: first.pixel_y_size(),
            }),
            extensions: Vec::new(),
            coverage: Some(GriddedCoverage {
                id: 1,
                tile_matrix_set_name: "t".into(),
                datatype: "integer".into(),
                scale: 1.0,
                offset: 0.0,
                precision: None,
                data_null: None,
            }),
        }
    }

    #[test]
    fn test_matching_tiles_accepted() {
        let stored = stored(DataType::Tiles);
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Png)).is_ok());
    }

    #[test]
    fn test_origin_tolerance() {
        let mut stored = stored(DataType::Tiles);
        let tms = stored.tile_matrix_set.as_mut().unwrap();
        tms.max_x += 5e-7;
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Png)).is_ok());

        let tms = stored.tile_matrix_set.as_mut().unwrap();
        tms.max_x += 1e-3;
        let err = check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Png))
            .unwrap_err();
        assert!(err.contains("tile origin"));
    }

    #[test]
    fn test_tile_size_must_match_exactly() {
        let mut stored = stored(DataType::Tiles);
        stored.first_matrix.as_mut().unwrap().tile_width = 512;
        let err = check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Png))
            .unwrap_err();
        assert!(err.contains("tile size"));
    }

    #[test]
    fn test_wrong_srs_rejected() {
        let mut stored = stored(DataType::Tiles);
        let srs = stored.srs.as_mut().unwrap();
        srs.organization_coordsys_id = 3857;
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Png)).is_err());
    }

    #[test]
    fn test_webp_requires_extension() {
        let mut stored = stored(DataType::Tiles);
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Webp)).is_err());
        stored.extensions.push(Extension {
            table_name: Some("t".into()),
            column_name: Some("tile_data".into()),
            extension_name: "gpkg_webp".into(),
            definition: String::new(),
            scope: "read-write".into(),
        });
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Webp)).is_ok());
    }

    #[test]
    fn test_coverage_datatype_checked() {
        let stored = stored(DataType::GriddedCoverage);
        let integer = CoverageEncoding::integer();
        let float = CoverageEncoding::for_datatype(CoverageDatatype::Float);
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::GriddedCoverage(&integer)).is_ok());
        let err = check_compatibility(&stored, &level_set(), ContentRequirement::GriddedCoverage(&float))
            .unwrap_err();
        assert!(err.contains("datatype"));
    }

    #[test]
    fn test_coverage_scale_offset_and_null_checked() {
        let stored = stored(DataType::GriddedCoverage);

        let scaled = CoverageEncoding {
            data_scale: 0.1,
            ..CoverageEncoding::integer()
        };
        let err = check_compatibility(&stored, &level_set(), ContentRequirement::GriddedCoverage(&scaled))
            .unwrap_err();
        assert!(err.contains("scale"));

        let offset = CoverageEncoding {
            data_offset: -500.0,
            ..CoverageEncoding::integer()
        };
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::GriddedCoverage(&offset)).is_err());

        let other_null = CoverageEncoding {
            data_null: Some(-9999.0),
            ..CoverageEncoding::integer()
        };
        let err = check_compatibility(&stored, &level_set(), ContentRequirement::GriddedCoverage(&other_null))
            .unwrap_err();
        assert!(err.contains("null"));

        let default_null = CoverageEncoding {
            data_null: None,
            ..CoverageEncoding::integer()
        };
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::GriddedCoverage(&default_null)).is_ok());
    }

    #[test]
    fn test_data_type_mismatch() {
        let stored = stored(DataType::GriddedCoverage);
        assert!(check_compatibility(&stored, &level_set(), ContentRequirement::Tiles(ImageFormat::Png)).is_err());
    }
}
