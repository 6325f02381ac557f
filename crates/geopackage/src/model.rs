//! Row types for the container's metadata tables.

use chrono::{DateTime, SecondsFormat, Utc};
use elevation_codec::{CoverageDatatype, CoverageEncoding, GriddedStats, TileScale};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tile_common::{BoundingBox, ServiceType, WebServiceBinding};

/// Kind of content a `gpkg_contents` row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Tiles,
    GriddedCoverage,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Tiles => "tiles",
            DataType::GriddedCoverage => "2d-gridded-coverage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tiles" => Some(DataType::Tiles),
            "2d-gridded-coverage" => Some(DataType::GriddedCoverage),
            _ => None,
        }
    }
}

/// Current time in the container's timestamp format.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SpatialReferenceSystem {
    pub srs_name: String,
    pub srs_id: i64,
    pub organization: String,
    pub organization_coordsys_id: i64,
    pub definition: String,
    pub description: Option<String>,
}

/// A `gpkg_contents` row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Content {
    pub table_name: String,
    pub data_type: String,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub last_change: String,
    pub min_x: Option<f64>,
    pub min_y: Option<f64>,
    pub max_x: Option<f64>,
    pub max_y: Option<f64>,
    pub srs_id: Option<i64>,
}

impl Content {
    pub fn kind(&self) -> Option<DataType> {
        DataType::parse(&self.data_type)
    }

    /// Identifier when set, table name otherwise.
    pub fn display_name(&self) -> &str {
        self.identifier.as_deref().unwrap_or(&self.table_name)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        Some(BoundingBox::new(
            self.min_x?,
            self.min_y?,
            self.max_x?,
            self.max_y?,
        ))
    }

    /// Parsed `last_change`, `None` if the stored text is not RFC 3339.
    pub fn last_change_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_change)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A `gpkg_tile_matrix_set` row. Its bounds are the pyramid's tile origin.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TileMatrixSet {
    pub table_name: String,
    pub srs_id: i64,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl TileMatrixSet {
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// A `gpkg_tile_matrix` row describing one zoom level.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TileMatrix {
    pub table_name: String,
    pub zoom_level: i64,
    pub matrix_width: i64,
    pub matrix_height: i64,
    pub tile_width: i64,
    pub tile_height: i64,
    pub pixel_x_size: f64,
    pub pixel_y_size: f64,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Extension {
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub extension_name: String,
    pub definition: String,
    pub scope: String,
}

/// A `gpkg_2d_gridded_coverage_ancillary` row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct GriddedCoverage {
    pub id: i64,
    pub tile_matrix_set_name: String,
    pub datatype: String,
    pub scale: f64,
    pub offset: f64,
    pub precision: Option<f64>,
    pub data_null: Option<f64>,
}

impl GriddedCoverage {
    pub fn datatype(&self) -> Option<CoverageDatatype> {
        self.datatype.parse().ok()
    }

    /// Coverage-wide encoding, `None` for an unknown datatype.
    pub fn encoding(&self) -> Option<CoverageEncoding> {
        let datatype = self.datatype()?;
        let defaults = CoverageEncoding::for_datatype(datatype);
        Some(CoverageEncoding {
            datatype,
            data_scale: self.scale,
            data_offset: self.offset,
            data_null: self.data_null.or(defaults.data_null),
        })
    }
}

/// A `gpkg_2d_gridded_tile_ancillary` row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct GriddedTile {
    pub id: i64,
    pub tpudt_name: String,
    pub tpudt_id: i64,
    pub scale: f64,
    pub offset: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

impl GriddedTile {
    pub fn tile_scale(&self) -> TileScale {
        TileScale {
            scale: self.scale,
            offset: self.offset,
        }
    }
}

/// Values written to `gpkg_2d_gridded_tile_ancillary` for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GriddedTileValues {
    pub tile_scale: TileScale,
    pub stats: Option<GriddedStats>,
}

/// A `gpkg_web_service` row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WebService {
    pub table_name: String,
    pub service_type: String,
    pub service_address: String,
    pub service_metadata: Option<String>,
    pub layer_name: Option<String>,
    pub output_format: Option<String>,
    pub is_transparent: bool,
}

impl WebService {
    /// The binding this row records, `None` for an unknown service type.
    pub fn binding(&self) -> Option<WebServiceBinding> {
        let service_type: ServiceType = self.service_type.parse().ok()?;
        Some(WebServiceBinding {
            service_type,
            service_address: self.service_address.clone(),
            service_metadata: self.service_metadata.clone(),
            layer_name: self.layer_name.clone(),
            output_format: self.output_format.clone(),
            is_transparent: self.is_transparent,
        })
    }
}

/// A row of a per-content tile table.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TileUserData {
    pub id: i64,
    pub zoom_level: i64,
    pub tile_column: i64,
    pub tile_row: i64,
    pub tile_data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> Content {
        Content {
            table_name: "bmng".into(),
            data_type: "tiles".into(),
            identifier: None,
            description: None,
            last_change: "2026-03-01T12:00:00.000Z".into(),
            min_x: Some(-180.0),
            min_y: Some(-90.0),
            max_x: Some(180.0),
            max_y: Some(90.0),
            srs_id: Some(4326),
        }
    }

    #[test]
    fn test_content_accessors() {
        let c = content();
        assert_eq!(c.kind(), Some(DataType::Tiles));
        assert_eq!(c.display_name(), "bmng");
        assert_eq!(c.bounding_box(), Some(BoundingBox::global()));
        assert!(c.last_change_time().is_some());
    }

    #[test]
    fn test_timestamp_now_parses() {
        let mut c = content();
        c.last_change = timestamp_now();
        assert!(c.last_change_time().is_some());
        assert!(c.last_change.ends_with('Z'));
    }

    #[test]
    fn test_coverage_encoding_defaults_null() {
        let coverage = GriddedCoverage {
            id: 1,
            tile_matrix_set_name: "srtm".into(),
            datatype: "float".into(),
            scale: 1.0,
            offset: 0.0,
            precision: None,
            data_null: None,
        };
        let encoding = coverage.encoding().unwrap();
        assert_eq!(encoding.data_null, Some(f32::MAX as f64));
    }
}
