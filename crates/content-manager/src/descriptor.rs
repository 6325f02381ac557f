//! Summaries of cached content for listings.

use chrono::{DateTime, Utc};
use elevation_codec::CoverageEncoding;
use geopackage::{Content, DataType};
use serde::Serialize;
use tile_common::{BoundingBox, LevelSet, ServiceType};

/// One cached imagery layer or elevation coverage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerDescriptor {
    /// Content identifier, the table name when none was recorded
    pub name: String,
    pub table_name: String,
    pub data_type: DataType,
    pub bounding_box: Option<BoundingBox>,
    pub last_change: Option<DateTime<Utc>>,
    pub level_count: u32,
    /// Whether missing tiles are fetched from a remote service
    pub has_remote: bool,
    pub service_type: Option<ServiceType>,
}

impl LayerDescriptor {
    pub(crate) fn new(
        content: &Content,
        data_type: DataType,
        level_set: &LevelSet,
        service_type: Option<ServiceType>,
    ) -> Self {
        Self {
            name: content.display_name().to_string(),
            table_name: content.table_name.clone(),
            data_type,
            bounding_box: content.bounding_box(),
            last_change: content.last_change_time(),
            level_count: level_set.num_levels(),
            has_remote: service_type.is_some(),
            service_type,
        }
    }
}

/// An elevation coverage and how its samples are stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageDescriptor {
    #[serde(flatten)]
    pub layer: LayerDescriptor,
    pub encoding: CoverageEncoding,
}
