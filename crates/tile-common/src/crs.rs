//! Coordinate Reference System identifiers as they appear in OGC documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CRS codes the cache understands.
///
/// EPSG:4326 and CRS:84 describe the same datum but differ in axis order
/// under WMS 1.3.0, so they are kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 geographic, latitude first
    Epsg4326,
    /// WGS84 geographic, longitude first
    Crs84,
    /// NAD83 geographic
    Epsg4269,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse a CRS identifier from a capabilities document or request.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "urn:ogc:def:crs:EPSG::4326"
    /// - "http://www.opengis.net/def/crs/EPSG/0/4326"
    /// - "CRS:84" and "urn:ogc:def:crs:OGC:1.3:CRS84"
    pub fn from_ogc_string(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        if normalized == "CRS:84"
            || normalized.ends_with(":CRS84")
            || normalized.ends_with("/CRS84")
        {
            return Ok(CrsCode::Crs84);
        }

        let code = normalized
            .rsplit(|c| c == ':' || c == '/')
            .next()
            .unwrap_or_default();
        let authority_is_epsg = normalized.contains("EPSG");

        match (authority_is_epsg, code) {
            (true, "4326") => Ok(CrsCode::Epsg4326),
            (true, "4269") => Ok(CrsCode::Epsg4269),
            (true, "3857") | (true, "900913") => Ok(CrsCode::Epsg3857),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Get the axis order for this CRS in WMS 1.3.0.
    ///
    /// EPSG geographic codes are latitude first; CRS:84 and projected codes
    /// are x first.
    pub fn axis_order_wms_1_3(&self) -> AxisOrder {
        match self {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => AxisOrder::LatLon,
            CrsCode::Crs84 | CrsCode::Epsg3857 => AxisOrder::XY,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(
            self,
            CrsCode::Epsg4326 | CrsCode::Crs84 | CrsCode::Epsg4269
        )
    }

    /// Organization that defines the code, as written to spatial_ref_sys.
    pub fn organization(&self) -> &'static str {
        match self {
            CrsCode::Crs84 => "OGC",
            _ => "EPSG",
        }
    }

    /// Numeric code within the organization.
    pub fn organization_code(&self) -> i64 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Crs84 => 84,
            CrsCode::Epsg4269 => 4269,
            CrsCode::Epsg3857 => 3857,
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Crs84 => "CRS:84",
            CrsCode::Epsg4269 => "EPSG:4269",
            CrsCode::Epsg3857 => "EPSG:3857",
        };
        write!(f, "{}", code)
    }
}

/// Axis order for coordinate interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    /// X (longitude/easting), Y (latitude/northing)
    XY,
    /// Y (latitude/northing), X (longitude/easting)
    LatLon,
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(
            CrsCode::from_ogc_string("EPSG:4326").unwrap(),
            CrsCode::Epsg4326
        );
        assert_eq!(
            CrsCode::from_ogc_string("epsg:3857").unwrap(),
            CrsCode::Epsg3857
        );
        assert_eq!(CrsCode::from_ogc_string("CRS:84").unwrap(), CrsCode::Crs84);
        assert!(CrsCode::from_ogc_string("EPSG:99999").is_err());
    }

    #[test]
    fn test_parse_urn_and_uri_forms() {
        assert_eq!(
            CrsCode::from_ogc_string("urn:ogc:def:crs:EPSG::4326").unwrap(),
            CrsCode::Epsg4326
        );
        assert_eq!(
            CrsCode::from_ogc_string("http://www.opengis.net/def/crs/EPSG/0/4326").unwrap(),
            CrsCode::Epsg4326
        );
        assert_eq!(
            CrsCode::from_ogc_string("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(),
            CrsCode::Crs84
        );
        assert!(CrsCode::from_ogc_string("AUTO:42001").is_err());
    }

    #[test]
    fn test_axis_order() {
        assert_eq!(CrsCode::Epsg4326.axis_order_wms_1_3(), AxisOrder::LatLon);
        assert_eq!(CrsCode::Crs84.axis_order_wms_1_3(), AxisOrder::XY);
        assert_eq!(CrsCode::Epsg3857.axis_order_wms_1_3(), AxisOrder::XY);
    }
}
