//! Remote service bindings recorded alongside cached content.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OGC service flavours the cache can pull from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    Wms,
    Wmts,
    Wcs100,
    Wcs201,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Wms => "WMS",
            ServiceType::Wmts => "WMTS",
            ServiceType::Wcs100 => "WCS100",
            ServiceType::Wcs201 => "WCS201",
        }
    }

    /// WCS services produce elevation coverages, the rest produce imagery.
    pub fn is_coverage(&self) -> bool {
        matches!(self, ServiceType::Wcs100 | ServiceType::Wcs201)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WMS" => Ok(ServiceType::Wms),
            "WMTS" => Ok(ServiceType::Wmts),
            "WCS100" | "WCS" => Ok(ServiceType::Wcs100),
            "WCS201" | "WCS2" => Ok(ServiceType::Wcs201),
            other => Err(format!("unknown service type '{}'", other)),
        }
    }
}

/// Where cached content originally came from.
///
/// `service_metadata` holds the raw capabilities or coverage description so
/// a reopened container can rebuild its remote source without a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebServiceBinding {
    pub service_type: ServiceType,
    pub service_address: String,
    pub service_metadata: Option<String>,
    pub layer_name: Option<String>,
    pub output_format: Option<String>,
    pub is_transparent: bool,
}
