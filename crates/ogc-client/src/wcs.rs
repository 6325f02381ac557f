//! WCS 1.0.0 and 2.0.1 clients for elevation coverages.
//!
//! Both versions are negotiated from a DescribeCoverage document. Requests
//! are always made in EPSG:4326 and returned as GeoTIFF. The pyramid is
//! fitted to the coverage's declared grid.

use crate::http::build_url;
use crate::negotiation::{negotiate_format, require_epsg_4326, COVERAGE_FORMAT_PREFERENCE};
use crate::source::{CoverageUrlSource, RemoteCoverage};
use crate::xml::{parse_document, parse_numbers, XmlElement};
use std::sync::Arc;
use tile_common::{
    BoundingBox, CacheError, CacheResult, CrsCode, LevelSet, ServiceType, WebServiceBinding,
};
use tracing::debug;

pub const WCS_100_VERSION: &str = "1.0.0";
pub const WCS_201_VERSION: &str = "2.0.1";

/// Output CRS for WCS 2.0.1 requests.
const EPSG_4326_URI: &str = "http://www.opengis.net/def/crs/EPSG/0/4326";

/// Format assumed for WCS 2.0.1 coverages that declare no native format.
const DEFAULT_COVERAGE_FORMAT: &str = "image/tiff";

/// Grid size from a `GridEnvelope`'s inclusive `low`/`high` corners.
fn grid_size(element: &XmlElement) -> Option<(u32, u32)> {
    let envelope = element.find("GridEnvelope")?;
    let low = parse_numbers(envelope.child_text("low")?)?;
    let high = parse_numbers(envelope.child_text("high")?)?;
    match (low.as_slice(), high.as_slice()) {
        ([low_x, low_y, ..], [high_x, high_y, ..]) => {
            let width = high_x - low_x + 1.0;
            let height = high_y - low_y + 1.0;
            (width >= 1.0 && height >= 1.0).then_some((width as u32, height as u32))
        }
        _ => None,
    }
}

// ============================================================================
// WCS 1.0.0
// ============================================================================

/// One `CoverageOffering` of a WCS 1.0.0 DescribeCoverage response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wcs100Coverage {
    pub name: String,
    pub label: Option<String>,
    pub lon_lat_envelope: Option<BoundingBox>,
    pub grid_width: Option<u32>,
    pub grid_height: Option<u32>,
    /// Union of `requestResponseCRSs`, `requestCRSs` and `responseCRSs`
    pub supported_crs: Vec<String>,
    pub formats: Vec<String>,
    pub native_format: Option<String>,
}

impl Wcs100Coverage {
    /// Parse a DescribeCoverage document and pick the offering called
    /// `name`, or the first one when `name` is `None`.
    pub fn parse(xml: &str, name: Option<&str>) -> CacheResult<Self> {
        let root = parse_document(xml)?;
        if root.name != "CoverageDescription" {
            return Err(CacheError::Xml(format!(
                "expected CoverageDescription, found <{}>",
                root.name
            )));
        }

        let offering = root
            .children_named("CoverageOffering")
            .find(|o| name.map_or(true, |n| o.child_text("name") == Some(n)))
            .ok_or_else(|| {
                CacheError::NotFound(format!(
                    "coverage '{}' in DescribeCoverage response",
                    name.unwrap_or_default()
                ))
            })?;

        let lon_lat_envelope = offering.child("lonLatEnvelope").and_then(|e| {
            let corners: Vec<Vec<f64>> = e
                .children_named("pos")
                .filter_map(|p| parse_numbers(p.text()))
                .collect();
            match corners.as_slice() {
                [lower, upper] if lower.len() >= 2 && upper.len() >= 2 => {
                    Some(BoundingBox::new(lower[0], lower[1], upper[0], upper[1]))
                }
                _ => None,
            }
        });

        let (grid_width, grid_height) = offering
            .child("domainSet")
            .and_then(grid_size)
            .map_or((None, None), |(w, h)| (Some(w), Some(h)));

        let mut supported_crs = Vec::new();
        if let Some(crs) = offering.child("supportedCRSs") {
            for list in ["requestResponseCRSs", "requestCRSs", "responseCRSs"] {
                for element in crs.children_named(list) {
                    for code in element.text().split_whitespace() {
                        if !supported_crs.iter().any(|c| c == code) {
                            supported_crs.push(code.to_string());
                        }
                    }
                }
            }
        }

        let formats_element = offering.child("supportedFormats");
        Ok(Self {
            name: offering.child_text("name").unwrap_or_default().to_string(),
            label: offering.child_text("label").map(str::to_string),
            lon_lat_envelope,
            grid_width,
            grid_height,
            supported_crs,
            formats: formats_element
                .map(|f| {
                    f.children_named("formats")
                        .map(|e| e.text().to_string())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            native_format: formats_element
                .and_then(|f| f.attr("nativeFormat"))
                .map(str::to_string),
        })
    }
}

/// DescribeCoverage URL for a WCS 1.0.0 coverage.
pub fn describe_coverage_100_url(address: &str, coverage: &str) -> CacheResult<String> {
    build_url(
        address,
        &[
            ("SERVICE", "WCS".to_string()),
            ("VERSION", WCS_100_VERSION.to_string()),
            ("REQUEST", "DescribeCoverage".to_string()),
            ("COVERAGE", coverage.to_string()),
        ],
    )
}

/// Negotiate an elevation coverage from a WCS 1.0.0 description.
pub fn coverage_100(
    description: &Wcs100Coverage,
    address: &str,
    tile_size: u32,
    metadata: Option<&str>,
) -> CacheResult<RemoteCoverage> {
    let name = description.name.as_str();
    require_epsg_4326(name, description.supported_crs.iter().map(String::as_str))?;

    let offered: Vec<String> = if description.formats.is_empty() {
        description.native_format.iter().cloned().collect()
    } else {
        description.formats.clone()
    };
    let format = negotiate_format(&offered, COVERAGE_FORMAT_PREFERENCE)
        .ok_or_else(|| {
            CacheError::negotiation(
                name,
                format!("no GeoTIFF format among [{}]", offered.join(", ")),
            )
        })?
        .to_string();

    let sector = description
        .lon_lat_envelope
        .ok_or_else(|| CacheError::negotiation(name, "coverage declares no lonLatEnvelope"))?;
    let level_set = coverage_level_set(
        name,
        sector,
        description.grid_width,
        description.grid_height,
        tile_size,
    )?;

    debug!(coverage = %name, format = %format, levels = level_set.num_levels(), "Negotiated WCS 1.0.0 coverage");

    let source = Wcs100Source {
        address: address.to_string(),
        coverage: name.to_string(),
        format: format.clone(),
    };
    Ok(RemoteCoverage {
        name: name.to_string(),
        title: description.label.clone(),
        level_set,
        format_mime: format.clone(),
        source: Arc::new(source),
        binding: coverage_binding(ServiceType::Wcs100, address, name, &format, metadata),
    })
}

/// GetCoverage requests against a WCS 1.0.0 service.
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs100Source {
    pub address: String,
    pub coverage: String,
    pub format: String,
}

impl CoverageUrlSource for Wcs100Source {
    fn coverage_url(&self, sector: &BoundingBox, width: u32, height: u32) -> CacheResult<String> {
        build_url(
            &self.address,
            &[
                ("SERVICE", "WCS".to_string()),
                ("VERSION", WCS_100_VERSION.to_string()),
                ("REQUEST", "GetCoverage".to_string()),
                ("COVERAGE", self.coverage.clone()),
                ("CRS", "EPSG:4326".to_string()),
                (
                    "BBOX",
                    format!(
                        "{},{},{},{}",
                        sector.min_x, sector.min_y, sector.max_x, sector.max_y
                    ),
                ),
                ("WIDTH", width.to_string()),
                ("HEIGHT", height.to_string()),
                ("FORMAT", self.format.clone()),
            ],
        )
    }
}

// ============================================================================
// WCS 2.0.1
// ============================================================================

/// One `CoverageDescription` of a WCS 2.0.1 DescribeCoverage response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wcs201Coverage {
    pub coverage_id: String,
    pub srs_name: Option<String>,
    pub axis_labels: Vec<String>,
    /// Envelope normalised to longitude/latitude
    pub envelope: Option<BoundingBox>,
    pub grid_width: Option<u32>,
    pub grid_height: Option<u32>,
    pub native_format: Option<String>,
}

impl Wcs201Coverage {
    /// Parse a DescribeCoverage document and pick `coverage_id`, or the
    /// first description when `None`.
    pub fn parse(xml: &str, coverage_id: Option<&str>) -> CacheResult<Self> {
        let root = parse_document(xml)?;
        if root.name != "CoverageDescriptions" {
            return Err(CacheError::Xml(format!(
                "expected CoverageDescriptions, found <{}>",
                root.name
            )));
        }

        let description = root
            .children_named("CoverageDescription")
            .find(|d| coverage_id.map_or(true, |id| d.child_text("CoverageId") == Some(id)))
            .ok_or_else(|| {
                CacheError::NotFound(format!(
                    "coverage '{}' in DescribeCoverage response",
                    coverage_id.unwrap_or_default()
                ))
            })?;

        let envelope = description.path(&["boundedBy", "Envelope"]);
        let srs_name = envelope.and_then(|e| e.attr("srsName")).map(str::to_string);
        let axis_labels: Vec<String> = envelope
            .and_then(|e| e.attr("axisLabels"))
            .map(|labels| labels.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let lat_first = match axis_labels.first() {
            Some(label) => is_latitude_label(label),
            None => srs_name
                .as_deref()
                .map(|s| matches!(CrsCode::from_ogc_string(s), Ok(CrsCode::Epsg4326)))
                .unwrap_or(false),
        };

        let bbox = envelope.and_then(|e| {
            let lower = parse_numbers(e.child_text("lowerCorner")?)?;
            let upper = parse_numbers(e.child_text("upperCorner")?)?;
            match (lower.as_slice(), upper.as_slice()) {
                ([a, b, ..], [c, d, ..]) if lat_first => Some(BoundingBox::new(*b, *a, *d, *c)),
                ([a, b, ..], [c, d, ..]) => Some(BoundingBox::new(*a, *b, *c, *d)),
                _ => None,
            }
        });

        let (grid_width, grid_height) = description
            .child("domainSet")
            .and_then(grid_size)
            .map_or((None, None), |(w, h)| (Some(w), Some(h)));

        Ok(Self {
            coverage_id: description
                .child_text("CoverageId")
                .unwrap_or_default()
                .to_string(),
            srs_name,
            axis_labels,
            envelope: bbox,
            grid_width,
            grid_height,
            native_format: description
                .path(&["ServiceParameters", "nativeFormat"])
                .map(|f| f.text().to_string())
                .filter(|f| !f.is_empty()),
        })
    }

    /// Subset label for the latitude axis.
    pub fn latitude_label(&self) -> &str {
        self.axis_labels
            .iter()
            .find(|l| is_latitude_label(l))
            .map(String::as_str)
            .unwrap_or("Lat")
    }

    /// Subset label for the longitude axis.
    pub fn longitude_label(&self) -> &str {
        self.axis_labels
            .iter()
            .find(|l| !is_latitude_label(l))
            .map(String::as_str)
            .unwrap_or("Long")
    }
}

fn is_latitude_label(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    label.starts_with("lat") || label == "y" || label == "n"
}

/// DescribeCoverage URL for a WCS 2.0.1 coverage.
pub fn describe_coverage_201_url(address: &str, coverage_id: &str) -> CacheResult<String> {
    build_url(
        address,
        &[
            ("SERVICE", "WCS".to_string()),
            ("VERSION", WCS_201_VERSION.to_string()),
            ("REQUEST", "DescribeCoverage".to_string()),
            ("COVERAGEID", coverage_id.to_string()),
        ],
    )
}

/// Negotiate an elevation coverage from a WCS 2.0.1 description.
pub fn coverage_201(
    description: &Wcs201Coverage,
    address: &str,
    tile_size: u32,
    metadata: Option<&str>,
) -> CacheResult<RemoteCoverage> {
    let name = description.coverage_id.as_str();
    require_epsg_4326(name, description.srs_name.as_deref())?;

    let format = match &description.native_format {
        Some(native) => negotiate_format(std::slice::from_ref(native), COVERAGE_FORMAT_PREFERENCE)
            .unwrap_or(DEFAULT_COVERAGE_FORMAT),
        None => DEFAULT_COVERAGE_FORMAT,
    }
    .to_string();

    let sector = description
        .envelope
        .ok_or_else(|| CacheError::negotiation(name, "coverage declares no envelope"))?;
    let level_set = coverage_level_set(
        name,
        sector,
        description.grid_width,
        description.grid_height,
        tile_size,
    )?;

    debug!(coverage = %name, format = %format, levels = level_set.num_levels(), "Negotiated WCS 2.0.1 coverage");

    let source = Wcs201Source {
        address: address.to_string(),
        coverage_id: name.to_string(),
        format: format.clone(),
        latitude_label: description.latitude_label().to_string(),
        longitude_label: description.longitude_label().to_string(),
    };
    Ok(RemoteCoverage {
        name: name.to_string(),
        title: None,
        level_set,
        format_mime: format.clone(),
        source: Arc::new(source),
        binding: coverage_binding(ServiceType::Wcs201, address, name, &format, metadata),
    })
}

/// GetCoverage requests against a WCS 2.0.1 service.
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs201Source {
    pub address: String,
    pub coverage_id: String,
    pub format: String,
    pub latitude_label: String,
    pub longitude_label: String,
}

impl CoverageUrlSource for Wcs201Source {
    fn coverage_url(&self, sector: &BoundingBox, width: u32, height: u32) -> CacheResult<String> {
        build_url(
            &self.address,
            &[
                ("SERVICE", "WCS".to_string()),
                ("VERSION", WCS_201_VERSION.to_string()),
                ("REQUEST", "GetCoverage".to_string()),
                ("COVERAGEID", self.coverage_id.clone()),
                (
                    "SUBSET",
                    format!("{}({},{})", self.latitude_label, sector.min_y, sector.max_y),
                ),
                (
                    "SUBSET",
                    format!("{}({},{})", self.longitude_label, sector.min_x, sector.max_x),
                ),
                (
                    "SCALESIZE",
                    format!(
                        "{}({}),{}({})",
                        self.longitude_label, width, self.latitude_label, height
                    ),
                ),
                ("OUTPUTCRS", EPSG_4326_URI.to_string()),
                ("FORMAT", self.format.clone()),
            ],
        )
    }
}

// ============================================================================
// Shared
// ============================================================================

fn coverage_level_set(
    name: &str,
    sector: BoundingBox,
    grid_width: Option<u32>,
    grid_height: Option<u32>,
    tile_size: u32,
) -> CacheResult<LevelSet> {
    let (Some(width), Some(height)) = (grid_width, grid_height) else {
        return Err(CacheError::negotiation(name, "coverage declares no grid envelope"));
    };
    LevelSet::from_coverage_description(sector, width, height, tile_size, tile_size)
}

fn coverage_binding(
    service_type: ServiceType,
    address: &str,
    name: &str,
    format: &str,
    metadata: Option<&str>,
) -> WebServiceBinding {
    WebServiceBinding {
        service_type,
        service_address: address.to_string(),
        service_metadata: metadata.map(str::to_string),
        layer_name: Some(name.to_string()),
        output_format: Some(format.to_string()),
        is_transparent: false,
    }
}
