//! WMTS 1.0.0 client.
//!
//! A layer is usable when one of its linked tile matrix sets is geographic
//! (EPSG:4326 or CRS:84) and starts with a quadtree run of matrices. The
//! cache pyramid is built from that run, and remote row and column numbers
//! are located geometrically from each matrix's top-left corner so no
//! assumption about the top-level matrix size is baked in.

use crate::http::build_url;
use crate::negotiation::{negotiate_image_format, supports_transparency};
use crate::source::{RemoteImageLayer, TileUrlSource};
use crate::xml::{parse_document, parse_numbers, XmlElement};
use std::sync::Arc;
use tile_common::{
    BoundingBox, CacheError, CacheResult, CrsCode, Level, LevelSet, ServiceType, TileCoord,
    TileDelta, WebServiceBinding, METERS_PER_DEGREE, STANDARD_PIXEL_SIZE,
};
use tracing::debug;

pub const WMTS_VERSION: &str = "1.0.0";

// ============================================================================
// Capabilities
// ============================================================================

/// Parsed WMTS 1.0.0 capabilities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WmtsCapabilities {
    pub title: Option<String>,
    /// KVP GetTile endpoint, when the service offers one
    pub get_tile_kvp_url: Option<String>,
    pub layers: Vec<WmtsLayer>,
    pub tile_matrix_sets: Vec<WmtsTileMatrixSet>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WmtsLayer {
    pub identifier: String,
    pub title: Option<String>,
    pub wgs84_bbox: Option<BoundingBox>,
    pub formats: Vec<String>,
    pub styles: Vec<WmtsStyle>,
    pub tile_matrix_set_links: Vec<String>,
    pub resource_urls: Vec<ResourceUrl>,
}

impl WmtsLayer {
    /// Default style, else the first declared, else `default`.
    pub fn default_style(&self) -> &str {
        self.styles
            .iter()
            .find(|s| s.is_default)
            .or_else(|| self.styles.first())
            .map(|s| s.identifier.as_str())
            .unwrap_or("default")
    }

    /// RESTful tile template for a format.
    pub fn tile_template(&self, format: &str) -> Option<&str> {
        self.resource_urls
            .iter()
            .find(|r| r.resource_type == "tile" && r.format.eq_ignore_ascii_case(format))
            .map(|r| r.template.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WmtsStyle {
    pub identifier: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUrl {
    pub format: String,
    pub resource_type: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WmtsTileMatrixSet {
    pub identifier: String,
    pub supported_crs: String,
    pub matrices: Vec<WmtsTileMatrix>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WmtsTileMatrix {
    pub identifier: String,
    pub scale_denominator: f64,
    /// Corner as written, in the axis order of the set's CRS
    pub top_left_corner: (f64, f64),
    pub tile_width: u32,
    pub tile_height: u32,
    pub matrix_width: u32,
    pub matrix_height: u32,
}

impl WmtsCapabilities {
    pub fn parse(xml: &str) -> CacheResult<Self> {
        let root = parse_document(xml)?;
        if root.name != "Capabilities" {
            return Err(CacheError::Xml(format!(
                "expected WMTS Capabilities, found <{}>",
                root.name
            )));
        }

        let contents = root.child("Contents");
        let layers = contents
            .map(|c| c.children_named("Layer").map(parse_layer).collect())
            .unwrap_or_default();
        let tile_matrix_sets = contents
            .map(|c| {
                c.children_named("TileMatrixSet")
                    .map(parse_tile_matrix_set)
                    .collect::<CacheResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            title: root
                .child("ServiceIdentification")
                .and_then(|s| s.child_text("Title"))
                .map(str::to_string),
            get_tile_kvp_url: root.child("OperationsMetadata").and_then(kvp_get_tile_url),
            layers,
            tile_matrix_sets,
        })
    }

    pub fn layer(&self, identifier: &str) -> Option<&WmtsLayer> {
        self.layers.iter().find(|l| l.identifier == identifier)
    }

    pub fn tile_matrix_set(&self, identifier: &str) -> Option<&WmtsTileMatrixSet> {
        self.tile_matrix_sets
            .iter()
            .find(|s| s.identifier == identifier)
    }
}

/// GetTile endpoint that accepts KVP encoding. A `Get` without an encoding
/// constraint accepts anything.
fn kvp_get_tile_url(operations: &XmlElement) -> Option<String> {
    let get_tile = operations
        .children_named("Operation")
        .find(|op| op.attr("name") == Some("GetTile"))?;

    get_tile
        .find_all("Get")
        .into_iter()
        .find(|get| {
            let encodings: Vec<&str> = get
                .children_named("Constraint")
                .filter(|c| c.attr("name") == Some("GetEncoding"))
                .flat_map(|c| c.find_all("Value"))
                .map(|v| v.text())
                .collect();
            encodings.is_empty() || encodings.iter().any(|e| e.eq_ignore_ascii_case("KVP"))
        })
        .and_then(|get| get.attr("href"))
        .map(str::to_string)
}

fn parse_layer(element: &XmlElement) -> WmtsLayer {
    WmtsLayer {
        identifier: element.child_text("Identifier").unwrap_or_default().to_string(),
        title: element.child_text("Title").map(str::to_string),
        wgs84_bbox: element.child("WGS84BoundingBox").and_then(|b| {
            let lower = parse_numbers(b.child_text("LowerCorner")?)?;
            let upper = parse_numbers(b.child_text("UpperCorner")?)?;
            match (lower.as_slice(), upper.as_slice()) {
                ([min_x, min_y], [max_x, max_y]) => {
                    Some(BoundingBox::new(*min_x, *min_y, *max_x, *max_y))
                }
                _ => None,
            }
        }),
        formats: element
            .children_named("Format")
            .map(|f| f.text().to_string())
            .collect(),
        styles: element
            .children_named("Style")
            .filter_map(|s| {
                Some(WmtsStyle {
                    identifier: s.child_text("Identifier")?.to_string(),
                    is_default: s.attr("isDefault") == Some("true"),
                })
            })
            .collect(),
        tile_matrix_set_links: element
            .children_named("TileMatrixSetLink")
            .filter_map(|l| l.child_text("TileMatrixSet"))
            .map(str::to_string)
            .collect(),
        resource_urls: element
            .children_named("ResourceURL")
            .filter_map(|r| {
                Some(ResourceUrl {
                    format: r.attr("format")?.to_string(),
                    resource_type: r.attr("resourceType")?.to_string(),
                    template: r.attr("template")?.to_string(),
                })
            })
            .collect(),
    }
}

fn parse_tile_matrix_set(element: &XmlElement) -> CacheResult<WmtsTileMatrixSet> {
    let identifier = element.child_text("Identifier").unwrap_or_default().to_string();
    let matrices = element
        .children_named("TileMatrix")
        .map(|m| parse_tile_matrix(&identifier, m))
        .collect::<CacheResult<Vec<_>>>()?;

    Ok(WmtsTileMatrixSet {
        supported_crs: element.child_text("SupportedCRS").unwrap_or_default().to_string(),
        identifier,
        matrices,
    })
}

fn parse_tile_matrix(set: &str, element: &XmlElement) -> CacheResult<WmtsTileMatrix> {
    let invalid = |what: &str| {
        CacheError::Xml(format!("tile matrix set '{}': missing or invalid {}", set, what))
    };
    let number = |name: &str| -> CacheResult<u32> {
        element
            .child_text(name)
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| invalid(name))
    };

    let corner = element
        .child_text("TopLeftCorner")
        .and_then(parse_numbers)
        .ok_or_else(|| invalid("TopLeftCorner"))?;
    let &[first, second] = corner.as_slice() else {
        return Err(invalid("TopLeftCorner"));
    };

    Ok(WmtsTileMatrix {
        identifier: element
            .child_text("Identifier")
            .ok_or_else(|| invalid("Identifier"))?
            .to_string(),
        scale_denominator: element
            .child_text("ScaleDenominator")
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| invalid("ScaleDenominator"))?,
        top_left_corner: (first, second),
        tile_width: number("TileWidth")?,
        tile_height: number("TileHeight")?,
        matrix_width: number("MatrixWidth")?,
        matrix_height: number("MatrixHeight")?,
    })
}

/// GetCapabilities URL for a service address.
pub fn capabilities_url(address: &str) -> CacheResult<String> {
    build_url(
        address,
        &[
            ("SERVICE", "WMTS".to_string()),
            ("REQUEST", "GetCapabilities".to_string()),
            ("VERSION", WMTS_VERSION.to_string()),
        ],
    )
}

// ============================================================================
// Geometry
// ============================================================================

/// A remote matrix located in longitude/latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixGeometry {
    pub identifier: String,
    /// West edge of column 0
    pub origin_lon: f64,
    /// North edge of row 0
    pub origin_lat: f64,
    /// Tile span in degrees
    pub tile_span: TileDelta,
    pub matrix_width: u32,
    pub matrix_height: u32,
}

impl MatrixGeometry {
    fn new(matrix: &WmtsTileMatrix, crs: CrsCode) -> Self {
        let (origin_lon, origin_lat) = match crs {
            CrsCode::Crs84 => matrix.top_left_corner,
            _ => (matrix.top_left_corner.1, matrix.top_left_corner.0),
        };
        let pixel = matrix.scale_denominator * STANDARD_PIXEL_SIZE / METERS_PER_DEGREE;
        Self {
            identifier: matrix.identifier.clone(),
            origin_lon,
            origin_lat,
            tile_span: TileDelta::new(
                pixel * matrix.tile_height as f64,
                pixel * matrix.tile_width as f64,
            ),
            matrix_width: matrix.matrix_width,
            matrix_height: matrix.matrix_height,
        }
    }

    /// Remote `(row, col)` of the tile containing the centre of `sector`.
    pub fn locate(&self, sector: &BoundingBox) -> Option<(u32, u32)> {
        let center_lon = (sector.min_x + sector.max_x) / 2.0;
        let center_lat = (sector.min_y + sector.max_y) / 2.0;
        let col = ((center_lon - self.origin_lon) / self.tile_span.lon).floor();
        let row = ((self.origin_lat - center_lat) / self.tile_span.lat).floor();
        let in_range = col >= 0.0
            && row >= 0.0
            && col < self.matrix_width as f64
            && row < self.matrix_height as f64;
        in_range.then_some((row as u32, col as u32))
    }
}

/// Leading run of a set's matrices in which each level doubles the previous.
fn quadtree_prefix(matrices: &[WmtsTileMatrix]) -> &[WmtsTileMatrix] {
    let mut len = matrices.len().min(1);
    while len < matrices.len() {
        let (previous, next) = (&matrices[len - 1], &matrices[len]);
        let doubles = next.matrix_width == previous.matrix_width * 2
            && next.matrix_height == previous.matrix_height * 2
            && next.tile_width == previous.tile_width
            && next.tile_height == previous.tile_height;
        if !doubles {
            break;
        }
        len += 1;
    }
    &matrices[..len]
}

/// First linked set that is geographic with at least one matrix.
fn select_tile_matrix_set<'a>(
    capabilities: &'a WmtsCapabilities,
    layer: &WmtsLayer,
) -> Option<(&'a WmtsTileMatrixSet, CrsCode)> {
    layer.tile_matrix_set_links.iter().find_map(|link| {
        let set = capabilities.tile_matrix_set(link)?;
        let crs = CrsCode::from_ogc_string(&set.supported_crs).ok()?;
        let usable = matches!(crs, CrsCode::Epsg4326 | CrsCode::Crs84) && !set.matrices.is_empty();
        usable.then_some((set, crs))
    })
}

// ============================================================================
// Negotiation
// ============================================================================

/// Negotiate an imagery layer from WMTS capabilities.
///
/// # Arguments
/// * `capabilities` - Parsed capabilities of the service
/// * `address` - Service address recorded in the binding
/// * `identifier` - Layer identifier
/// * `metadata` - Raw capabilities document to keep in the binding
pub fn image_layer(
    capabilities: &WmtsCapabilities,
    address: &str,
    identifier: &str,
    metadata: Option<&str>,
) -> CacheResult<RemoteImageLayer> {
    let layer = capabilities
        .layer(identifier)
        .ok_or_else(|| CacheError::negotiation(identifier, "layer not offered by the service"))?;

    let (set, crs) = select_tile_matrix_set(capabilities, layer).ok_or_else(|| {
        CacheError::negotiation(
            identifier,
            format!(
                "no EPSG:4326 or CRS:84 tile matrix set among [{}]",
                layer.tile_matrix_set_links.join(", ")
            ),
        )
    })?;

    let (format_mime, format) = negotiate_image_format(identifier, &layer.formats)?;

    let template = match (layer.tile_template(&format_mime), &capabilities.get_tile_kvp_url) {
        (Some(template), _) => TileTemplate::Rest(template.to_string()),
        (None, Some(url)) => TileTemplate::Kvp(url.clone()),
        (None, None) => {
            return Err(CacheError::negotiation(
                identifier,
                format!("no tile template for {} and no KVP GetTile endpoint", format_mime),
            ))
        }
    };

    let matrices: Vec<MatrixGeometry> = quadtree_prefix(&set.matrices)
        .iter()
        .map(|m| MatrixGeometry::new(m, crs))
        .collect();
    let level_set = level_set(layer, &set.matrices[0], &matrices)?;

    debug!(
        layer = %identifier,
        tile_matrix_set = %set.identifier,
        format = %format_mime,
        levels = level_set.num_levels(),
        "Negotiated WMTS layer"
    );

    let transparent = supports_transparency(format);
    let source = WmtsTileSource {
        template,
        layer: identifier.to_string(),
        style: layer.default_style().to_string(),
        format: format_mime.clone(),
        tile_matrix_set: set.identifier.clone(),
        matrices,
    };

    Ok(RemoteImageLayer {
        name: identifier.to_string(),
        title: layer.title.clone(),
        level_set,
        format_mime: format_mime.clone(),
        format,
        source: Arc::new(source),
        binding: WebServiceBinding {
            service_type: ServiceType::Wmts,
            service_address: address.to_string(),
            service_metadata: metadata.map(str::to_string),
            layer_name: Some(identifier.to_string()),
            output_format: Some(format_mime),
            is_transparent: transparent,
        },
    })
}

fn level_set(
    layer: &WmtsLayer,
    first: &WmtsTileMatrix,
    matrices: &[MatrixGeometry],
) -> CacheResult<LevelSet> {
    let top = &matrices[0];
    let origin = BoundingBox::new(
        top.origin_lon,
        top.origin_lat - top.matrix_height as f64 * top.tile_span.lat,
        top.origin_lon + top.matrix_width as f64 * top.tile_span.lon,
        top.origin_lat,
    );
    let sector = layer
        .wgs84_bbox
        .and_then(|b| b.intersection(&origin))
        .unwrap_or(origin);

    LevelSet::new(
        sector,
        origin,
        top.tile_span,
        matrices.len() as u32,
        first.tile_width,
        first.tile_height,
    )
}

// ============================================================================
// Tile requests
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TileTemplate {
    /// Server `ResourceURL` template with `{TileMatrix}`-style tokens
    Rest(String),
    /// KVP GetTile endpoint
    Kvp(String),
}

/// Builds GetTile requests for one layer and tile matrix set.
#[derive(Debug, Clone, PartialEq)]
pub struct WmtsTileSource {
    pub template: TileTemplate,
    pub layer: String,
    pub style: String,
    pub format: String,
    pub tile_matrix_set: String,
    /// Remote matrix for each pyramid level, by level number
    pub matrices: Vec<MatrixGeometry>,
}

impl TileUrlSource for WmtsTileSource {
    fn tile_url(&self, level: &Level, coord: TileCoord) -> CacheResult<String> {
        let matrix = self.matrices.get(coord.level as usize).ok_or_else(|| {
            CacheError::invalid_parameter(
                "tile",
                format!("{} has no remote tile matrix in '{}'", coord, self.tile_matrix_set),
            )
        })?;
        let sector = level.tile_sector(coord.row, coord.col);
        let (row, col) = matrix.locate(&sector).ok_or_else(|| {
            CacheError::invalid_parameter(
                "tile",
                format!("{} falls outside remote matrix '{}'", coord, matrix.identifier),
            )
        })?;

        match &self.template {
            TileTemplate::Rest(template) => Ok(template
                .replace("{Style}", &self.style)
                .replace("{TileMatrixSet}", &self.tile_matrix_set)
                .replace("{TileMatrix}", &matrix.identifier)
                .replace("{TileRow}", &row.to_string())
                .replace("{TileCol}", &col.to_string())),
            TileTemplate::Kvp(base) => build_url(
                base,
                &[
                    ("SERVICE", "WMTS".to_string()),
                    ("REQUEST", "GetTile".to_string()),
                    ("VERSION", WMTS_VERSION.to_string()),
                    ("LAYER", self.layer.clone()),
                    ("STYLE", self.style.clone()),
                    ("FORMAT", self.format.clone()),
                    ("TILEMATRIXSET", self.tile_matrix_set.clone()),
                    ("TILEMATRIX", matrix.identifier.clone()),
                    ("TILEROW", row.to_string()),
                    ("TILECOL", col.to_string()),
                ],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::capabilities::{WMTS_100, WMTS_ADDRESS};

    #[test]
    fn test_parse_capabilities() {
        let caps = WmtsCapabilities::parse(WMTS_100).unwrap();
        assert_eq!(caps.title.as_deref(), Some("Test Tile Service"));
        assert_eq!(
            caps.get_tile_kvp_url.as_deref(),
            Some("https://tiles.example.com/wmts?")
        );
        assert_eq!(caps.layers.len(), 3);
        assert_eq!(caps.tile_matrix_sets.len(), 2);

        let relief = caps.layer("relief").unwrap();
        assert_eq!(relief.default_style(), "default");
        assert_eq!(relief.tile_matrix_set_links, vec!["WebMercator", "EPSG4326"]);
        assert!(relief.tile_template("image/png").is_some());
        assert!(relief.tile_template("image/jpeg").is_none());

        let set = caps.tile_matrix_set("EPSG4326").unwrap();
        assert_eq!(set.matrices.len(), 4);
        assert_eq!(set.matrices[0].top_left_corner, (90.0, -180.0));
    }

    #[test]
    fn test_matrix_geometry_spans_180_degrees() {
        let caps = WmtsCapabilities::parse(WMTS_100).unwrap();
        let set = caps.tile_matrix_set("EPSG4326").unwrap();
        let geometry = MatrixGeometry::new(&set.matrices[0], CrsCode::Epsg4326);
        assert_eq!(geometry.origin_lon, -180.0);
        assert_eq!(geometry.origin_lat, 90.0);
        assert!((geometry.tile_span.lon - 180.0).abs() < 1e-6);
        assert!((geometry.tile_span.lat - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_quadtree_prefix_stops_at_break() {
        let caps = WmtsCapabilities::parse(WMTS_100).unwrap();
        let mut matrices = caps.tile_matrix_set("EPSG4326").unwrap().matrices.clone();
        assert_eq!(quadtree_prefix(&matrices).len(), 4);
        matrices[2].matrix_width = 7;
        assert_eq!(quadtree_prefix(&matrices).len(), 2);
        assert!(quadtree_prefix(&[]).is_empty());
    }

    #[test]
    fn test_level_set_follows_matrices() {
        let caps = WmtsCapabilities::parse(WMTS_100).unwrap();
        let layer = image_layer(&caps, WMTS_ADDRESS, "roads", None).unwrap();
        let set = &layer.level_set;
        assert_eq!(set.num_levels(), 4);
        assert!(set.tile_origin.approx_eq(&BoundingBox::global(), 1e-6));
        assert!(set.sector.approx_eq(&BoundingBox::new(0.0, 0.0, 90.0, 90.0), 1e-6));
        assert_eq!(set.first_level().matrix_width, 2);
        assert_eq!(set.level(3).unwrap().matrix_height, 8);
    }

    #[test]
    fn test_locate_outside_matrix() {
        let geometry = MatrixGeometry {
            identifier: "0".to_string(),
            origin_lon: -180.0,
            origin_lat: 90.0,
            tile_span: TileDelta::new(180.0, 180.0),
            matrix_width: 2,
            matrix_height: 1,
        };
        assert_eq!(
            geometry.locate(&BoundingBox::new(10.0, 10.0, 20.0, 20.0)),
            Some((0, 1))
        );
        assert_eq!(geometry.locate(&BoundingBox::new(190.0, 0.0, 200.0, 10.0)), None);
    }

    #[test]
    fn test_mercator_only_layer_fails() {
        let caps = WmtsCapabilities::parse(WMTS_100).unwrap();
        let err = image_layer(&caps, WMTS_ADDRESS, "basemap", None).unwrap_err();
        assert!(matches!(err, CacheError::Negotiation { .. }));

        let err = image_layer(&caps, WMTS_ADDRESS, "missing", None).unwrap_err();
        assert!(matches!(err, CacheError::Negotiation { .. }));
    }
}
