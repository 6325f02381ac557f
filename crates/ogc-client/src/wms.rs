//! WMS 1.3.0 client.
//!
//! Parses capabilities with layer property inheritance, negotiates CRS and
//! format for one or more layers, and builds GetMap requests for pyramid
//! tiles.

use crate::http::build_url;
use crate::negotiation::{
    check_layer_limit, negotiate_image_format, negotiate_wms_crs, supports_transparency,
};
use crate::source::{RemoteImageLayer, TileUrlSource};
use crate::xml::{parse_document, XmlElement};
use std::sync::Arc;
use tile_common::{
    num_levels_for_resolution, AxisOrder, BoundingBox, CacheError, CacheResult, CrsCode, Level,
    LevelSet, ServiceType, TileCoord, TileDelta, WebServiceBinding, METERS_PER_DEGREE,
    STANDARD_PIXEL_SIZE,
};
use tracing::debug;

pub const WMS_VERSION: &str = "1.3.0";

/// Levels used when a layer declares no minimum scale.
pub const DEFAULT_LEVEL_COUNT: u32 = 20;

/// Parsed WMS 1.3.0 capabilities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WmsCapabilities {
    pub title: Option<String>,
    /// GetMap endpoint, may carry vendor parameters such as `map=`
    pub get_map_url: Option<String>,
    pub get_map_formats: Vec<String>,
    pub layer_limit: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// Every layer in document order, inherited properties resolved
    pub layers: Vec<WmsLayer>,
}

/// One layer with its inherited properties applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WmsLayer {
    /// `None` for grouping layers that cannot be requested
    pub name: Option<String>,
    pub title: Option<String>,
    pub crs: Vec<String>,
    pub geographic_bbox: Option<BoundingBox>,
    pub styles: Vec<String>,
    pub opaque: bool,
    pub min_scale_denominator: Option<f64>,
    pub max_scale_denominator: Option<f64>,
}

impl WmsCapabilities {
    /// Parse a capabilities document.
    pub fn parse(xml: &str) -> CacheResult<Self> {
        let root = parse_document(xml)?;
        if root.name != "WMS_Capabilities" {
            return Err(CacheError::Xml(format!(
                "expected WMS_Capabilities, found <{}>",
                root.name
            )));
        }
        if let Some(version) = root.attr("version") {
            if version != WMS_VERSION {
                return Err(CacheError::Xml(format!(
                    "unsupported WMS version {}",
                    version
                )));
            }
        }

        let service = root.child("Service");
        let get_map = root.path(&["Capability", "Request", "GetMap"]);

        let mut layers = Vec::new();
        if let Some(capability) = root.child("Capability") {
            for layer in capability.children_named("Layer") {
                collect_layers(layer, &WmsLayer::default(), &mut layers);
            }
        }

        Ok(Self {
            title: service.and_then(|s| s.child_text("Title")).map(str::to_string),
            get_map_url: get_map
                .and_then(|g| g.find("OnlineResource"))
                .and_then(|r| r.attr("href"))
                .map(str::to_string),
            get_map_formats: get_map
                .map(|g| {
                    g.children_named("Format")
                        .map(|f| f.text().to_string())
                        .filter(|f| !f.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            layer_limit: service.and_then(|s| parse_child(s, "LayerLimit")),
            max_width: service.and_then(|s| parse_child(s, "MaxWidth")),
            max_height: service.and_then(|s| parse_child(s, "MaxHeight")),
            layers,
        })
    }

    /// Named layer lookup.
    pub fn layer(&self, name: &str) -> Option<&WmsLayer> {
        self.layers
            .iter()
            .find(|layer| layer.name.as_deref() == Some(name))
    }

    /// Names of every requestable layer.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().filter_map(|l| l.name.as_deref()).collect()
    }
}

fn parse_child<T: std::str::FromStr>(element: &XmlElement, name: &str) -> Option<T> {
    element.child_text(name).and_then(|t| t.parse().ok())
}

/// Walk a layer tree. CRS and styles accumulate down the tree; bounding box,
/// opacity and scale limits are replaced when a child declares its own.
fn collect_layers(element: &XmlElement, parent: &WmsLayer, out: &mut Vec<WmsLayer>) {
    let mut crs = parent.crs.clone();
    for code in element.children_named("CRS") {
        let code = code.text().to_string();
        if !code.is_empty() && !crs.contains(&code) {
            crs.push(code);
        }
    }

    let mut styles = parent.styles.clone();
    for style in element.children_named("Style") {
        if let Some(name) = style.child_text("Name") {
            if !styles.iter().any(|s| s == name) {
                styles.push(name.to_string());
            }
        }
    }

    let layer = WmsLayer {
        name: element.child_text("Name").map(str::to_string),
        title: element.child_text("Title").map(str::to_string),
        crs,
        geographic_bbox: element
            .child("EX_GeographicBoundingBox")
            .and_then(geographic_bbox)
            .or(parent.geographic_bbox),
        styles,
        opaque: element
            .attr("opaque")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(parent.opaque),
        min_scale_denominator: parse_child(element, "MinScaleDenominator")
            .or(parent.min_scale_denominator),
        max_scale_denominator: parse_child(element, "MaxScaleDenominator")
            .or(parent.max_scale_denominator),
    };

    out.push(layer.clone());
    for child in element.children_named("Layer") {
        collect_layers(child, &layer, out);
    }
}

fn geographic_bbox(element: &XmlElement) -> Option<BoundingBox> {
    let value = |name| parse_child::<f64>(element, name);
    let bbox = BoundingBox::new(
        value("westBoundLongitude")?,
        value("southBoundLatitude")?,
        value("eastBoundLongitude")?,
        value("northBoundLatitude")?,
    );
    bbox.is_valid().then_some(bbox)
}

/// GetCapabilities URL for a service address.
pub fn capabilities_url(address: &str) -> CacheResult<String> {
    build_url(
        address,
        &[
            ("SERVICE", "WMS".to_string()),
            ("REQUEST", "GetCapabilities".to_string()),
            ("VERSION", WMS_VERSION.to_string()),
        ],
    )
}

/// Negotiate an imagery layer for one or more named layers.
///
/// # Arguments
/// * `capabilities` - Parsed capabilities of the service
/// * `address` - Service address, used when no GetMap URL is declared
/// * `layer_names` - Layers composited in one GetMap request
/// * `tile_size` - Tile width and height in pixels
/// * `metadata` - Raw capabilities document to keep in the binding
pub fn image_layer(
    capabilities: &WmsCapabilities,
    address: &str,
    layer_names: &[&str],
    tile_size: u32,
    metadata: Option<&str>,
) -> CacheResult<RemoteImageLayer> {
    let label = layer_names.join(",");
    if layer_names.is_empty() {
        return Err(CacheError::invalid_parameter("layers", "no layer requested"));
    }
    check_layer_limit(&label, layer_names.len(), capabilities.layer_limit)?;

    let layers = layer_names
        .iter()
        .map(|name| {
            capabilities
                .layer(name)
                .ok_or_else(|| CacheError::negotiation(*name, "layer not offered by the service"))
        })
        .collect::<CacheResult<Vec<_>>>()?;

    // Every layer in the request must accept the chosen CRS.
    let common_crs: Vec<String> = layers[0]
        .crs
        .iter()
        .filter(|code| layers[1..].iter().all(|l| l.crs.contains(code)))
        .cloned()
        .collect();
    let crs = negotiate_wms_crs(&common_crs).ok_or_else(|| {
        CacheError::negotiation(
            &label,
            format!(
                "neither EPSG:4326 nor CRS:84 offered, layer lists [{}]",
                common_crs.join(", ")
            ),
        )
    })?;

    let (format_mime, format) = negotiate_image_format(&label, &capabilities.get_map_formats)?;
    let transparent = !layers.iter().all(|l| l.opaque) && supports_transparency(format);

    let level_set = level_set(&layers, tile_size)?;
    debug!(
        layer = %label,
        crs = %crs,
        format = %format_mime,
        levels = level_set.num_levels(),
        "Negotiated WMS layer"
    );

    let source = WmsTileSource {
        get_map_url: capabilities
            .get_map_url
            .clone()
            .unwrap_or_else(|| address.to_string()),
        layers: label.clone(),
        styles: vec![String::new(); layer_names.len()].join(","),
        format: format_mime.clone(),
        crs,
        transparent,
        time: None,
    };

    Ok(RemoteImageLayer {
        name: label.clone(),
        title: match layers.as_slice() {
            [single] => single.title.clone(),
            _ => None,
        },
        level_set,
        format_mime: format_mime.clone(),
        format,
        source: Arc::new(source),
        binding: WebServiceBinding {
            service_type: ServiceType::Wms,
            service_address: address.to_string(),
            service_metadata: metadata.map(str::to_string),
            layer_name: Some(label),
            output_format: Some(format_mime),
            is_transparent: transparent,
        },
    })
}

/// Pyramid for a set of layers: two 180 degree tiles at level 0, enough
/// levels to reach the finest minimum scale, over the union of the layers'
/// extents.
fn level_set(layers: &[&WmsLayer], tile_size: u32) -> CacheResult<LevelSet> {
    let global = BoundingBox::global();
    let sector = layers
        .iter()
        .map(|l| l.geographic_bbox.unwrap_or(global))
        .reduce(|a, b| a.union(&b))
        .and_then(|s| s.intersection(&global))
        .unwrap_or(global);

    let finest_scale = layers
        .iter()
        .filter_map(|l| l.min_scale_denominator)
        .filter(|s| *s > 0.0)
        .reduce(f64::min);
    let num_levels = match finest_scale {
        Some(scale) => num_levels_for_resolution(
            180.0 / tile_size as f64,
            scale_to_resolution(scale),
        ),
        None => DEFAULT_LEVEL_COUNT,
    };

    LevelSet::new(
        sector,
        global,
        TileDelta::new(180.0, 180.0),
        num_levels,
        tile_size,
        tile_size,
    )
}

/// Degrees per pixel at a scale denominator.
pub fn scale_to_resolution(scale_denominator: f64) -> f64 {
    scale_denominator * STANDARD_PIXEL_SIZE / METERS_PER_DEGREE
}

/// Builds GetMap requests covering exactly one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsTileSource {
    pub get_map_url: String,
    pub layers: String,
    pub styles: String,
    pub format: String,
    pub crs: CrsCode,
    pub transparent: bool,
    pub time: Option<String>,
}

impl WmsTileSource {
    /// `BBOX` value for a sector in this source's CRS axis order.
    pub fn bbox_param(&self, sector: &BoundingBox) -> String {
        match self.crs.axis_order_wms_1_3() {
            AxisOrder::LatLon => format!(
                "{},{},{},{}",
                sector.min_y, sector.min_x, sector.max_y, sector.max_x
            ),
            AxisOrder::XY => format!(
                "{},{},{},{}",
                sector.min_x, sector.min_y, sector.max_x, sector.max_y
            ),
        }
    }

    /// GetMap URL for an arbitrary sector and size.
    pub fn get_map_url(&self, sector: &BoundingBox, width: u32, height: u32) -> CacheResult<String> {
        let mut params = vec![
            ("SERVICE", "WMS".to_string()),
            ("VERSION", WMS_VERSION.to_string()),
            ("REQUEST", "GetMap".to_string()),
            ("LAYERS", self.layers.clone()),
            ("STYLES", self.styles.clone()),
            ("CRS", self.crs.to_string()),
            ("BBOX", self.bbox_param(sector)),
            ("WIDTH", width.to_string()),
            ("HEIGHT", height.to_string()),
            ("FORMAT", self.format.clone()),
            (
                "TRANSPARENT",
                if self.transparent { "TRUE" } else { "FALSE" }.to_string(),
            ),
        ];
        if let Some(time) = &self.time {
            params.push(("TIME", time.clone()));
        }
        build_url(&self.get_map_url, &params)
    }
}

impl TileUrlSource for WmsTileSource {
    fn tile_url(&self, level: &Level, coord: TileCoord) -> CacheResult<String> {
        let sector = level.tile_sector(coord.row, coord.col);
        self.get_map_url(&sector, level.tile_width, level.tile_height)
    }
}
