//! Picking a coordinate system, output format and layer count both sides
//! support.

use tile_common::{CacheError, CacheResult, CrsCode, ImageFormat};

/// Imagery formats in order of preference.
pub const IMAGE_FORMAT_PREFERENCE: &[&str] =
    &["image/png", "image/jpg", "image/jpeg", "image/gif", "image/bmp"];

/// Coverage formats in order of preference. WCS 1.0.0 servers name formats
/// loosely, so the common GeoTIFF spellings are all accepted.
pub const COVERAGE_FORMAT_PREFERENCE: &[&str] =
    &["image/tiff", "GeoTIFF", "GTiff", "image/geotiff"];

/// Format used when a capability document lists none.
pub const DEFAULT_IMAGE_FORMAT: &str = "image/png";

/// First preferred format the server offers, in the server's own spelling.
///
/// Format parameters (`image/png; mode=8bit`) are ignored when comparing.
pub fn negotiate_format<'a>(offered: &'a [String], preferences: &[&str]) -> Option<&'a str> {
    preferences.iter().find_map(|preferred| {
        offered
            .iter()
            .find(|format| {
                format
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .eq_ignore_ascii_case(preferred)
            })
            .map(String::as_str)
    })
}

/// Imagery format for a layer, falling back to [`DEFAULT_IMAGE_FORMAT`] when
/// the server lists no formats at all.
pub fn negotiate_image_format(layer: &str, offered: &[String]) -> CacheResult<(String, ImageFormat)> {
    let chosen = if offered.is_empty() {
        DEFAULT_IMAGE_FORMAT
    } else {
        negotiate_format(offered, IMAGE_FORMAT_PREFERENCE).ok_or_else(|| {
            CacheError::negotiation(
                layer,
                format!("no supported image format among [{}]", offered.join(", ")),
            )
        })?
    };

    let format = ImageFormat::from_mime(chosen).ok_or_else(|| {
        CacheError::negotiation(layer, format!("unrecognised image format '{}'", chosen))
    })?;
    Ok((chosen.to_string(), format))
}

/// Geographic CRS for a WMS request: EPSG:4326, else CRS:84.
pub fn negotiate_wms_crs(offered: &[String]) -> Option<CrsCode> {
    let parsed: Vec<CrsCode> = offered
        .iter()
        .filter_map(|crs| CrsCode::from_ogc_string(crs).ok())
        .collect();

    [CrsCode::Epsg4326, CrsCode::Crs84]
        .into_iter()
        .find(|preferred| parsed.contains(preferred))
}

/// WCS requests are only made in EPSG:4326.
pub fn require_epsg_4326<'a, I>(coverage: &str, offered: I) -> CacheResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let offered: Vec<&str> = offered.into_iter().collect();
    if offered
        .iter()
        .any(|crs| matches!(CrsCode::from_ogc_string(crs), Ok(CrsCode::Epsg4326)))
    {
        Ok(())
    } else {
        Err(CacheError::negotiation(
            coverage,
            format!("EPSG:4326 not offered, server lists [{}]", offered.join(", ")),
        ))
    }
}

/// Reject multi-layer requests beyond the server's `LayerLimit`.
pub fn check_layer_limit(layer: &str, requested: usize, limit: Option<u32>) -> CacheResult<()> {
    match limit {
        Some(limit) if requested > limit as usize => Err(CacheError::negotiation(
            layer,
            format!(
                "{} layers requested but the server allows {} per request",
                requested, limit
            ),
        )),
        _ => Ok(()),
    }
}

/// Whether tiles in `format` can carry transparency.
pub fn supports_transparency(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::Gif | ImageFormat::Webp
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_preference_order() {
        let offered = strings(&["image/tiff", "image/jpeg", "image/png; mode=8bit"]);
        assert_eq!(
            negotiate_format(&offered, IMAGE_FORMAT_PREFERENCE),
            Some("image/png; mode=8bit")
        );

        let offered = strings(&["image/gif", "image/jpeg"]);
        assert_eq!(negotiate_format(&offered, IMAGE_FORMAT_PREFERENCE), Some("image/jpeg"));

        let offered = strings(&["ArcGrid", "GeoTIFF"]);
        assert_eq!(negotiate_format(&offered, COVERAGE_FORMAT_PREFERENCE), Some("GeoTIFF"));
    }

    #[test]
    fn test_image_format_negotiation() {
        let (mime, format) = negotiate_image_format("a", &[]).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(format, ImageFormat::Png);

        let err = negotiate_image_format("a", &strings(&["image/tiff"])).unwrap_err();
        assert!(matches!(err, CacheError::Negotiation { .. }));
    }

    #[test]
    fn test_wms_crs_preference() {
        assert_eq!(
            negotiate_wms_crs(&strings(&["CRS:84", "EPSG:4326"])),
            Some(CrsCode::Epsg4326)
        );
        assert_eq!(
            negotiate_wms_crs(&strings(&["EPSG:3857", "CRS:84"])),
            Some(CrsCode::Crs84)
        );
        assert_eq!(negotiate_wms_crs(&strings(&["EPSG:3857"])), None);
    }

    #[test]
    fn test_require_epsg_4326() {
        assert!(require_epsg_4326("dem", ["EPSG:4326"]).is_ok());
        assert!(require_epsg_4326("dem", ["http://www.opengis.net/def/crs/EPSG/0/4326"]).is_ok());
        assert!(matches!(
            require_epsg_4326("dem", ["EPSG:32632", "CRS:84"]),
            Err(CacheError::Negotiation { .. })
        ));
    }

    #[test]
    fn test_layer_limit() {
        assert!(check_layer_limit("a,b", 2, Some(2)).is_ok());
        assert!(check_layer_limit("a,b,c", 3, None).is_ok());
        assert!(matches!(
            check_layer_limit("a,b,c", 3, Some(2)),
            Err(CacheError::Negotiation { .. })
        ));
    }
}
