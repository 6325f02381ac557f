//! End-to-end negotiation against canned capability documents.

use ogc_client::testing::RecordingFetcher;
use ogc_client::OgcClient;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use test_utils::capabilities::*;
use tile_common::{BoundingBox, CacheError, ServiceType, TileCoord, WebServiceBinding};

fn client(fetcher: RecordingFetcher) -> (OgcClient, Arc<RecordingFetcher>) {
    let fetcher = Arc::new(fetcher);
    (OgcClient::with_fetcher(fetcher.clone()), fetcher)
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[tokio::test]
async fn test_wms_layer_negotiation() {
    let (client, fetcher) = client(RecordingFetcher::new().respond("GetCapabilities", WMS_130));

    let layer = client.wms_image_layer(WMS_ADDRESS, &["bmng"]).await.unwrap();
    assert_eq!(layer.format_mime, "image/png");
    assert_eq!(layer.level_set.num_levels(), 11);
    assert!(!layer.binding.is_transparent);
    assert_eq!(layer.binding.service_metadata.as_deref(), Some(WMS_130));

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 1);
    let params = query(&requests[0]);
    assert_eq!(params["SERVICE"], "WMS");
    assert_eq!(params["REQUEST"], "GetCapabilities");
    assert_eq!(params["VERSION"], "1.3.0");
}

#[tokio::test]
async fn test_wms_get_map_for_tile() {
    let (client, _) = client(RecordingFetcher::new().respond("GetCapabilities", WMS_130));
    let layer = client.wms_image_layer(WMS_ADDRESS, &["bmng"]).await.unwrap();

    let url = layer
        .tile_url(&layer.level_set, TileCoord::new(3, 2, 5))
        .unwrap();
    assert!(url.starts_with("https://maps.example.com/wms?map=world&"));

    let params = query(&url);
    assert_eq!(params["REQUEST"], "GetMap");
    assert_eq!(params["LAYERS"], "bmng");
    assert_eq!(params["CRS"], "EPSG:4326");
    assert_eq!(params["BBOX"], "22.5,-67.5,45,-45");
    assert_eq!(params["WIDTH"], "256");
    assert_eq!(params["HEIGHT"], "256");
    assert_eq!(params["FORMAT"], "image/png");
    assert_eq!(params["TRANSPARENT"], "FALSE");
}

#[tokio::test]
async fn test_wms_listing_skips_failed_layers() {
    let (client, _) = client(
        RecordingFetcher::new().respond("GetCapabilities", WMS_130_MERCATOR_ONLY),
    );
    let layers = client.wms_image_layers(WMS_ADDRESS).await.unwrap();
    assert!(layers.is_empty());

    let (client, _) = self::client(RecordingFetcher::new().respond("GetCapabilities", WMS_130));
    let names: Vec<String> = client
        .wms_image_layers(WMS_ADDRESS)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(names, vec!["bmng", "boundaries", "placenames"]);
}

#[tokio::test]
async fn test_wms_mercator_only_is_negotiation_failure() {
    let (client, _) = client(
        RecordingFetcher::new().respond("GetCapabilities", WMS_130_MERCATOR_ONLY),
    );
    let err = client.wms_image_layer(WMS_ADDRESS, &["osm"]).await.unwrap_err();
    assert!(matches!(err, CacheError::Negotiation { .. }));
}

#[tokio::test]
async fn test_wmts_rest_template() {
    let (client, _) = client(RecordingFetcher::new().respond("GetCapabilities", WMTS_100));
    let layer = client.wmts_image_layer(WMTS_ADDRESS, "relief").await.unwrap();
    assert_eq!(layer.format_mime, "image/png");
    assert_eq!(layer.binding.service_type, ServiceType::Wmts);

    let url = layer
        .tile_url(&layer.level_set, TileCoord::new(3, 2, 5))
        .unwrap();
    assert_eq!(
        url,
        "https://tiles.example.com/relief/default/EPSG4326/EPSG4326:3/2/5.png"
    );
}

#[tokio::test]
async fn test_wmts_kvp_request() {
    let (client, _) = client(RecordingFetcher::new().respond("GetCapabilities", WMTS_100));
    let layer = client.wmts_image_layer(WMTS_ADDRESS, "roads").await.unwrap();

    let url = layer
        .tile_url(&layer.level_set, TileCoord::new(1, 0, 2))
        .unwrap();
    let params = query(&url);
    assert_eq!(params["REQUEST"], "GetTile");
    assert_eq!(params["LAYER"], "roads");
    assert_eq!(params["STYLE"], "line");
    assert_eq!(params["TILEMATRIXSET"], "EPSG4326");
    assert_eq!(params["TILEMATRIX"], "EPSG4326:1");
    assert_eq!(params["TILEROW"], "0");
    assert_eq!(params["TILECOL"], "2");
}

#[tokio::test]
async fn test_wmts_tile_outside_pyramid() {
    let (client, _) = client(RecordingFetcher::new().respond("GetCapabilities", WMTS_100));
    let layer = client.wmts_image_layer(WMTS_ADDRESS, "relief").await.unwrap();
    let err = layer
        .tile_url(&layer.level_set, TileCoord::new(4, 0, 0))
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidParameter { .. }));
}

#[tokio::test]
async fn test_wcs100_coverage_request() {
    let (client, fetcher) =
        client(RecordingFetcher::new().respond("DescribeCoverage", WCS_100_DESCRIBE));
    let coverage = client.wcs100_coverage(WCS_ADDRESS, "srtm30").await.unwrap();
    assert_eq!(coverage.level_set.num_levels(), 8);

    let describe = query(&fetcher.requests()[0]);
    assert_eq!(describe["COVERAGE"], "srtm30");

    let url = coverage
        .tile_url(&coverage.level_set, TileCoord::new(0, 0, 1))
        .unwrap();
    let params = query(&url);
    assert_eq!(params["REQUEST"], "GetCoverage");
    assert_eq!(params["CRS"], "EPSG:4326");
    assert_eq!(params["BBOX"], "0,-90,180,90");
    assert_eq!(params["WIDTH"], "256");
    assert_eq!(params["FORMAT"], "GeoTIFF");
}

#[tokio::test]
async fn test_wcs100_projected_only_fails() {
    let (client, _) =
        client(RecordingFetcher::new().respond("DescribeCoverage", WCS_100_PROJECTED_ONLY));
    let err = client.wcs100_coverage(WCS_ADDRESS, "utm_dem").await.unwrap_err();
    assert!(matches!(err, CacheError::Negotiation { .. }));
}

#[tokio::test]
async fn test_wcs201_coverage_request() {
    let (client, _) =
        client(RecordingFetcher::new().respond("DescribeCoverage", WCS_201_DESCRIBE));
    let coverage = client.wcs201_coverage(WCS_ADDRESS, "gebco").await.unwrap();
    assert_eq!(coverage.level_set.num_levels(), 9);

    let sector = BoundingBox::new(-67.5, 22.5, -45.0, 45.0);
    let url = coverage.source.coverage_url(&sector, 256, 256).unwrap();
    let pairs: Vec<(String, String)> = Url::parse(&url)
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let subsets: Vec<&str> = pairs
        .iter()
        .filter(|(k, _)| k == "SUBSET")
        .map(|(_, v)| v.as_str())
        .collect();
    assert_eq!(subsets, vec!["Lat(22.5,45)", "Long(-67.5,-45)"]);
    assert!(pairs.contains(&("COVERAGEID".to_string(), "gebco".to_string())));
    assert!(pairs.contains(&("SCALESIZE".to_string(), "Long(256),Lat(256)".to_string())));
}

#[tokio::test]
async fn test_service_exception_is_reported() {
    let (client, _) = client(RecordingFetcher::new().respond("GetCapabilities", SERVICE_EXCEPTION));
    let err = client.wms_image_layer(WMS_ADDRESS, &["bmng"]).await.unwrap_err();
    match err {
        CacheError::ServiceException(message) => assert!(message.contains("LayerNotDefined")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_failures_are_transient() {
    let (client, _) = client(
        RecordingFetcher::new()
            .fail("GetCapabilities", 503)
            .time_out("DescribeCoverage"),
    );
    let err = client.wms_image_layer(WMS_ADDRESS, &["bmng"]).await.unwrap_err();
    assert!(err.is_transient());
    let err = client.wcs100_coverage(WCS_ADDRESS, "srtm30").await.unwrap_err();
    assert!(matches!(err, CacheError::Timeout(_)));
}

#[tokio::test]
async fn test_binding_rebuilds_offline() {
    let (client, fetcher) = client(RecordingFetcher::new());
    let binding = WebServiceBinding {
        service_type: ServiceType::Wms,
        service_address: WMS_ADDRESS.to_string(),
        service_metadata: Some(WMS_130.to_string()),
        layer_name: Some("bmng,boundaries".to_string()),
        output_format: Some("image/png".to_string()),
        is_transparent: true,
    };
    let layer = client.image_layer_from_binding(&binding).await.unwrap();
    assert_eq!(layer.name, "bmng,boundaries");
    assert!(fetcher.requests().is_empty());

    let coverage_binding = WebServiceBinding {
        service_type: ServiceType::Wcs201,
        service_address: WCS_ADDRESS.to_string(),
        service_metadata: Some(WCS_201_DESCRIBE.to_string()),
        layer_name: Some("gebco".to_string()),
        output_format: None,
        is_transparent: false,
    };
    let coverage = client.coverage_from_binding(&coverage_binding).await.unwrap();
    assert_eq!(coverage.name, "gebco");
    assert!(fetcher.requests().is_empty());

    assert!(matches!(
        client.coverage_from_binding(&binding).await,
        Err(CacheError::InvalidParameter { .. })
    ));
}

#[tokio::test]
async fn test_binding_without_metadata_fetches() {
    let (client, fetcher) = client(RecordingFetcher::new().respond("GetCapabilities", WMTS_100));
    let binding = WebServiceBinding {
        service_type: ServiceType::Wmts,
        service_address: WMTS_ADDRESS.to_string(),
        service_metadata: None,
        layer_name: Some("roads".to_string()),
        output_format: None,
        is_transparent: true,
    };
    let layer = client.image_layer_from_binding(&binding).await.unwrap();
    assert_eq!(layer.name, "roads");
    assert_eq!(fetcher.request_count("GetCapabilities"), 1);
}
