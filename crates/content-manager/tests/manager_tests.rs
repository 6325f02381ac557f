//! Cache fill, listing and removal through the content manager.

use content_manager::{CacheConfig, ContentManager, ElevationResult, TileResult};
use elevation_codec::{CoverageDatatype, CoverageEncoding, SampleBuffer};
use geopackage::{ContainerConfig, GeoPackage};
use ogc_client::testing::RecordingFetcher;
use ogc_client::OgcClient;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use test_utils::capabilities::*;
use test_utils::{create_test_grid, fake_png_bytes, file_checksum, TempContainer};
use tile_common::{BoundingBox, CacheError, ImageFormat, ServiceType, TileCoord, WebServiceBinding};

async fn open_container(temp: &TempContainer) -> Arc<GeoPackage> {
    Arc::new(
        GeoPackage::open(temp.path(), &ContainerConfig::default())
            .await
            .unwrap(),
    )
}

fn manager(
    container: Arc<GeoPackage>,
    fetcher: RecordingFetcher,
) -> (ContentManager, Arc<RecordingFetcher>) {
    let fetcher = Arc::new(fetcher);
    let client = OgcClient::with_fetcher(fetcher.clone());
    (ContentManager::new(container, client), fetcher)
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn float_tiff(values: Vec<f32>, width: u32, height: u32) -> Vec<u8> {
    elevation_codec::encode(&SampleBuffer::Float(values), width, height, CoverageDatatype::Float)
        .unwrap()
}

// ============================================================================
// Imagery
// ============================================================================

#[tokio::test]
async fn test_cold_start_tile_fetch() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, fetcher) = manager(
        container.clone(),
        RecordingFetcher::new()
            .respond("GetCapabilities", WMS_130)
            .respond("GetMap", fake_png_bytes(7)),
    );

    let remote = manager
        .client()
        .wms_image_layer(WMS_ADDRESS, &["bmng"])
        .await
        .unwrap();
    let layer = manager
        .setup_image_layer_cache(&remote, "bmng", true)
        .await
        .unwrap();
    let before = container.content("bmng").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let coord = TileCoord::new(3, 2, 5);
    assert_eq!(layer.get_tile(coord).await, TileResult::Tile(fake_png_bytes(7)));

    let get_maps: Vec<String> = fetcher
        .requests()
        .into_iter()
        .filter(|url| url.contains("GetMap"))
        .collect();
    assert_eq!(get_maps.len(), 1);
    assert_eq!(query(&get_maps[0])["BBOX"], "22.5,-67.5,45,-45");

    assert_eq!(container.tile_count("bmng").await.unwrap(), 1);
    let after = container.content("bmng").await.unwrap().unwrap();
    assert!(after.last_change_time().unwrap() > before.last_change_time().unwrap());

    // Second request is served from the container.
    assert_eq!(layer.get_tile(coord).await, TileResult::Tile(fake_png_bytes(7)));
    assert_eq!(fetcher.request_count("GetMap"), 1);

    let stats = manager.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.writes, 1);
}

#[tokio::test]
async fn test_listing_rebuilds_remote_from_stored_capabilities() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    {
        let (manager, _) = manager(
            container.clone(),
            RecordingFetcher::new().respond("GetCapabilities", WMS_130),
        );
        let remote = manager
            .client()
            .wms_image_layer(WMS_ADDRESS, &["bmng"])
            .await
            .unwrap();
        manager
            .setup_image_layer_cache(&remote, "bmng", true)
            .await
            .unwrap();
    }

    let (manager, fetcher) = manager(
        container,
        RecordingFetcher::new().respond("GetMap", fake_png_bytes(1)),
    );
    let layers = manager.list_image_layers(None).await.unwrap();
    assert_eq!(layers.len(), 1);

    let descriptor = layers[0].descriptor();
    assert_eq!(descriptor.name, "bmng");
    assert_eq!(descriptor.level_count, 11);
    assert!(descriptor.has_remote);
    assert_eq!(descriptor.service_type, Some(ServiceType::Wms));
    assert_eq!(fetcher.request_count("GetCapabilities"), 0);

    let tile = layers[0].get_tile(TileCoord::new(1, 0, 0)).await;
    assert_eq!(tile, TileResult::Tile(fake_png_bytes(1)));
}

#[tokio::test]
async fn test_listing_omits_layers_failing_negotiation() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let levels = tile_common::LevelSet::from_tile_pyramid(BoundingBox::global(), 2, 1, 4, 256, 256)
        .unwrap();

    let mercator = WebServiceBinding {
        service_type: ServiceType::Wms,
        service_address: WMS_ADDRESS.to_string(),
        service_metadata: Some(WMS_130_MERCATOR_ONLY.to_string()),
        layer_name: Some("osm".to_string()),
        output_format: Some("image/png".to_string()),
        is_transparent: false,
    };
    container
        .setup_tiles_content("osm", &levels, ImageFormat::Png, Some(&mercator))
        .await
        .unwrap();
    container
        .setup_tiles_content("local", &levels, ImageFormat::Png, None)
        .await
        .unwrap();

    let (manager, _) = manager(container, RecordingFetcher::new());
    let names: Vec<String> = manager
        .list_image_layers(None)
        .await
        .unwrap()
        .iter()
        .map(|l| l.name().to_string())
        .collect();
    assert_eq!(names, vec!["local"]);

    let err = manager.image_layer("osm").await.unwrap_err();
    assert!(matches!(err, CacheError::Negotiation { .. }));
}

#[tokio::test]
async fn test_unreachable_service_falls_back_to_cache_only() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let levels = tile_common::LevelSet::from_tile_pyramid(BoundingBox::global(), 2, 1, 4, 256, 256)
        .unwrap();
    let binding = WebServiceBinding {
        service_type: ServiceType::Wmts,
        service_address: WMTS_ADDRESS.to_string(),
        service_metadata: None,
        layer_name: Some("relief".to_string()),
        output_format: None,
        is_transparent: false,
    };
    container
        .setup_tiles_content("relief", &levels, ImageFormat::Png, Some(&binding))
        .await
        .unwrap();
    container
        .write_tile("relief", TileCoord::new(0, 0, 0), &fake_png_bytes(3))
        .await
        .unwrap();

    let (manager, _) = manager(container, RecordingFetcher::new().fail("GetCapabilities", 503));
    let layers = manager.list_image_layers(Some("relief")).await.unwrap();
    assert_eq!(layers.len(), 1);
    assert!(!layers[0].has_remote());

    assert_eq!(
        layers[0].get_tile(TileCoord::new(0, 0, 0)).await,
        TileResult::Tile(fake_png_bytes(3))
    );
    assert_eq!(
        layers[0].get_tile(TileCoord::new(0, 0, 1)).await,
        TileResult::Unavailable
    );
}

#[tokio::test]
async fn test_failed_fetch_is_unavailable_and_not_stored() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, fetcher) = manager(
        container.clone(),
        RecordingFetcher::new()
            .respond("GetCapabilities", WMS_130)
            .respond("BBOX=-90%2C0%2C90%2C180", SERVICE_EXCEPTION)
            .fail("GetMap", 500),
    );
    let remote = manager
        .client()
        .wms_image_layer(WMS_ADDRESS, &["bmng"])
        .await
        .unwrap();
    let layer = manager
        .setup_image_layer_cache(&remote, "bmng", false)
        .await
        .unwrap();

    // Served an exception report instead of an image.
    assert_eq!(layer.get_tile(TileCoord::new(0, 0, 1)).await, TileResult::Unavailable);
    // HTTP 500.
    assert_eq!(layer.get_tile(TileCoord::new(0, 0, 0)).await, TileResult::Unavailable);
    // Outside the pyramid, never requested.
    assert_eq!(layer.get_tile(TileCoord::new(0, 3, 3)).await, TileResult::Unavailable);

    assert_eq!(fetcher.request_count("GetMap"), 2);
    assert_eq!(container.tile_count("bmng").await.unwrap(), 0);
    assert_eq!(manager.stats().fetch_failures, 2);
    assert!(container.web_service("bmng").await.unwrap().is_none());
}

#[tokio::test]
async fn test_seed_fetches_missing_tiles_once() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, fetcher) = manager(
        container.clone(),
        RecordingFetcher::new()
            .respond("GetCapabilities", WMS_130)
            .respond("GetMap", fake_png_bytes(9)),
    );
    let remote = manager
        .client()
        .wms_image_layer(WMS_ADDRESS, &["bmng"])
        .await
        .unwrap();
    let layer = manager
        .setup_image_layer_cache(&remote, "bmng", true)
        .await
        .unwrap();

    let sector = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
    let report = layer
        .seed(&sector, 1, manager.seed_concurrency())
        .await
        .unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.written, 2);
    assert_eq!(container.tile_count("bmng").await.unwrap(), 2);

    let report = layer.seed(&sector, 1, 4).await.unwrap();
    assert_eq!(report.cached, 2);
    assert_eq!(report.written, 0);
    assert_eq!(fetcher.request_count("GetMap"), 2);
}

#[tokio::test]
async fn test_setup_reuses_compatible_and_rejects_incompatible() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, _) = manager(
        container.clone(),
        RecordingFetcher::new().respond("GetCapabilities", WMS_130),
    );
    let remote = manager
        .client()
        .wms_image_layer(WMS_ADDRESS, &["bmng"])
        .await
        .unwrap();

    manager
        .setup_image_layer_cache(&remote, "bmng", true)
        .await
        .unwrap();
    manager
        .setup_image_layer_cache(&remote, "bmng", true)
        .await
        .unwrap();
    assert_eq!(container.contents().await.unwrap().len(), 1);

    let wide = manager
        .client()
        .clone()
        .with_tile_size(512)
        .wms_image_layer(WMS_ADDRESS, &["bmng"])
        .await
        .unwrap();
    let err = manager
        .setup_image_layer_cache(&wide, "bmng", true)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Incompatible { .. }));
}

#[tokio::test]
async fn test_clear_then_delete() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, _) = manager(
        container.clone(),
        RecordingFetcher::new()
            .respond("GetCapabilities", WMS_130)
            .respond("GetMap", fake_png_bytes(2)),
    );
    let remote = manager
        .client()
        .wms_image_layer(WMS_ADDRESS, &["boundaries"])
        .await
        .unwrap();
    let layer = manager
        .setup_image_layer_cache(&remote, "Country Boundaries", true)
        .await
        .unwrap();
    assert_eq!(layer.table_name(), "Country_Boundaries");
    layer.get_tile(TileCoord::new(0, 0, 1)).await;
    assert_eq!(container.tile_count("Country_Boundaries").await.unwrap(), 1);

    manager.clear_content("Country Boundaries").await.unwrap();
    assert_eq!(container.tile_count("Country_Boundaries").await.unwrap(), 0);
    assert_eq!(manager.list_image_layers(None).await.unwrap().len(), 1);

    assert!(manager.delete_content("Country Boundaries").await.unwrap());
    assert!(manager.list_image_layers(None).await.unwrap().is_empty());
    assert!(!manager.delete_content("Country Boundaries").await.unwrap());
}

// ============================================================================
// Elevation
// ============================================================================

#[tokio::test]
async fn test_elevation_fetch_is_stored_in_container_encoding() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, fetcher) = manager(
        container.clone(),
        RecordingFetcher::new()
            .respond("DescribeCoverage", WCS_100_DESCRIBE)
            .respond("GetCoverage", float_tiff(create_test_grid(4, 4), 4, 4)),
    );
    let remote = manager
        .client()
        .wcs100_coverage(WCS_ADDRESS, "srtm30")
        .await
        .unwrap();
    let coverage = manager
        .setup_elevation_coverage_cache(&remote, "srtm30", &CoverageEncoding::integer(), true)
        .await
        .unwrap();

    let coord = TileCoord::new(0, 0, 1);
    let raster = match coverage.get_elevation(coord).await {
        ElevationResult::Raster(raster) => raster,
        ElevationResult::Unavailable => panic!("expected a raster"),
    };
    assert_eq!(raster.width, 4);
    assert_eq!(raster.encoding.datatype, CoverageDatatype::Integer);
    assert_eq!(raster.height(2, 1), Some(21.0));

    let row = container.read_tile_row("srtm30", coord).await.unwrap().unwrap();
    let ancillary = container
        .gridded_tile("srtm30", row.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ancillary.max, Some(33.0));
    assert_eq!(ancillary.min, Some(0.0));

    // Cached copy decodes to the same heights without another request.
    let cached = coverage.get_elevation(coord).await.into_raster().unwrap();
    assert_eq!(cached.heights(), raster.heights());
    assert_eq!(fetcher.request_count("GetCoverage"), 1);

    let listed = manager.list_elevation_coverages(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    let descriptor = listed[0].descriptor();
    assert_eq!(descriptor.layer.level_count, 8);
    assert_eq!(descriptor.encoding, CoverageEncoding::integer());
    assert_eq!(descriptor.layer.service_type, Some(ServiceType::Wcs100));
}

#[tokio::test]
async fn test_reused_coverage_keeps_stored_encoding() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, fetcher) = manager(
        container.clone(),
        RecordingFetcher::new()
            .respond("DescribeCoverage", WCS_100_DESCRIBE)
            .respond("GetCoverage", float_tiff(vec![1000.0; 4], 2, 2)),
    );
    let remote = manager
        .client()
        .wcs100_coverage(WCS_ADDRESS, "srtm30")
        .await
        .unwrap();
    let decimetres = CoverageEncoding {
        data_scale: 0.1,
        ..CoverageEncoding::integer()
    };
    manager
        .setup_elevation_coverage_cache(&remote, "srtm30", &decimetres, true)
        .await
        .unwrap();

    let err = manager
        .setup_elevation_coverage_cache(&remote, "srtm30", &CoverageEncoding::integer(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Incompatible { .. }));

    let coverage = manager
        .setup_elevation_coverage_cache(&remote, "srtm30", &decimetres, true)
        .await
        .unwrap();
    assert_eq!(coverage.encoding().data_scale, 0.1);

    let coord = TileCoord::new(0, 0, 1);
    let fetched = coverage.get_elevation(coord).await.into_raster().unwrap();
    test_utils::assert_approx_eq!(fetched.height(0, 0).unwrap(), 1000.0, 1e-6);

    let reopened = manager.elevation_coverage("srtm30").await.unwrap();
    let stored = reopened.get_elevation(coord).await.into_raster().unwrap();
    test_utils::assert_approx_eq!(stored.height(0, 0).unwrap(), 1000.0, 1e-6);
    assert_eq!(fetcher.request_count("GetCoverage"), 1);
}

#[tokio::test]
async fn test_height_at_position() {
    let temp = TempContainer::default();
    let container = open_container(&temp).await;
    let (manager, _) = manager(
        container,
        RecordingFetcher::new()
            .respond("DescribeCoverage", WCS_201_DESCRIBE)
            .respond("GetCoverage", float_tiff(vec![125.5; 4], 2, 2)),
    );
    let remote = manager
        .client()
        .wcs201_coverage(WCS_ADDRESS, "gebco")
        .await
        .unwrap();
    let coverage = manager
        .setup_elevation_coverage_cache(&remote, "gebco", &CoverageEncoding::float(), false)
        .await
        .unwrap();

    let sector = coverage.level_set().sector;
    let lon = (sector.min_x + sector.max_x) / 2.0;
    let lat = (sector.min_y + sector.max_y) / 2.0;
    assert_eq!(coverage.height_at(lon, lat).await, Some(125.5));
    assert_eq!(coverage.height_at(sector.max_x + 1.0, lat).await, None);
}

// ============================================================================
// Read-only
// ============================================================================

#[tokio::test]
async fn test_read_only_serves_without_writing() {
    let temp = TempContainer::default();
    {
        let container = open_container(&temp).await;
        let (manager, _) = manager(
            container.clone(),
            RecordingFetcher::new()
                .respond("GetCapabilities", WMS_130)
                .respond("GetMap", fake_png_bytes(4)),
        );
        let remote = manager
            .client()
            .wms_image_layer(WMS_ADDRESS, &["bmng"])
            .await
            .unwrap();
        let layer = manager
            .setup_image_layer_cache(&remote, "bmng", true)
            .await
            .unwrap();
        layer.get_tile(TileCoord::new(0, 0, 0)).await;
        container.close().await;
    }
    let checksum = file_checksum(temp.path());

    let fetcher = Arc::new(RecordingFetcher::new().respond("GetMap", fake_png_bytes(5)));
    let config = CacheConfig {
        path: temp.path().to_path_buf(),
        read_only: true,
        ..CacheConfig::default()
    };
    let manager = ContentManager::open(&config, OgcClient::with_fetcher(fetcher.clone()))
        .await
        .unwrap();

    let layer = manager.image_layer("bmng").await.unwrap();
    assert!(layer.has_remote());
    assert_eq!(
        layer.get_tile(TileCoord::new(0, 0, 0)).await,
        TileResult::Tile(fake_png_bytes(4))
    );
    assert_eq!(
        layer.get_tile(TileCoord::new(0, 0, 1)).await,
        TileResult::Tile(fake_png_bytes(5))
    );
    assert_eq!(manager.stats().writes, 0);

    let sector = BoundingBox::global();
    assert!(matches!(
        layer.seed(&sector, 1, 2).await,
        Err(CacheError::ReadOnly(_))
    ));
    assert!(matches!(
        manager.clear_content("bmng").await,
        Err(CacheError::ReadOnly(_))
    ));
    assert!(matches!(
        manager.delete_content("bmng").await,
        Err(CacheError::ReadOnly(_))
    ));

    manager.container().close().await;
    assert_eq!(file_checksum(temp.path()), checksum);
}
