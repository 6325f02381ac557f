//! Façade over the container and the OGC clients.
//!
//! Listing turns container contents into layer handles. Content with a
//! recorded web service gets its remote source rebuilt, from the stored
//! capabilities document when there is one. A remote that fails
//! negotiation drops the layer from the listing; any other failure leaves
//! the layer usable from the cache alone.

use crate::config::CacheConfig;
use crate::elevation::ElevationCoverage;
use crate::imagery::ImageLayer;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use elevation_codec::CoverageEncoding;
use geopackage::{table_name_for, Content, DataType, GeoPackage};
use ogc_client::{OgcClient, RemoteCoverage, RemoteImageLayer};
use std::sync::Arc;
use tile_common::{CacheError, CacheResult, LevelSet, WebServiceBinding};
use tracing::{info, instrument, warn};

/// Entry point for cached imagery and elevation content.
#[derive(Debug, Clone)]
pub struct ContentManager {
    container: Arc<GeoPackage>,
    client: OgcClient,
    stats: Arc<CacheStats>,
    seed_concurrency: usize,
}

impl ContentManager {
    /// Open the container named by `config`.
    ///
    /// A writable container is created when missing; a read-only one must
    /// already exist.
    pub async fn open(config: &CacheConfig, client: OgcClient) -> CacheResult<Self> {
        config.validate().map_err(CacheError::Validation)?;

        let container = if config.read_only {
            GeoPackage::open_read_only(&config.path, &config.container).await?
        } else {
            GeoPackage::open(&config.path, &config.container).await?
        };
        info!(
            path = %config.path.display(),
            read_only = config.read_only,
            "Opened content manager"
        );

        Ok(Self::new(Arc::new(container), client.with_tile_size(config.tile_size))
            .with_seed_concurrency(config.seed_concurrency))
    }

    pub fn new(container: Arc<GeoPackage>, client: OgcClient) -> Self {
        Self {
            container,
            client,
            stats: Arc::new(CacheStats::default()),
            seed_concurrency: CacheConfig::default().seed_concurrency,
        }
    }

    pub fn with_seed_concurrency(mut self, concurrency: usize) -> Self {
        self.seed_concurrency = concurrency.max(1);
        self
    }

    pub fn container(&self) -> &Arc<GeoPackage> {
        &self.container
    }

    pub fn client(&self) -> &OgcClient {
        &self.client
    }

    pub fn seed_concurrency(&self) -> usize {
        self.seed_concurrency
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Cached imagery layers, optionally only the one named `filter`.
    ///
    /// `filter` matches a content identifier or table name.
    #[instrument(skip(self))]
    pub async fn list_image_layers(&self, filter: Option<&str>) -> CacheResult<Vec<ImageLayer>> {
        let contents = self.container.contents_by_type(DataType::Tiles).await?;
        let mut layers = Vec::new();

        for content in contents.into_iter().filter(|c| matches_filter(c, filter)) {
            let table = content.table_name.clone();
            match self.open_image_layer(content).await {
                Ok(layer) => layers.push(layer),
                Err(e) => warn!(table = %table, error = %e, "Skipping image layer"),
            }
        }

        info!(count = layers.len(), "Listed image layers");
        Ok(layers)
    }

    /// Cached elevation coverages, optionally only the one named `filter`.
    #[instrument(skip(self))]
    pub async fn list_elevation_coverages(
        &self,
        filter: Option<&str>,
    ) -> CacheResult<Vec<ElevationCoverage>> {
        let contents = self
            .container
            .contents_by_type(DataType::GriddedCoverage)
            .await?;
        let mut coverages = Vec::new();

        for content in contents.into_iter().filter(|c| matches_filter(c, filter)) {
            let table = content.table_name.clone();
            match self.open_elevation_coverage(content).await {
                Ok(coverage) => coverages.push(coverage),
                Err(e) => warn!(table = %table, error = %e, "Skipping elevation coverage"),
            }
        }

        info!(count = coverages.len(), "Listed elevation coverages");
        Ok(coverages)
    }

    /// A single cached imagery layer by identifier or table name.
    pub async fn image_layer(&self, name: &str) -> CacheResult<ImageLayer> {
        let content = self.require_content(name, DataType::Tiles).await?;
        self.open_image_layer(content).await
    }

    /// A single cached elevation coverage by identifier or table name.
    pub async fn elevation_coverage(&self, name: &str) -> CacheResult<ElevationCoverage> {
        let content = self.require_content(name, DataType::GriddedCoverage).await?;
        self.open_elevation_coverage(content).await
    }

    async fn open_image_layer(&self, content: Content) -> CacheResult<ImageLayer> {
        let level_set = self.stored_level_set(&content).await?;

        let remote = match self.stored_binding(&content.table_name).await? {
            Some(binding) => match self.client.image_layer_from_binding(&binding).await {
                Ok(remote) => Some(remote),
                Err(e @ CacheError::Negotiation { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        table = %content.table_name,
                        service = %binding.service_type,
                        error = %e,
                        "Remote layer unavailable, serving cached tiles only"
                    );
                    None
                }
            },
            None => None,
        };

        Ok(ImageLayer::new(
            content,
            level_set,
            remote,
            self.container.clone(),
            self.client.clone(),
            self.stats.clone(),
        ))
    }

    async fn open_elevation_coverage(&self, content: Content) -> CacheResult<ElevationCoverage> {
        let level_set = self.stored_level_set(&content).await?;
        let encoding = self
            .container
            .gridded_coverage(&content.table_name)
            .await?
            .and_then(|coverage| coverage.encoding())
            .ok_or_else(|| {
                CacheError::validation(format!(
                    "coverage '{}' has no usable gridded coverage row",
                    content.table_name
                ))
            })?;

        let remote = match self.stored_binding(&content.table_name).await? {
            Some(binding) => match self.client.coverage_from_binding(&binding).await {
                Ok(remote) => Some(remote),
                Err(e @ CacheError::Negotiation { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        table = %content.table_name,
                        service = %binding.service_type,
                        error = %e,
                        "Remote coverage unavailable, serving cached tiles only"
                    );
                    None
                }
            },
            None => None,
        };

        Ok(ElevationCoverage::new(
            content,
            level_set,
            encoding,
            remote,
            self.container.clone(),
            self.client.clone(),
            self.stats.clone(),
        ))
    }

    async fn stored_level_set(&self, content: &Content) -> CacheResult<LevelSet> {
        self.container
            .level_set(&content.table_name)
            .await?
            .ok_or_else(|| {
                CacheError::validation(format!(
                    "content '{}' has no tile matrices",
                    content.table_name
                ))
            })
    }

    async fn stored_binding(&self, table_name: &str) -> CacheResult<Option<WebServiceBinding>> {
        let Some(service) = self.container.web_service(table_name).await? else {
            return Ok(None);
        };
        let binding = service.binding();
        if binding.is_none() {
            warn!(
                table = %table_name,
                service_type = %service.service_type,
                "Unknown web service type, serving cached tiles only"
            );
        }
        Ok(binding)
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Attach a container entry to an imagery layer negotiated from a service.
    ///
    /// Existing content named `name` is validated and reused; otherwise it
    /// is created. With `write_web_metadata` the service binding, including
    /// the capabilities document, is recorded so the layer can be reopened
    /// offline.
    ///
    /// # Arguments
    /// * `remote` - Layer built from the service's capabilities
    /// * `name` - Content identifier in the container
    /// * `write_web_metadata` - Record the service binding with the content
    #[instrument(skip(self, remote), fields(layer = %remote.name))]
    pub async fn setup_image_layer_cache(
        &self,
        remote: &RemoteImageLayer,
        name: &str,
        write_web_metadata: bool,
    ) -> CacheResult<ImageLayer> {
        let content = if self.container.is_read_only() {
            let content = self.require_content(name, DataType::Tiles).await?;
            self.container
                .validate_tiles_content(&content.table_name, &remote.level_set, remote.format)
                .await?;
            content
        } else {
            let binding = write_web_metadata.then_some(&remote.binding);
            self.container
                .setup_tiles_content(name, &remote.level_set, remote.format, binding)
                .await?
        };

        let level_set = self
            .container
            .level_set(&content.table_name)
            .await?
            .unwrap_or_else(|| remote.level_set.clone());
        info!(table = %content.table_name, levels = level_set.num_levels(), "Image layer cache ready");

        Ok(ImageLayer::new(
            content,
            level_set,
            Some(remote.clone()),
            self.container.clone(),
            self.client.clone(),
            self.stats.clone(),
        ))
    }

    /// Attach a container entry to a coverage negotiated from a service.
    ///
    /// # Arguments
    /// * `remote` - Coverage built from the service's description
    /// * `name` - Content identifier in the container
    /// * `encoding` - How heights are stored in the container
    /// * `write_web_metadata` - Record the service binding with the content
    #[instrument(skip(self, remote, encoding), fields(coverage = %remote.name))]
    pub async fn setup_elevation_coverage_cache(
        &self,
        remote: &RemoteCoverage,
        name: &str,
        encoding: &CoverageEncoding,
        write_web_metadata: bool,
    ) -> CacheResult<ElevationCoverage> {
        let content = if self.container.is_read_only() {
            let content = self.require_content(name, DataType::GriddedCoverage).await?;
            self.container
                .validate_gridded_coverage_content(&content.table_name, &remote.level_set, encoding)
                .await?;
            content
        } else {
            let binding = write_web_metadata.then_some(&remote.binding);
            self.container
                .setup_gridded_coverage_content(name, &remote.level_set, encoding, binding)
                .await?
        };

        let level_set = self
            .container
            .level_set(&content.table_name)
            .await?
            .unwrap_or_else(|| remote.level_set.clone());
        let encoding = self
            .container
            .gridded_coverage(&content.table_name)
            .await?
            .and_then(|coverage| coverage.encoding())
            .unwrap_or(*encoding);
        info!(table = %content.table_name, levels = level_set.num_levels(), "Elevation coverage cache ready");

        Ok(ElevationCoverage::new(
            content,
            level_set,
            encoding,
            Some(remote.clone()),
            self.container.clone(),
            self.client.clone(),
            self.stats.clone(),
        ))
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove content and all of its metadata.
    ///
    /// Returns `false` when nothing is named `name`.
    pub async fn delete_content(&self, name: &str) -> CacheResult<bool> {
        let Some(content) = self.find_content(name).await? else {
            if self.container.is_read_only() {
                return Err(CacheError::ReadOnly(format!("delete '{}'", name)));
            }
            return Ok(false);
        };
        self.container.delete_content(&content.table_name).await
    }

    /// Remove every cached tile of `name`, keeping its metadata.
    pub async fn clear_content(&self, name: &str) -> CacheResult<()> {
        let table = match self.find_content(name).await? {
            Some(content) => content.table_name,
            None => table_name_for(name),
        };
        self.container.clear_content(&table).await
    }

    async fn find_content(&self, name: &str) -> CacheResult<Option<Content>> {
        if let Some(content) = self.container.content_by_identifier(name).await? {
            return Ok(Some(content));
        }
        if let Some(content) = self.container.content(name).await? {
            return Ok(Some(content));
        }
        self.container.content(&table_name_for(name)).await
    }

    async fn require_content(&self, name: &str, data_type: DataType) -> CacheResult<Content> {
        self.find_content(name)
            .await?
            .filter(|c| c.kind() == Some(data_type))
            .ok_or_else(|| CacheError::NotFound(format!("{} content '{}'", data_type.as_str(), name)))
    }
}

fn matches_filter(content: &Content, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(name) => {
            content.display_name() == name
                || content.table_name == name
                || content.table_name == table_name_for(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(table: &str, identifier: Option<&str>) -> Content {
        Content {
            table_name: table.to_string(),
            data_type: "tiles".to_string(),
            identifier: identifier.map(str::to_string),
            description: None,
            last_change: "2024-01-01T00:00:00.000Z".to_string(),
            min_x: None,
            min_y: None,
            max_x: None,
            max_y: None,
            srs_id: Some(4326),
        }
    }

    #[test]
    fn test_matches_filter() {
        let boundaries = content("Country_Boundaries", Some("Country Boundaries"));
        assert!(matches_filter(&boundaries, None));
        assert!(matches_filter(&boundaries, Some("Country Boundaries")));
        assert!(matches_filter(&boundaries, Some("Country_Boundaries")));
        assert!(!matches_filter(&boundaries, Some("Country")));

        let bare = content("bmng", None);
        assert!(matches_filter(&bare, Some("bmng")));
        assert!(!matches_filter(&bare, Some("bmng2")));
    }
}
