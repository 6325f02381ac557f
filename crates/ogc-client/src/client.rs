//! Entry point for building remote layers and coverages.

use crate::config::ClientConfig;
use crate::http::{check_service_exception, Fetch, HttpClient};
use crate::source::{RemoteCoverage, RemoteImageLayer};
use crate::wcs::{self, Wcs100Coverage, Wcs201Coverage};
use crate::wms::{self, WmsCapabilities};
use crate::wmts::{self, WmtsCapabilities};
use bytes::Bytes;
use std::sync::Arc;
use tile_common::{CacheError, CacheResult, ServiceType, WebServiceBinding};
use tracing::{info, instrument, warn};

/// Default tile size for pyramids derived from capabilities.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Fetches capability documents and negotiates remote sources.
#[derive(Clone)]
pub struct OgcClient {
    fetcher: Arc<dyn Fetch>,
    tile_size: u32,
}

impl std::fmt::Debug for OgcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OgcClient")
            .field("tile_size", &self.tile_size)
            .finish_non_exhaustive()
    }
}

impl OgcClient {
    /// Client backed by reqwest.
    pub fn new(config: &ClientConfig) -> CacheResult<Self> {
        Ok(Self::with_fetcher(Arc::new(HttpClient::new(config)?)))
    }

    /// Client backed by any fetcher.
    pub fn with_fetcher(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }

    /// Tile size used for WMS and WCS pyramids.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// GET a URL, rejecting OGC exception reports served as content.
    pub async fn fetch(&self, url: &str) -> CacheResult<Bytes> {
        let body = self.fetcher.fetch(url).await?;
        check_service_exception(&body)?;
        Ok(body)
    }

    async fn fetch_document(&self, url: &str) -> CacheResult<String> {
        let body = self.fetch(url).await?;
        String::from_utf8(body.to_vec())
            .map_err(|e| CacheError::Xml(format!("Response from {} is not UTF-8: {}", url, e)))
    }

    // ========================================================================
    // WMS
    // ========================================================================

    /// Fetch WMS capabilities, returning the parsed and raw document.
    pub async fn wms_capabilities(&self, address: &str) -> CacheResult<(WmsCapabilities, String)> {
        let document = self.fetch_document(&wms::capabilities_url(address)?).await?;
        Ok((WmsCapabilities::parse(&document)?, document))
    }

    /// Negotiate a WMS layer, or several composited in one request.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn wms_image_layer(
        &self,
        address: &str,
        layer_names: &[&str],
    ) -> CacheResult<RemoteImageLayer> {
        let (capabilities, document) = self.wms_capabilities(address).await?;
        wms::image_layer(
            &capabilities,
            address,
            layer_names,
            self.tile_size,
            Some(&document),
        )
    }

    /// Every named layer of a WMS service that negotiates.
    ///
    /// Layers failing negotiation are logged and skipped.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn wms_image_layers(&self, address: &str) -> CacheResult<Vec<RemoteImageLayer>> {
        let (capabilities, document) = self.wms_capabilities(address).await?;
        let mut layers = Vec::new();
        for name in capabilities.layer_names() {
            match wms::image_layer(&capabilities, address, &[name], self.tile_size, Some(&document)) {
                Ok(layer) => layers.push(layer),
                Err(e) => warn!(layer = %name, error = %e, "Skipping WMS layer"),
            }
        }
        info!(count = layers.len(), "Listed WMS layers");
        Ok(layers)
    }

    // ========================================================================
    // WMTS
    // ========================================================================

    pub async fn wmts_capabilities(&self, address: &str) -> CacheResult<(WmtsCapabilities, String)> {
        let document = self.fetch_document(&wmts::capabilities_url(address)?).await?;
        Ok((WmtsCapabilities::parse(&document)?, document))
    }

    #[instrument(skip(self), fields(address = %address))]
    pub async fn wmts_image_layer(&self, address: &str, identifier: &str) -> CacheResult<RemoteImageLayer> {
        let (capabilities, document) = self.wmts_capabilities(address).await?;
        wmts::image_layer(&capabilities, address, identifier, Some(&document))
    }

    // ========================================================================
    // WCS
    // ========================================================================

    #[instrument(skip(self), fields(address = %address))]
    pub async fn wcs100_coverage(&self, address: &str, coverage: &str) -> CacheResult<RemoteCoverage> {
        let url = wcs::describe_coverage_100_url(address, coverage)?;
        let document = self.fetch_document(&url).await?;
        let description = Wcs100Coverage::parse(&document, Some(coverage))?;
        wcs::coverage_100(&description, address, self.tile_size, Some(&document))
    }

    #[instrument(skip(self), fields(address = %address))]
    pub async fn wcs201_coverage(&self, address: &str, coverage_id: &str) -> CacheResult<RemoteCoverage> {
        let url = wcs::describe_coverage_201_url(address, coverage_id)?;
        let document = self.fetch_document(&url).await?;
        let description = Wcs201Coverage::parse(&document, Some(coverage_id))?;
        wcs::coverage_201(&description, address, self.tile_size, Some(&document))
    }

    // ========================================================================
    // Stored bindings
    // ========================================================================

    /// Rebuild an imagery source from a stored binding.
    ///
    /// The stored capabilities document is used when present, so no request
    /// is made; otherwise capabilities are fetched again.
    pub async fn image_layer_from_binding(
        &self,
        binding: &WebServiceBinding,
    ) -> CacheResult<RemoteImageLayer> {
        let layer_name = binding_layer(binding)?;
        let address = binding.service_address.as_str();
        let stored = binding.service_metadata.as_deref();

        match binding.service_type {
            ServiceType::Wms => {
                let names: Vec<&str> = layer_name.split(',').map(str::trim).collect();
                match stored {
                    Some(document) => wms::image_layer(
                        &WmsCapabilities::parse(document)?,
                        address,
                        &names,
                        self.tile_size,
                        Some(document),
                    ),
                    None => self.wms_image_layer(address, &names).await,
                }
            }
            ServiceType::Wmts => match stored {
                Some(document) => wmts::image_layer(
                    &WmtsCapabilities::parse(document)?,
                    address,
                    layer_name,
                    Some(document),
                ),
                None => self.wmts_image_layer(address, layer_name).await,
            },
            other => Err(CacheError::invalid_parameter(
                "service_type",
                format!("{} does not serve imagery", other),
            )),
        }
    }

    /// Rebuild an elevation source from a stored binding.
    pub async fn coverage_from_binding(&self, binding: &WebServiceBinding) -> CacheResult<RemoteCoverage> {
        let name = binding_layer(binding)?;
        let address = binding.service_address.as_str();
        let stored = binding.service_metadata.as_deref();

        match binding.service_type {
            ServiceType::Wcs100 => match stored {
                Some(document) => wcs::coverage_100(
                    &Wcs100Coverage::parse(document, Some(name))?,
                    address,
                    self.tile_size,
                    Some(document),
                ),
                None => self.wcs100_coverage(address, name).await,
            },
            ServiceType::Wcs201 => match stored {
                Some(document) => wcs::coverage_201(
                    &Wcs201Coverage::parse(document, Some(name))?,
                    address,
                    self.tile_size,
                    Some(document),
                ),
                None => self.wcs201_coverage(address, name).await,
            },
            other => Err(CacheError::invalid_parameter(
                "service_type",
                format!("{} does not serve coverages", other),
            )),
        }
    }
}

fn binding_layer(binding: &WebServiceBinding) -> CacheResult<&str> {
    binding
        .layer_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CacheError::invalid_parameter("layer_name", "binding names no layer"))
}
