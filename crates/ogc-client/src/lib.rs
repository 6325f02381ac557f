//! OGC web service clients for the tile cache.
//!
//! Fetches and parses WMS 1.3.0, WMTS 1.0.0 and WCS 1.0.0/2.0.1 capability
//! documents, negotiates a geographic CRS and output format, and produces
//! [`RemoteImageLayer`] and [`RemoteCoverage`] values that build per-tile
//! request URLs.

pub mod client;
pub mod config;
pub mod http;
pub mod negotiation;
pub mod source;
pub mod wcs;
pub mod wms;
pub mod wmts;
pub mod xml;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{OgcClient, DEFAULT_TILE_SIZE};
pub use config::ClientConfig;
pub use http::{build_url, check_service_exception, Fetch, HttpClient};
pub use source::{CoverageUrlSource, RemoteCoverage, RemoteImageLayer, TileUrlSource};
pub use wcs::{Wcs100Coverage, Wcs201Coverage};
pub use wms::WmsCapabilities;
pub use wmts::WmtsCapabilities;
