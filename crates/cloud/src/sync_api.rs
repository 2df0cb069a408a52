//! Blocking (synchronous) API.
//!
//! Wraps the async [`StacClient`] and [`RemoteFile`] around one shared
//! Tokio runtime so callers (the monitor's worker threads, the CLI) don't
//! need to manage their own async runtime.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::error::{CloudError, Result};
use crate::range_reader::{RangeReaderOptions, RemoteFile};
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};
use crate::stac_models::{StacItem, StacItemCollection, StacSearchParams};

/// Build a single-threaded runtime with IO and timers enabled.
///
/// `block_on` may be called on it from several threads at once; each call
/// drives its own future.
pub fn runtime() -> Result<Arc<Runtime>> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CloudError::Network(format!("failed to start runtime: {e}")))?;
    Ok(Arc::new(rt))
}

/// Blocking wrapper around [`StacClient`].
pub struct StacClientBlocking {
    rt: Arc<Runtime>,
    inner: StacClient,
}

impl StacClientBlocking {
    /// Create a new blocking STAC client with its own runtime.
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        Self::with_runtime(catalog, options, runtime()?)
    }

    /// Create a blocking client on an existing runtime.
    pub fn with_runtime(
        catalog: StacCatalog,
        options: StacClientOptions,
        rt: Arc<Runtime>,
    ) -> Result<Self> {
        let inner = StacClient::new(catalog, options)?;
        Ok(Self { rt, inner })
    }

    pub fn catalog(&self) -> &StacCatalog {
        self.inner.catalog()
    }

    /// Runtime shared with remote reads opened through [`Self::open_asset`].
    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.rt)
    }

    /// Execute a single search request (blocking).
    pub fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        self.rt.block_on(self.inner.search(params))
    }

    /// Search with automatic pagination (blocking).
    pub fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        self.rt.block_on(self.inner.search_all(params))
    }

    /// Sign an asset href for Planetary Computer (blocking).
    pub fn sign_asset_href(&self, href: &str, collection: &str) -> Result<String> {
        self.rt.block_on(self.inner.sign_asset_href(href, collection))
    }

    /// Sign `href` if needed and open it for random access.
    pub fn open_asset(
        &self,
        href: &str,
        collection: &str,
        options: &RangeReaderOptions,
    ) -> Result<RemoteFile> {
        let url = self.sign_asset_href(href, collection)?;
        RemoteFile::open(&url, options, self.runtime())
    }
}
