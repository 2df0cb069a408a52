//! # vegmon cloud
//!
//! Remote access to Sentinel-2 imagery published through STAC catalogs.
//!
//! - [`stac_client`]: async STAC Item Search with pagination, cloud-cover
//!   queries and Planetary Computer asset signing
//! - [`stac_models`]: serde models plus Sentinel-2 property accessors
//!   (product id, datatake id, acquisition time, EPSG)
//! - [`http`]: range requests with retry and exponential backoff
//! - [`range_reader`]: a blocking `Read + Seek` view of a remote file backed
//!   by an LRU block cache, so GeoTIFF decoders only fetch the tiles they
//!   touch
//! - [`blocking`]: synchronous wrappers for callers without a runtime

pub mod cache;
pub mod error;
pub mod http;
pub mod range_reader;
pub mod stac_client;
pub mod stac_models;
pub mod sync_api;

pub use error::{CloudError, Result};
pub use range_reader::{RangeReaderOptions, RemoteFile};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};

/// Blocking API re-exported as `blocking` module.
pub mod blocking {
    pub use crate::sync_api::*;
}
