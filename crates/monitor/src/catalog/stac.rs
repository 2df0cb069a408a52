//! Catalog backed by a STAC API or a saved ItemCollection

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::{debug, warn};
use vegmon_algorithms::imagery::QualityRule;
use vegmon_cloud::blocking::{runtime, StacClientBlocking};
use vegmon_cloud::stac_client::load_item_collection;
use vegmon_cloud::{RangeReaderOptions, RemoteFile, StacCatalog, StacClientOptions, StacItem, StacSearchParams};
use vegmon_core::io::GeoTiffReader;
use vegmon_core::{GridSpec, Raster, CRS};

use super::{read_onto_grid, Band, Scene, SceneCatalog, SceneQuery};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};

const DEFAULT_COLLECTION: &str = "sentinel-2-l2a";
const PAGE_SIZE: u32 = 100;

/// Where STAC items come from
#[derive(Debug, Clone, PartialEq)]
pub enum StacSource {
    /// Live Item Search against a catalog
    Api(StacCatalog),
    /// A FeatureCollection of items saved to disk
    ItemsFile(PathBuf),
}

/// Scene catalog over STAC items.
///
/// Band assets are read lazily: remote assets through HTTP range requests
/// (signed first on Planetary Computer), local ones from the filesystem.
pub struct StacSceneCatalog {
    client: Option<StacClientBlocking>,
    items: Vec<StacItem>,
    runtime: Arc<Runtime>,
    collection: String,
    quality_keys: &'static [&'static str],
    range: RangeReaderOptions,
}

impl StacSceneCatalog {
    /// Open `source`. `quality` decides which asset serves as the quality
    /// band (`QA60` or `SCL`).
    pub fn open(
        source: StacSource,
        options: StacClientOptions,
        range: RangeReaderOptions,
        quality: &QualityRule,
    ) -> Result<Self> {
        if matches!(quality, QualityRule::Qa60 { .. }) {
            warn!("Sentinel-2 L2A STAC items rarely carry a QA60 asset; scenes without one are not cloud masked");
        }
        let rt = runtime()?;
        let (client, items) = match source {
            StacSource::Api(catalog) => (
                Some(StacClientBlocking::with_runtime(catalog, options, Arc::clone(&rt))?),
                Vec::new(),
            ),
            StacSource::ItemsFile(path) => {
                let collection = load_item_collection(&path)?;
                debug!(path = %path.display(), items = collection.len(), "loaded STAC items");
                (None, collection.features)
            }
        };

        Ok(Self {
            client,
            items,
            runtime: rt,
            collection: DEFAULT_COLLECTION.to_string(),
            quality_keys: quality_asset_keys(quality),
            range,
        })
    }

    /// Catalog described by `config.catalog`: the items file when set,
    /// otherwise a live search against `stac`
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let catalog = &config.catalog;
        let source = match &catalog.items_file {
            Some(path) => StacSource::ItemsFile(path.clone()),
            None => StacSource::Api(StacCatalog::from_str_or_url(&catalog.stac)),
        };
        let timeout = Duration::from_secs(catalog.request_timeout_s);
        let options = StacClientOptions {
            request_timeout: timeout,
            max_retries: catalog.max_retries,
            max_items: catalog.max_items,
        };
        let range = RangeReaderOptions {
            block_size: catalog.block_size_kib * 1024,
            cache_blocks: catalog.cache_blocks,
            request_timeout: timeout,
            max_retries: catalog.max_retries,
        };
        Self::open(source, options, range, &config.quality)
    }

    /// Search a different collection id
    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }

    fn fetch_items(&self, query: &SceneQuery) -> Result<Vec<StacItem>> {
        let Some(client) = &self.client else {
            return Ok(self.items.clone());
        };
        let params = StacSearchParams::new()
            .bbox(query.bbox.min_x, query.bbox.min_y, query.bbox.max_x, query.bbox.max_y)
            .interval(query.interval.start_utc(), query.interval.end_utc())
            .max_cloud_cover(query.max_cloud_percent)
            .collections(&[self.collection.as_str()])
            .sort_by_datetime()
            .limit(PAGE_SIZE);
        Ok(client.search_all(&params)?)
    }

    fn scene_from_item(&self, item: &StacItem) -> Option<Scene> {
        let (Some(acquired), Some(footprint)) = (item.acquired(), item.footprint()) else {
            debug!(id = %item.id, "skipping item without datetime or footprint");
            return None;
        };

        let mut assets = HashMap::new();
        for band in Band::ALL {
            let keys = match band {
                Band::Quality => self.quality_keys,
                other => spectral_asset_keys(other),
            };
            if let Some(asset) = keys.iter().find_map(|k| item.asset(k)) {
                assets.insert(band, asset.href.clone());
            }
        }

        Some(Scene {
            product_id: item.product_id().to_string(),
            datatake_id: item.datatake_id().map(str::to_string),
            acquired,
            cloud_percent: item.cloud_cover().unwrap_or(0.0),
            footprint,
            crs: item.epsg().map(CRS::from_epsg).unwrap_or_else(CRS::unknown),
            assets,
            collection: item.collection.clone(),
        })
    }
}

impl SceneCatalog for StacSceneCatalog {
    fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>> {
        let items = self.fetch_items(query)?;
        let total = items.len();
        let scenes: Vec<Scene> = items
            .iter()
            .filter_map(|item| self.scene_from_item(item))
            .filter(|scene| query.accepts(scene))
            .collect();
        debug!(
            month = %query.interval.label(),
            items = total,
            scenes = scenes.len(),
            "scene search"
        );
        Ok(scenes)
    }

    fn read_band(&self, scene: &Scene, band: Band, grid: &GridSpec) -> Result<Raster<f64>> {
        let href = scene.assets.get(&band).ok_or_else(|| MonitorError::MissingAsset {
            scene: scene.product_id.clone(),
            band: band.to_string(),
        })?;

        if href.starts_with("http://") || href.starts_with("https://") {
            let file = match &self.client {
                Some(client) => {
                    let collection = scene.collection.as_deref().unwrap_or(&self.collection);
                    client.open_asset(href, collection, &self.range)?
                }
                None => RemoteFile::open(href, &self.range, Arc::clone(&self.runtime))?,
            };
            let raster = read_onto_grid(GeoTiffReader::new(file)?, grid)?;
            debug!(scene = %scene.product_id, %band, "read remote band");
            return Ok(raster);
        }

        let path = href.strip_prefix("file://").unwrap_or(href);
        let file = File::open(path).map_err(|e| {
            warn!(scene = %scene.product_id, path, "cannot open band asset");
            MonitorError::Io(e)
        })?;
        read_onto_grid(GeoTiffReader::new(BufReader::new(file))?, grid)
    }
}

/// Asset keys of a spectral band: Earth Search names first, then the
/// Planetary Computer band codes
fn spectral_asset_keys(band: Band) -> &'static [&'static str] {
    match band {
        Band::Red => &["red", "B04"],
        Band::Nir => &["nir", "B08"],
        Band::Green => &["green", "B03"],
        Band::Blue => &["blue", "B02"],
        Band::Quality => &[],
    }
}

fn quality_asset_keys(rule: &QualityRule) -> &'static [&'static str] {
    match rule {
        QualityRule::Qa60 { .. } => &["qa60", "QA60"],
        QualityRule::Scl { .. } => &["scl", "SCL"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::MonthInterval;
    use chrono::NaiveDate;
    use std::io::Write;
    use vegmon_core::BBox;

    const ITEMS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "S2A_18PWT_20250604_0_L2A",
      "bbox": [-74.99, 9.94, -74.08, 10.94],
      "properties": {
        "datetime": "2025-06-04T15:32:40Z",
        "eo:cloud_cover": 12.0,
        "proj:epsg": 32618,
        "s2:product_uri": "S2A_MSIL2A_20250604T152641_N0511_R025_T18PWT_20250604T201507.SAFE",
        "s2:datatake_id": "GS2A_20250604T152641_051972_N05.11"
      },
      "assets": {
        "red": {"href": "/data/T18PWT/B04.tif"},
        "nir": {"href": "/data/T18PWT/B08.tif"},
        "scl": {"href": "/data/T18PWT/SCL.tif"}
      }
    },
    {
      "type": "Feature",
      "id": "S2A_18PWT_20250604_1_L2A",
      "bbox": [-74.99, 9.94, -74.08, 10.94],
      "properties": {
        "datetime": "2025-06-04T15:32:40Z",
        "eo:cloud_cover": 12.0,
        "s2:product_uri": "S2A_MSIL2A_20250604T152641_N0511_R025_T18PWT_20250604T201507.SAFE",
        "s2:datatake_id": "GS2A_20250604T152641_051972_N05.11"
      },
      "assets": {}
    },
    {
      "type": "Feature",
      "id": "S2B_18PWT_20250619_0_L2A",
      "bbox": [-74.99, 9.94, -74.08, 10.94],
      "properties": {
        "datetime": "2025-06-19T15:32:40Z",
        "eo:cloud_cover": 91.5
      },
      "assets": {}
    },
    {
      "type": "Feature",
      "id": "S2B_18PWT_20250709_0_L2A",
      "bbox": [-74.99, 9.94, -74.08, 10.94],
      "properties": {"datetime": "2025-07-09T15:32:40Z", "eo:cloud_cover": 3.0},
      "assets": {}
    }
  ],
  "links": []
}"#;

    fn catalog(quality: &QualityRule) -> (tempfile::NamedTempFile, StacSceneCatalog) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ITEMS.as_bytes()).unwrap();
        let catalog = StacSceneCatalog::open(
            StacSource::ItemsFile(file.path().to_path_buf()),
            StacClientOptions::default(),
            RangeReaderOptions::default(),
            quality,
        )
        .unwrap();
        (file, catalog)
    }

    fn june() -> SceneQuery {
        SceneQuery {
            interval: MonthInterval::of(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()).unwrap(),
            bbox: BBox::new(-74.5924, 10.8193, -74.5435, 10.8400),
            max_cloud_percent: 80.0,
        }
    }

    #[test]
    fn items_file_search_filters_month_and_clouds() {
        let (_file, catalog) = catalog(&QualityRule::scl());
        let scenes = catalog.search(&june()).unwrap();

        // both listings of the 06-04 product pass; de-duplication is the
        // engine's job
        assert_eq!(scenes.len(), 2);
        assert!(scenes.iter().all(|s| s.product_id
            == "S2A_MSIL2A_20250604T152641_N0511_R025_T18PWT_20250604T201507"));
        assert_eq!(scenes[0].crs, CRS::from_epsg(32618));
    }

    #[test]
    fn band_aliases_follow_quality_rule() {
        let (_file, scl_catalog) = catalog(&QualityRule::scl());
        let scene = &scl_catalog.search(&june()).unwrap()[0];
        assert_eq!(scene.assets.get(&Band::Red).map(String::as_str), Some("/data/T18PWT/B04.tif"));
        assert!(scene.has_band(Band::Quality));
        assert!(!scene.has_band(Band::Green));

        let (_file, qa_catalog) = catalog(&QualityRule::qa60());
        let scene = &qa_catalog.search(&june()).unwrap()[0];
        assert!(!scene.has_band(Band::Quality));
    }

    #[test]
    fn default_config_resolves_the_quality_band() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ITEMS.as_bytes()).unwrap();
        let mut config = MonitorConfig::default();
        config.catalog.items_file = Some(file.path().to_path_buf());

        let catalog = StacSceneCatalog::from_config(&config).unwrap();
        let scene = &catalog.search(&june()).unwrap()[0];
        assert!(scene.has_band(Band::Quality));
        assert_eq!(
            scene.assets.get(&Band::Quality).map(String::as_str),
            Some("/data/T18PWT/SCL.tif")
        );
    }

    #[test]
    fn missing_asset_is_reported() {
        let (_file, catalog) = catalog(&QualityRule::scl());
        let scene = &catalog.search(&june()).unwrap()[1];
        let grid = GridSpec::geographic(&june().bbox, 30.0).unwrap();
        let err = catalog.read_band(scene, Band::Blue, &grid).unwrap_err();
        assert!(matches!(err, MonitorError::MissingAsset { .. }));
    }
}
