//! Scene catalogs
//!
//! A catalog answers two questions for the imagery engine: which
//! acquisitions touch a region during a month, and what a given band of one
//! acquisition looks like on an analysis grid.

mod memory;
mod stac;

pub use memory::InMemoryCatalog;
pub use stac::{StacSceneCatalog, StacSource};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{Read, Seek};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vegmon_algorithms::resample::warp_nearest;
use vegmon_core::crs::project_bbox;
use vegmon_core::io::GeoTiffReader;
use vegmon_core::{BBox, GridSpec, Raster, CRS};

use crate::error::Result;
use crate::window::MonthInterval;

/// Spectral or quality band of a Sentinel-2 acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Red,
    Nir,
    Green,
    Blue,
    /// QA60 bit mask or scene classification layer
    Quality,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::Red, Band::Nir, Band::Green, Band::Blue, Band::Quality];

    pub fn name(self) -> &'static str {
        match self {
            Band::Red => "red",
            Band::Nir => "nir",
            Band::Green => "green",
            Band::Blue => "blue",
            Band::Quality => "quality",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One catalogued acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Product identifier, unique per delivered product
    pub product_id: String,
    /// Acquisition group (datatake); tiles of one pass share it
    pub datatake_id: Option<String>,
    pub acquired: DateTime<Utc>,
    /// Scene-level cloudy pixel percentage
    pub cloud_percent: f64,
    /// WGS84 footprint extent
    pub footprint: BBox,
    pub crs: CRS,
    /// Band -> asset location (URL or path)
    pub assets: HashMap<Band, String>,
    /// Catalog collection, used when signing asset URLs
    pub collection: Option<String>,
}

impl Scene {
    /// Group identity used to count acquisitions: the datatake id, or the
    /// product id when the catalog does not report one
    pub fn group_id(&self) -> &str {
        self.datatake_id.as_deref().unwrap_or(&self.product_id)
    }

    pub fn has_band(&self, band: Band) -> bool {
        self.assets.contains_key(&band)
    }
}

/// Scene search issued once per month and region
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    pub interval: MonthInterval,
    /// WGS84 extent the scenes must intersect
    pub bbox: BBox,
    /// Scenes at or above this cloudy percentage are dropped
    pub max_cloud_percent: f64,
}

impl SceneQuery {
    /// Scene-level filter: interval, footprint and cloud percentage
    pub fn accepts(&self, scene: &Scene) -> bool {
        self.interval.contains(scene.acquired)
            && scene.footprint.intersects(&self.bbox)
            && scene.cloud_percent < self.max_cloud_percent
    }
}

/// Source of scenes and their band rasters
pub trait SceneCatalog: Send + Sync {
    /// Scenes matching `query`. May contain duplicates; the engine
    /// de-duplicates with [`distinct_scenes`].
    fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>>;

    /// `band` of `scene` resampled onto `grid`; cells the scene does not
    /// cover are NaN.
    fn read_band(&self, scene: &Scene, band: Band, grid: &GridSpec) -> Result<Raster<f64>>;
}

impl<C: SceneCatalog + ?Sized> SceneCatalog for &C {
    fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>> {
        (**self).search(query)
    }

    fn read_band(&self, scene: &Scene, band: Band, grid: &GridSpec) -> Result<Raster<f64>> {
        (**self).read_band(scene, band, grid)
    }
}

/// Order scenes by `(acquired, product_id)` and keep the first occurrence
/// of each product id
pub fn distinct_scenes(mut scenes: Vec<Scene>) -> Vec<Scene> {
    scenes.sort_by(|a, b| {
        a.acquired
            .cmp(&b.acquired)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    let mut seen = HashSet::new();
    scenes.retain(|s| seen.insert(s.product_id.clone()));
    scenes
}

/// Number of distinct acquisition groups among `scenes`
pub fn count_acquisitions(scenes: &[Scene]) -> usize {
    scenes.iter().map(Scene::group_id).collect::<HashSet<_>>().len()
}

/// Read the part of a GeoTIFF covering `grid` and warp it onto the grid.
///
/// Only the tiles under the grid's footprint (projected into the file's
/// CRS) are decoded. A file that misses the grid yields an all-NaN raster.
pub(crate) fn read_onto_grid<R: Read + Seek>(
    mut reader: GeoTiffReader<R>,
    grid: &GridSpec,
) -> Result<Raster<f64>> {
    let grid_bbox = grid.bbox();
    let file_bbox = match reader.crs().and_then(CRS::epsg) {
        Some(epsg) if !reader.crs().is_some_and(|c| c.is_equivalent(&grid.crs)) => {
            project_bbox(&grid_bbox, epsg)?
        }
        _ => grid_bbox,
    };

    match reader.window_for_bbox(&file_bbox) {
        Some(window) => {
            let src = reader.read_window(window)?;
            Ok(warp_nearest(&src, grid)?)
        }
        None => Ok(Raster::on_grid(grid, f64::NAN)),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn scene(product: &str, datatake: Option<&str>, day: u32) -> Scene {
        Scene {
            product_id: product.to_string(),
            datatake_id: datatake.map(str::to_string),
            acquired: Utc.with_ymd_and_hms(2025, 6, day, 15, 30, 0).unwrap(),
            cloud_percent: 10.0,
            footprint: BBox::new(-75.0, 10.0, -74.0, 11.0),
            crs: CRS::wgs84(),
            assets: HashMap::new(),
            collection: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::scene;
    use super::*;
    use chrono::NaiveDate;

    fn june_query() -> SceneQuery {
        SceneQuery {
            interval: MonthInterval::of(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()).unwrap(),
            bbox: BBox::new(-74.6, 10.8, -74.5, 10.9),
            max_cloud_percent: 80.0,
        }
    }

    #[test]
    fn duplicates_keep_earliest_occurrence() {
        let mut late_copy = scene("P1", Some("DT1"), 20);
        late_copy.cloud_percent = 55.0;
        let scenes = vec![late_copy, scene("P2", Some("DT2"), 3), scene("P1", Some("DT1"), 5)];

        let distinct = distinct_scenes(scenes);
        let ids: Vec<_> = distinct.iter().map(|s| s.product_id.as_str()).collect();
        assert_eq!(ids, vec!["P2", "P1"]);
        assert_eq!(distinct[1].cloud_percent, 10.0);
    }

    #[test]
    fn acquisitions_count_datatakes() {
        let scenes = vec![
            scene("P1", Some("DT1"), 5),
            scene("P2", Some("DT1"), 5),
            scene("P3", Some("DT2"), 10),
            scene("P4", None, 15),
        ];
        assert_eq!(count_acquisitions(&scenes), 3);
        assert_eq!(count_acquisitions(&[]), 0);
    }

    #[test]
    fn query_filters_month_footprint_and_clouds() {
        let query = june_query();
        assert!(query.accepts(&scene("P1", None, 10)));

        let mut cloudy = scene("P2", None, 10);
        cloudy.cloud_percent = 80.0;
        assert!(!query.accepts(&cloudy));

        let mut elsewhere = scene("P3", None, 10);
        elsewhere.footprint = BBox::new(-70.0, 5.0, -69.0, 6.0);
        assert!(!query.accepts(&elsewhere));

        let mut july = scene("P4", None, 10);
        july.acquired = query.interval.end_utc();
        assert!(!query.accepts(&july));
    }
}
