//! Catalog held entirely in memory

use std::collections::HashMap;

use vegmon_algorithms::resample::warp_nearest;
use vegmon_core::{GridSpec, Raster};

use super::{Band, Scene, SceneCatalog, SceneQuery};
use crate::error::{MonitorError, Result};

/// Scenes and band rasters registered up front.
///
/// Band rasters may be on any grid the warper accepts (WGS84 or a UTM zone
/// when the target is WGS84); they are resampled on every read.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    scenes: Vec<Scene>,
    bands: HashMap<(String, Band), Raster<f64>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scene and its bands.
    ///
    /// The scene's asset map gains an entry for every band given. Inserting
    /// the same product twice keeps both catalog entries, which is how
    /// duplicate listings from a real catalog are reproduced.
    pub fn insert(&mut self, mut scene: Scene, bands: Vec<(Band, Raster<f64>)>) {
        for (band, raster) in bands {
            scene
                .assets
                .entry(band)
                .or_insert_with(|| format!("memory://{}/{}", scene.product_id, band));
            self.bands.insert((scene.product_id.clone(), band), raster);
        }
        self.scenes.push(scene);
    }

    pub fn with_scene(mut self, scene: Scene, bands: Vec<(Band, Raster<f64>)>) -> Self {
        self.insert(scene, bands);
        self
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl SceneCatalog for InMemoryCatalog {
    fn search(&self, query: &SceneQuery) -> Result<Vec<Scene>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| query.accepts(s))
            .cloned()
            .collect())
    }

    fn read_band(&self, scene: &Scene, band: Band, grid: &GridSpec) -> Result<Raster<f64>> {
        let raster = self
            .bands
            .get(&(scene.product_id.clone(), band))
            .ok_or_else(|| MonitorError::MissingAsset {
                scene: scene.product_id.clone(),
                band: band.to_string(),
            })?;
        Ok(warp_nearest(raster, grid)?)
    }
}
