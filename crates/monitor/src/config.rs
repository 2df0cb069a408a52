//! Run configuration
//!
//! One immutable [`MonitorConfig`] drives a run. Every field has a default
//! so a JSON file only needs the values it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vegmon_algorithms::imagery::QualityRule;
use vegmon_algorithms::statistics::ReductionOptions;
use vegmon_colormap::{Rgb, StretchParams};
use vegmon_core::Aoi;

use crate::error::{MonitorError, Result};
use crate::retry::RetryPolicy;
use crate::window::parse_month_label;

/// Complejo Pajarales, Cienaga Grande de Santa Marta (lon, lat)
pub const PAJARALES_RING: [[f64; 2]; 4] = [
    [-74.592_186_4, 10.839_763_2],
    [-74.592_401_0, 10.819_277_8],
    [-74.543_691_9, 10.819_741_5],
    [-74.543_477_4, 10.839_973_9],
];

/// Where the area of interest is read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AoiSource {
    /// Exterior ring of (lon, lat) pairs; closing it is optional
    Ring { coordinates: Vec<[f64; 2]> },
    /// GeoJSON Polygon, Feature or FeatureCollection file
    Geojson { path: PathBuf },
}

impl Default for AoiSource {
    fn default() -> Self {
        Self::Ring {
            coordinates: PAJARALES_RING.to_vec(),
        }
    }
}

impl AoiSource {
    pub fn load(&self) -> Result<Aoi> {
        match self {
            Self::Ring { coordinates } => {
                let ring: Vec<(f64, f64)> = coordinates.iter().map(|c| (c[0], c[1])).collect();
                Ok(Aoi::from_ring(&ring)?)
            }
            Self::Geojson { path } => {
                let text = std::fs::read_to_string(path)?;
                Ok(Aoi::from_geojson(&text)?)
            }
        }
    }
}

/// Scene catalog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// `es`, `pc` or a STAC API root URL
    pub stac: String,
    /// Saved ItemCollection used instead of a live search
    pub items_file: Option<PathBuf>,
    /// Item limit per monthly search
    pub max_items: usize,
    pub request_timeout_s: u64,
    pub max_retries: u32,
    /// Range-read block size, KiB
    pub block_size_kib: usize,
    /// Blocks cached per open asset
    pub cache_blocks: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            stac: "es".into(),
            items_file: None,
            max_items: 1000,
            request_timeout_s: 30,
            max_retries: 3,
            block_size_kib: 512,
            cache_blocks: 64,
        }
    }
}

/// Export destination and naming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for all exports
    pub root: PathBuf,
    /// Destination folder under `root`
    pub folder: String,
    /// Table (and chart) file stem
    pub description: String,
    /// Frame identifier prefix
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output"),
            folder: "CGSM_ComplejoPajarales".into(),
            description: "Pajarales_NDVI040_monthly_median_18m".into(),
            prefix: "Pajarales".into(),
        }
    }
}

impl OutputConfig {
    /// `<root>/<folder>`
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.folder)
    }
}

/// Months to render as frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Explicit `YYYY-MM` months; when empty the last `count` full months
    pub months: Vec<String>,
    pub count: usize,
    /// Export cell size, metres
    pub scale_m: f64,
    /// Buffer around the AOI for the frame extent, metres
    pub buffer_m: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            months: Vec::new(),
            count: 12,
            scale_m: 10.0,
            buffer_m: 2500.0,
        }
    }
}

/// Colours and stretch of rendered frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameStyle {
    pub stretch_min: f64,
    pub stretch_max: f64,
    pub overlay_color: Rgb,
    pub overlay_opacity: f64,
    pub outline_color: Rgb,
    pub outline_width_px: f64,
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            stretch_min: 0.0,
            stretch_max: 3000.0,
            overlay_color: Rgb::RED,
            overlay_opacity: 0.6,
            outline_color: Rgb::YELLOW,
            outline_width_px: 2.0,
        }
    }
}

impl FrameStyle {
    pub fn stretch(&self) -> StretchParams {
        StretchParams::new(self.stretch_min, self.stretch_max)
    }
}

/// Full monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub aoi: AoiSource,
    pub catalog: CatalogConfig,
    /// NDVI at or above this counts as vegetation
    pub threshold: f64,
    /// Scenes with this cloudy percentage or more are ignored
    pub max_cloud_percent: f64,
    /// Number of months in the statistics window
    pub stats_months: usize,
    pub quality: QualityRule,
    /// Analysis grid and reduction limits
    pub reduction: ReductionOptions,
    pub frames: FrameConfig,
    pub style: FrameStyle,
    pub output: OutputConfig,
    pub retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            aoi: AoiSource::default(),
            catalog: CatalogConfig::default(),
            threshold: 0.40,
            max_cloud_percent: 80.0,
            stats_months: 18,
            quality: QualityRule::default(),
            reduction: ReductionOptions::default(),
            frames: FrameConfig::default(),
            style: FrameStyle::default(),
            output: OutputConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges and formats before anything is requested
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(MonitorError::Config(format!("{name} must be positive, got {value}")))
            }
        }

        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(MonitorError::Config(format!(
                "threshold must lie in [-1, 1], got {}",
                self.threshold
            )));
        }
        if !(self.max_cloud_percent > 0.0 && self.max_cloud_percent <= 100.0) {
            return Err(MonitorError::Config(format!(
                "max_cloud_percent must lie in (0, 100], got {}",
                self.max_cloud_percent
            )));
        }
        positive("reduction.scale_m", self.reduction.scale_m)?;
        positive("frames.scale_m", self.frames.scale_m)?;
        if !(self.frames.buffer_m.is_finite() && self.frames.buffer_m >= 0.0) {
            return Err(MonitorError::Config(format!(
                "frames.buffer_m must be non-negative, got {}",
                self.frames.buffer_m
            )));
        }
        if self.reduction.tile_scale == 0 {
            return Err(MonitorError::Config("reduction.tile_scale must be at least 1".into()));
        }
        if self.reduction.max_pixels == 0 {
            return Err(MonitorError::Config("reduction.max_pixels must be positive".into()));
        }
        for month in &self.frames.months {
            parse_month_label(month)?;
        }
        if !(0.0..=1.0).contains(&self.style.overlay_opacity) {
            return Err(MonitorError::Config(format!(
                "style.overlay_opacity must lie in [0, 1], got {}",
                self.style.overlay_opacity
            )));
        }
        positive("style.outline_width_px", self.style.outline_width_px)?;
        if self.style.stretch_max <= self.style.stretch_min {
            return Err(MonitorError::Config("style.stretch_max must exceed stretch_min".into()));
        }
        if self.output.folder.trim().is_empty() || self.output.description.trim().is_empty() {
            return Err(MonitorError::Config("output folder and description are required".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MonitorError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pajarales_run() {
        let cfg = MonitorConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.threshold, 0.40);
        assert_eq!(cfg.stats_months, 18);
        assert_eq!(cfg.catalog.stac, "es");
        assert_eq!(cfg.quality, QualityRule::scl());
        assert_eq!(cfg.reduction.scale_m, 30.0);
        assert_eq!(cfg.reduction.tile_scale, 4);
        assert_eq!(cfg.frames.count, 12);
        assert_eq!(cfg.frames.scale_m, 10.0);
        assert_eq!(cfg.output.dir(), PathBuf::from("output/CGSM_ComplejoPajarales"));
        assert_eq!(cfg.style.overlay_color.to_hex(), "#ff0000");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: MonitorConfig = serde_json::from_str(
            r##"{
                "threshold": 0.5,
                "quality": {"kind": "scl", "classes": [3, 8, 9, 10]},
                "frames": {"months": ["2024-10", "2024-12"]},
                "style": {"outline_color": "#00ff00"}
            }"##,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.threshold, 0.5);
        assert_eq!(cfg.frames.count, 12);
        assert_eq!(cfg.frames.months.len(), 2);
        assert_eq!(cfg.style.outline_color, Rgb::new(0, 255, 0));
        assert_eq!(cfg.style.overlay_opacity, 0.6);
        assert_eq!(cfg.max_cloud_percent, 80.0);
    }

    #[test]
    fn json_round_trip() {
        let cfg = MonitorConfig::default();
        let back: MonitorConfig = serde_json::from_str(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = MonitorConfig::default();
        cfg.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.frames.months = vec!["2025-13".into()];
        assert!(matches!(cfg.validate(), Err(MonitorError::InvalidMonth(_))));

        let mut cfg = MonitorConfig::default();
        cfg.style.overlay_opacity = 1.2;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.reduction.tile_scale = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_aoi_loads() {
        let aoi = MonitorConfig::default().aoi.load().unwrap();
        let bbox = aoi.bbox();
        assert!(bbox.min_x < -74.59 && bbox.max_x > -74.544);
        assert!(aoi.area_ha() > 1000.0);
    }

    #[test]
    fn geojson_aoi_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aoi.geojson");
        std::fs::write(
            &path,
            r#"{"type": "Polygon", "coordinates": [[[-74.6, 10.8], [-74.5, 10.8], [-74.5, 10.9], [-74.6, 10.8]]]}"#,
        )
        .unwrap();

        let source: AoiSource =
            serde_json::from_value(serde_json::json!({"type": "geojson", "path": path})).unwrap();
        assert!(source.load().unwrap().contains(-74.52, 10.82));
    }
}
