//! Imagery service contract
//!
//! Each unit of work is an explicit request value. The monthly aggregator
//! and the frame builder only talk to an [`ImageryService`]; the
//! in-process implementation is [`RasterEngine`](crate::engine::RasterEngine).

use chrono::NaiveDate;
use vegmon_algorithms::imagery::QualityRule;
use vegmon_algorithms::statistics::ReductionOptions;
use vegmon_colormap::RgbaImage;
use vegmon_core::{Aoi, GridSpec};

use crate::config::{FrameStyle, MonitorConfig};
use crate::error::Result;
use crate::window::month_label;

/// Composite and reduce one calendar month over the AOI
#[derive(Debug, Clone)]
pub struct MonthlyReduction<'a> {
    /// Month start (day 1)
    pub month: NaiveDate,
    pub aoi: &'a Aoi,
    pub quality: &'a QualityRule,
    pub threshold: f64,
    pub max_cloud_percent: f64,
    pub options: ReductionOptions,
}

impl<'a> MonthlyReduction<'a> {
    pub fn new(month: NaiveDate, aoi: &'a Aoi, config: &'a MonitorConfig) -> Self {
        Self {
            month,
            aoi,
            quality: &config.quality,
            threshold: config.threshold,
            max_cloud_percent: config.max_cloud_percent,
            options: config.reduction,
        }
    }

    pub fn label(&self) -> String {
        month_label(self.month)
    }
}

/// Raw outcome of a monthly reduction.
///
/// `None` marks a reducer that produced no value; the aggregator turns it
/// into 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthReduction {
    pub month: NaiveDate,
    /// Distinct acquisition groups that contributed
    pub n_scenes: usize,
    /// Area at or above the threshold, m²
    pub area_m2: Option<f64>,
    /// Fraction of the AOI with a defined composite value
    pub valid_frac: Option<f64>,
    /// Cell size the reduction actually ran at, metres
    pub scale_m: f64,
}

/// Render one overlay frame
#[derive(Debug, Clone)]
pub struct FrameRequest<'a> {
    pub reduction: MonthlyReduction<'a>,
    /// Frame cell size, metres
    pub scale_m: f64,
    /// Frame extent: AOI bounds grown by this many metres
    pub buffer_m: f64,
    pub style: FrameStyle,
}

impl<'a> FrameRequest<'a> {
    pub fn new(month: NaiveDate, aoi: &'a Aoi, config: &'a MonitorConfig) -> Self {
        Self {
            reduction: MonthlyReduction::new(month, aoi, config),
            scale_m: config.frames.scale_m,
            buffer_m: config.frames.buffer_m,
            style: config.style,
        }
    }
}

/// A rendered frame and the statistics computed alongside it
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub month: NaiveDate,
    pub image: RgbaImage,
    /// Georeferencing of `image`
    pub grid: GridSpec,
    /// Vegetated area over the AOI at the analysis scale, m²
    pub area_m2: Option<f64>,
    pub n_scenes: usize,
}

/// Service that turns requests into reductions and frames
pub trait ImageryService: Send + Sync {
    fn reduce_month(&self, request: &MonthlyReduction<'_>) -> Result<MonthReduction>;

    fn render_frame(&self, request: &FrameRequest<'_>) -> Result<RenderedFrame>;
}

impl<S: ImageryService + ?Sized> ImageryService for &S {
    fn reduce_month(&self, request: &MonthlyReduction<'_>) -> Result<MonthReduction> {
        (**self).reduce_month(request)
    }

    fn render_frame(&self, request: &FrameRequest<'_>) -> Result<RenderedFrame> {
        (**self).render_frame(request)
    }
}
