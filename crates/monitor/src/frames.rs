//! Visual frame builder
//!
//! Each target month is rendered and exported on its own; a month that
//! fails is reported without holding back the others.

use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};
use vegmon_algorithms::maybe_rayon::*;
use vegmon_colormap::RgbaImage;
use vegmon_core::{Aoi, GridSpec};

use crate::aggregate::area_ha;
use crate::config::{FrameConfig, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::export::ImageSink;
use crate::retry::RetryPolicy;
use crate::service::{FrameRequest, ImageryService, RenderedFrame};
use crate::window::{build_window, floor_to_month, month_label, parse_month_label};

/// A rendered month ready for the image sink
#[derive(Debug, Clone)]
pub struct ExportFrame {
    pub month: NaiveDate,
    /// Vegetated area recomputed for this frame, hectares
    pub area_ha: f64,
    pub n_scenes: usize,
    /// `<prefix>_<YYYY-MM>_<area>ha`
    pub identifier: String,
    pub image: RgbaImage,
    pub grid: GridSpec,
}

impl ExportFrame {
    pub fn from_rendered(rendered: RenderedFrame, prefix: &str) -> Self {
        let area_ha = area_ha(rendered.area_m2);
        Self {
            identifier: frame_identifier(prefix, rendered.month, area_ha),
            month: rendered.month,
            area_ha,
            n_scenes: rendered.n_scenes,
            image: rendered.image,
            grid: rendered.grid,
        }
    }
}

/// Export name for a frame: the month label and the area rounded to
/// whole hectares (halves away from zero)
pub fn frame_identifier(prefix: &str, month: NaiveDate, area_ha: f64) -> String {
    let rounded = if area_ha.is_finite() {
        area_ha.max(0.0).round() as u64
    } else {
        0
    };
    format!("{prefix}_{}_{rounded}ha", month_label(month))
}

/// Months to render: the explicit list when given, otherwise the last
/// `count` full months before `today`
pub fn frame_months(frames: &FrameConfig, today: NaiveDate) -> Result<Vec<NaiveDate>> {
    if frames.months.is_empty() {
        return build_window(today, frames.count);
    }
    let mut months = Vec::with_capacity(frames.months.len());
    for label in &frames.months {
        let month = parse_month_label(label)?;
        if month >= floor_to_month(today) {
            warn!(month = %label, "frame month has not finished yet");
        }
        if !months.contains(&month) {
            months.push(month);
        }
    }
    Ok(months)
}

/// A frame that made it to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFrame {
    pub identifier: String,
    pub area_ha: f64,
    pub n_scenes: usize,
    pub path: PathBuf,
}

/// Result of one month's render and export
#[derive(Debug)]
pub struct FrameOutcome {
    pub month: NaiveDate,
    pub result: Result<ExportedFrame>,
}

/// Outcomes for every requested month, in request order
#[derive(Debug, Default)]
pub struct FrameReport {
    pub outcomes: Vec<FrameOutcome>,
}

impl FrameReport {
    pub fn exported(&self) -> impl Iterator<Item = &ExportedFrame> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (NaiveDate, &MonitorError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.month, e)))
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Render `month` through `service` and build its export frame
pub fn build_frame<S: ImageryService + ?Sized>(
    service: &S,
    request: &FrameRequest<'_>,
    prefix: &str,
) -> Result<ExportFrame> {
    let rendered = service.render_frame(request)?;
    Ok(ExportFrame::from_rendered(rendered, prefix))
}

/// Builds and exports frames for a list of months
pub struct FrameBuilder<'a, S: ?Sized, K: ?Sized> {
    service: &'a S,
    sink: &'a K,
    aoi: &'a Aoi,
    config: &'a MonitorConfig,
    retry: RetryPolicy,
}

impl<'a, S, K> FrameBuilder<'a, S, K>
where
    S: ImageryService + ?Sized,
    K: ImageSink + ?Sized,
{
    pub fn new(service: &'a S, sink: &'a K, aoi: &'a Aoi, config: &'a MonitorConfig) -> Self {
        Self {
            service,
            sink,
            aoi,
            config,
            retry: config.retry,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Render and export every month concurrently
    pub fn run(&self, months: &[NaiveDate]) -> FrameReport {
        let outcomes = months
            .into_par_iter()
            .map(|&month| FrameOutcome {
                month,
                result: self.export_one(month),
            })
            .collect::<Vec<_>>();

        for outcome in &outcomes {
            match &outcome.result {
                Ok(frame) => info!(
                    frame = %frame.identifier,
                    area_ha = frame.area_ha,
                    n_scenes = frame.n_scenes,
                    "frame exported"
                ),
                Err(e) => warn!(month = %month_label(outcome.month), error = %e, "frame failed"),
            }
        }
        FrameReport { outcomes }
    }

    fn export_one(&self, month: NaiveDate) -> Result<ExportedFrame> {
        let request = FrameRequest::new(month, self.aoi, self.config);
        let label = month_label(month);
        let frame = self.retry.run(&label, || {
            build_frame(self.service, &request, &self.config.output.prefix)
        })?;
        let path = self.sink.write_image(&frame)?;
        Ok(ExportedFrame {
            identifier: frame.identifier,
            area_ha: frame.area_ha,
            n_scenes: frame.n_scenes,
            path,
        })
    }
}
