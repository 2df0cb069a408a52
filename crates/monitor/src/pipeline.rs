//! End-to-end monitor run
//!
//! [`Monitor`] ties the pieces together: window, sequential aggregation,
//! table and chart export, and the independent frame exports.

use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};
use vegmon_core::Aoi;

use crate::aggregate::MonthlyRecord;
use crate::chart::{ChartSink, SvgChartSink};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::export::{GeoTiffImageSink, ImageSink};
use crate::frames::{frame_months, FrameBuilder, FrameReport};
use crate::queue::AggregationQueue;
use crate::service::{ImageryService, MonthlyReduction};
use crate::table::{CsvTableSink, MonthlyTable, TableSink};
use crate::window::build_window;

/// Rows logged after the table is assembled
const HEAD_ROWS: usize = 5;

/// Where the table and its chart went
#[derive(Debug, Clone, PartialEq)]
pub struct TableExport {
    pub csv: PathBuf,
    /// `None` when the chart could not be written
    pub chart: Option<PathBuf>,
}

/// Everything a full run produced
#[derive(Debug)]
pub struct RunReport {
    pub table: MonthlyTable,
    pub export: TableExport,
    pub frames: FrameReport,
}

/// Monthly vegetation monitor over one AOI
pub struct Monitor<S> {
    service: S,
    config: MonitorConfig,
    aoi: Aoi,
}

impl<S: ImageryService> Monitor<S> {
    /// Validate `config` and load its AOI
    pub fn new(service: S, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let aoi = config.aoi.load()?;
        let b = aoi.bbox();
        info!(
            area_ha = aoi.area_ha(),
            west = b.min_x,
            south = b.min_y,
            east = b.max_x,
            north = b.max_y,
            "area of interest loaded"
        );
        Ok(Self { service, config, aoi })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn aoi(&self) -> &Aoi {
        &self.aoi
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Months of the statistics window ending before `today`'s month
    pub fn statistics_window(&self, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        build_window(today, self.config.stats_months)
    }

    /// Aggregate every month of the statistics window, one at a time
    pub fn run_statistics(&self, today: NaiveDate) -> Result<MonthlyTable> {
        self.run_statistics_with(today, |_| {})
    }

    /// As [`Self::run_statistics`], calling `on_record` after each month
    pub fn run_statistics_with<F>(&self, today: NaiveDate, on_record: F) -> Result<MonthlyTable>
    where
        F: FnMut(&MonthlyRecord),
    {
        let months = self.statistics_window(today)?;
        info!(
            months = months.len(),
            threshold = self.config.threshold,
            max_cloud_percent = self.config.max_cloud_percent,
            scale_m = self.config.reduction.scale_m,
            "statistics window"
        );

        let mut queue = AggregationQueue::new(&self.service, self.config.retry);
        for month in months {
            queue.submit(MonthlyReduction::new(month, &self.aoi, &self.config));
        }
        let table = MonthlyTable::new(queue.run(on_record)?);

        if let Some(summary) = table.summary() {
            info!("trend: {summary}");
        }
        for record in table.head(HEAD_ROWS) {
            info!(
                month = %record.month,
                area_ha = record.area_ha,
                n_scenes = record.n_scenes,
                valid_frac = record.valid_frac,
                "row"
            );
        }
        Ok(table)
    }

    /// Write the table, then the chart. A chart failure is only logged.
    pub fn export_table(
        &self,
        table: &MonthlyTable,
        tables: &dyn TableSink,
        chart: Option<&dyn ChartSink>,
    ) -> Result<TableExport> {
        let description = &self.config.output.description;
        let csv = tables.write_table(table, description)?;
        let chart = chart.and_then(|sink| match sink.write_chart(table, description) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "chart not written");
                None
            }
        });
        Ok(TableExport { csv, chart })
    }

    /// Render and export the frame months
    pub fn run_frames<K: ImageSink + ?Sized>(&self, today: NaiveDate, sink: &K) -> Result<FrameReport> {
        let months = frame_months(&self.config.frames, today)?;
        info!(
            months = months.len(),
            scale_m = self.config.frames.scale_m,
            buffer_m = self.config.frames.buffer_m,
            "frame months"
        );
        let report = FrameBuilder::new(&self.service, sink, &self.aoi, &self.config).run(&months);
        if !report.is_complete() {
            warn!(
                failed = report.failed_count(),
                total = report.outcomes.len(),
                "some frames failed"
            );
        }
        Ok(report)
    }

    /// Statistics, table export and frames into `<out>/<folder>`
    pub fn run(&self, today: NaiveDate) -> Result<RunReport> {
        let dir = self.config.output.dir();
        let table = self.run_statistics(today)?;
        let chart = SvgChartSink::new(&dir);
        let export = self.export_table(
            &table,
            &CsvTableSink::new(&dir),
            Some(&chart as &dyn ChartSink),
        )?;
        let frames = self.run_frames(today, &GeoTiffImageSink::new(&dir))?;
        Ok(RunReport { table, export, frames })
    }
}
