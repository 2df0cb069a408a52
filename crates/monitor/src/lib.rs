//! # vegmon monitor
//!
//! Monthly NDVI vegetation monitoring of a fixed area of interest.
//!
//! - [`window`]: the last N full calendar months
//! - [`catalog`]: Sentinel-2 scene catalogs (in-memory, STAC API, saved
//!   item collections)
//! - [`engine`]: quality masking, NDVI, median compositing and region
//!   reduction behind the [`ImageryService`] contract
//! - [`aggregate`] and [`queue`]: one [`MonthlyRecord`] per month, issued
//!   strictly one month at a time
//! - [`table`], [`chart`]: the ordered table, its CSV and trend chart
//! - [`frames`], [`export`]: true-colour frames with the vegetation
//!   overlay, exported as GeoTIFF
//! - [`pipeline`]: the whole run driven by one [`MonitorConfig`]

pub mod aggregate;
pub mod catalog;
pub mod chart;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod frames;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod service;
pub mod table;
pub mod window;

pub use aggregate::{aggregate_month, MonthlyRecord};
pub use catalog::{Band, InMemoryCatalog, Scene, SceneCatalog, SceneQuery, StacSceneCatalog, StacSource};
pub use chart::{ChartSink, SvgChartSink};
pub use config::MonitorConfig;
pub use engine::RasterEngine;
pub use error::{MonitorError, Result};
pub use export::{GeoTiffImageSink, ImageSink};
pub use frames::{frame_identifier, ExportFrame, FrameReport};
pub use pipeline::{Monitor, RunReport};
pub use queue::{AggregationQueue, MAX_CONCURRENT_AGGREGATIONS};
pub use retry::RetryPolicy;
pub use service::{FrameRequest, ImageryService, MonthReduction, MonthlyReduction, RenderedFrame};
pub use table::{CsvTableSink, MonthlyTable, TableSink, TrendSummary};
pub use window::{build_window, MonthInterval};
