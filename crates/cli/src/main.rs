//! vegmon CLI - monthly NDVI vegetation monitor

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vegmon_monitor::config::AoiSource;
use vegmon_monitor::window::month_label;
use vegmon_monitor::{
    build_window, ChartSink, CsvTableSink, FrameReport, GeoTiffImageSink, Monitor, MonitorConfig, MonthlyTable,
    RasterEngine, StacSceneCatalog, SvgChartSink,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vegmon")]
#[command(author, version, about = "Monthly NDVI vegetation monitor", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the months of the statistics window
    Window {
        /// Reference date (YYYY-MM-DD), defaults to today (UTC)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Number of full months
        #[arg(short, long)]
        months: Option<usize>,
    },
    /// Monthly vegetated area table (CSV + chart)
    Stats {
        #[command(flatten)]
        run: RunArgs,
        /// Number of full months
        #[arg(short, long)]
        months: Option<usize>,
    },
    /// True-colour frames with the vegetation overlay
    Frames {
        #[command(flatten)]
        run: RunArgs,
        /// Explicit months, YYYY-MM, comma separated
        #[arg(long, value_delimiter = ',')]
        months: Vec<String>,
        /// Number of most recent full months when no list is given
        #[arg(long)]
        count: Option<usize>,
        /// Export cell size in metres
        #[arg(long)]
        scale: Option<f64>,
    },
    /// Statistics followed by frames
    Run {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show the area of interest
    Aoi {
        /// Read the AOI from a GeoJSON file instead of the configuration
        #[arg(long)]
        geojson: Option<PathBuf>,
        /// Print the AOI as GeoJSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as JSON
    Config,
}

/// Overrides shared by the processing commands
#[derive(Args)]
struct RunArgs {
    /// Reference date (YYYY-MM-DD), defaults to today (UTC)
    #[arg(long)]
    today: Option<NaiveDate>,
    /// Output root directory
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// STAC catalog: es, pc or an API URL
    #[arg(long)]
    stac: Option<String>,
    /// Saved STAC ItemCollection used instead of a live search
    #[arg(long)]
    items: Option<PathBuf>,
    /// NDVI vegetation threshold
    #[arg(short, long)]
    threshold: Option<f64>,
    /// Maximum scene cloud cover, percent
    #[arg(long)]
    max_cloud: Option<f64>,
}

impl RunArgs {
    fn apply(&self, config: &mut MonitorConfig) {
        if let Some(out) = &self.out {
            config.output.root = out.clone();
        }
        if let Some(stac) = &self.stac {
            config.catalog.stac = stac.clone();
        }
        if let Some(items) = &self.items {
            config.catalog.items_file = Some(items.clone());
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(max_cloud) = self.max_cloud {
            config.max_cloud_percent = max_cloud;
        }
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn month_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn load_config(path: Option<&PathBuf>) -> Result<MonitorConfig> {
    let config = match path {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    Ok(config)
}

fn open_monitor(config: MonitorConfig) -> Result<Monitor<RasterEngine<StacSceneCatalog>>> {
    config.validate().context("Invalid configuration")?;
    let pb = spinner("Opening scene catalog...")?;
    let catalog = StacSceneCatalog::from_config(&config).context("Failed to open scene catalog")?;
    pb.finish_and_clear();
    Monitor::new(RasterEngine::new(catalog), config).context("Failed to load AOI")
}

fn statistics(monitor: &Monitor<RasterEngine<StacSceneCatalog>>, today: NaiveDate) -> Result<MonthlyTable> {
    let months = monitor.statistics_window(today)?.len();
    let pb = month_bar(months)?;
    let start = Instant::now();
    let table = monitor
        .run_statistics_with(today, |record| {
            pb.set_message(format!("{} {:.1} ha", record.month, record.area_ha));
            pb.inc(1);
        })
        .context("Monthly statistics failed")?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    let dir = monitor.config().output.dir();
    let chart = SvgChartSink::new(&dir);
    let export = monitor
        .export_table(&table, &CsvTableSink::new(&dir), Some(&chart as &dyn ChartSink))
        .context("Failed to write table")?;

    print_table(&table);
    println!("Table saved to: {}", export.csv.display());
    if let Some(chart) = export.chart {
        println!("Chart saved to: {}", chart.display());
    }
    println!("  Processing time: {:.2?}", elapsed);
    Ok(table)
}

fn frames(monitor: &Monitor<RasterEngine<StacSceneCatalog>>, today: NaiveDate) -> Result<FrameReport> {
    let pb = spinner("Rendering frames...")?;
    let start = Instant::now();
    let sink = GeoTiffImageSink::new(monitor.config().output.dir());
    let report = monitor.run_frames(today, &sink)?;
    pb.finish_and_clear();

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(frame) => println!("{}  {:>9.1} ha  {}", frame.identifier, frame.area_ha, frame.path.display()),
            Err(e) => println!("{}  FAILED: {}", month_label(outcome.month), e),
        }
    }
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(report)
}

fn ensure_frames_complete(report: &FrameReport) -> Result<()> {
    let failed = report.failed_count();
    if failed > 0 {
        bail!("{} of {} frames failed", failed, report.outcomes.len());
    }
    Ok(())
}

fn print_table(table: &MonthlyTable) {
    println!("{:<8} {:>10} {:>8} {:>10}", "month", "area_ha", "scenes", "valid");
    for r in table.records() {
        println!(
            "{:<8} {:>10.2} {:>8} {:>9.1}%",
            r.month,
            r.area_ha,
            r.n_scenes,
            r.valid_frac * 100.0
        );
    }
    if let Some(summary) = table.summary() {
        println!("\n{}", summary);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        // ── Window ───────────────────────────────────────────────────
        Commands::Window { today, months } => {
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            let n = months.unwrap_or(config.stats_months);
            for month in build_window(today, n)? {
                println!("{}", month_label(month));
            }
        }

        // ── Statistics ───────────────────────────────────────────────
        Commands::Stats { run, months } => {
            run.apply(&mut config);
            if let Some(n) = months {
                config.stats_months = n;
            }
            let monitor = open_monitor(config)?;
            statistics(&monitor, run.today())?;
        }

        // ── Frames ───────────────────────────────────────────────────
        Commands::Frames {
            run,
            months,
            count,
            scale,
        } => {
            run.apply(&mut config);
            if !months.is_empty() {
                config.frames.months = months;
            }
            if let Some(count) = count {
                config.frames.count = count;
            }
            if let Some(scale) = scale {
                config.frames.scale_m = scale;
            }
            let monitor = open_monitor(config)?;
            let report = frames(&monitor, run.today())?;
            ensure_frames_complete(&report)?;
        }

        // ── Full run ─────────────────────────────────────────────────
        Commands::Run { run } => {
            run.apply(&mut config);
            let today = run.today();
            info!(today = %today, "monitor run");
            let monitor = open_monitor(config)?;
            statistics(&monitor, today)?;
            let report = frames(&monitor, today)?;
            ensure_frames_complete(&report)?;
        }

        // ── AOI ──────────────────────────────────────────────────────
        Commands::Aoi { geojson, json } => {
            if let Some(path) = geojson {
                config.aoi = AoiSource::Geojson { path };
            }
            let aoi = config.aoi.load().context("Failed to load AOI")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&aoi.to_geojson())?);
            } else {
                let b = aoi.bbox();
                println!(
                    "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                    b.min_x, b.min_y, b.max_x, b.max_y
                );
                println!("Area: {:.2} ha", aoi.area_ha());
                let frame = aoi.buffered_bounds(config.frames.buffer_m);
                println!(
                    "Frame extent (+{} m): ({:.6}, {:.6}) - ({:.6}, {:.6})",
                    config.frames.buffer_m, frame.min_x, frame.min_y, frame.max_x, frame.max_y
                );
            }
        }

        // ── Config ───────────────────────────────────────────────────
        Commands::Config => {
            config.validate().context("Invalid configuration")?;
            println!("{}", config.to_json()?);
        }
    }

    Ok(())
}
