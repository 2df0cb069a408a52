//! Trend chart of vegetated area per month

use std::fmt::{self, Write};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::table::MonthlyTable;

/// Destination for the area chart
pub trait ChartSink {
    /// Render `area_ha` over `month`; returns where the chart went
    fn write_chart(&self, table: &MonthlyTable, title: &str) -> Result<PathBuf>;
}

/// Line chart drawn as a standalone SVG at `<dir>/<title>_area.svg`
#[derive(Debug, Clone)]
pub struct SvgChartSink {
    dir: PathBuf,
    width: f64,
    height: f64,
}

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 72.0;
const Y_TICKS: usize = 5;

impl SvgChartSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            width: 900.0,
            height: 420.0,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// SVG document for `table`
    pub fn render(&self, table: &MonthlyTable, title: &str) -> Result<String> {
        let mut svg = String::new();
        self.write_svg(&mut svg, table, title)?;
        Ok(svg)
    }

    fn write_svg<W: Write>(&self, svg: &mut W, table: &MonthlyTable, title: &str) -> fmt::Result {
        let plot_w = self.width - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = self.height - MARGIN_TOP - MARGIN_BOTTOM;
        let records = table.records();

        let y_max = nice_ceiling(records.iter().map(|r| r.area_ha).fold(0.0, f64::max));
        let x_of = |i: usize| {
            if records.len() <= 1 {
                MARGIN_LEFT + plot_w / 2.0
            } else {
                MARGIN_LEFT + plot_w * i as f64 / (records.len() - 1) as f64
            }
        };
        let y_of = |v: f64| MARGIN_TOP + plot_h * (1.0 - v / y_max);

        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        )?;
        writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="24" text-anchor="middle" font-family="sans-serif" font-size="16">{}</text>"#,
            self.width / 2.0,
            escape(title)
        )?;

        // axes
        writeln!(
            svg,
            r#"<path d="M{l:.1},{t:.1} V{b:.1} H{r:.1}" fill="none" stroke="black"/>"#,
            l = MARGIN_LEFT,
            t = MARGIN_TOP,
            b = MARGIN_TOP + plot_h,
            r = MARGIN_LEFT + plot_w
        )?;
        for k in 0..=Y_TICKS {
            let v = y_max * k as f64 / Y_TICKS as f64;
            let y = y_of(v);
            writeln!(
                svg,
                r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#dddddd"/>"##,
                MARGIN_LEFT,
                MARGIN_LEFT + plot_w
            )?;
            writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="end" font-family="sans-serif" font-size="11">{v:.0}</text>"#,
                MARGIN_LEFT - 6.0,
                y + 4.0
            )?;
        }
        writeln!(
            svg,
            r#"<text x="16" y="{:.1}" transform="rotate(-90 16 {:.1})" text-anchor="middle" font-family="sans-serif" font-size="12">area (ha)</text>"#,
            MARGIN_TOP + plot_h / 2.0,
            MARGIN_TOP + plot_h / 2.0
        )?;

        for (i, record) in records.iter().enumerate() {
            let x = x_of(i);
            let y = MARGIN_TOP + plot_h + 14.0;
            writeln!(
                svg,
                r#"<text x="{x:.1}" y="{y:.1}" transform="rotate(-45 {x:.1} {y:.1})" text-anchor="end" font-family="sans-serif" font-size="11">{}</text>"#,
                escape(&record.month)
            )?;
        }

        if !records.is_empty() {
            let points: Vec<String> = records
                .iter()
                .enumerate()
                .map(|(i, r)| format!("{:.1},{:.1}", x_of(i), y_of(r.area_ha)))
                .collect();
            writeln!(
                svg,
                r##"<polyline points="{}" fill="none" stroke="#2e7d32" stroke-width="2"/>"##,
                points.join(" ")
            )?;
            for (i, r) in records.iter().enumerate() {
                writeln!(
                    svg,
                    r##"<circle cx="{:.1}" cy="{:.1}" r="3" fill="#2e7d32"><title>{}: {:.2} ha</title></circle>"##,
                    x_of(i),
                    y_of(r.area_ha),
                    escape(&r.month),
                    r.area_ha
                )?;
            }
        }

        writeln!(svg, "</svg>")
    }
}

impl ChartSink for SvgChartSink {
    fn write_chart(&self, table: &MonthlyTable, title: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{title}_area.svg"));
        fs::write(&path, self.render(table, title)?)?;
        info!(path = %path.display(), "chart written");
        Ok(path)
    }
}

/// Round up to 1, 2 or 5 times a power of ten; at least 1
fn nice_ceiling(value: f64) -> f64 {
    if !(value.is_finite() && value > 1.0) {
        return 1.0;
    }
    let magnitude = 10f64.powf(value.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|&c| c >= value)
        .unwrap_or(10.0 * magnitude)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
