//! Monthly table assembly and CSV export

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::aggregate::MonthlyRecord;
use crate::error::Result;

/// Records sorted ascending by month start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyTable {
    records: Vec<MonthlyRecord>,
}

impl MonthlyTable {
    /// Assemble a table from records in any order
    pub fn new(mut records: Vec<MonthlyRecord>) -> Self {
        records.sort_by_key(|r| r.time_start);
        Self { records }
    }

    pub fn records(&self) -> &[MonthlyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First `n` records
    pub fn head(&self, n: usize) -> &[MonthlyRecord] {
        &self.records[..n.min(self.records.len())]
    }

    /// `None` for an empty table
    pub fn summary(&self) -> Option<TrendSummary> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        let areas = self.records.iter().map(|r| r.area_ha);

        let (min, max) = areas
            .clone()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), a| (lo.min(a), hi.max(a)));
        let mean = areas.sum::<f64>() / self.records.len() as f64;
        let peak = self
            .records
            .iter()
            .max_by(|a, b| a.area_ha.total_cmp(&b.area_ha))
            .map_or_else(String::new, |r| r.month.clone());

        Some(TrendSummary {
            months: self.records.len(),
            first_month: first.month.clone(),
            last_month: last.month.clone(),
            mean_area_ha: mean,
            min_area_ha: min,
            max_area_ha: max,
            peak_month: peak,
            change_ha: last.area_ha - first.area_ha,
            mean_valid_frac: self.records.iter().map(|r| r.valid_frac).sum::<f64>()
                / self.records.len() as f64,
        })
    }
}

/// Overview of the vegetated area across the table
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    pub months: usize,
    pub first_month: String,
    pub last_month: String,
    pub mean_area_ha: f64,
    pub min_area_ha: f64,
    pub max_area_ha: f64,
    pub peak_month: String,
    /// Last month's area minus the first month's
    pub change_ha: f64,
    pub mean_valid_frac: f64,
}

impl fmt::Display for TrendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} months {}..{}: mean {:.1} ha (min {:.1}, max {:.1} in {}), change {:+.1} ha, mean valid {:.0}%",
            self.months,
            self.first_month,
            self.last_month,
            self.mean_area_ha,
            self.min_area_ha,
            self.max_area_ha,
            self.peak_month,
            self.change_ha,
            self.mean_valid_frac * 100.0
        )
    }
}

/// Destination for the monthly table
pub trait TableSink {
    /// Write `table` under the name `description`; returns where it went
    fn write_table(&self, table: &MonthlyTable, description: &str) -> Result<PathBuf>;
}

/// Writes `<dir>/<description>.csv` with header
/// `month,area_ha,n_scenes,valid_frac`
#[derive(Debug, Clone)]
pub struct CsvTableSink {
    dir: PathBuf,
}

impl CsvTableSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TableSink for CsvTableSink {
    fn write_table(&self, table: &MonthlyTable, description: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{description}.csv"));

        let mut writer = csv::Writer::from_path(&path)?;
        if table.is_empty() {
            writer.write_record(["month", "area_ha", "n_scenes", "valid_frac"])?;
        }
        for record in table.records() {
            writer.serialize(record)?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = table.len(), "table written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(month: u32, area_ha: f64) -> MonthlyRecord {
        let start = NaiveDate::from_ymd_opt(2025, month, 1).unwrap();
        MonthlyRecord {
            month: start.format("%Y-%m").to_string(),
            area_ha,
            n_scenes: 2,
            valid_frac: 0.5,
            time_start: start,
        }
    }

    #[test]
    fn sorts_any_input_order() {
        let table = MonthlyTable::new(vec![record(9, 1.0), record(3, 2.0), record(6, 3.0)]);
        let months: Vec<_> = table.records().iter().map(|r| r.month.as_str()).collect();
        assert_eq!(months, vec!["2025-03", "2025-06", "2025-09"]);
        assert_eq!(table.head(2).len(), 2);
        assert_eq!(table.head(10).len(), 3);
    }

    #[test]
    fn summary_tracks_trend() {
        let table = MonthlyTable::new(vec![record(1, 100.0), record(2, 160.0), record(3, 130.0)]);
        let summary = table.summary().unwrap();
        assert_eq!(summary.months, 3);
        assert_eq!(summary.first_month, "2025-01");
        assert_eq!(summary.mean_area_ha, 130.0);
        assert_eq!(summary.min_area_ha, 100.0);
        assert_eq!(summary.max_area_ha, 160.0);
        assert_eq!(summary.peak_month, "2025-02");
        assert_eq!(summary.change_ha, 30.0);
        assert!(summary.to_string().contains("change +30.0 ha"));

        assert!(MonthlyTable::default().summary().is_none());
    }

    #[test]
    fn csv_has_fixed_header_and_sorted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvTableSink::new(dir.path().join("CGSM_ComplejoPajarales"));
        let table = MonthlyTable::new(vec![record(7, 12.5), record(5, 0.0)]);

        let path = sink.write_table(&table, "Pajarales_NDVI040_monthly_median_18m").unwrap();
        assert!(path.ends_with("CGSM_ComplejoPajarales/Pajarales_NDVI040_monthly_median_18m.csv"));

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "month,area_ha,n_scenes,valid_frac");
        assert_eq!(lines[1], "2025-05,0.0,2,0.5");
        assert_eq!(lines[2], "2025-07,12.5,2,0.5");
    }

    #[test]
    fn empty_table_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = CsvTableSink::new(dir.path())
            .write_table(&MonthlyTable::default(), "empty")
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap().trim(), "month,area_ha,n_scenes,valid_frac");
    }
}
