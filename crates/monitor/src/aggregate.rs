//! Monthly aggregation
//!
//! Turns a raw [`MonthReduction`] into a table record: square metres to
//! hectares, missing values to 0, values clamped to their ranges.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{MonitorError, Result};
use crate::service::{ImageryService, MonthReduction, MonthlyReduction};
use crate::window::month_label;

pub const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

/// One row of the monthly table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRecord {
    /// `YYYY-MM`
    pub month: String,
    /// Vegetated area, hectares (>= 0)
    pub area_ha: f64,
    /// Distinct acquisition groups in the month
    pub n_scenes: usize,
    /// Fraction of the AOI with usable data, [0, 1]
    pub valid_frac: f64,
    /// Month start; ordering key, not exported
    #[serde(skip)]
    pub time_start: NaiveDate,
}

impl MonthlyRecord {
    /// Coalesce a reduction into a record
    pub fn from_reduction(reduction: &MonthReduction) -> Self {
        Self {
            month: month_label(reduction.month),
            area_ha: area_ha(reduction.area_m2),
            n_scenes: reduction.n_scenes,
            valid_frac: coalesce(reduction.valid_frac).clamp(0.0, 1.0),
            time_start: reduction.month,
        }
    }
}

fn coalesce(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Square metres to hectares; missing, non-finite and negative become 0
pub fn area_ha(area_m2: Option<f64>) -> f64 {
    (coalesce(area_m2) / SQUARE_METRES_PER_HECTARE).max(0.0)
}

/// Reduce one month through `service` and coalesce the result
pub fn aggregate_month<S: ImageryService + ?Sized>(
    service: &S,
    request: &MonthlyReduction<'_>,
) -> Result<MonthlyRecord> {
    let reduction = service
        .reduce_month(request)
        .map_err(|e| MonitorError::Aggregation {
            month: request.label(),
            source: Box::new(e),
        })?;
    Ok(MonthlyRecord::from_reduction(&reduction))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn reduction(area_m2: Option<f64>, valid_frac: Option<f64>, n_scenes: usize) -> MonthReduction {
        MonthReduction {
            month: june(),
            n_scenes,
            area_m2,
            valid_frac,
            scale_m: 30.0,
        }
    }

    #[test]
    fn converts_to_hectares() {
        let record = MonthlyRecord::from_reduction(&reduction(Some(1_534_000.0), Some(0.82), 4));
        assert_eq!(record.month, "2025-06");
        assert_eq!(record.area_ha, 153.4);
        assert_eq!(record.n_scenes, 4);
        assert_eq!(record.valid_frac, 0.82);
        assert_eq!(record.time_start, june());
    }

    #[test]
    fn missing_values_become_zero() {
        let record = MonthlyRecord::from_reduction(&reduction(None, None, 0));
        assert_eq!(record.month, "2025-06");
        assert_eq!(record.area_ha, 0.0);
        assert_eq!(record.n_scenes, 0);
        assert_eq!(record.valid_frac, 0.0);
    }

    #[test]
    fn values_are_clamped() {
        let record =
            MonthlyRecord::from_reduction(&reduction(Some(-5.0), Some(1.000_000_1), 1));
        assert_eq!(record.area_ha, 0.0);
        assert_eq!(record.valid_frac, 1.0);

        let record = MonthlyRecord::from_reduction(&reduction(Some(f64::NAN), Some(-0.2), 1));
        assert_eq!(record.area_ha, 0.0);
        assert_eq!(record.valid_frac, 0.0);
    }
}
