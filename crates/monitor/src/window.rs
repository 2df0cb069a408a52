//! Calendar month windows
//!
//! All month arithmetic runs on month starts (day 1), so adding or removing
//! months never clamps a day-of-month. A window only ever holds months that
//! have fully elapsed relative to the reference date.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};

use crate::error::{MonitorError, Result};

/// First day of the month containing `date`
pub fn floor_to_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// Shift a date by `n` calendar months (negative goes back).
///
/// `None` when the result leaves chrono's supported range.
pub fn add_months(date: NaiveDate, n: i32) -> Option<NaiveDate> {
    let months = Months::new(n.unsigned_abs());
    if n >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    }
}

/// `YYYY-MM` label of the month containing `date`
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Parse a `YYYY-MM` label into the month start
pub fn parse_month_label(label: &str) -> Result<NaiveDate> {
    let label = label.trim();
    let bad = || MonitorError::InvalidMonth(label.to_string());

    let (year, month) = label.split_once('-').ok_or_else(bad)?;
    if year.len() != 4 || month.len() != 2 {
        return Err(bad());
    }
    let year: i32 = year.parse().map_err(|_| bad())?;
    let month: u32 = month.parse().map_err(|_| bad())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(bad)
}

/// Half-open calendar month `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthInterval {
    /// Interval of the month containing `date`
    pub fn of(date: NaiveDate) -> Result<Self> {
        let start = floor_to_month(date);
        let end = add_months(start, 1).ok_or_else(|| MonitorError::InvalidMonth(month_label(start)))?;
        Ok(Self { start, end })
    }

    pub fn label(&self) -> String {
        month_label(self.start)
    }

    /// Start as a UTC instant (00:00:00)
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive end as a UTC instant
    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_utc() && instant < self.end_utc()
    }
}

/// The `n` most recent fully elapsed months before `today`, ascending.
///
/// The month containing `today` is never included: the last element is the
/// month before it and the first is `n - 1` months earlier.
pub fn build_window(today: NaiveDate, n: usize) -> Result<Vec<NaiveDate>> {
    let current = floor_to_month(today);
    let span = i32::try_from(n).map_err(|_| MonitorError::Config(format!("window of {n} months")))?;

    let first = add_months(current, -span).ok_or_else(|| {
        MonitorError::Config(format!("{n} months before {} is out of range", month_label(current)))
    })?;

    (0..span)
        .map(|i| add_months(first, i).ok_or_else(|| MonitorError::InvalidMonth(month_label(first))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn three_months_before_november() {
        let window = build_window(ymd(2025, 11, 5), 3).unwrap();
        assert_eq!(window, vec![ymd(2025, 8, 1), ymd(2025, 9, 1), ymd(2025, 10, 1)]);
    }

    #[test]
    fn empty_and_single_windows() {
        assert!(build_window(ymd(2025, 11, 5), 0).unwrap().is_empty());
        assert_eq!(build_window(ymd(2025, 11, 30), 1).unwrap(), vec![ymd(2025, 10, 1)]);
    }

    #[test]
    fn first_of_month_still_excludes_current_month() {
        let window = build_window(ymd(2025, 3, 1), 2).unwrap();
        assert_eq!(window, vec![ymd(2025, 1, 1), ymd(2025, 2, 1)]);
    }

    #[test]
    fn window_crosses_year_boundary() {
        let window = build_window(ymd(2025, 2, 14), 4).unwrap();
        assert_eq!(
            window,
            vec![ymd(2024, 10, 1), ymd(2024, 11, 1), ymd(2024, 12, 1), ymd(2025, 1, 1)]
        );
    }

    #[test]
    fn window_properties_hold_across_dates() {
        let mut today = ymd(2023, 1, 1);
        while today < ymd(2026, 1, 1) {
            for n in [1usize, 7, 12, 18, 30] {
                let window = build_window(today, n).unwrap();
                assert_eq!(window.len(), n);
                assert!(window.iter().all(|m| m.day() == 1));
                assert!(window.iter().all(|m| *m < floor_to_month(today)));
                assert_eq!(add_months(*window.last().unwrap(), 1), Some(floor_to_month(today)));
                for pair in window.windows(2) {
                    assert_eq!(add_months(pair[0], 1), Some(pair[1]));
                }
            }
            today = today + Days::new(11);
        }
    }

    #[test]
    fn floor_and_shift() {
        assert_eq!(floor_to_month(ymd(2024, 2, 29)), ymd(2024, 2, 1));
        assert_eq!(add_months(ymd(2024, 1, 1), 13), Some(ymd(2025, 2, 1)));
        assert_eq!(add_months(ymd(2024, 1, 1), -1), Some(ymd(2023, 12, 1)));
    }

    #[test]
    fn month_labels_round_trip() {
        assert_eq!(month_label(ymd(2025, 6, 17)), "2025-06");
        assert_eq!(parse_month_label("2024-10").unwrap(), ymd(2024, 10, 1));
        assert_eq!(parse_month_label(" 2025-02 ").unwrap(), ymd(2025, 2, 1));
        for bad in ["2025-13", "2025-6", "25-06", "2025/06", "", "2025-06-01"] {
            assert!(parse_month_label(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn interval_is_half_open() {
        let june = MonthInterval::of(ymd(2025, 6, 20)).unwrap();
        assert_eq!(june.start, ymd(2025, 6, 1));
        assert_eq!(june.end, ymd(2025, 7, 1));
        assert_eq!(june.label(), "2025-06");

        let first_instant = june.start_utc();
        assert!(june.contains(first_instant));
        assert!(!june.contains(june.end_utc()));
        assert!(june.contains(june.end_utc() - chrono::Duration::milliseconds(1)));
    }
}
