//! Inventory time series
//!
//! The ordered sequence of [`InventoryTime`] entries defines how a study is
//! discretized. Each adjacent pair of entries is one processing interval.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Default mixing height when none is recorded (m)
pub const DEFAULT_MIXING_HEIGHT_M: f64 = 914.4;

/// One timestamp of the inventory time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InventoryTime {
    /// Local timestamp of the airport
    pub time: NaiveDateTime,
    /// Atmospheric mixing height (m)
    #[serde(default = "default_mixing_height")]
    pub mixing_height_m: f64,
}

fn default_mixing_height() -> f64 {
    DEFAULT_MIXING_HEIGHT_M
}

impl InventoryTime {
    /// Timestamp with the default mixing height
    pub fn new(time: NaiveDateTime) -> Self {
        Self {
            time,
            mixing_height_m: DEFAULT_MIXING_HEIGHT_M,
        }
    }

    /// Timestamp with an explicit mixing height
    pub fn with_mixing_height(time: NaiveDateTime, mixing_height_m: f64) -> Self {
        Self {
            time,
            mixing_height_m,
        }
    }

    pub fn year(&self) -> i32 {
        self.time.year()
    }

    pub fn month(&self) -> u32 {
        self.time.month()
    }

    pub fn day(&self) -> u32 {
        self.time.day()
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn weekday(&self) -> Weekday {
        self.time.weekday()
    }

    /// Day of the year, 1-based
    pub fn day_of_year(&self) -> u32 {
        self.time.ordinal()
    }

    /// Elapsed time until `later`, in hours (negative if `later` is earlier)
    pub fn hours_until(&self, later: &InventoryTime) -> f64 {
        (later.time - self.time).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// Build an evenly spaced series covering `[start, end]`
///
/// The last entry is `end` when the span is a whole number of steps,
/// otherwise the last step that does not pass `end`. A step that would run
/// past the representable calendar ends the series.
pub fn regular_series(
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
    mixing_height_m: f64,
) -> Vec<InventoryTime> {
    let mut out = Vec::new();
    if step <= Duration::zero() {
        return out;
    }
    let mut t = start;
    while t <= end {
        out.push(InventoryTime::with_mixing_height(t, mixing_height_m));
        let Some(next) = t.checked_add_signed(step) else {
            break;
        };
        t = next;
    }
    out
}

/// True when every timestamp is strictly later than the previous one
pub fn is_strictly_increasing(series: &[InventoryTime]) -> bool {
    series.windows(2).all(|w| w[0].time < w[1].time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_calendar_fields() {
        let t = InventoryTime::new(at(13));
        assert_eq!(t.year(), 2024);
        assert_eq!(t.month(), 3);
        assert_eq!(t.day(), 1);
        assert_eq!(t.hour(), 13);
        assert_eq!(t.weekday(), Weekday::Fri);
        assert_eq!(t.day_of_year(), 61); // leap year
        assert_eq!(t.mixing_height_m, DEFAULT_MIXING_HEIGHT_M);
    }

    #[test]
    fn test_regular_series() {
        let series = regular_series(at(0), at(3), Duration::hours(1), 500.0);
        assert_eq!(series.len(), 4);
        assert!(is_strictly_increasing(&series));
        assert_eq!(series[3].time, at(3));
        assert_eq!(series[0].mixing_height_m, 500.0);
        assert_eq!(series[0].hours_until(&series[3]), 3.0);
    }

    #[test]
    fn test_regular_series_rejects_zero_step() {
        assert!(regular_series(at(0), at(3), Duration::zero(), 500.0).is_empty());
    }

    #[test]
    fn test_regular_series_stops_at_calendar_limit() {
        let series = regular_series(
            at(0),
            NaiveDateTime::MAX,
            Duration::days(36_500_000),
            500.0,
        );
        assert!(!series.is_empty());
        assert!(is_strictly_increasing(&series));
        assert_eq!(series[0].time, at(0));
    }

    #[test]
    fn test_not_increasing() {
        let series = vec![InventoryTime::new(at(2)), InventoryTime::new(at(1))];
        assert!(!is_strictly_increasing(&series));
    }
}
