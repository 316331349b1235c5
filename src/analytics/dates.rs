use chrono::{Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Closed date range `[start, end]` over a domain's report date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::validation(format!(
                "start_date {start} is after end_date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Whole calendar year.
    pub fn year(year: i32) -> CoreResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| CoreError::validation(format!("invalid year {year}")))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| CoreError::validation(format!("invalid year {year}")))?;
        Ok(Self { start, end })
    }

    /// The same range shifted back one year. 29 February maps to 28 February.
    pub fn previous_year(&self) -> Self {
        let shift = |d: NaiveDate| d.checked_sub_months(Months::new(12)).unwrap_or(d);
        Self {
            start: shift(self.start),
            end: shift(self.end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Five consecutive years ending at the range's end year, or at the current
/// year when no range is given.
pub fn trend_years(range: Option<&DateRange>) -> Vec<i32> {
    let last = range
        .map(|r| r.end.year())
        .unwrap_or_else(|| Utc::now().year());
    (last - 4..=last).collect()
}

pub fn parse_date(value: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::validation(format!("invalid date '{value}', expected YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn previous_year_shifts_both_ends() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 6, 30)).unwrap();
        let prev = range.previous_year();
        assert_eq!(prev.start, d(2023, 1, 1));
        assert_eq!(prev.end, d(2023, 6, 30));
    }

    #[test]
    fn leap_day_clamps() {
        let range = DateRange::new(d(2024, 2, 1), d(2024, 2, 29)).unwrap();
        assert_eq!(range.previous_year().end, d(2023, 2, 28));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(DateRange::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
    }

    #[test]
    fn trend_years_end_at_range_year() {
        let range = DateRange::year(2024).unwrap();
        assert_eq!(trend_years(Some(&range)), vec![2020, 2021, 2022, 2023, 2024]);
    }

    #[test]
    fn parse_date_accepts_iso() {
        assert_eq!(parse_date("2024-03-05").unwrap(), d(2024, 3, 5));
        assert!(parse_date("05/03/2024").is_err());
    }
}
