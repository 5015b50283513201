use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::date_util::last_day_of_month;
use crate::error::{Error, Result};

static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})$").unwrap()
});

/// A reporting date window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Month(i32, u8),
    Rolling(u32, NaiveDate),
    YearToDate(i32),
    MonthToDate(i32, u8),
    Range(NaiveDate, NaiveDate),
}

impl Period {
    /// Parse a period string.
    ///
    /// Supported formats:
    /// - `mtd` — month to date (the default window)
    /// - `ytd` — year to date
    /// - `30d` — rolling last N days
    /// - `2026-08` — calendar month
    /// - `2026` — calendar year
    /// - `2026-08-01..2026-08-25` — explicit inclusive range
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let today = chrono::Local::now().date_naive();

        match s.to_lowercase().as_str() {
            "mtd" => {
                return Ok(Period::MonthToDate(today.year(), today.month() as u8));
            }
            "ytd" => {
                return Ok(Period::YearToDate(today.year()));
            }
            _ => {}
        }

        // Rolling: "30d", "7d", etc.
        if s.ends_with('d') || s.ends_with('D') {
            if let Ok(n) = s[..s.len() - 1].parse::<u32>() {
                if n == 0 {
                    return Err(Error::PeriodParse("rolling window must be >= 1 day".into()));
                }
                return Ok(Period::Rolling(n, today));
            }
        }

        // Year: "2026"
        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Period::Year(year));
            }
        }

        // Month: "2026-08"
        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let month: u8 = caps[2].parse().unwrap();
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        // Range: "2026-08-01..2026-08-25"
        if let Some(caps) = RE_RANGE.captures(s) {
            let start = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
                .map_err(|_| Error::PeriodParse(format!("invalid start date: {s}")))?;
            let end = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d")
                .map_err(|_| Error::PeriodParse(format!("invalid end date: {s}")))?;
            if end < start {
                return Err(Error::PeriodParse(format!("range ends before it starts: {s}")));
            }
            return Ok(Period::Range(start, end));
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Convert to a canonical key string for display and storage.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Rolling(n, _) => format!("{n}d"),
            Period::YearToDate(y) => format!("{y}-ytd"),
            Period::MonthToDate(y, m) => format!("{y}-{m:02}-td"),
            Period::Range(start, end) => format!("{start}..{end}"),
        }
    }

    /// Get the date range (inclusive start, inclusive end) for this period.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        let today = chrono::Local::now().date_naive();
        match self {
            Period::Year(y) => (
                NaiveDate::from_ymd_opt(*y, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(*y, 12, 31).unwrap(),
            ),
            Period::Month(y, m) => (
                NaiveDate::from_ymd_opt(*y, *m as u32, 1).unwrap(),
                last_day_of_month(*y, *m as u32),
            ),
            Period::Rolling(n, as_of) => (*as_of - Duration::days(*n as i64 - 1), *as_of),
            Period::YearToDate(y) => (NaiveDate::from_ymd_opt(*y, 1, 1).unwrap(), today),
            Period::MonthToDate(y, m) => {
                (NaiveDate::from_ymd_opt(*y, *m as u32, 1).unwrap(), today)
            }
            Period::Range(start, end) => (*start, *end),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year() {
        assert_eq!(Period::parse("2026").unwrap(), Period::Year(2026));
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(Period::parse("2026-01").unwrap(), Period::Month(2026, 1));
        assert_eq!(Period::parse("2026-12").unwrap(), Period::Month(2026, 12));
    }

    #[test]
    fn test_parse_rolling() {
        let p = Period::parse("30d").unwrap();
        match p {
            Period::Rolling(30, _) => {}
            _ => panic!("expected Rolling(30, _), got {p:?}"),
        }
        assert!(Period::parse("0d").is_err());
    }

    #[test]
    fn test_parse_to_date() {
        let today = chrono::Local::now().date_naive();

        match Period::parse("mtd").unwrap() {
            Period::MonthToDate(y, m) => {
                assert_eq!(y, today.year());
                assert_eq!(m, today.month() as u8);
            }
            p => panic!("expected MonthToDate, got {p:?}"),
        }

        match Period::parse("ytd").unwrap() {
            Period::YearToDate(y) => assert_eq!(y, today.year()),
            p => panic!("expected YearToDate, got {p:?}"),
        }
    }

    #[test]
    fn test_parse_range() {
        let p = Period::parse("2026-08-01..2026-08-25").unwrap();
        let (s, e) = p.date_range();
        assert_eq!(s, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(e, NaiveDate::from_ymd_opt(2026, 8, 25).unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Period::parse("garbage").is_err());
        assert!(Period::parse("2026-13").is_err());
        assert!(Period::parse("2026-08-25..2026-08-01").is_err());
        assert!(Period::parse("2026-08-99..2026-09-01").is_err());
    }

    #[test]
    fn test_to_key() {
        assert_eq!(Period::Year(2026).to_key(), "2026");
        assert_eq!(Period::Month(2026, 8).to_key(), "2026-08");
        assert_eq!(Period::MonthToDate(2026, 8).to_key(), "2026-08-td");
        let range = Period::Range(
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 25).unwrap(),
        );
        assert_eq!(range.to_key(), "2026-08-01..2026-08-25");
    }

    #[test]
    fn test_date_range_year() {
        let (s, e) = Period::Year(2026).date_range();
        assert_eq!(s, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(e, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
    }

    #[test]
    fn test_date_range_month() {
        let (s, e) = Period::Month(2026, 2).date_range();
        assert_eq!(s, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(e, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn test_date_range_rolling() {
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let (s, e) = Period::Rolling(30, as_of).date_range();
        assert_eq!(e, as_of);
        assert_eq!((e - s).num_days(), 29); // 30 days inclusive
    }
}
