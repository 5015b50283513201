use chrono::{Duration, NaiveDate};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// Extract YYYY-MM-DD from an ISO date or datetime string.
pub fn date_key_from_iso(iso: &str) -> &str {
    // get() keeps this safe when byte 10 falls inside a multi-byte char.
    iso.get(..10).unwrap_or(iso)
}
