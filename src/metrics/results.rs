//! Fallback extraction of conversions and revenue from platform
//! custom-conversion payloads.
//!
//! Meta reports purchases under indicator names like
//! `offsite_conversion.fb_pixel_purchase` with a sibling
//! `...purchase.value` carrying the monetary amount. When an insight
//! row's primary conversion/revenue counters are zero or missing, the
//! payload is the source of truth.

use std::collections::HashMap;

use crate::metrics::types::{PerformanceRecord, ResultEntry};

/// Sum payload values per indicator name.
fn indicator_sums(results: &[ResultEntry]) -> HashMap<&str, f64> {
    let mut sums: HashMap<&str, f64> = HashMap::new();
    for entry in results {
        if entry.value.is_finite() {
            *sums.entry(entry.indicator.as_str()).or_insert(0.0) += entry.value;
        }
    }
    sums
}

fn is_purchase_count(indicator: &str) -> bool {
    // `fb_pixel_purchase` indicators also have `.value`-suffixed siblings
    // carrying revenue; those must not count as purchases.
    indicator.ends_with(".purchase")
        || (indicator.contains("fb_pixel_purchase") && !indicator.ends_with(".value"))
}

fn is_purchase_value(indicator: &str) -> bool {
    // Meta emits both `...purchase.value` and `..._purchase.value` keys,
    // so a suffix check alone misses `fb_pixel_purchase.value`.
    indicator.contains("purchase.value")
}

/// Conversions from the payload, or None when no purchase indicator matches.
pub fn payload_conversions(results: &[ResultEntry]) -> Option<f64> {
    let sums = indicator_sums(results);
    let mut total = 0.0;
    let mut matched = false;
    for (indicator, value) in &sums {
        if is_purchase_count(indicator) {
            total += value;
            matched = true;
        }
    }
    matched.then_some(total)
}

/// Revenue from the payload, or None when no purchase-value indicator matches.
pub fn payload_revenue(results: &[ResultEntry]) -> Option<f64> {
    let sums = indicator_sums(results);
    let mut total = 0.0;
    let mut matched = false;
    for (indicator, value) in &sums {
        if is_purchase_value(indicator) {
            total += value;
            matched = true;
        }
    }
    matched.then_some(total)
}

/// Conversions for a record: the primary counter when it is a positive
/// finite number, otherwise the payload fallback, otherwise 0.
pub fn effective_conversions(record: &PerformanceRecord) -> f64 {
    if record.conversions.is_finite() && record.conversions > 0.0 {
        return record.conversions;
    }
    payload_conversions(&record.results).unwrap_or(0.0)
}

/// Revenue for a record, with the same primary-then-fallback rule.
pub fn effective_revenue(record: &PerformanceRecord) -> f64 {
    if record.revenue.is_finite() && record.revenue > 0.0 {
        return record.revenue;
    }
    payload_revenue(&record.results).unwrap_or(0.0)
}
