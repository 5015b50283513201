use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::metrics::types::{PerformanceRecord, ResultEntry};

/// One action/result entry as delivered by the store.
///
/// Meta calls the field `action_type`, our store normalizes to `indicator`;
/// values arrive either as a single `value` or a `values` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResultEntry {
    #[serde(alias = "action_type")]
    pub indicator: Option<String>,
    #[serde(alias = "values")]
    pub value: Option<Value>,
}

/// One insight row as delivered by the store, before validation.
///
/// Every field is optional: upstream exports are inconsistent about which
/// columns they populate, and numbers sometimes arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInsightRow {
    #[serde(alias = "entity_id", alias = "campaign_id")]
    pub id: Option<String>,
    #[serde(alias = "entity_name", alias = "campaign_name")]
    pub name: Option<String>,
    #[serde(alias = "date_start", alias = "day")]
    pub date: Option<String>,
    pub status: Option<String>,
    pub parent_id: Option<String>,
    pub impressions: Option<Value>,
    pub clicks: Option<Value>,
    pub spend: Option<Value>,
    pub conversions: Option<Value>,
    pub revenue: Option<Value>,
    pub results: Option<Vec<RawResultEntry>>,
}

impl RawInsightRow {
    /// Validate and convert into a warehouse record.
    ///
    /// Returns the rejection reason when the row is unusable. Metric fields
    /// never cause rejection; bad values coerce to zero instead.
    pub fn into_record(self) -> std::result::Result<PerformanceRecord, String> {
        let entity_id = match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err("missing entity id".to_string()),
        };
        let date_str = match self.date.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => return Err(format!("row {entity_id}: missing date")),
        };
        // Timestamps come through occasionally; keep the date part.
        let date_part = crate::date_util::date_key_from_iso(date_str);
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_err(|_| format!("row {entity_id}: unparseable date {date_str:?}"))?;

        let results = self
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let indicator = entry.indicator?.trim().to_string();
                if indicator.is_empty() {
                    return None;
                }
                let value = entry.value.as_ref().and_then(number_from)?;
                Some(ResultEntry { indicator, value })
            })
            .collect();

        Ok(PerformanceRecord {
            entity_id,
            entity_name: self.name.filter(|n| !n.trim().is_empty()),
            date,
            status: self.status.filter(|s| !s.trim().is_empty()),
            impressions: count_from(self.impressions.as_ref()),
            clicks: count_from(self.clicks.as_ref()),
            spend: amount_from(self.spend.as_ref()),
            conversions: amount_from(self.conversions.as_ref()),
            revenue: amount_from(self.revenue.as_ref()),
            results,
        })
    }
}

/// Pull a number out of a JSON value that may be a number, a numeric string,
/// or a one-element array of either.
fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Array(items) => items.first().and_then(number_from),
        _ => None,
    }
}

fn amount_from(value: Option<&Value>) -> f64 {
    match value.and_then(number_from) {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

fn count_from(value: Option<&Value>) -> u64 {
    amount_from(value) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row_from(v: Value) -> RawInsightRow {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_into_record_full_row() {
        let row = row_from(json!({
            "id": "c1",
            "name": "Campaign One",
            "date": "2026-08-01",
            "status": "ACTIVE",
            "impressions": 1500,
            "clicks": 25,
            "spend": "60.0",
            "conversions": 3,
            "revenue": 180.0,
            "results": [
                {"indicator": "actions:offsite_conversion.fb_pixel_purchase", "value": 3},
                {"indicator": "actions:purchase.value", "value": "180"}
            ]
        }));
        let record = row.into_record().unwrap();
        assert_eq!(record.entity_id, "c1");
        assert_eq!(record.impressions, 1500);
        assert_eq!(record.clicks, 25);
        assert_eq!(record.spend, 60.0);
        assert_eq!(record.results.len(), 2);
    }

    #[test]
    fn test_missing_id_rejected() {
        let err = row_from(json!({"date": "2026-08-01"}))
            .into_record()
            .unwrap_err();
        assert!(err.contains("missing entity id"));

        let err = row_from(json!({"id": "  ", "date": "2026-08-01"}))
            .into_record()
            .unwrap_err();
        assert!(err.contains("missing entity id"));
    }

    #[test]
    fn test_missing_or_bad_date_rejected() {
        let err = row_from(json!({"id": "c1"})).into_record().unwrap_err();
        assert!(err.contains("missing date"));

        let err = row_from(json!({"id": "c1", "date": "yesterday"}))
            .into_record()
            .unwrap_err();
        assert!(err.contains("unparseable date"));
    }

    #[test]
    fn test_multibyte_date_rejected_without_panic() {
        let err = row_from(json!({"id": "c1", "date": "2026-08-0é"}))
            .into_record()
            .unwrap_err();
        assert!(err.contains("unparseable date"));
    }

    #[test]
    fn test_timestamp_date_truncated() {
        let record = row_from(json!({"id": "c1", "date": "2026-08-01T00:00:00Z"}))
            .into_record()
            .unwrap();
        assert_eq!(record.date.to_string(), "2026-08-01");
    }

    #[test]
    fn test_field_aliases() {
        let record = row_from(json!({
            "campaign_id": "c9",
            "campaign_name": "Aliased",
            "day": "2026-08-02"
        }))
        .into_record()
        .unwrap();
        assert_eq!(record.entity_id, "c9");
        assert_eq!(record.entity_name.as_deref(), Some("Aliased"));
    }

    #[test]
    fn test_bad_metric_values_coerce_to_zero() {
        let record = row_from(json!({
            "id": "c1",
            "date": "2026-08-01",
            "impressions": -5,
            "clicks": "lots",
            "spend": null
        }))
        .into_record()
        .unwrap();
        assert_eq!(record.impressions, 0);
        assert_eq!(record.clicks, 0);
        assert_eq!(record.spend, 0.0);
    }

    #[test]
    fn test_result_entry_variants() {
        let record = row_from(json!({
            "id": "c1",
            "date": "2026-08-01",
            "results": [
                {"action_type": "purchase", "values": ["2.5"]},
                {"indicator": "", "value": 1},
                {"indicator": "no_value"},
                {"indicator": "bad_value", "value": {"nested": true}}
            ]
        }))
        .into_record()
        .unwrap();
        assert_eq!(record.results.len(), 1);
        assert_eq!(record.results[0].indicator, "purchase");
        assert_eq!(record.results[0].value, 2.5);
    }
}
