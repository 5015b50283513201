use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One indicator/value pair from a platform's custom-conversion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub indicator: String,
    pub value: f64,
}

/// A validated per-entity, per-day performance row.
///
/// Counters are already coerced: absent, null, negative, or non-finite
/// source values become 0 at parse time.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceRecord {
    pub entity_id: String,
    pub entity_name: Option<String>,
    pub date: NaiveDate,
    pub status: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
    pub results: Vec<ResultEntry>,
}

/// A metric a goal can target or a report can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Impressions,
    Clicks,
    Spend,
    Conversions,
    Revenue,
    Ctr,
    Cpc,
    Cpm,
    Roas,
    Cpa,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Impressions => "impressions",
            Metric::Clicks => "clicks",
            Metric::Spend => "spend",
            Metric::Conversions => "conversions",
            Metric::Revenue => "revenue",
            Metric::Ctr => "ctr",
            Metric::Cpc => "cpc",
            Metric::Cpm => "cpm",
            Metric::Roas => "roas",
            Metric::Cpa => "cpa",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "impressions" => Ok(Metric::Impressions),
            "clicks" => Ok(Metric::Clicks),
            "spend" => Ok(Metric::Spend),
            "conversions" => Ok(Metric::Conversions),
            "revenue" => Ok(Metric::Revenue),
            "ctr" => Ok(Metric::Ctr),
            "cpc" => Ok(Metric::Cpc),
            "cpm" => Ok(Metric::Cpm),
            "roas" => Ok(Metric::Roas),
            "cpa" => Ok(Metric::Cpa),
            other => Err(Error::MetricParse(format!("unknown metric: {other}"))),
        }
    }

    /// Whether a smaller value is the desirable direction for this metric.
    /// Cost metrics want to go down; everything else wants to go up.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, Metric::Spend | Metric::Cpc | Metric::Cpm | Metric::Cpa)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolled-up totals for one grouping key, with derived ratios computed lazily.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedTotals {
    pub name: Option<String>,
    pub status: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
}

impl AggregatedTotals {
    /// Click-through rate as a percentage. None when there are no impressions.
    pub fn ctr(&self) -> Option<f64> {
        if self.impressions > 0 {
            Some(self.clicks as f64 / self.impressions as f64 * 100.0)
        } else {
            None
        }
    }

    /// Cost per click. None when there are no clicks.
    pub fn cpc(&self) -> Option<f64> {
        if self.clicks > 0 {
            Some(self.spend / self.clicks as f64)
        } else {
            None
        }
    }

    /// Cost per thousand impressions. None when there are no impressions.
    pub fn cpm(&self) -> Option<f64> {
        if self.impressions > 0 {
            Some(self.spend * 1000.0 / self.impressions as f64)
        } else {
            None
        }
    }

    /// Return on ad spend. None when spend is zero.
    pub fn roas(&self) -> Option<f64> {
        if self.spend > 0.0 {
            Some(self.revenue / self.spend)
        } else {
            None
        }
    }

    /// Cost per acquisition. None when there are no conversions.
    pub fn cpa(&self) -> Option<f64> {
        if self.conversions > 0.0 {
            Some(self.spend / self.conversions)
        } else {
            None
        }
    }

    /// Look up any metric's aggregated value. Derived ratios may be None
    /// when their denominator is zero; base counters are always present.
    pub fn value_of(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Impressions => Some(self.impressions as f64),
            Metric::Clicks => Some(self.clicks as f64),
            Metric::Spend => Some(self.spend),
            Metric::Conversions => Some(self.conversions),
            Metric::Revenue => Some(self.revenue),
            Metric::Ctr => self.ctr(),
            Metric::Cpc => self.cpc(),
            Metric::Cpm => self.cpm(),
            Metric::Roas => self.roas(),
            Metric::Cpa => self.cpa(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_parse() {
        assert_eq!(Metric::parse("conversions").unwrap(), Metric::Conversions);
        assert_eq!(Metric::parse("ROAS").unwrap(), Metric::Roas);
        assert!(Metric::parse("likes").is_err());
    }

    #[test]
    fn test_lower_is_better() {
        assert!(Metric::Spend.lower_is_better());
        assert!(Metric::Cpc.lower_is_better());
        assert!(Metric::Cpm.lower_is_better());
        assert!(Metric::Cpa.lower_is_better());
        assert!(!Metric::Conversions.lower_is_better());
        assert!(!Metric::Roas.lower_is_better());
    }

    #[test]
    fn test_derived_metrics_none_on_zero_denominator() {
        let totals = AggregatedTotals::default();
        assert_eq!(totals.ctr(), None);
        assert_eq!(totals.cpc(), None);
        assert_eq!(totals.cpm(), None);
        assert_eq!(totals.roas(), None);
        assert_eq!(totals.cpa(), None);
        // Base counters are always defined.
        assert_eq!(totals.value_of(Metric::Spend), Some(0.0));
    }

    #[test]
    fn test_derived_metrics_values() {
        let totals = AggregatedTotals {
            impressions: 1500,
            clicks: 25,
            spend: 60.0,
            conversions: 4.0,
            revenue: 240.0,
            ..Default::default()
        };
        let ctr = totals.ctr().unwrap();
        assert!((ctr - 1.6666666).abs() < 1e-5);
        assert_eq!(totals.cpc(), Some(2.4));
        assert_eq!(totals.cpm(), Some(40.0));
        assert_eq!(totals.roas(), Some(4.0));
        assert_eq!(totals.cpa(), Some(15.0));
    }

    #[test]
    fn test_derived_metrics_finite() {
        let totals = AggregatedTotals {
            impressions: 1,
            clicks: 1,
            spend: 0.0,
            conversions: 0.0,
            revenue: 10.0,
            ..Default::default()
        };
        for metric in [Metric::Ctr, Metric::Cpc, Metric::Cpm, Metric::Roas, Metric::Cpa] {
            if let Some(v) = totals.value_of(metric) {
                assert!(v.is_finite(), "{metric} produced a non-finite value");
            }
        }
    }
}
