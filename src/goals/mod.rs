use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ident::parse_entity_key;
use crate::metrics::types::{AggregatedTotals, Metric};
use crate::query::period::Period;
use crate::storage::repository::KpiSlot;
use crate::storage::Database;

/// Which way a metric should move to count as progress.
///
/// Normally derived from the metric itself (cost metrics go down), but a
/// goal can override it, e.g. spend treated as a delivery target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Higher,
    Lower,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Higher => "higher",
            Direction::Lower => "lower",
        }
    }

    pub fn parse_opt(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "higher" | "up" => Some(Direction::Higher),
            "lower" | "down" => Some(Direction::Lower),
            _ => None,
        }
    }
}

/// A user-defined target for one metric on one entity key.
#[derive(Debug, Clone, Serialize)]
pub struct Goal {
    pub entity_key: String,
    pub metric: Metric,
    pub target: f64,
    pub direction: Option<Direction>,
    pub note: Option<String>,
}

impl Goal {
    /// The effective direction: explicit override, else derived from the metric.
    pub fn effective_direction(&self) -> Direction {
        self.direction.unwrap_or(if self.metric.lower_is_better() {
            Direction::Lower
        } else {
            Direction::Higher
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Ok,
    NoData,
}

/// Qualitative standing of an actual value against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    Good,
    Warn,
    Bad,
    Unavailable,
}

impl HealthTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthTier::Good => "good",
            HealthTier::Warn => "warn",
            HealthTier::Bad => "bad",
            HealthTier::Unavailable => "unavailable",
        }
    }
}

/// Result of evaluating a goal against aggregated totals.
#[derive(Debug, Clone, Serialize)]
pub struct GoalProgress {
    pub entity_key: String,
    pub metric: Metric,
    pub target: f64,
    pub actual: Option<f64>,
    /// Percent complete, always within [0, 100].
    pub progress_pct: f64,
    /// Amount still needed, only meaningful for higher-is-better goals.
    pub remaining: Option<f64>,
    pub status: GoalStatus,
    pub health: HealthTier,
}

/// Evaluate a goal against totals. Stateless and idempotent.
pub fn evaluate(goal: &Goal, totals: &AggregatedTotals) -> GoalProgress {
    let direction = goal.effective_direction();
    let actual = totals.value_of(goal.metric).filter(|v| v.is_finite());

    let Some(actual_value) = actual else {
        return GoalProgress {
            entity_key: goal.entity_key.clone(),
            metric: goal.metric,
            target: goal.target,
            actual: None,
            progress_pct: 0.0,
            remaining: None,
            status: GoalStatus::NoData,
            health: HealthTier::Unavailable,
        };
    };

    let (progress_pct, remaining) = match direction {
        Direction::Lower => {
            let pct = if actual_value <= goal.target {
                100.0
            } else if goal.target <= 0.0 {
                0.0
            } else {
                (goal.target / actual_value * 100.0).clamp(0.0, 100.0)
            };
            (pct, None)
        }
        Direction::Higher => {
            if goal.target <= 0.0 {
                (0.0, None)
            } else {
                let pct = (actual_value / goal.target * 100.0).clamp(0.0, 100.0);
                (pct, Some((goal.target - actual_value).max(0.0)))
            }
        }
    };

    GoalProgress {
        entity_key: goal.entity_key.clone(),
        metric: goal.metric,
        target: goal.target,
        actual: Some(actual_value),
        progress_pct,
        remaining,
        status: GoalStatus::Ok,
        health: classify(Some(actual_value), Some(goal.target), direction),
    }
}

/// Classify an actual value against a target into a health tier.
///
/// Lower-is-better: within target is good, up to 30% over is warn.
/// Higher-is-better: at target is good, down to 70% of it is warn.
pub fn classify(actual: Option<f64>, target: Option<f64>, direction: Direction) -> HealthTier {
    let (Some(actual), Some(target)) = (actual, target) else {
        return HealthTier::Unavailable;
    };
    if !actual.is_finite() || !target.is_finite() {
        return HealthTier::Unavailable;
    }
    match direction {
        Direction::Lower => {
            if actual <= target {
                HealthTier::Good
            } else if actual <= target * 1.3 {
                HealthTier::Warn
            } else {
                HealthTier::Bad
            }
        }
        Direction::Higher => {
            if actual >= target {
                HealthTier::Good
            } else if actual >= target * 0.7 {
                HealthTier::Warn
            } else {
                HealthTier::Bad
            }
        }
    }
}

/// Evaluation of one client KPI slot over combined platform totals.
#[derive(Debug, Clone, Serialize)]
pub struct KpiReport {
    pub name: String,
    pub metric: Metric,
    pub target: f64,
    pub actual: Option<f64>,
    pub health: HealthTier,
}

pub fn evaluate_kpi(slot: &KpiSlot, totals: &AggregatedTotals) -> KpiReport {
    let direction = if slot.metric.lower_is_better() {
        Direction::Lower
    } else {
        Direction::Higher
    };
    let actual = totals.value_of(slot.metric).filter(|v| v.is_finite());
    KpiReport {
        name: slot.name.clone(),
        metric: slot.metric,
        target: slot.target,
        actual,
        health: classify(actual, Some(slot.target), direction),
    }
}

/// Evaluate a stored goal over a period, pulling totals from the warehouse.
///
/// Goal keys of the form `platform:entity_id` resolve to that entity's rows;
/// any other key has no data source and evaluates to `NoData`.
pub async fn progress(db: &Database, goal: &Goal, period: &Period) -> Result<GoalProgress> {
    let Ok((platform, entity_id)) = parse_entity_key(&goal.entity_key) else {
        return Ok(GoalProgress {
            entity_key: goal.entity_key.clone(),
            metric: goal.metric,
            target: goal.target,
            actual: None,
            progress_pct: 0.0,
            remaining: None,
            status: GoalStatus::NoData,
            health: HealthTier::Unavailable,
        });
    };
    let totals = crate::metrics::entity_totals(db, platform, entity_id, period).await?;
    Ok(evaluate(goal, &totals))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(metric: Metric, target: f64) -> Goal {
        Goal {
            entity_key: "meta:c1".to_string(),
            metric,
            target,
            direction: None,
            note: None,
        }
    }

    fn totals_with(conversions: f64, spend: f64) -> AggregatedTotals {
        AggregatedTotals {
            conversions,
            spend,
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let p = evaluate(&goal(Metric::Conversions, 100.0), &totals_with(250.0, 0.0));
        assert_eq!(p.progress_pct, 100.0);
        assert_eq!(p.remaining, Some(0.0));
        assert_eq!(p.status, GoalStatus::Ok);
    }

    #[test]
    fn test_progress_partial() {
        let p = evaluate(&goal(Metric::Conversions, 200.0), &totals_with(50.0, 0.0));
        assert_eq!(p.progress_pct, 25.0);
        assert_eq!(p.remaining, Some(150.0));
    }

    #[test]
    fn test_zero_target_higher_is_no_progress() {
        let p = evaluate(&goal(Metric::Conversions, 0.0), &totals_with(50.0, 0.0));
        assert_eq!(p.progress_pct, 0.0);
        assert_eq!(p.remaining, None);
    }

    #[test]
    fn test_lower_is_better_within_target() {
        let p = evaluate(&goal(Metric::Spend, 100.0), &totals_with(0.0, 80.0));
        assert_eq!(p.progress_pct, 100.0);
        assert_eq!(p.remaining, None);
        assert_eq!(p.health, HealthTier::Good);
    }

    #[test]
    fn test_lower_is_better_over_target() {
        // target 10, actual 1000: progress is 1%, not 100%.
        let p = evaluate(&goal(Metric::Spend, 10.0), &totals_with(0.0, 1000.0));
        assert_eq!(p.progress_pct, 1.0);
        assert_eq!(p.health, HealthTier::Bad);
    }

    #[test]
    fn test_lower_is_better_zero_target_over() {
        let p = evaluate(&goal(Metric::Spend, 0.0), &totals_with(0.0, 5.0));
        assert_eq!(p.progress_pct, 0.0);
    }

    #[test]
    fn test_direction_override_spend_as_delivery() {
        let mut g = goal(Metric::Spend, 100.0);
        g.direction = Some(Direction::Higher);
        let p = evaluate(&g, &totals_with(0.0, 80.0));
        assert_eq!(p.progress_pct, 80.0);
        assert_eq!(p.remaining, Some(20.0));
    }

    #[test]
    fn test_no_data_for_undefined_derived_metric() {
        // No clicks recorded, so CPC is undefined.
        let p = evaluate(&goal(Metric::Cpc, 2.0), &AggregatedTotals::default());
        assert_eq!(p.actual, None);
        assert_eq!(p.progress_pct, 0.0);
        assert_eq!(p.status, GoalStatus::NoData);
        assert_eq!(p.health, HealthTier::Unavailable);
    }

    #[test]
    fn test_classify_higher_tiers() {
        let d = Direction::Higher;
        assert_eq!(classify(Some(100.0), Some(100.0), d), HealthTier::Good);
        assert_eq!(classify(Some(70.0), Some(100.0), d), HealthTier::Warn);
        assert_eq!(classify(Some(69.0), Some(100.0), d), HealthTier::Bad);
        assert_eq!(classify(Some(120.0), Some(100.0), d), HealthTier::Good);
    }

    #[test]
    fn test_classify_lower_tiers() {
        let d = Direction::Lower;
        assert_eq!(classify(Some(90.0), Some(100.0), d), HealthTier::Good);
        assert_eq!(classify(Some(100.0), Some(100.0), d), HealthTier::Good);
        assert_eq!(classify(Some(130.0), Some(100.0), d), HealthTier::Warn);
        assert_eq!(classify(Some(131.0), Some(100.0), d), HealthTier::Bad);
    }

    #[test]
    fn test_classify_unavailable() {
        assert_eq!(
            classify(None, Some(100.0), Direction::Higher),
            HealthTier::Unavailable
        );
        assert_eq!(
            classify(Some(1.0), None, Direction::Higher),
            HealthTier::Unavailable
        );
        assert_eq!(
            classify(Some(f64::NAN), Some(100.0), Direction::Higher),
            HealthTier::Unavailable
        );
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let g = goal(Metric::Conversions, 200.0);
        let t = totals_with(50.0, 10.0);
        let first = evaluate(&g, &t);
        let second = evaluate(&g, &t);
        assert_eq!(first.progress_pct, second.progress_pct);
        assert_eq!(first.health, second.health);
    }

    #[test]
    fn test_evaluate_kpi_uses_metric_direction() {
        let slot = KpiSlot {
            name: "CPA".to_string(),
            metric: Metric::Cpa,
            target: 10.0,
        };
        let totals = AggregatedTotals {
            spend: 120.0,
            conversions: 10.0,
            ..Default::default()
        };
        // CPA = 12, within 30% over a target of 10.
        let report = evaluate_kpi(&slot, &totals);
        assert_eq!(report.actual, Some(12.0));
        assert_eq!(report.health, HealthTier::Warn);
    }
}
