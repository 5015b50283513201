pub mod results;
pub mod types;

pub use types::*;

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

use crate::error::Result;
use crate::ident::{Level, Platform};
use crate::query::period::Period;
use crate::storage::Database;

/// Roll per-day records up into per-group totals.
///
/// `group_by` maps each record to its grouping key; records mapping to
/// `None` are dropped. Output is sorted by descending spend, ties keeping
/// first-seen order.
pub fn aggregate<K, F>(records: &[PerformanceRecord], group_by: F) -> Vec<(K, AggregatedTotals)>
where
    K: Eq + Hash + Clone,
    F: Fn(&PerformanceRecord) -> Option<K>,
{
    let mut groups: Vec<(K, AggregatedTotals)> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();

    for record in records {
        let Some(key) = group_by(record) else {
            continue;
        };
        let idx = match index.get(&key) {
            Some(&i) => i,
            None => {
                groups.push((key.clone(), AggregatedTotals::default()));
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        let totals = &mut groups[idx].1;
        totals.impressions += record.impressions;
        totals.clicks += record.clicks;
        if record.spend.is_finite() && record.spend > 0.0 {
            totals.spend += record.spend;
        }
        totals.conversions += results::effective_conversions(record);
        totals.revenue += results::effective_revenue(record);
        if totals.name.is_none() {
            totals.name = record.entity_name.clone();
        }
        if totals.status.is_none() {
            totals.status = record.status.clone();
        }
    }

    groups.sort_by(|a, b| {
        b.1.spend
            .partial_cmp(&a.1.spend)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    groups
}

/// A flattened totals row for one entity, ready for display or JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct EntityTotals {
    pub entity_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub cpm: Option<f64>,
    pub roas: Option<f64>,
    pub cpa: Option<f64>,
}

impl EntityTotals {
    pub fn from_totals(entity_id: String, totals: &AggregatedTotals) -> Self {
        Self {
            entity_id,
            name: totals.name.clone(),
            status: totals.status.clone(),
            impressions: totals.impressions,
            clicks: totals.clicks,
            spend: totals.spend,
            conversions: totals.conversions,
            revenue: totals.revenue,
            ctr: totals.ctr(),
            cpc: totals.cpc(),
            cpm: totals.cpm(),
            roas: totals.roas(),
            cpa: totals.cpa(),
        }
    }
}

/// Account-wide totals over a period, from campaign-level rows.
pub async fn account_totals(
    db: &Database,
    account_id: &str,
    platform: Option<Platform>,
    period: &Period,
) -> Result<AggregatedTotals> {
    let records =
        fetch_account_records(db, account_id, platform, Level::Campaign, period).await?;
    let grouped = aggregate(&records, |_| Some(()));
    Ok(grouped
        .into_iter()
        .next()
        .map(|(_, totals)| totals)
        .unwrap_or_default())
}

/// Per-entity totals at the requested level, sorted by descending spend.
pub async fn breakdown(
    db: &Database,
    account_id: &str,
    platform: Option<Platform>,
    level: Level,
    period: &Period,
) -> Result<Vec<EntityTotals>> {
    let records = fetch_account_records(db, account_id, platform, level, period).await?;
    let grouped = aggregate(&records, |r| Some(r.entity_id.clone()));
    Ok(grouped
        .iter()
        .map(|(entity_id, totals)| EntityTotals::from_totals(entity_id.clone(), totals))
        .collect())
}

/// Totals for a single entity (any level) over a period.
pub async fn entity_totals(
    db: &Database,
    platform: Platform,
    entity_id: &str,
    period: &Period,
) -> Result<AggregatedTotals> {
    let (start, end) = period.date_range();
    let start = start.format("%Y-%m-%d").to_string();
    let end = end.format("%Y-%m-%d").to_string();
    let platform = platform.as_str().to_string();
    let entity_id = entity_id.to_string();

    let records = db
        .reader()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT entity_id, entity_name, date_key, status,
                        impressions, clicks, spend, conversions, revenue, results_json
                 FROM fact_insights
                 WHERE platform = ?1 AND entity_id = ?2
                   AND date_key >= ?3 AND date_key <= ?4",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![platform, entity_id, start, end],
                record_from_row,
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    let grouped = aggregate(&records, |_| Some(()));
    Ok(grouped
        .into_iter()
        .next()
        .map(|(_, totals)| totals)
        .unwrap_or_default())
}

/// Combined totals across a client's linked Meta and Google accounts.
pub async fn client_totals(
    db: &Database,
    client: &crate::storage::repository::Client,
    period: &Period,
) -> Result<AggregatedTotals> {
    let mut records = Vec::new();
    if let Some(ref account_id) = client.meta_account_id {
        records.extend(
            fetch_account_records(db, account_id, Some(Platform::Meta), Level::Campaign, period)
                .await?,
        );
    }
    if let Some(ref account_id) = client.google_account_id {
        records.extend(
            fetch_account_records(
                db,
                account_id,
                Some(Platform::Google),
                Level::Campaign,
                period,
            )
            .await?,
        );
    }
    let grouped = aggregate(&records, |_| Some(()));
    Ok(grouped
        .into_iter()
        .next()
        .map(|(_, totals)| totals)
        .unwrap_or_default())
}

async fn fetch_account_records(
    db: &Database,
    account_id: &str,
    platform: Option<Platform>,
    level: Level,
    period: &Period,
) -> Result<Vec<PerformanceRecord>> {
    let (start, end) = period.date_range();
    let start = start.format("%Y-%m-%d").to_string();
    let end = end.format("%Y-%m-%d").to_string();
    let account_id = account_id.to_string();
    let level = level.as_str().to_string();
    let platform = platform.map(|p| p.as_str().to_string());

    let records = db
        .reader()
        .call(move |conn| {
            let mut sql = String::from(
                "SELECT entity_id, entity_name, date_key, status,
                        impressions, clicks, spend, conversions, revenue, results_json
                 FROM fact_insights
                 WHERE account_id = ?1 AND level = ?2
                   AND date_key >= ?3 AND date_key <= ?4",
            );
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
                Box::new(account_id),
                Box::new(level),
                Box::new(start),
                Box::new(end),
            ];
            if let Some(p) = platform {
                sql.push_str(" AND platform = ?5");
                params.push(Box::new(p));
            }
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs.as_slice(), record_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;
    Ok(records)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<PerformanceRecord, rusqlite::Error> {
    let date_key: String = row.get(2)?;
    let date = chrono::NaiveDate::parse_from_str(&date_key, "%Y-%m-%d").map_err(|_| {
        rusqlite::Error::InvalidColumnType(2, "date_key".into(), rusqlite::types::Type::Text)
    })?;
    let results_json: Option<String> = row.get(9)?;
    let results = results_json
        .as_deref()
        .and_then(|json| serde_json::from_str::<Vec<ResultEntry>>(json).ok())
        .unwrap_or_default();

    Ok(PerformanceRecord {
        entity_id: row.get(0)?,
        entity_name: row.get(1)?,
        date,
        status: row.get(3)?,
        impressions: row.get::<_, i64>(4)?.max(0) as u64,
        clicks: row.get::<_, i64>(5)?.max(0) as u64,
        spend: row.get(6)?,
        conversions: row.get(7)?,
        revenue: row.get(8)?,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(entity_id: &str, impressions: u64, clicks: u64, spend: f64) -> PerformanceRecord {
        PerformanceRecord {
            entity_id: entity_id.to_string(),
            entity_name: None,
            date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            status: None,
            impressions,
            clicks,
            spend,
            conversions: 0.0,
            revenue: 0.0,
            results: Vec::new(),
        }
    }

    #[test]
    fn test_aggregate_empty() {
        let grouped = aggregate(&[], |r: &PerformanceRecord| Some(r.entity_id.clone()));
        assert!(grouped.is_empty());
    }

    #[test]
    fn test_aggregate_two_days_one_entity() {
        let records = vec![record("A", 1000, 20, 50.0), record("A", 500, 5, 10.0)];
        let grouped = aggregate(&records, |r| Some(r.entity_id.clone()));
        assert_eq!(grouped.len(), 1);
        let (key, totals) = &grouped[0];
        assert_eq!(key, "A");
        assert_eq!(totals.impressions, 1500);
        assert_eq!(totals.clicks, 25);
        assert_eq!(totals.spend, 60.0);
        let ctr = totals.ctr().unwrap();
        assert!((ctr - 1.6666666).abs() < 1e-5);
        assert_eq!(totals.cpc(), Some(2.4));
        assert_eq!(totals.cpm(), Some(40.0));
    }

    #[test]
    fn test_aggregate_spend_sum_matches_arithmetic() {
        let spends = [12.5, 0.0, 7.25, 100.0];
        let records: Vec<_> = spends
            .iter()
            .map(|&s| record("A", 10, 1, s))
            .collect();
        let grouped = aggregate(&records, |r| Some(r.entity_id.clone()));
        let expected: f64 = spends.iter().sum();
        assert!((grouped[0].1.spend - expected).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_drops_keyless_records() {
        let records = vec![record("A", 100, 1, 1.0), record("", 100, 1, 1.0)];
        let grouped = aggregate(&records, |r| {
            if r.entity_id.is_empty() {
                None
            } else {
                Some(r.entity_id.clone())
            }
        });
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].1.impressions, 100);
    }

    #[test]
    fn test_aggregate_orders_by_spend_desc() {
        let records = vec![
            record("low", 10, 1, 5.0),
            record("high", 10, 1, 100.0),
            record("mid", 10, 1, 50.0),
        ];
        let grouped = aggregate(&records, |r| Some(r.entity_id.clone()));
        let keys: Vec<&str> = grouped.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_aggregate_ties_keep_first_seen_order() {
        let records = vec![
            record("b", 10, 1, 5.0),
            record("a", 10, 1, 5.0),
            record("c", 10, 1, 5.0),
        ];
        let grouped = aggregate(&records, |r| Some(r.entity_id.clone()));
        let keys: Vec<&str> = grouped.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_aggregate_first_name_wins() {
        let mut first = record("A", 1, 0, 0.0);
        first.entity_name = Some("Summer Sale".to_string());
        let mut second = record("A", 1, 0, 0.0);
        second.entity_name = Some("Renamed".to_string());
        let grouped = aggregate(&[first, second], |r| Some(r.entity_id.clone()));
        assert_eq!(grouped[0].1.name.as_deref(), Some("Summer Sale"));
    }

    #[test]
    fn test_aggregate_ignores_negative_spend() {
        // Coercion happens at parse time, but the aggregator also refuses
        // to subtract if a bad row slips through.
        let mut bad = record("A", 0, 0, -10.0);
        bad.spend = -10.0;
        let grouped = aggregate(&[record("A", 0, 0, 5.0), bad], |r| Some(r.entity_id.clone()));
        assert_eq!(grouped[0].1.spend, 5.0);
    }

    #[test]
    fn test_aggregate_uses_payload_fallback() {
        let mut r = record("A", 0, 0, 0.0);
        r.results = vec![
            ResultEntry {
                indicator: "offsite_conversion.fb_pixel_purchase".to_string(),
                value: 2.0,
            },
            ResultEntry {
                indicator: "offsite_conversion.fb_pixel_purchase.value".to_string(),
                value: 150.0,
            },
        ];
        let grouped = aggregate(&[r], |r| Some(r.entity_id.clone()));
        assert_eq!(grouped[0].1.conversions, 2.0);
        assert_eq!(grouped[0].1.revenue, 150.0);
    }

    async fn seed_insights(db: &Database) {
        db.writer()
            .call(|conn| {
                let rows = [
                    ("meta", "campaign", "c1", "2026-08-01", 1000i64, 20i64, 50.0, 1.0, 40.0),
                    ("meta", "campaign", "c1", "2026-08-02", 500, 5, 10.0, 0.0, 0.0),
                    ("meta", "campaign", "c2", "2026-08-01", 2000, 10, 80.0, 2.0, 90.0),
                    ("meta", "adset", "s1", "2026-08-01", 900, 18, 45.0, 1.0, 40.0),
                    ("google", "campaign", "g1", "2026-08-01", 300, 30, 20.0, 3.0, 60.0),
                ];
                for (platform, level, entity_id, date_key, imp, clicks, spend, conv, rev) in rows {
                    conn.execute(
                        "INSERT INTO fact_insights (
                            platform, level, entity_id, date_key, account_id,
                            entity_name, impressions, clicks, spend, conversions, revenue, cached_at
                        ) VALUES (?1, ?2, ?3, ?4, 'acct1', ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
                        rusqlite::params![
                            platform,
                            level,
                            entity_id,
                            date_key,
                            format!("{entity_id} name"),
                            imp,
                            clicks,
                            spend,
                            conv,
                            rev
                        ],
                    )?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_breakdown_and_account_totals() {
        let db = Database::open_memory().await.unwrap();
        seed_insights(&db).await;

        let period = Period::Month(2026, 8);
        let rows = breakdown(&db, "acct1", Some(Platform::Meta), Level::Campaign, &period)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        // c2 spent more, so it sorts first.
        assert_eq!(rows[0].entity_id, "c2");
        assert_eq!(rows[1].entity_id, "c1");
        assert_eq!(rows[1].impressions, 1500);
        assert_eq!(rows[1].clicks, 25);
        assert_eq!(rows[1].spend, 60.0);

        let totals = account_totals(&db, "acct1", Some(Platform::Meta), &period)
            .await
            .unwrap();
        assert_eq!(totals.impressions, 3500);
        assert_eq!(totals.spend, 140.0);

        // No platform filter includes google campaign rows too.
        let all = account_totals(&db, "acct1", None, &period).await.unwrap();
        assert_eq!(all.spend, 160.0);
    }

    #[tokio::test]
    async fn test_entity_totals_out_of_range_dates_excluded() {
        let db = Database::open_memory().await.unwrap();
        seed_insights(&db).await;

        let period = Period::Range(
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        );
        let totals = entity_totals(&db, Platform::Meta, "c1", &period).await.unwrap();
        assert_eq!(totals.impressions, 1000);
        assert_eq!(totals.spend, 50.0);
    }

    #[tokio::test]
    async fn test_account_totals_empty_warehouse() {
        let db = Database::open_memory().await.unwrap();
        let totals = account_totals(&db, "nobody", None, &Period::Year(2026))
            .await
            .unwrap();
        assert_eq!(totals.impressions, 0);
        assert_eq!(totals.ctr(), None);
    }
}
