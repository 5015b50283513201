use rusqlite::{params, Connection, OptionalExtension};

use crate::goals::{Direction, Goal};
use crate::ident::{entity_key, Level, Platform};
use crate::metrics::types::{Metric, PerformanceRecord};

// ── Insights ───────────────────────────────────────────────────────

pub fn upsert_insight(
    conn: &Connection,
    platform: Platform,
    level: Level,
    account_id: &str,
    parent_id: Option<&str>,
    record: &PerformanceRecord,
) -> Result<(), rusqlite::Error> {
    let results_json = if record.results.is_empty() {
        None
    } else {
        serde_json::to_string(&record.results).ok()
    };
    let date_key = record.date.format("%Y-%m-%d").to_string();

    conn.execute(
        "INSERT INTO fact_insights (
            platform, level, entity_id, date_key, account_id,
            entity_name, parent_id, status,
            impressions, clicks, spend, conversions, revenue,
            results_json, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, datetime('now'))
        ON CONFLICT(platform, level, entity_id, date_key) DO UPDATE SET
            account_id=excluded.account_id, entity_name=excluded.entity_name,
            parent_id=excluded.parent_id, status=excluded.status,
            impressions=excluded.impressions, clicks=excluded.clicks,
            spend=excluded.spend, conversions=excluded.conversions,
            revenue=excluded.revenue, results_json=excluded.results_json,
            cached_at=excluded.cached_at",
        params![
            platform.as_str(),
            level.as_str(),
            record.entity_id,
            date_key,
            account_id,
            record.entity_name,
            parent_id,
            record.status,
            record.impressions as i64,
            record.clicks as i64,
            record.spend,
            record.conversions,
            record.revenue,
            results_json,
        ],
    )?;
    Ok(())
}

// ── Accounts ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Account {
    pub account_key: String,
    pub platform: Platform,
    pub account_id: String,
    pub display_name: Option<String>,
    pub ingest_enabled: bool,
    pub added_at: String,
    pub last_ingest_at: Option<String>,
}

pub fn add_account(
    conn: &Connection,
    platform: Platform,
    account_id: &str,
    display_name: Option<&str>,
) -> Result<String, rusqlite::Error> {
    let key = entity_key(platform, account_id);
    conn.execute(
        "INSERT OR REPLACE INTO dim_accounts (
            account_key, platform, account_id, display_name, ingest_enabled, added_at
        ) VALUES (?1, ?2, ?3, ?4, 1, datetime('now'))",
        params![key, platform.as_str(), account_id, display_name],
    )?;
    Ok(key)
}

pub fn remove_account(conn: &Connection, account_key: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM dim_accounts WHERE account_key = ?1",
        params![account_key],
    )?;
    Ok(count > 0)
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT account_key, platform, account_id, display_name, ingest_enabled,
                added_at, last_ingest_at
         FROM dim_accounts WHERE ingest_enabled = 1 ORDER BY added_at",
    )?;
    let rows = stmt.query_map([], account_from_row)?;
    rows.collect()
}

pub fn update_account_ingest_time(
    conn: &Connection,
    account_key: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE dim_accounts SET last_ingest_at = datetime('now') WHERE account_key = ?1",
        params![account_key],
    )?;
    Ok(())
}

fn account_from_row(row: &rusqlite::Row<'_>) -> Result<Account, rusqlite::Error> {
    let platform: String = row.get(1)?;
    let platform = Platform::parse(&platform).map_err(|_| {
        rusqlite::Error::InvalidColumnType(1, "platform".into(), rusqlite::types::Type::Text)
    })?;
    Ok(Account {
        account_key: row.get(0)?,
        platform,
        account_id: row.get(2)?,
        display_name: row.get(3)?,
        ingest_enabled: row.get(4)?,
        added_at: row.get(5)?,
        last_ingest_at: row.get(6)?,
    })
}

// ── Clients ────────────────────────────────────────────────────────

/// One of a client's two configurable KPI slots.
#[derive(Debug, Clone)]
pub struct KpiSlot {
    pub name: String,
    pub metric: Metric,
    pub target: f64,
}

#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    pub monthly_budget: Option<f64>,
    pub meta_account_id: Option<String>,
    pub google_account_id: Option<String>,
    pub kpi1: Option<KpiSlot>,
    pub kpi2: Option<KpiSlot>,
    pub created_at: String,
}

pub fn upsert_client(conn: &Connection, client: &Client) -> Result<(), rusqlite::Error> {
    let (kpi1_name, kpi1_metric, kpi1_target) = kpi_columns(client.kpi1.as_ref());
    let (kpi2_name, kpi2_metric, kpi2_target) = kpi_columns(client.kpi2.as_ref());
    conn.execute(
        "INSERT INTO dim_clients (
            client_id, name, monthly_budget, meta_account_id, google_account_id,
            kpi1_name, kpi1_metric, kpi1_target,
            kpi2_name, kpi2_metric, kpi2_target, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, datetime('now'))
        ON CONFLICT(client_id) DO UPDATE SET
            name=excluded.name, monthly_budget=excluded.monthly_budget,
            meta_account_id=excluded.meta_account_id,
            google_account_id=excluded.google_account_id,
            kpi1_name=excluded.kpi1_name, kpi1_metric=excluded.kpi1_metric,
            kpi1_target=excluded.kpi1_target,
            kpi2_name=excluded.kpi2_name, kpi2_metric=excluded.kpi2_metric,
            kpi2_target=excluded.kpi2_target",
        params![
            client.client_id,
            client.name,
            client.monthly_budget,
            client.meta_account_id,
            client.google_account_id,
            kpi1_name,
            kpi1_metric,
            kpi1_target,
            kpi2_name,
            kpi2_metric,
            kpi2_target,
        ],
    )?;
    Ok(())
}

fn kpi_columns(slot: Option<&KpiSlot>) -> (Option<&str>, Option<&'static str>, Option<f64>) {
    match slot {
        Some(k) => (Some(k.name.as_str()), Some(k.metric.as_str()), Some(k.target)),
        None => (None, None, None),
    }
}

pub fn get_client(conn: &Connection, client_id: &str) -> Result<Option<Client>, rusqlite::Error> {
    conn.query_row(
        "SELECT client_id, name, monthly_budget, meta_account_id, google_account_id,
                kpi1_name, kpi1_metric, kpi1_target,
                kpi2_name, kpi2_metric, kpi2_target, created_at
         FROM dim_clients WHERE client_id = ?1",
        params![client_id],
        client_from_row,
    )
    .optional()
}

pub fn list_clients(conn: &Connection) -> Result<Vec<Client>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT client_id, name, monthly_budget, meta_account_id, google_account_id,
                kpi1_name, kpi1_metric, kpi1_target,
                kpi2_name, kpi2_metric, kpi2_target, created_at
         FROM dim_clients ORDER BY name",
    )?;
    let rows = stmt.query_map([], client_from_row)?;
    rows.collect()
}

pub fn remove_client(conn: &Connection, client_id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM dim_clients WHERE client_id = ?1",
        params![client_id],
    )?;
    Ok(count > 0)
}

fn client_from_row(row: &rusqlite::Row<'_>) -> Result<Client, rusqlite::Error> {
    Ok(Client {
        client_id: row.get(0)?,
        name: row.get(1)?,
        monthly_budget: row.get(2)?,
        meta_account_id: row.get(3)?,
        google_account_id: row.get(4)?,
        kpi1: kpi_from_columns(row.get(5)?, row.get(6)?, row.get(7)?),
        kpi2: kpi_from_columns(row.get(8)?, row.get(9)?, row.get(10)?),
        created_at: row.get(11)?,
    })
}

fn kpi_from_columns(
    name: Option<String>,
    metric: Option<String>,
    target: Option<f64>,
) -> Option<KpiSlot> {
    let metric = Metric::parse(&metric?).ok()?;
    let target = target?;
    Some(KpiSlot {
        name: name.unwrap_or_else(|| metric.as_str().to_string()),
        metric,
        target,
    })
}

// ── Goals ──────────────────────────────────────────────────────────

/// Last writer wins: re-setting a goal for the same entity key replaces
/// its metric, target, direction, and note.
pub fn set_goal(conn: &Connection, goal: &Goal) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO goals (entity_key, metric, target, direction, note, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'), datetime('now'))
         ON CONFLICT(entity_key) DO UPDATE SET
            metric=excluded.metric, target=excluded.target,
            direction=excluded.direction, note=excluded.note,
            updated_at=excluded.updated_at",
        params![
            goal.entity_key,
            goal.metric.as_str(),
            goal.target,
            goal.direction.map(|d| d.as_str()),
            goal.note,
        ],
    )?;
    Ok(())
}

pub fn get_goal(conn: &Connection, entity_key: &str) -> Result<Option<Goal>, rusqlite::Error> {
    conn.query_row(
        "SELECT entity_key, metric, target, direction, note FROM goals WHERE entity_key = ?1",
        params![entity_key],
        goal_from_row,
    )
    .optional()
}

pub fn list_goals(conn: &Connection) -> Result<Vec<Goal>, rusqlite::Error> {
    let mut stmt = conn
        .prepare("SELECT entity_key, metric, target, direction, note FROM goals ORDER BY entity_key")?;
    let rows = stmt.query_map([], goal_from_row)?;
    rows.collect()
}

pub fn remove_goal(conn: &Connection, entity_key: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute("DELETE FROM goals WHERE entity_key = ?1", params![entity_key])?;
    Ok(count > 0)
}

fn goal_from_row(row: &rusqlite::Row<'_>) -> Result<Goal, rusqlite::Error> {
    let metric: String = row.get(1)?;
    let metric = Metric::parse(&metric).map_err(|_| {
        rusqlite::Error::InvalidColumnType(1, "metric".into(), rusqlite::types::Type::Text)
    })?;
    let direction: Option<String> = row.get(3)?;
    let direction = direction.as_deref().and_then(Direction::parse_opt);
    Ok(Goal {
        entity_key: row.get(0)?,
        metric,
        target: row.get(2)?,
        direction,
        note: row.get(4)?,
    })
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Ingest Jobs ────────────────────────────────────────────────────

pub fn insert_ingest_job(
    conn: &Connection,
    entity_key: &str,
    range_start: Option<&str>,
    range_end: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO ingest_jobs (entity_key, status, started_at, ingest_range_start, ingest_range_end)
         VALUES (?1, 'running', datetime('now'), ?2, ?3)",
        params![entity_key, range_start, range_end],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_ingest_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    rows_ingested: u64,
    rows_rejected: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE ingest_jobs SET
            status = ?2, completed_at = datetime('now'),
            rows_ingested = ?3, rows_rejected = ?4, error_message = ?5
         WHERE id = ?1",
        params![
            job_id,
            status,
            rows_ingested as i64,
            rows_rejected as i64,
            error_message,
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct IngestJob {
    pub id: i64,
    pub entity_key: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub rows_ingested: i64,
    pub rows_rejected: i64,
    pub error_message: Option<String>,
}

pub fn recent_ingest_jobs(conn: &Connection, limit: u32) -> Result<Vec<IngestJob>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_key, status, started_at, completed_at,
                rows_ingested, rows_rejected, error_message
         FROM ingest_jobs ORDER BY started_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(IngestJob {
            id: row.get(0)?,
            entity_key: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            rows_ingested: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            rows_rejected: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
            error_message: row.get(7)?,
        })
    })?;
    rows.collect()
}
