use chrono::Duration;

use crate::error::Result;
use crate::ident::{entity_key, normalize_account_id, Level, Platform};
use crate::ingest::{IngestOptions, IngestProgress, IngestReport, DEFAULT_WINDOW_DAYS};
use crate::storage::repository;
use crate::storage::Database;
use crate::store::{StoreClient, MAX_ROWS_PER_REQUEST};

/// `app_config` key overriding the per-request row cap.
pub const CONFIG_ROW_LIMIT: &str = "ingest_row_limit";

/// Ingest one account's insight rows at every level into the warehouse.
///
/// Fetches campaign, ad set, and ad rows for the requested window, validates
/// each, and upserts the good ones. Rejected rows are counted and logged but
/// never abort the run; a transport or database error does.
pub async fn ingest_account(
    db: &Database,
    store: &StoreClient,
    platform: Platform,
    account_id: &str,
    options: &IngestOptions,
    progress: &dyn IngestProgress,
) -> Result<IngestReport> {
    let account_id = normalize_account_id(platform, account_id).to_string();
    let account_key = entity_key(platform, &account_id);

    let today = chrono::Local::now().date_naive();
    let since = options
        .since_date()
        .unwrap_or(today - Duration::days(DEFAULT_WINDOW_DAYS as i64 - 1));
    let row_limit = resolve_row_limit(db, options).await?;

    let job_id = db
        .writer()
        .call({
            let account_key = account_key.clone();
            let range_start = since.format("%Y-%m-%d").to_string();
            let range_end = today.format("%Y-%m-%d").to_string();
            move |conn| {
                repository::insert_ingest_job(conn, &account_key, Some(&range_start), Some(&range_end))
            }
        })
        .await?;

    let mut rows_ingested: u64 = 0;
    let mut rows_rejected: u64 = 0;

    for level in Level::ALL {
        let raw_rows = match store
            .fetch_insights(&account_id, platform, level, since, today, row_limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                let message = e.to_string();
                db.writer()
                    .call(move |conn| {
                        repository::update_ingest_job(
                            conn,
                            job_id,
                            "failed",
                            rows_ingested,
                            rows_rejected,
                            Some(&message),
                        )
                    })
                    .await?;
                return Err(e);
            }
        };
        progress.on_rows_fetched(&account_key, level, raw_rows.len());

        let mut records = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            match raw.into_record() {
                Ok(record) => records.push(record),
                Err(reason) => {
                    log::warn!("Rejected {} row for {account_key}: {reason}", level.as_str());
                    rows_rejected += 1;
                }
            }
        }

        rows_ingested += records.len() as u64;
        db.writer()
            .call({
                let account_id = account_id.clone();
                move |conn| {
                    let tx = conn.transaction()?;
                    for record in &records {
                        repository::upsert_insight(&tx, platform, level, &account_id, None, record)?;
                    }
                    tx.commit()?;
                    Ok::<(), rusqlite::Error>(())
                }
            })
            .await?;
    }

    let report = IngestReport::from_counts(account_key.clone(), rows_ingested, rows_rejected);
    let status = report.status.as_str().to_string();
    let error = report.error.clone();
    db.writer()
        .call({
            let account_key = account_key.clone();
            move |conn| {
                repository::update_ingest_job(
                    conn,
                    job_id,
                    &status,
                    rows_ingested,
                    rows_rejected,
                    error.as_deref(),
                )?;
                repository::update_account_ingest_time(conn, &account_key)?;
                Ok::<(), rusqlite::Error>(())
            }
        })
        .await?;

    Ok(report)
}

async fn resolve_row_limit(db: &Database, options: &IngestOptions) -> Result<u32> {
    if let Some(limit) = options.row_limit {
        return Ok(limit.min(MAX_ROWS_PER_REQUEST));
    }
    let configured: Option<String> = db
        .reader()
        .call(|conn| repository::get_config(conn, CONFIG_ROW_LIMIT))
        .await?;
    let limit = configured
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(MAX_ROWS_PER_REQUEST);
    Ok(limit.min(MAX_ROWS_PER_REQUEST))
}
