pub mod ingestor;

pub use ingestor::ingest_account;

use chrono::NaiveDate;
use serde::Serialize;

use crate::ident::Level;

/// Default lookback window when neither `--since` nor `--days` is given.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Options controlling an ingest run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Explicit start date; wins over `days`.
    pub since: Option<NaiveDate>,
    /// Rolling lookback in days, ending today.
    pub days: Option<u32>,
    /// Per-request row cap override.
    pub row_limit: Option<u32>,
}

impl IngestOptions {
    /// Resolve the start date, if any was requested.
    pub fn since_date(&self) -> Option<NaiveDate> {
        if self.since.is_some() {
            return self.since;
        }
        self.days.map(|days| {
            let today = chrono::Local::now().date_naive();
            today - chrono::Duration::days(days.max(1) as i64 - 1)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    PartialFailure,
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Success => "completed",
            IngestStatus::PartialFailure => "partial_failure",
            IngestStatus::Failed => "failed",
        }
    }
}

/// Outcome of ingesting one account.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub entity_key: String,
    pub status: IngestStatus,
    pub rows_ingested: u64,
    pub rows_rejected: u64,
    pub error: Option<String>,
}

impl IngestReport {
    pub fn from_counts(entity_key: String, rows_ingested: u64, rows_rejected: u64) -> Self {
        let status = if rows_rejected == 0 {
            IngestStatus::Success
        } else if rows_ingested > 0 {
            IngestStatus::PartialFailure
        } else {
            IngestStatus::Failed
        };
        IngestReport {
            entity_key,
            status,
            rows_ingested,
            rows_rejected,
            error: if rows_rejected > 0 {
                Some(format!("{rows_rejected} rows rejected"))
            } else {
                None
            },
        }
    }

    pub fn failed(entity_key: String, error: String) -> Self {
        IngestReport {
            entity_key,
            status: IngestStatus::Failed,
            rows_ingested: 0,
            rows_rejected: 0,
            error: Some(error),
        }
    }
}

/// Callbacks for reporting ingest progress to the user interface.
pub trait IngestProgress {
    fn on_entity_start(&self, entity_key: &str, index: usize, total: usize);
    fn on_rows_fetched(&self, entity_key: &str, level: Level, count: usize);
    fn on_entity_complete(&self, report: &IngestReport);
}

/// Progress sink that discards all events.
pub struct NoopProgress;

impl IngestProgress for NoopProgress {
    fn on_entity_start(&self, _entity_key: &str, _index: usize, _total: usize) {}
    fn on_rows_fetched(&self, _entity_key: &str, _level: Level, _count: usize) {}
    fn on_entity_complete(&self, _report: &IngestReport) {}
}
