pub mod date_util;
pub mod error;
pub mod goals;
pub mod ident;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
pub use goals::{Direction, Goal, GoalProgress, GoalStatus, HealthTier, KpiReport};
pub use ident::{Level, Platform};
pub use ingest::{IngestOptions, IngestProgress, IngestReport, IngestStatus, NoopProgress};
pub use metrics::{AggregatedTotals, EntityTotals, Metric, PerformanceRecord};
pub use query::builder::InsightQuery;
pub use query::period::Period;
pub use storage::Database;
pub use store::StoreClient;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{Account, Client, IngestJob, KpiSlot};

use ingest::ingestor;
use storage::repository;

/// Main entry point for the performance data warehouse.
pub struct PerfoDW {
    db: Database,
    store: Option<StoreClient>,
}

impl PerfoDW {
    pub fn new(db: Database, store: Option<StoreClient>) -> Self {
        Self { db, store }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    fn store(&self) -> Result<&StoreClient> {
        self.store.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "no store configured; set {} and {}",
                store::ENV_STORE_URL,
                store::ENV_STORE_KEY
            ))
        })
    }

    // ── Ingest commands ────────────────────────────────────────────

    pub async fn ingest_account(
        &self,
        platform: Platform,
        account_id: &str,
        options: &IngestOptions,
        progress: &dyn IngestProgress,
    ) -> Result<IngestReport> {
        let store = self.store()?;
        ingestor::ingest_account(&self.db, store, platform, account_id, options, progress).await
    }

    /// Ingest every registered account, continuing past per-account failures.
    pub async fn ingest_all(
        &self,
        options: &IngestOptions,
        progress: &dyn IngestProgress,
    ) -> Result<Vec<IngestReport>> {
        let store = self.store()?;
        let accounts: Vec<Account> = self
            .db
            .reader()
            .call(|conn| repository::list_accounts(conn))
            .await?;

        let total = accounts.len();
        let mut reports = Vec::new();
        for (i, account) in accounts.iter().enumerate() {
            progress.on_entity_start(&account.account_key, i, total);
            let result = ingestor::ingest_account(
                &self.db,
                store,
                account.platform,
                &account.account_id,
                options,
                progress,
            )
            .await;
            match result {
                Ok(report) => {
                    progress.on_entity_complete(&report);
                    reports.push(report);
                }
                Err(e) => {
                    log::error!("Failed to ingest {}: {e}", account.account_key);
                    let report = IngestReport::failed(account.account_key.clone(), e.to_string());
                    progress.on_entity_complete(&report);
                    reports.push(report);
                }
            }
        }
        Ok(reports)
    }

    // ── Account commands ───────────────────────────────────────────

    pub async fn account_add(
        &self,
        platform: Platform,
        account_id: &str,
        display_name: Option<&str>,
    ) -> Result<String> {
        let account_id = ident::normalize_account_id(platform, account_id).to_string();
        let display_name = display_name.map(|s| s.to_string());
        self.db
            .writer()
            .call(move |conn| {
                repository::add_account(conn, platform, &account_id, display_name.as_deref())
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn account_remove(&self, account_key: &str) -> Result<bool> {
        self.db
            .writer()
            .call({
                let account_key = account_key.to_string();
                move |conn| repository::remove_account(conn, &account_key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn account_list(&self) -> Result<Vec<Account>> {
        self.db
            .reader()
            .call(|conn| repository::list_accounts(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Client commands ────────────────────────────────────────────

    pub async fn client_set(&self, client: Client) -> Result<()> {
        self.db
            .writer()
            .call(move |conn| repository::upsert_client(conn, &client))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn client_get(&self, client_id: &str) -> Result<Client> {
        let client_id = client_id.to_string();
        let found = self
            .db
            .reader()
            .call({
                let client_id = client_id.clone();
                move |conn| repository::get_client(conn, &client_id)
            })
            .await?;
        found.ok_or(Error::NotFound(format!("client {client_id}")))
    }

    pub async fn client_list(&self) -> Result<Vec<Client>> {
        self.db
            .reader()
            .call(|conn| repository::list_clients(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn client_remove(&self, client_id: &str) -> Result<bool> {
        self.db
            .writer()
            .call({
                let client_id = client_id.to_string();
                move |conn| repository::remove_client(conn, &client_id)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Combined totals across a client's linked Meta and Google accounts.
    pub async fn client_totals(&self, client_id: &str, period: &Period) -> Result<AggregatedTotals> {
        let client = self.client_get(client_id).await?;
        metrics::client_totals(&self.db, &client, period).await
    }

    /// Evaluate a client's configured KPI slots over a period.
    pub async fn client_kpis(&self, client_id: &str, period: &Period) -> Result<Vec<KpiReport>> {
        let client = self.client_get(client_id).await?;
        let totals = metrics::client_totals(&self.db, &client, period).await?;
        let mut reports = Vec::new();
        if let Some(ref slot) = client.kpi1 {
            reports.push(goals::evaluate_kpi(slot, &totals));
        }
        if let Some(ref slot) = client.kpi2 {
            reports.push(goals::evaluate_kpi(slot, &totals));
        }
        Ok(reports)
    }

    // ── Goal commands ──────────────────────────────────────────────

    pub async fn goal_set(&self, goal: Goal) -> Result<()> {
        self.db
            .writer()
            .call(move |conn| repository::set_goal(conn, &goal))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn goal_get(&self, entity_key: &str) -> Result<Goal> {
        let entity_key = entity_key.to_string();
        let found = self
            .db
            .reader()
            .call({
                let entity_key = entity_key.clone();
                move |conn| repository::get_goal(conn, &entity_key)
            })
            .await?;
        found.ok_or(Error::NotFound(format!("goal {entity_key}")))
    }

    pub async fn goal_list(&self) -> Result<Vec<Goal>> {
        self.db
            .reader()
            .call(|conn| repository::list_goals(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn goal_remove(&self, entity_key: &str) -> Result<bool> {
        self.db
            .writer()
            .call({
                let entity_key = entity_key.to_string();
                move |conn| repository::remove_goal(conn, &entity_key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Evaluate one stored goal over a period.
    pub async fn goal_progress(&self, entity_key: &str, period: &Period) -> Result<GoalProgress> {
        let goal = self.goal_get(entity_key).await?;
        goals::progress(&self.db, &goal, period).await
    }

    /// Evaluate every stored goal over a period.
    pub async fn goal_progress_all(&self, period: &Period) -> Result<Vec<GoalProgress>> {
        let stored = self.goal_list().await?;
        let mut out = Vec::with_capacity(stored.len());
        for goal in &stored {
            out.push(goals::progress(&self.db, goal, period).await?);
        }
        Ok(out)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Status ─────────────────────────────────────────────────────

    pub async fn recent_jobs(&self, limit: u32) -> Result<Vec<IngestJob>> {
        self.db
            .reader()
            .call(move |conn| repository::recent_ingest_jobs(conn, limit))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
