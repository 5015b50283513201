//! HTTP client for the remote insight store.
//!
//! The store is a PostgREST-style endpoint exposing one `insights` table.
//! Filters are passed as `column=op.value` query parameters and auth is a
//! bearer key sent alongside an `apikey` header.

pub mod types;

use std::time::Duration;

use chrono::NaiveDate;
use log::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::ident::{Level, Platform};
use types::RawInsightRow;

/// Environment variable naming the store base URL.
pub const ENV_STORE_URL: &str = "PERFODW_STORE_URL";
/// Environment variable holding the store API key.
pub const ENV_STORE_KEY: &str = "PERFODW_STORE_KEY";

/// Hard cap on rows per request; the store truncates silently past this.
pub const MAX_ROWS_PER_REQUEST: u32 = 50_000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl StoreClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("store API key is empty".to_string()));
        }
        let base_url = Url::parse(base_url)?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(StoreClient {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from `PERFODW_STORE_URL` and `PERFODW_STORE_KEY`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(ENV_STORE_URL)
            .map_err(|_| Error::Config(format!("{ENV_STORE_URL} is not set")))?;
        let key = std::env::var(ENV_STORE_KEY)
            .map_err(|_| Error::Config(format!("{ENV_STORE_KEY} is not set")))?;
        Self::new(&url, &key)
    }

    /// Fetch raw insight rows for one account at one level over a date range.
    ///
    /// `limit` is clamped to [`MAX_ROWS_PER_REQUEST`]. Rows come back
    /// unvalidated; callers convert them via [`RawInsightRow::into_record`].
    pub async fn fetch_insights(
        &self,
        account_id: &str,
        platform: Platform,
        level: Level,
        start: NaiveDate,
        end: NaiveDate,
        limit: u32,
    ) -> Result<Vec<RawInsightRow>> {
        let mut url = self.base_url.join("insights")?;
        let limit = limit.min(MAX_ROWS_PER_REQUEST);
        url.query_pairs_mut()
            .append_pair("account_id", &format!("eq.{account_id}"))
            .append_pair("platform", &format!("eq.{}", platform.as_str()))
            .append_pair("level", &format!("eq.{}", level.as_str()))
            .append_pair("date", &format!("gte.{start}"))
            .append_pair("date", &format!("lte.{end}"))
            .append_pair("order", "date.asc")
            .append_pair("limit", &limit.to_string());

        debug!("GET {url}");
        let response = self
            .http
            .get(url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(Error::Store(format!(
                "store returned {status} for {account_id}/{}: {snippet}",
                level.as_str()
            )));
        }

        let rows: Vec<RawInsightRow> = response.json().await?;
        debug!(
            "fetched {} {} rows for {account_id} ({start}..{end})",
            rows.len(),
            level.as_str()
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_key() {
        assert!(StoreClient::new("https://store.example.com/", "").is_err());
        assert!(StoreClient::new("https://store.example.com/", "   ").is_err());
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(StoreClient::new("not a url", "key").is_err());
    }

    #[test]
    fn test_new_accepts_valid_config() {
        let client = StoreClient::new("https://store.example.com/", "key");
        assert!(client.is_ok());
    }
}
