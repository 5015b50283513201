use serde::Serialize;

use crate::error::Result;
use crate::storage::Database;

/// A row from an insight query.
#[derive(Debug, Clone, Serialize)]
pub struct InsightRow {
    pub platform: String,
    pub level: String,
    pub entity_id: String,
    pub entity_name: Option<String>,
    pub parent_id: Option<String>,
    pub account_id: String,
    pub date_key: String,
    pub status: Option<String>,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
}

/// Builder for constructing insight queries with optional filters.
#[derive(Debug, Clone, Default)]
pub struct InsightQuery {
    account_id: Option<String>,
    platform: Option<String>,
    level: Option<String>,
    entity_ids: Vec<String>,
    date_after: Option<String>,
    date_before: Option<String>,
    limit: Option<u32>,
    order_by: Option<String>,
    order_desc: bool,
}

impl InsightQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn platform(mut self, platform: crate::ident::Platform) -> Self {
        self.platform = Some(platform.as_str().to_string());
        self
    }

    pub fn level(mut self, level: crate::ident::Level) -> Self {
        self.level = Some(level.as_str().to_string());
        self
    }

    pub fn entities(mut self, ids: &[String]) -> Self {
        self.entity_ids = ids.to_vec();
        self
    }

    pub fn date_after(mut self, date: &str) -> Self {
        self.date_after = Some(date.to_string());
        self
    }

    pub fn date_before(mut self, date: &str) -> Self {
        self.date_before = Some(date.to_string());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_desc = true;
        self
    }

    /// Build and execute the query, returning insight rows.
    pub async fn rows(self, db: &Database) -> Result<Vec<InsightRow>> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (sql, params) = builder.build_sql();
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), |row| {
                    Ok(InsightRow {
                        platform: row.get(0)?,
                        level: row.get(1)?,
                        entity_id: row.get(2)?,
                        entity_name: row.get(3)?,
                        parent_id: row.get(4)?,
                        account_id: row.get(5)?,
                        date_key: row.get(6)?,
                        status: row.get(7)?,
                        impressions: row.get(8)?,
                        clicks: row.get(9)?,
                        spend: row.get(10)?,
                        conversions: row.get(11)?,
                        revenue: row.get(12)?,
                    })
                })?;
                let result: std::result::Result<Vec<InsightRow>, _> = rows.collect();
                result
            })
            .await
            .map_err(|e| crate::error::Error::Database(e.to_string()))
    }

    /// Build and execute the query, returning a count of matching rows.
    pub async fn count(self, db: &Database) -> Result<u64> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (inner_sql, params) = builder.build_sql();
                let sql = format!("SELECT COUNT(*) FROM ({inner_sql})");
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
                Ok::<u64, rusqlite::Error>(count as u64)
            })
            .await
            .map_err(|e| crate::error::Error::Database(e.to_string()))
    }

    /// Build and execute the query, returning results as JSON.
    pub async fn to_json(self, db: &Database) -> Result<String> {
        let rows = self.rows(db).await?;
        serde_json::to_string_pretty(&rows).map_err(|e| crate::error::Error::Other(e.to_string()))
    }

    /// Build and execute the query, returning results as CSV.
    pub async fn to_csv(self, db: &Database) -> Result<String> {
        let rows = self.rows(db).await?;
        let mut out = String::new();
        out.push_str(
            "platform,level,entity_id,entity_name,parent_id,account_id,date,status,impressions,clicks,spend,conversions,revenue\n",
        );
        for row in &rows {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                csv_escape(&row.platform),
                csv_escape(&row.level),
                csv_escape(&row.entity_id),
                csv_escape(row.entity_name.as_deref().unwrap_or("")),
                csv_escape(row.parent_id.as_deref().unwrap_or("")),
                csv_escape(&row.account_id),
                csv_escape(&row.date_key),
                csv_escape(row.status.as_deref().unwrap_or("")),
                row.impressions,
                row.clicks,
                row.spend,
                row.conversions,
                row.revenue,
            ));
        }
        Ok(out)
    }

    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();
        let mut param_idx = 1;

        let select = "SELECT i.platform, i.level, i.entity_id, i.entity_name, i.parent_id,
                i.account_id, i.date_key, i.status,
                i.impressions, i.clicks, i.spend, i.conversions, i.revenue
            FROM fact_insights i";

        if let Some(ref account_id) = self.account_id {
            wheres.push(format!("i.account_id = ?{param_idx}"));
            params.push(Box::new(account_id.clone()));
            param_idx += 1;
        }

        if let Some(ref platform) = self.platform {
            wheres.push(format!("i.platform = ?{param_idx}"));
            params.push(Box::new(platform.clone()));
            param_idx += 1;
        }

        if let Some(ref level) = self.level {
            wheres.push(format!("i.level = ?{param_idx}"));
            params.push(Box::new(level.clone()));
            param_idx += 1;
        }

        if !self.entity_ids.is_empty() {
            let placeholders: Vec<String> = self
                .entity_ids
                .iter()
                .map(|_| {
                    let p = format!("?{param_idx}");
                    param_idx += 1;
                    p
                })
                .collect();
            wheres.push(format!("i.entity_id IN ({})", placeholders.join(",")));
            for id in &self.entity_ids {
                params.push(Box::new(id.clone()));
            }
        }

        if let Some(ref date) = self.date_after {
            wheres.push(format!("i.date_key >= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }
        if let Some(ref date) = self.date_before {
            wheres.push(format!("i.date_key <= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }

        let mut sql = select.to_string();
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }

        let order_field = self.order_by.as_deref().unwrap_or("i.date_key");
        let order_dir = if self.order_desc { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY {order_field} {order_dir}"));

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT ?{param_idx}"));
            params.push(Box::new(limit));
        }

        (sql, params)
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
