use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::datastore::TableStore;

/// Supabase-hosted Postgres reached over the PostgREST endpoint. Row
/// operations go through `/rest/v1/{table}`; DDL goes through the
/// `exec_sql` RPC function that the hosted project exposes.
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    client: Client,
}

impl SupabaseStore {
    pub fn new(base_url: String, service_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            client: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.request(method, format!("{}{path}", self.base_url)))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response> {
        if res.status().is_success() {
            Ok(res)
        } else {
            let status = res.status();
            Err(anyhow!(
                "Supabase API error ({status}): {}",
                res.text().await.unwrap_or_default()
            ))
        }
    }

    async fn post_exec_sql(&self, client: &Client, sql: &str) -> Result<()> {
        let res = self
            .authorize(client.request(
                reqwest::Method::POST,
                format!("{}/rest/v1/rpc/exec_sql", self.base_url),
            ))
            .json(&serde_json::json!({ "query": sql }))
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct TableRow {
    table_name: String,
}

#[async_trait]
impl TableStore for SupabaseStore {
    async fn insert(&self, table: &str, data: &Value) -> Result<Value> {
        let res = self
            .request(reqwest::Method::POST, &format!("/rest/v1/{table}"))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await?;
        let mut rows: Vec<Value> = Self::check(res).await?.json().await?;
        Ok(if rows.is_empty() {
            data.clone()
        } else {
            rows.remove(0)
        })
    }

    async fn select(
        &self,
        table: &str,
        filters: &Map<String, Value>,
        limit: usize,
        order: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut query: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        for (col, val) in filters {
            query.push((col.clone(), format!("eq.{}", filter_text(val))));
        }
        if let Some(col) = order {
            query.push(("order".to_string(), col.to_string()));
        }
        let res = self
            .request(reqwest::Method::GET, &format!("/rest/v1/{table}"))
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    async fn select_since(
        &self,
        table: &str,
        filters: &Map<String, Value>,
        created_after: &str,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let mut query: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("limit".to_string(), limit.to_string()),
            ("created_at".to_string(), format!("gte.{created_after}")),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        for (col, val) in filters {
            query.push((col.clone(), format!("eq.{}", filter_text(val))));
        }
        let res = self
            .request(reqwest::Method::GET, &format!("/rest/v1/{table}"))
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    async fn update(
        &self,
        table: &str,
        match_col: &str,
        match_val: &str,
        data: &Value,
    ) -> Result<Option<Value>> {
        let res = self
            .request(reqwest::Method::PATCH, &format!("/rest/v1/{table}"))
            .header("Prefer", "return=representation")
            .query(&[(match_col, format!("eq.{match_val}"))])
            .json(data)
            .send()
            .await?;
        let mut rows: Vec<Value> = Self::check(res).await?.json().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn delete(&self, table: &str, row_id: &str) -> Result<()> {
        let res = self
            .request(reqwest::Method::DELETE, &format!("/rest/v1/{table}"))
            .query(&[("id", format!("eq.{row_id}"))])
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        // The RPC route can reject long-lived pooled connections; retry the
        // identical request once over a fresh client before surfacing the
        // error.
        match self.post_exec_sql(&self.client, sql).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!("exec_sql failed, retrying on a fresh connection: {first:#}");
                self.post_exec_sql(&Client::new(), sql)
                    .await
                    .map_err(|_| first)
            }
        }
    }

    async fn list_table_names(&self) -> Result<Vec<String>> {
        let res = self
            .request(reqwest::Method::GET, "/rest/v1/information_schema.tables")
            .query(&[
                ("select", "table_name"),
                ("table_schema", "eq.public"),
            ])
            .send()
            .await?;
        let rows: Vec<TableRow> = Self::check(res).await?.json().await?;
        Ok(rows.into_iter().map(|r| r.table_name).collect())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute_ddl(&format!("DROP TABLE IF EXISTS {table}")).await
    }
}

/// PostgREST `eq.` filters are plain text; strip the JSON quoting from
/// string values and render everything else compactly.
fn filter_text(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = SupabaseStore::new(
            "https://demo.supabase.co/".to_string(),
            "key".to_string(),
        );
        assert_eq!(store.base_url, "https://demo.supabase.co");
    }

    #[test]
    fn filter_values_render_without_json_quoting() {
        assert_eq!(filter_text(&Value::String("pending".to_string())), "pending");
        assert_eq!(filter_text(&serde_json::json!(7)), "7");
        assert_eq!(filter_text(&serde_json::json!(true)), "true");
    }
}
