pub mod supabase;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

/// System tables that may never be structurally altered or dropped through
/// this layer.
pub const PROTECTED_TABLES: [&str; 7] = [
    "projects",
    "tasks",
    "conversations",
    "messages",
    "progress_log",
    "daily_summaries",
    "assistants",
];

pub const CUSTOM_PREFIX: &str = "custom_";

const DEFAULT_ROW_LIMIT: usize = 100;

fn identifier_regex() -> Regex {
    Regex::new(r"[^a-z0-9_]").unwrap()
}

/// Normalize a caller-supplied table name to `[a-z0-9_]+` and force the
/// `custom_` prefix. Idempotent: an already-sanitized name passes through
/// unchanged.
pub fn sanitize_table_name(name: &str) -> String {
    let clean = identifier_regex()
        .replace_all(&name.to_lowercase(), "_")
        .to_string();
    if clean.starts_with(CUSTOM_PREFIX) {
        clean
    } else {
        format!("{CUSTOM_PREFIX}{clean}")
    }
}

/// Column names get the same character normalization but no prefix.
pub fn sanitize_column_name(name: &str) -> String {
    identifier_regex()
        .replace_all(&name.to_lowercase(), "_")
        .to_string()
}

/// Resolution rule shared by all row operations: a name already carrying
/// the custom prefix is used verbatim; anything else is sanitized and
/// prefixed. The order matters: checking the prefix first is what lets
/// personas address system tables and custom tables uniformly.
pub fn resolve_table_name(name: &str) -> String {
    if name.starts_with(CUSTOM_PREFIX) {
        name.to_string()
    } else {
        sanitize_table_name(name)
    }
}

/// Internal representation of a declared logical column type. Unknown
/// declarations fall back to `Text`, matching the tool schema's loose
/// typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Date,
    DateTime,
    Boolean,
    Json,
}

impl ColumnType {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" | "string" | "url" | "email" => Self::Text,
            "number" | "integer" => Self::Integer,
            "decimal" => Self::Decimal,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "boolean" => Self::Boolean,
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// The single translation table from logical types to storage DDL.
    pub fn ddl(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Decimal => "DECIMAL",
            Self::Date => "DATE",
            Self::DateTime => "TIMESTAMP WITH TIME ZONE",
            Self::Boolean => "BOOLEAN",
            Self::Json => "JSONB",
        }
    }
}

/// A column declaration as personas supply it in `create_custom_table`.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: Option<String>,
}

/// Render the CREATE TABLE statement for a sanitized table name. Identity
/// and timestamp columns are always appended; caller-influenced text only
/// enters through the identifier sanitizer and the closed type table.
pub fn build_create_table_sql(safe_name: &str, columns: &[ColumnSpec]) -> String {
    let mut defs = vec!["id UUID PRIMARY KEY DEFAULT uuid_generate_v4()".to_string()];
    for col in columns {
        let name = sanitize_column_name(&col.name);
        let ty = ColumnType::parse(col.column_type.as_deref().unwrap_or("text"));
        defs.push(format!("{name} {}", ty.ddl()));
    }
    defs.push("created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()".to_string());
    defs.push("updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()".to_string());
    format!(
        "CREATE TABLE IF NOT EXISTS {safe_name} ({})",
        defs.join(", ")
    )
}

/// Raw table-level access to the hosted database. `DataGateway` and the
/// domain helpers sit on top; tests swap in scripted stores.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn insert(&self, table: &str, data: &Value) -> Result<Value>;

    /// Equality-conjunction filters applied before the limit; optional
    /// server-side ordering column.
    async fn select(
        &self,
        table: &str,
        filters: &Map<String, Value>,
        limit: usize,
        order: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// Like `select`, additionally restricted to rows created at or after
    /// the given RFC 3339 instant.
    async fn select_since(
        &self,
        table: &str,
        filters: &Map<String, Value>,
        created_after: &str,
        limit: usize,
    ) -> Result<Vec<Value>>;

    /// Update rows where `match_col = match_val`; returns the first updated
    /// row if the backend reports one.
    async fn update(
        &self,
        table: &str,
        match_col: &str,
        match_val: &str,
        data: &Value,
    ) -> Result<Option<Value>>;

    async fn delete(&self, table: &str, row_id: &str) -> Result<()>;

    /// Administrative DDL path; implementations try one fallback transport
    /// before giving up.
    async fn execute_ddl(&self, sql: &str) -> Result<()>;

    async fn list_table_names(&self) -> Result<Vec<String>>;

    /// Privileged drop. Callers must have applied the guard rules first.
    async fn drop_table(&self, table: &str) -> Result<()>;
}

/// The tool-facing CRUD gateway. Every operation returns a JSON result with
/// a `status` field and never propagates an error: the callers are LLM
/// tool-call loops that must receive *some* output to continue their run.
pub struct DataGateway {
    store: Arc<dyn TableStore>,
}

impl DataGateway {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Privileged: create a custom table (coordinator-only by convention).
    pub async fn create_table(&self, name: &str, columns: &[ColumnSpec]) -> Value {
        let safe_name = sanitize_table_name(name);
        let sql = build_create_table_sql(&safe_name, columns);
        match self.store.execute_ddl(&sql).await {
            Ok(()) => {
                info!("Created table: {safe_name}");
                let mut names: Vec<String> =
                    columns.iter().map(|c| sanitize_column_name(&c.name)).collect();
                names.extend(["id", "created_at", "updated_at"].map(String::from));
                json!({
                    "status": "success",
                    "table_name": safe_name,
                    "columns": names,
                    "message": format!("Table '{safe_name}' created"),
                })
            }
            Err(e) => {
                error!("Error creating table {safe_name}: {e:#}");
                json!({ "status": "error", "message": e.to_string() })
            }
        }
    }

    /// Privileged: enumerate tables carrying the custom prefix.
    pub async fn list_tables(&self) -> Value {
        match self.store.list_table_names().await {
            Ok(names) => {
                let tables: Vec<String> = names
                    .into_iter()
                    .filter(|n| n.starts_with(CUSTOM_PREFIX))
                    .collect();
                json!({
                    "status": "success",
                    "count": tables.len(),
                    "tables": tables,
                })
            }
            Err(e) => json!({ "status": "error", "message": e.to_string() }),
        }
    }

    /// Privileged: drop a custom table. Protected names and names without
    /// the custom prefix are refused before the store is ever touched.
    pub async fn drop_table(&self, name: &str) -> Value {
        let trimmed = name.trim().to_lowercase();
        if PROTECTED_TABLES.contains(&trimmed.as_str()) {
            warn!("Refusing to drop protected table: {trimmed}");
            return json!({
                "status": "error",
                "message": format!("table '{trimmed}' is protected and cannot be dropped"),
            });
        }
        if !trimmed.starts_with(CUSTOM_PREFIX) {
            return json!({
                "status": "error",
                "message": "only custom_ tables can be dropped",
            });
        }
        let safe_name = sanitize_table_name(&trimmed);
        match self.store.drop_table(&safe_name).await {
            Ok(()) => {
                info!("Dropped table: {safe_name}");
                json!({
                    "status": "success",
                    "message": format!("Table '{safe_name}' dropped"),
                })
            }
            Err(e) => json!({ "status": "error", "message": e.to_string() }),
        }
    }

    pub async fn insert_row(&self, table: &str, data: &Value) -> Value {
        let safe_name = resolve_table_name(table);
        match self.store.insert(&safe_name, data).await {
            Ok(inserted) => {
                info!("Inserted row into {safe_name}");
                json!({
                    "status": "success",
                    "table": safe_name,
                    "inserted": inserted,
                })
            }
            Err(e) => {
                error!("Error inserting into {safe_name}: {e:#}");
                json!({ "status": "error", "message": e.to_string() })
            }
        }
    }

    pub async fn get_rows(
        &self,
        table: &str,
        filters: Option<&Map<String, Value>>,
        limit: Option<usize>,
    ) -> Value {
        let safe_name = resolve_table_name(table);
        let empty = Map::new();
        let filters = filters.unwrap_or(&empty);
        let limit = limit.unwrap_or(DEFAULT_ROW_LIMIT);
        match self.store.select(&safe_name, filters, limit, None).await {
            Ok(rows) => json!({
                "status": "success",
                "table": safe_name,
                "count": rows.len(),
                "rows": rows,
            }),
            Err(e) => {
                error!("Error querying {safe_name}: {e:#}");
                json!({ "status": "error", "message": e.to_string() })
            }
        }
    }

    pub async fn update_row(&self, table: &str, row_id: &str, data: &Value) -> Value {
        let safe_name = resolve_table_name(table);
        let stamped = stamp_updated_at(data);
        match self.store.update(&safe_name, "id", row_id, &stamped).await {
            Ok(updated) => json!({
                "status": "success",
                "table": safe_name,
                "updated": updated,
            }),
            Err(e) => json!({ "status": "error", "message": e.to_string() }),
        }
    }

    pub async fn delete_row(&self, table: &str, row_id: &str) -> Value {
        let safe_name = resolve_table_name(table);
        match self.store.delete(&safe_name, row_id).await {
            Ok(()) => json!({
                "status": "success",
                "message": format!("Row deleted from {safe_name}"),
            }),
            Err(e) => json!({ "status": "error", "message": e.to_string() }),
        }
    }
}

/// Updates always carry a fresh `updated_at`, regardless of what the caller
/// supplied.
pub fn stamp_updated_at(data: &Value) -> Value {
    let mut map = match data {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    map.insert(
        "updated_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    Value::Object(map)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::sync::Mutex;

    /// Scripted in-memory store recording every call, for gateway and
    /// domain-helper tests.
    #[derive(Default)]
    pub struct RecordingStore {
        pub state: Mutex<RecordingState>,
    }

    #[derive(Default)]
    pub struct RecordingState {
        pub rows: Vec<Value>,
        pub tables: Vec<String>,
        pub inserts: Vec<(String, Value)>,
        pub updates: Vec<(String, String, String, Value)>,
        pub deletes: Vec<(String, String)>,
        pub ddl: Vec<String>,
        pub drops: Vec<String>,
        pub selects: Vec<(String, Map<String, Value>, usize)>,
        pub fail: bool,
    }

    #[async_trait]
    impl TableStore for RecordingStore {
        async fn insert(&self, table: &str, data: &Value) -> Result<Value> {
            let mut s = self.state.lock().unwrap();
            if s.fail {
                anyhow::bail!("store unavailable");
            }
            s.inserts.push((table.to_string(), data.clone()));
            Ok(data.clone())
        }

        async fn select(
            &self,
            table: &str,
            filters: &Map<String, Value>,
            limit: usize,
            _order: Option<&str>,
        ) -> Result<Vec<Value>> {
            let mut s = self.state.lock().unwrap();
            if s.fail {
                anyhow::bail!("store unavailable");
            }
            s.selects
                .push((table.to_string(), filters.clone(), limit));
            let rows = s
                .rows
                .iter()
                .filter(|row| {
                    filters.iter().all(|(k, v)| row.get(k) == Some(v))
                })
                .take(limit)
                .cloned()
                .collect();
            Ok(rows)
        }

        async fn select_since(
            &self,
            table: &str,
            filters: &Map<String, Value>,
            created_after: &str,
            limit: usize,
        ) -> Result<Vec<Value>> {
            let rows = self.select(table, filters, limit, None).await?;
            Ok(rows
                .into_iter()
                .filter(|row| {
                    row.get("created_at")
                        .and_then(Value::as_str)
                        .map(|c| c >= created_after)
                        .unwrap_or(true)
                })
                .collect())
        }

        async fn update(
            &self,
            table: &str,
            match_col: &str,
            match_val: &str,
            data: &Value,
        ) -> Result<Option<Value>> {
            let mut s = self.state.lock().unwrap();
            if s.fail {
                anyhow::bail!("store unavailable");
            }
            s.updates.push((
                table.to_string(),
                match_col.to_string(),
                match_val.to_string(),
                data.clone(),
            ));
            Ok(Some(data.clone()))
        }

        async fn delete(&self, table: &str, row_id: &str) -> Result<()> {
            let mut s = self.state.lock().unwrap();
            if s.fail {
                anyhow::bail!("store unavailable");
            }
            s.deletes.push((table.to_string(), row_id.to_string()));
            Ok(())
        }

        async fn execute_ddl(&self, sql: &str) -> Result<()> {
            let mut s = self.state.lock().unwrap();
            if s.fail {
                anyhow::bail!("store unavailable");
            }
            s.ddl.push(sql.to_string());
            Ok(())
        }

        async fn list_table_names(&self) -> Result<Vec<String>> {
            let s = self.state.lock().unwrap();
            if s.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(s.tables.clone())
        }

        async fn drop_table(&self, table: &str) -> Result<()> {
            let mut s = self.state.lock().unwrap();
            if s.fail {
                anyhow::bail!("store unavailable");
            }
            s.drops.push(table.to_string());
            Ok(())
        }
    }
}
