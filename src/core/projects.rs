use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::config::ProjectsConfig;
use crate::core::datastore::{TableStore, stamp_updated_at};

const PROGRESS_LIMIT: usize = 200;

/// Typed helpers over the protected system tables (projects, tasks,
/// progress_log, daily_summaries). These address the tables directly
/// through the store, unlike the tool-facing gateway which only ever sees
/// custom tables.
pub struct ProjectsService {
    store: Arc<dyn TableStore>,
}

impl ProjectsService {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub async fn get_project(&self, project_key: &str) -> Result<Option<Value>> {
        let mut filters = Map::new();
        filters.insert(
            "project_key".to_string(),
            Value::String(project_key.to_string()),
        );
        let mut rows = self.store.select("projects", &filters, 1, None).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    pub async fn get_all_projects(&self) -> Result<Vec<Value>> {
        self.store
            .select("projects", &Map::new(), 100, Some("priority"))
            .await
    }

    pub async fn create_project(&self, project_key: &str, seed: &ProjectSeedData) -> Result<Value> {
        let data = json!({
            "project_key": project_key,
            "name": seed.name,
            "type": seed.kind,
            "status": seed.status,
            "priority": seed.priority,
            "description": seed.description,
            "current_focus": seed.current_focus,
        });
        let row = self.store.insert("projects", &data).await?;
        info!("Created project: {project_key}");
        Ok(row)
    }

    pub async fn update_project(&self, project_key: &str, updates: &Value) -> Result<Option<Value>> {
        let stamped = stamp_updated_at(updates);
        let updated = self
            .store
            .update("projects", "project_key", project_key, &stamped)
            .await?;
        if updated.is_some() {
            info!("Updated project: {project_key}");
        }
        Ok(updated)
    }

    /// Upsert every seed from the YAML config into the projects table.
    pub async fn sync_projects_from_config(&self, config: &ProjectsConfig) -> Result<usize> {
        if config.projects.is_empty() {
            warn!("No projects in config");
            return Ok(0);
        }
        let mut synced = 0;
        for (key, seed) in &config.projects {
            let data = ProjectSeedData {
                name: seed.name.clone(),
                kind: seed.kind.clone(),
                status: seed.status.clone(),
                priority: seed.priority.clone(),
                description: seed.description.clone(),
                current_focus: seed.current_focus.clone(),
            };
            if self.get_project(key).await?.is_some() {
                self.update_project(
                    key,
                    &json!({
                        "name": data.name,
                        "type": data.kind,
                        "status": data.status,
                        "priority": data.priority,
                        "description": data.description,
                        "current_focus": data.current_focus,
                    }),
                )
                .await?;
            } else {
                self.create_project(key, &data).await?;
            }
            synced += 1;
        }
        info!("Projects synced from config: {synced}");
        Ok(synced)
    }

    pub async fn create_task(&self, task: NewTask<'_>) -> Result<Option<Value>> {
        let Some(project) = self.get_project(task.project_key).await? else {
            error!("Project not found: {}", task.project_key);
            return Ok(None);
        };
        let data = json!({
            "project_id": project["id"],
            "title": task.title,
            "description": task.description,
            "priority": task.priority,
            "status": "pending",
            "assigned_to": task.assigned_to,
            "due_date": task.due_date,
        });
        let row = self.store.insert("tasks", &data).await?;
        info!("Created task: {} for {}", task.title, task.project_key);
        Ok(Some(row))
    }

    pub async fn get_tasks(
        &self,
        project_key: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut filters = Map::new();
        if let Some(key) = project_key
            && let Some(project) = self.get_project(key).await?
        {
            filters.insert("project_id".to_string(), project["id"].clone());
        }
        if let Some(status) = status {
            filters.insert("status".to_string(), Value::String(status.to_string()));
        }
        self.store
            .select("tasks", &filters, 100, Some("priority"))
            .await
    }

    pub async fn get_pending_tasks(&self, project_key: Option<&str>) -> Result<Vec<Value>> {
        self.get_tasks(project_key, Some("pending")).await
    }

    pub async fn complete_task(&self, task_id: &str) -> Result<Option<Value>> {
        let updates = json!({
            "status": "completed",
            "completed_at": Utc::now().to_rfc3339(),
        });
        let updated = self.store.update("tasks", "id", task_id, &updates).await?;
        if updated.is_some() {
            info!("Completed task: {task_id}");
        }
        Ok(updated)
    }

    pub async fn log_progress(
        &self,
        project_key: &str,
        event_type: &str,
        description: &str,
        metadata: Option<Value>,
    ) -> Result<Option<Value>> {
        let Some(project) = self.get_project(project_key).await? else {
            error!("Project not found: {project_key}");
            return Ok(None);
        };
        let data = json!({
            "project_id": project["id"],
            "event_type": event_type,
            "description": description,
            "metadata": metadata.unwrap_or_else(|| json!({})),
        });
        let row = self.store.insert("progress_log", &data).await?;
        info!("Logged progress for {project_key}: {event_type}");
        Ok(Some(row))
    }

    /// Progress entries from the last `days` days, newest first.
    pub async fn get_progress(&self, project_key: Option<&str>, days: i64) -> Result<Vec<Value>> {
        let mut filters = Map::new();
        if let Some(key) = project_key
            && let Some(project) = self.get_project(key).await?
        {
            filters.insert("project_id".to_string(), project["id"].clone());
        }
        let from_date = (Utc::now() - Duration::days(days)).to_rfc3339();
        self.store
            .select_since("progress_log", &filters, &from_date, PROGRESS_LIMIT)
            .await
    }

    /// Create or replace today's summary row.
    pub async fn upsert_daily_summary(
        &self,
        summary: &str,
        projects_status: Value,
        tasks_completed: u32,
        tasks_created: u32,
    ) -> Result<Value> {
        let today = Utc::now().date_naive().to_string();
        let data = json!({
            "date": today,
            "summary": summary,
            "projects_status": projects_status,
            "tasks_completed": tasks_completed,
            "tasks_created": tasks_created,
        });

        let mut filters = Map::new();
        filters.insert("date".to_string(), Value::String(today.clone()));
        let existing = self
            .store
            .select("daily_summaries", &filters, 1, None)
            .await?;
        if existing.is_empty() {
            let row = self.store.insert("daily_summaries", &data).await?;
            info!("Created daily summary for {today}");
            Ok(row)
        } else {
            let updated = self
                .store
                .update("daily_summaries", "date", &today, &stamp_updated_at(&data))
                .await?;
            info!("Updated daily summary for {today}");
            Ok(updated.unwrap_or(data))
        }
    }

    pub async fn get_daily_summary(&self, date: Option<&str>) -> Result<Option<Value>> {
        let date = match date {
            Some(d) => d.to_string(),
            None => Utc::now().date_naive().to_string(),
        };
        let mut filters = Map::new();
        filters.insert("date".to_string(), Value::String(date));
        let mut rows = self
            .store
            .select("daily_summaries", &filters, 1, None)
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }
}

/// Owned project fields, used for both YAML seeds and direct creation.
#[derive(Debug, Clone)]
pub struct ProjectSeedData {
    pub name: String,
    pub kind: String,
    pub status: String,
    pub priority: String,
    pub description: String,
    pub current_focus: String,
}

#[derive(Debug, Clone, Copy)]
pub struct NewTask<'a> {
    pub project_key: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub priority: &'a str,
    pub assigned_to: Option<&'a str>,
    pub due_date: Option<&'a str>,
}

impl<'a> NewTask<'a> {
    pub fn new(project_key: &'a str, title: &'a str) -> Self {
        Self {
            project_key,
            title,
            description: "",
            priority: "medium",
            assigned_to: None,
            due_date: None,
        }
    }
}
