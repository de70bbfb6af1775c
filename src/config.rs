use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

/// Built-in persona roster, used when `ATTACHE_PERSONAS` is not set.
const DEFAULT_PERSONAS_YAML: &str = include_str!("../config/personas.yaml");

const DEFAULT_POLL_MS: u64 = 500;

/// Process-level settings. Every field comes from the environment; missing
/// required credentials are fatal at construction.
#[derive(Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub poll_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let openai_api_key = require_env("OPENAI_API_KEY")?;
        let supabase_url = require_env("SUPABASE_URL")?;
        let supabase_service_key = require_env("SUPABASE_SERVICE_KEY")?;
        let poll_ms = std::env::var("ATTACHE_POLL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_MS);
        Ok(Self {
            openai_api_key,
            supabase_url,
            supabase_service_key,
            poll_interval: Duration::from_millis(poll_ms),
        })
    }

    /// Only the telegram adapter needs this, so it is not part of `from_env`.
    pub fn telegram_token() -> Result<String> {
        require_env("TELEGRAM_BOT_TOKEN")
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{key} environment variable is required"))
}

/// The persona roster plus the ordered keyword table, as one YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaFile {
    pub personas: Vec<PersonaEntry>,
    #[serde(default)]
    pub topics: Vec<TopicEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaEntry {
    pub key: String,
    pub assistant_id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicEntry {
    pub keyword: String,
    pub persona: String,
}

/// Load the persona document from `ATTACHE_PERSONAS` if set, otherwise the
/// compiled-in default roster.
pub fn load_persona_file() -> Result<PersonaFile> {
    let text = match std::env::var("ATTACHE_PERSONAS") {
        Ok(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading persona config from {path}"))?,
        Err(_) => DEFAULT_PERSONAS_YAML.to_string(),
    };
    parse_persona_file(&text)
}

pub fn parse_persona_file(text: &str) -> Result<PersonaFile> {
    let file: PersonaFile = serde_yaml::from_str(text).context("parsing persona config")?;
    if file.personas.is_empty() {
        return Err(anyhow!("persona config declares no personas"));
    }
    Ok(file)
}

/// Project seed file used by `setup-db` (optional at runtime).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectsConfig {
    #[serde(default)]
    pub projects: std::collections::BTreeMap<String, ProjectSeed>,
    #[serde(default)]
    pub focus_this_week: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSeed {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub priority: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub current_focus: String,
}

pub fn load_projects_config(path: &str) -> Result<ProjectsConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading projects config from {path}"))?;
    serde_yaml::from_str(&text).context("parsing projects config")
}
