pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Run states observed through the hosted assistant service. Anything the
/// service reports outside the known set lands in `Other` and is treated as
/// fatal by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Other(String),
}

impl RunStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A function invocation requested by a run in `requires_action`.
/// `arguments` is the raw JSON string exactly as the service sent it.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// One turn of a persona on a thread. `tool_calls` is populated only while
/// the run is in `RequiresAction`.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    pub tool_calls: Vec<ToolCall>,
    pub last_error: Option<String>,
}

/// The hosted assistant service boundary: conversation threads, runs,
/// tool-output submission, and the assistant tool definitions themselves
/// (used by `sync-tools`). One implementation talks to OpenAI; tests supply
/// scripted mocks.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    async fn create_thread(&self) -> Result<String>;

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()>;

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        additional_instructions: Option<&str>,
    ) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Must carry exactly one output per pending tool call.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run>;

    /// Text of the most recent message on the thread (the assistant's reply
    /// once a run has completed).
    async fn latest_message_text(&self, thread_id: &str) -> Result<String>;

    async fn assistant_tools(&self, assistant_id: &str) -> Result<Vec<Value>>;

    async fn set_assistant_tools(&self, assistant_id: &str, tools: Vec<Value>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(RunStatus::parse("queued"), RunStatus::Queued);
        assert_eq!(RunStatus::parse("in_progress"), RunStatus::InProgress);
        assert_eq!(
            RunStatus::parse("requires_action"),
            RunStatus::RequiresAction
        );
        assert_eq!(RunStatus::parse("completed"), RunStatus::Completed);
        assert_eq!(RunStatus::parse("failed"), RunStatus::Failed);
    }

    #[test]
    fn unknown_status_is_preserved_verbatim() {
        assert_eq!(
            RunStatus::parse("cancelling"),
            RunStatus::Other("cancelling".to_string())
        );
    }
}
