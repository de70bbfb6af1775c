use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::assistants::{AssistantsApi, Run, RunStatus, ToolCall, ToolOutput};

const API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI Assistants API (v2) client. Threads and runs are addressed by the
/// opaque ids the service hands back; nothing is persisted locally.
pub struct OpenAiAssistants {
    api_key: String,
    client: Client,
}

impl OpenAiAssistants {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{API_BASE}{path}"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response> {
        if res.status().is_success() {
            Ok(res)
        } else {
            let status = res.status();
            Err(anyhow!(
                "OpenAI API error ({status}): {}",
                res.text().await.unwrap_or_default()
            ))
        }
    }
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_instructions: Option<&'a str>,
}

#[derive(Serialize)]
struct SubmitToolOutputsRequest<'a> {
    tool_outputs: &'a [ToolOutput],
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: String,
    required_action: Option<RequiredAction>,
    last_error: Option<ApiError>,
}

#[derive(Deserialize)]
struct RequiredAction {
    submit_tool_outputs: PendingToolOutputs,
}

#[derive(Deserialize)]
struct PendingToolOutputs {
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Deserialize)]
struct MessageObject {
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<MessageText>,
}

#[derive(Deserialize)]
struct MessageText {
    value: String,
}

#[derive(Deserialize)]
struct AssistantObject {
    tools: Vec<Value>,
}

impl RunObject {
    fn into_run(self) -> Run {
        let tool_calls = self
            .required_action
            .map(|ra| {
                ra.submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let last_error = self.last_error.map(|e| match e.code {
            Some(code) => format!("{code}: {}", e.message),
            None => e.message,
        });
        Run {
            id: self.id,
            status: RunStatus::parse(&self.status),
            tool_calls,
            last_error,
        }
    }
}

#[async_trait]
impl AssistantsApi for OpenAiAssistants {
    async fn create_thread(&self) -> Result<String> {
        let res = self
            .request(reqwest::Method::POST, "/threads")
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let thread: ThreadObject = Self::check(res).await?.json().await?;
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let res = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&CreateMessageRequest {
                role: "user",
                content: text,
            })
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        additional_instructions: Option<&str>,
    ) -> Result<Run> {
        let res = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
            .json(&CreateRunRequest {
                assistant_id,
                additional_instructions,
            })
            .send()
            .await?;
        let run: RunObject = Self::check(res).await?.json().await?;
        Ok(run.into_run())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let res = self
            .request(
                reqwest::Method::GET,
                &format!("/threads/{thread_id}/runs/{run_id}"),
            )
            .send()
            .await?;
        let run: RunObject = Self::check(res).await?.json().await?;
        Ok(run.into_run())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        let res = self
            .request(
                reqwest::Method::POST,
                &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            )
            .json(&SubmitToolOutputsRequest {
                tool_outputs: outputs,
            })
            .send()
            .await?;
        let run: RunObject = Self::check(res).await?.json().await?;
        Ok(run.into_run())
    }

    async fn latest_message_text(&self, thread_id: &str) -> Result<String> {
        let res = self
            .request(
                reqwest::Method::GET,
                &format!("/threads/{thread_id}/messages?limit=1&order=desc"),
            )
            .send()
            .await?;
        let list: MessageList = Self::check(res).await?.json().await?;
        let text = list
            .data
            .into_iter()
            .next()
            .and_then(|msg| {
                msg.content
                    .into_iter()
                    .find(|c| c.kind == "text")
                    .and_then(|c| c.text)
            })
            .map(|t| t.value)
            .unwrap_or_default();
        Ok(text)
    }

    async fn assistant_tools(&self, assistant_id: &str) -> Result<Vec<Value>> {
        let res = self
            .request(reqwest::Method::GET, &format!("/assistants/{assistant_id}"))
            .send()
            .await?;
        let assistant: AssistantObject = Self::check(res).await?.json().await?;
        Ok(assistant.tools)
    }

    async fn set_assistant_tools(&self, assistant_id: &str, tools: Vec<Value>) -> Result<()> {
        let res = self
            .request(reqwest::Method::POST, &format!("/assistants/{assistant_id}"))
            .json(&serde_json::json!({ "tools": tools }))
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }
}
