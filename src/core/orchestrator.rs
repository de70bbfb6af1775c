use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::core::assistants::{AssistantsApi, RunStatus, ToolCall, ToolOutput};
use crate::core::datastore::DataGateway;
use crate::core::personas::PersonaRegistry;
use crate::core::router::TopicRouter;
use crate::core::tools::ToolRequest;

/// One persona's answer to one request.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub persona_name: String,
    pub content: String,
    pub thread_id: String,
    /// Set when auto-routing sent the request past the coordinator.
    pub delegated_to: Option<String>,
}

/// Drives conversations across the persona roster: one thread per persona,
/// run polling, and tool-call dispatch (including coordinator-initiated
/// delegation back into this same orchestrator). One instance per end-user
/// session; the service clients behind it are shared.
pub struct Orchestrator {
    registry: PersonaRegistry,
    router: TopicRouter,
    api: Arc<dyn AssistantsApi>,
    gateway: Arc<DataGateway>,
    threads: Mutex<HashMap<String, String>>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: PersonaRegistry,
        router: TopicRouter,
        api: Arc<dyn AssistantsApi>,
        gateway: Arc<DataGateway>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            router,
            api,
            gateway,
            threads: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    /// Send a message to the coordinator. Optional context is prepended so
    /// the persona sees where the request came from.
    pub async fn ask(&self, message: &str, context: Option<&str>) -> Result<AgentReply> {
        let coordinator = self.registry.coordinator();
        let thread_id = self.thread_for(&coordinator.key).await?;

        let full_message = match context {
            Some(c) => format!("Context: {c}\n\nRequest: {message}"),
            None => message.to_string(),
        };
        self.api.add_user_message(&thread_id, &full_message).await?;

        let content = self
            .run_assistant(&thread_id, &coordinator.assistant_id)
            .await?;
        Ok(AgentReply {
            persona_name: coordinator.name.clone(),
            content,
            thread_id,
            delegated_to: None,
        })
    }

    /// Address a specialist directly, on its own thread. An unknown key
    /// yields an informative reply rather than an error, because this is
    /// also the delegation target inside a live tool-call loop.
    ///
    /// Boxed future: delegation makes this mutually recursive with the run
    /// loop.
    pub fn ask_specialist<'a>(
        &'a self,
        key: &'a str,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let Some(persona) = self.registry.get(key) else {
                warn!("Delegation to unknown persona: {key}");
                return Ok(format!("Unknown specialist: {key}"));
            };
            let thread_id = self.thread_for(key).await?;
            self.api.add_user_message(&thread_id, message).await?;
            info!("Sent to {key}: {}", preview(message));
            self.run_assistant(&thread_id, &persona.assistant_id).await
        })
    }

    /// Route by topic keyword when one matches; otherwise fall back to the
    /// coordinator.
    pub async fn ask_with_auto_routing(&self, message: &str) -> Result<AgentReply> {
        let Some(key) = self.router.route(message).map(str::to_string) else {
            return self.ask(message, None).await;
        };
        info!("Auto-routing to specialist: {key}");
        let content = self.ask_specialist(&key, message).await?;
        let thread_id = self
            .threads
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default();
        let persona_name = self
            .registry
            .get(&key)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| key.clone());
        Ok(AgentReply {
            persona_name,
            content,
            thread_id,
            delegated_to: Some(key),
        })
    }

    /// Send the same message to every specialist, collecting one entry per
    /// persona in roster order. One failing persona never hides the others'
    /// replies.
    pub async fn broadcast(&self, message: &str) -> Vec<(String, String)> {
        let keys: Vec<String> = self.registry.specialists().map(|p| p.key.clone()).collect();
        let mut replies = Vec::with_capacity(keys.len());
        for key in keys {
            match self.ask_specialist(&key, message).await {
                Ok(text) => replies.push((key, text)),
                Err(e) => {
                    error!("Error from {key}: {e:#}");
                    replies.push((key, format!("Error: {e:#}")));
                }
            }
        }
        replies
    }

    /// Ask the coordinator for a cross-project status overview.
    pub async fn get_all_status(&self) -> Result<String> {
        let reply = self
            .ask(
                "Give me a brief status across all projects. \
                 What is in flight right now, and what are this week's priorities?",
                None,
            )
            .await?;
        Ok(reply.content)
    }

    pub async fn reset_thread(&self, key: &str) {
        if self.threads.lock().await.remove(key).is_some() {
            info!("Reset thread for {key}");
        }
    }

    pub async fn reset_all_threads(&self) {
        self.threads.lock().await.clear();
        info!("Reset all threads");
    }

    async fn thread_for(&self, key: &str) -> Result<String> {
        let mut threads = self.threads.lock().await;
        if let Some(id) = threads.get(key) {
            return Ok(id.clone());
        }
        let id = self.api.create_thread().await?;
        info!("Created thread {id} for {key}");
        threads.insert(key.to_string(), id.clone());
        Ok(id)
    }

    /// Create a run and drive it to a terminal state: poll while the
    /// service is working, answer every tool call when it asks, and hand
    /// back the assistant's final message.
    async fn run_assistant(&self, thread_id: &str, assistant_id: &str) -> Result<String> {
        let mut run = self.api.create_run(thread_id, assistant_id, None).await?;
        loop {
            match run.status {
                RunStatus::Queued | RunStatus::InProgress => {
                    tokio::time::sleep(self.poll_interval).await;
                    run = self.api.get_run(thread_id, &run.id).await?;
                }
                RunStatus::RequiresAction => {
                    let outputs = self.answer_tool_calls(&run.tool_calls).await?;
                    run = self
                        .api
                        .submit_tool_outputs(thread_id, &run.id, &outputs)
                        .await?;
                }
                RunStatus::Completed => {
                    return self.api.latest_message_text(thread_id).await;
                }
                RunStatus::Failed => {
                    let detail = run
                        .last_error
                        .unwrap_or_else(|| "no error detail".to_string());
                    error!("Run failed: {detail}");
                    bail!("assistant run failed: {detail}");
                }
                RunStatus::Other(state) => {
                    bail!("assistant run ended in unsupported state: {state}");
                }
            }
        }
    }

    /// One output per pending call, in order. Database operations go
    /// through the gateway (which already recovers its own failures into
    /// error payloads); delegation recurses into `ask_specialist`; names we
    /// do not manage get an acknowledgement so the run can proceed.
    async fn answer_tool_calls(&self, calls: &[ToolCall]) -> Result<Vec<ToolOutput>> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            info!("Tool call: {}({})", call.name, preview(&call.arguments));
            let output = match ToolRequest::parse(&call.name, &call.arguments) {
                ToolRequest::CreateCustomTable(a) => self
                    .gateway
                    .create_table(&a.table_name, &a.columns)
                    .await
                    .to_string(),
                ToolRequest::ListCustomTables => self.gateway.list_tables().await.to_string(),
                ToolRequest::InsertRow(a) => {
                    self.gateway.insert_row(&a.table_name, &a.data).await.to_string()
                }
                ToolRequest::GetRows(a) => self
                    .gateway
                    .get_rows(&a.table_name, a.filters.as_ref(), a.limit)
                    .await
                    .to_string(),
                ToolRequest::UpdateRow(a) => self
                    .gateway
                    .update_row(&a.table_name, &a.row_id, &a.data)
                    .await
                    .to_string(),
                ToolRequest::DeleteRow(a) => self
                    .gateway
                    .delete_row(&a.table_name, &a.row_id)
                    .await
                    .to_string(),
                ToolRequest::DelegateToSpecialist(a) => {
                    self.ask_specialist(&a.specialist, &a.task).await?
                }
                ToolRequest::Unknown { name } => {
                    warn!("Unhandled tool call: {name}");
                    json!({ "status": "ok" }).to_string()
                }
                ToolRequest::Invalid { name, error } => {
                    warn!("Malformed arguments for {name}: {error}");
                    json!({
                        "status": "error",
                        "message": format!("invalid arguments for {name}: {error}"),
                    })
                    .to_string()
                }
            };
            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output,
            });
        }
        Ok(outputs)
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(100) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::Value;

    use super::*;
    use crate::config::TopicEntry;
    use crate::core::assistants::Run;
    use crate::core::datastore::testutil::RecordingStore;
    use crate::core::personas::testutil::roster;

    /// Scripted assistant service. Each `create_run` pops the next plan for
    /// that assistant (a sequence of run snapshots); `get_run` and
    /// `submit_tool_outputs` step through the remaining snapshots. With no
    /// plan scripted, runs complete immediately.
    #[derive(Default)]
    struct MockApi {
        state: std::sync::Mutex<MockState>,
    }

    #[derive(Default)]
    struct MockState {
        threads_created: usize,
        messages: Vec<(String, String)>,
        plans: HashMap<String, VecDeque<VecDeque<Run>>>,
        pending: HashMap<String, VecDeque<Run>>,
        thread_assistant: HashMap<String, String>,
        submissions: Vec<(String, Vec<ToolOutput>)>,
        replies: HashMap<String, String>,
        run_seq: usize,
        polls: usize,
    }

    impl MockApi {
        fn plan(&self, assistant_id: &str, phases: Vec<Run>) {
            self.state
                .lock()
                .unwrap()
                .plans
                .entry(assistant_id.to_string())
                .or_default()
                .push_back(phases.into());
        }

        fn reply(&self, assistant_id: &str, text: &str) {
            self.state
                .lock()
                .unwrap()
                .replies
                .insert(assistant_id.to_string(), text.to_string());
        }

        fn next_phase(&self, run_id: &str) -> Result<Run> {
            let mut s = self.state.lock().unwrap();
            let mut run = s
                .pending
                .get_mut(run_id)
                .and_then(|q| q.pop_front())
                .ok_or_else(|| anyhow::anyhow!("script exhausted for {run_id}"))?;
            run.id = run_id.to_string();
            Ok(run)
        }
    }

    #[async_trait::async_trait]
    impl AssistantsApi for MockApi {
        async fn create_thread(&self) -> Result<String> {
            let mut s = self.state.lock().unwrap();
            s.threads_created += 1;
            Ok(format!("thread_{}", s.threads_created))
        }

        async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .messages
                .push((thread_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn create_run(
            &self,
            thread_id: &str,
            assistant_id: &str,
            _additional_instructions: Option<&str>,
        ) -> Result<Run> {
            let mut s = self.state.lock().unwrap();
            s.run_seq += 1;
            let run_id = format!("run_{}", s.run_seq);
            let mut phases = s
                .plans
                .get_mut(assistant_id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| VecDeque::from([completed()]));
            let mut first = phases
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("empty plan for {assistant_id}"))?;
            first.id = run_id.clone();
            s.pending.insert(run_id, phases);
            s.thread_assistant
                .insert(thread_id.to_string(), assistant_id.to_string());
            Ok(first)
        }

        async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
            self.state.lock().unwrap().polls += 1;
            self.next_phase(run_id)
        }

        async fn submit_tool_outputs(
            &self,
            _thread_id: &str,
            run_id: &str,
            outputs: &[ToolOutput],
        ) -> Result<Run> {
            self.state
                .lock()
                .unwrap()
                .submissions
                .push((run_id.to_string(), outputs.to_vec()));
            self.next_phase(run_id)
        }

        async fn latest_message_text(&self, thread_id: &str) -> Result<String> {
            let s = self.state.lock().unwrap();
            let assistant = s.thread_assistant.get(thread_id).cloned().unwrap_or_default();
            Ok(s.replies.get(&assistant).cloned().unwrap_or_else(|| "done".to_string()))
        }

        async fn assistant_tools(&self, _assistant_id: &str) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }

        async fn set_assistant_tools(&self, _assistant_id: &str, _tools: Vec<Value>) -> Result<()> {
            Ok(())
        }
    }

    fn completed() -> Run {
        Run {
            id: String::new(),
            status: RunStatus::Completed,
            tool_calls: Vec::new(),
            last_error: None,
        }
    }

    fn queued() -> Run {
        Run {
            id: String::new(),
            status: RunStatus::Queued,
            tool_calls: Vec::new(),
            last_error: None,
        }
    }

    fn requires_action(calls: Vec<ToolCall>) -> Run {
        Run {
            id: String::new(),
            status: RunStatus::RequiresAction,
            tool_calls: calls,
            last_error: None,
        }
    }

    fn failed(detail: &str) -> Run {
        Run {
            id: String::new(),
            status: RunStatus::Failed,
            tool_calls: Vec::new(),
            last_error: Some(detail.to_string()),
        }
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        }
    }

    fn fixture(api: Arc<MockApi>) -> (Orchestrator, Arc<RecordingStore>) {
        let registry = PersonaRegistry::from_entries(&roster()).unwrap();
        let router = TopicRouter::from_entries(&[TopicEntry {
            keyword: "lsrc".to_string(),
            persona: "lsrc_tech".to_string(),
        }]);
        let store = Arc::new(RecordingStore::default());
        let gateway = Arc::new(DataGateway::new(store.clone()));
        (
            Orchestrator::new(registry, router, api, gateway, Duration::ZERO),
            store,
        )
    }

    #[tokio::test]
    async fn ask_reuses_the_coordinator_thread() {
        let api = Arc::new(MockApi::default());
        api.reply("asst_chief_of_staff", "on it");
        let (orch, _) = fixture(api.clone());

        let first = orch.ask("hello", None).await.unwrap();
        let second = orch.ask("again", None).await.unwrap();

        assert_eq!(first.content, "on it");
        assert_eq!(first.thread_id, second.thread_id);
        assert!(first.delegated_to.is_none());
        assert_eq!(api.state.lock().unwrap().threads_created, 1);
    }

    #[tokio::test]
    async fn each_persona_gets_its_own_thread() {
        let api = Arc::new(MockApi::default());
        api.reply("asst_lsrc_tech", "all quiet");
        let (orch, _) = fixture(api.clone());

        orch.ask("hello", None).await.unwrap();
        let first = orch.ask_specialist("lsrc_tech", "status?").await.unwrap();
        orch.ask_specialist("lsrc_tech", "and now?").await.unwrap();

        assert_eq!(first, "all quiet");
        let state = api.state.lock().unwrap();
        // One thread for the coordinator, one reused by the specialist.
        assert_eq!(state.threads_created, 2);
        // One message appended and one run created per request.
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.run_seq, 3);
    }

    #[tokio::test]
    async fn reset_thread_starts_a_fresh_conversation() {
        let api = Arc::new(MockApi::default());
        let (orch, _) = fixture(api.clone());

        orch.ask("hello", None).await.unwrap();
        orch.reset_thread("chief_of_staff").await;
        orch.ask("hello again", None).await.unwrap();

        assert_eq!(api.state.lock().unwrap().threads_created, 2);
    }

    #[tokio::test]
    async fn reset_all_threads_clears_every_persona() {
        let api = Arc::new(MockApi::default());
        let (orch, _) = fixture(api.clone());

        orch.ask("a", None).await.unwrap();
        orch.ask_specialist("documentary", "b").await.unwrap();
        orch.reset_all_threads().await;
        orch.ask("c", None).await.unwrap();
        orch.ask_specialist("documentary", "d").await.unwrap();

        assert_eq!(api.state.lock().unwrap().threads_created, 4);
    }

    #[tokio::test]
    async fn context_is_prepended_to_the_message() {
        let api = Arc::new(MockApi::default());
        let (orch, _) = fixture(api.clone());

        orch.ask("ship it", Some("from telegram")).await.unwrap();

        let messages = &api.state.lock().unwrap().messages;
        assert_eq!(messages[0].1, "Context: from telegram\n\nRequest: ship it");
    }

    #[tokio::test]
    async fn queued_runs_are_polled_to_completion() {
        let api = Arc::new(MockApi::default());
        api.plan("asst_chief_of_staff", vec![queued(), queued(), completed()]);
        let (orch, _) = fixture(api.clone());

        orch.ask("hello", None).await.unwrap();

        assert_eq!(api.state.lock().unwrap().polls, 2);
    }

    #[tokio::test]
    async fn every_tool_call_gets_exactly_one_output() {
        let api = Arc::new(MockApi::default());
        api.plan(
            "asst_chief_of_staff",
            vec![
                requires_action(vec![
                    call("c1", "get_rows", r#"{"table_name": "custom_venues"}"#),
                    call("c2", "get_weather", "{}"),
                    call("c3", "update_row", r#"{"bad": true}"#),
                ]),
                completed(),
            ],
        );
        let (orch, store) = fixture(api.clone());

        orch.ask("look things up", None).await.unwrap();

        let state = api.state.lock().unwrap();
        assert_eq!(state.submissions.len(), 1);
        let outputs = &state.submissions[0].1;
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].tool_call_id, "c1");
        let first: Value = serde_json::from_str(&outputs[0].output).unwrap();
        assert_eq!(first["status"], "success");
        // Unmanaged name acknowledged, not failed.
        assert_eq!(outputs[1].output, r#"{"status":"ok"}"#);
        // Malformed args degrade to an error payload inside the output.
        let third: Value = serde_json::from_str(&outputs[2].output).unwrap();
        assert_eq!(third["status"], "error");
        // The select actually reached the store.
        assert_eq!(store.state.lock().unwrap().selects.len(), 1);
    }

    #[tokio::test]
    async fn delegation_runs_the_specialist_on_its_own_thread() {
        let api = Arc::new(MockApi::default());
        api.plan(
            "asst_chief_of_staff",
            vec![
                requires_action(vec![call(
                    "c1",
                    "delegate_to_specialist",
                    r#"{"specialist": "lsrc_tech", "task": "check the build"}"#,
                )]),
                completed(),
            ],
        );
        api.reply("asst_lsrc_tech", "build is green");
        api.reply("asst_chief_of_staff", "all good");
        let (orch, _) = fixture(api.clone());

        let reply = orch.ask("how is the release?", None).await.unwrap();

        assert_eq!(reply.content, "all good");
        let state = api.state.lock().unwrap();
        assert_eq!(state.threads_created, 2);
        assert!(state
            .messages
            .iter()
            .any(|(_, text)| text == "check the build"));
        assert_eq!(state.submissions[0].1[0].output, "build is green");
    }

    #[tokio::test]
    async fn delegation_to_unknown_persona_keeps_the_run_alive() {
        let api = Arc::new(MockApi::default());
        api.plan(
            "asst_chief_of_staff",
            vec![
                requires_action(vec![call(
                    "c1",
                    "delegate_to_specialist",
                    r#"{"specialist": "nobody", "task": "x"}"#,
                )]),
                completed(),
            ],
        );
        let (orch, _) = fixture(api.clone());

        orch.ask("delegate this", None).await.unwrap();

        let state = api.state.lock().unwrap();
        assert!(state.submissions[0].1[0]
            .output
            .contains("Unknown specialist: nobody"));
    }

    #[tokio::test]
    async fn auto_routing_matches_a_specialist() {
        let api = Arc::new(MockApi::default());
        api.reply("asst_lsrc_tech", "specialist here");
        let (orch, _) = fixture(api);

        let reply = orch.ask_with_auto_routing("lsrc build status").await.unwrap();

        assert_eq!(reply.delegated_to.as_deref(), Some("lsrc_tech"));
        assert_eq!(reply.content, "specialist here");
        assert!(!reply.thread_id.is_empty());
    }

    #[tokio::test]
    async fn auto_routing_falls_back_to_the_coordinator() {
        let api = Arc::new(MockApi::default());
        api.reply("asst_chief_of_staff", "coordinator here");
        let (orch, _) = fixture(api);

        let reply = orch.ask_with_auto_routing("plan my week").await.unwrap();

        assert!(reply.delegated_to.is_none());
        assert_eq!(reply.content, "coordinator here");
    }

    #[tokio::test]
    async fn broadcast_isolates_a_failing_specialist() {
        let api = Arc::new(MockApi::default());
        api.plan("asst_lsrc_tech", vec![failed("rate limited")]);
        api.reply("asst_documentary", "noted");
        let (orch, _) = fixture(api);

        let replies = orch.broadcast("weekly check-in").await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].0, "lsrc_tech");
        assert!(replies[0].1.starts_with("Error:"));
        assert_eq!(replies[1], ("documentary".to_string(), "noted".to_string()));
    }

    #[tokio::test]
    async fn failed_run_surfaces_the_service_error() {
        let api = Arc::new(MockApi::default());
        api.plan("asst_chief_of_staff", vec![failed("server_error: boom")]);
        let (orch, _) = fixture(api);

        let err = orch.ask("hello", None).await.unwrap_err();
        assert!(err.to_string().contains("server_error: boom"));
    }

    #[tokio::test]
    async fn unsupported_run_state_is_an_error() {
        let api = Arc::new(MockApi::default());
        api.plan(
            "asst_chief_of_staff",
            vec![Run {
                id: String::new(),
                status: RunStatus::Other("cancelling".to_string()),
                tool_calls: Vec::new(),
                last_error: None,
            }],
        );
        let (orch, _) = fixture(api);

        let err = orch.ask("hello", None).await.unwrap_err();
        assert!(err.to_string().contains("cancelling"));
    }
}
