use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::core::assistants::AssistantsApi;
use crate::core::datastore::DataGateway;
use crate::core::orchestrator::Orchestrator;
use crate::core::personas::{PersonaRegistry, PersonaRole};
use crate::core::router::TopicRouter;

/// Telegram adapter. Each chat gets its own orchestrator (its own threads)
/// lazily; the service clients behind them are shared.
pub struct TelegramInterface {
    token: String,
    registry: PersonaRegistry,
    router: TopicRouter,
    api: Arc<dyn AssistantsApi>,
    gateway: Arc<DataGateway>,
    poll_interval: Duration,
}

type Sessions = Arc<Mutex<HashMap<i64, Arc<Orchestrator>>>>;

impl TelegramInterface {
    pub fn new(
        token: String,
        registry: PersonaRegistry,
        router: TopicRouter,
        api: Arc<dyn AssistantsApi>,
        gateway: Arc<DataGateway>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            token,
            registry,
            router,
            api,
            gateway,
            poll_interval,
        }
    }

    fn new_orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            self.registry.clone(),
            self.router.clone(),
            self.api.clone(),
            self.gateway.clone(),
            self.poll_interval,
        ))
    }

    pub async fn run(self) -> Result<()> {
        let bot = Bot::new(&self.token);

        let commands = vec![
            teloxide::types::BotCommand::new("start", "Introduction and command list"),
            teloxide::types::BotCommand::new("help", "How to use the bot"),
            teloxide::types::BotCommand::new("status", "Status across all projects"),
            teloxide::types::BotCommand::new("agents", "List the persona roster"),
            teloxide::types::BotCommand::new("ask", "Ask a specialist directly"),
            teloxide::types::BotCommand::new("reset", "Reset the conversation"),
        ];
        if let Err(e) = bot.set_my_commands(commands).await {
            error!("Failed to set telegram bot commands: {e}");
        }

        let sessions: Sessions = Arc::new(Mutex::new(HashMap::new()));
        let interface = Arc::new(self);

        info!("Telegram interface started");
        teloxide::repl(bot, move |bot: Bot, msg: Message| {
            let sessions = sessions.clone();
            let interface = interface.clone();
            async move {
                let Some(text) = msg.text() else {
                    return Ok(());
                };
                let chat_id = msg.chat.id;
                let text = text.trim().to_string();
                info!("Telegram message from {chat_id}: {text}");

                let orchestrator = {
                    let mut map = sessions.lock().await;
                    map.entry(chat_id.0)
                        .or_insert_with(|| interface.new_orchestrator())
                        .clone()
                };

                let _ = bot
                    .send_chat_action(chat_id, teloxide::types::ChatAction::Typing)
                    .await;

                let reply = match text.as_str() {
                    "/start" => welcome_text(&interface.registry),
                    "/help" => HELP_TEXT.to_string(),
                    "/agents" => agents_text(&interface.registry),
                    "/status" => match orchestrator.get_all_status().await {
                        Ok(status) => status,
                        Err(e) => {
                            error!("Status request failed: {e:#}");
                            format!("Something went wrong: {e:#}")
                        }
                    },
                    "/reset" => {
                        sessions.lock().await.remove(&chat_id.0);
                        "Conversation reset. Next message starts fresh.".to_string()
                    }
                    _ => {
                        if let Some(rest) = text.strip_prefix("/ask ") {
                            match rest.trim().split_once(' ') {
                                Some((key, message)) => {
                                    match orchestrator.ask_specialist(key, message.trim()).await {
                                        Ok(content) => content,
                                        Err(e) => {
                                            error!("Specialist request failed: {e:#}");
                                            format!("Something went wrong: {e:#}")
                                        }
                                    }
                                }
                                None => "Usage: /ask <agent> <message>".to_string(),
                            }
                        } else {
                            match orchestrator.ask(&text, Some("telegram")).await {
                                Ok(reply) => reply.content,
                                Err(e) => {
                                    error!("Coordinator request failed: {e:#}");
                                    format!("Something went wrong: {e:#}")
                                }
                            }
                        }
                    }
                };

                let _ = bot.send_message(chat_id, reply).await;
                Ok(())
            }
        })
        .await;

        Ok(())
    }
}

const HELP_TEXT: &str = "How to use:

Just write a message and the coordinator handles it, delegating to \
specialists when needed.

/status — status across all projects
/agents — list the persona roster
/ask <agent> <message> — talk to a specialist directly
/reset — start the conversation over";

fn welcome_text(registry: &PersonaRegistry) -> String {
    let mut text = String::from("Hi! I run your project team:\n\n");
    for persona in registry.iter() {
        let marker = match persona.role {
            PersonaRole::Coordinator => "*",
            PersonaRole::Specialist => "-",
        };
        text.push_str(&format!("{marker} {} ({})\n", persona.name, persona.key));
    }
    text.push_str("\n");
    text.push_str(HELP_TEXT);
    text
}

fn agents_text(registry: &PersonaRegistry) -> String {
    let mut text = String::from("Persona roster:\n\n");
    for persona in registry.iter() {
        text.push_str(&format!("{} — {}\n", persona.key, persona.name));
        if !persona.description.is_empty() {
            text.push_str(&format!("    {}\n", persona.description));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersonaEntry;

    fn registry() -> PersonaRegistry {
        PersonaRegistry::from_entries(&[
            PersonaEntry {
                key: "chief_of_staff".to_string(),
                assistant_id: "asst_1".to_string(),
                name: "Chief of Staff".to_string(),
                role: "coordinator".to_string(),
                description: "coordinates everything".to_string(),
            },
            PersonaEntry {
                key: "lsrc_tech".to_string(),
                assistant_id: "asst_2".to_string(),
                name: "LSRC Tech".to_string(),
                role: "specialist".to_string(),
                description: String::new(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn welcome_lists_every_persona() {
        let text = welcome_text(&registry());
        assert!(text.contains("* Chief of Staff (chief_of_staff)"));
        assert!(text.contains("- LSRC Tech (lsrc_tech)"));
        assert!(text.contains("/status"));
    }

    #[test]
    fn agents_text_includes_descriptions_when_present() {
        let text = agents_text(&registry());
        assert!(text.contains("coordinates everything"));
        assert!(text.contains("lsrc_tech — LSRC Tech"));
    }
}
