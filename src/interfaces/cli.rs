use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use console::style;

use crate::core::orchestrator::Orchestrator;
use crate::core::personas::PersonaRole;

enum Flow {
    Continue,
    Quit,
}

/// Interactive chat loop on stdin/stdout. Plain text goes to the
/// coordinator; slash commands address the roster directly.
pub async fn run_repl(orchestrator: Arc<Orchestrator>) -> Result<()> {
    print_banner(&orchestrator);
    let stdin = std::io::stdin();

    loop {
        print!("{} ", style("you ›").cyan().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match handle_input(&orchestrator, input).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => println!("{} {e:#}", style("error:").red().bold()),
        }
    }
    println!("{}", style("bye!").dim());
    Ok(())
}

async fn handle_input(orchestrator: &Orchestrator, input: &str) -> Result<Flow> {
    match input {
        "/quit" | "/exit" => return Ok(Flow::Quit),
        "/help" => print_help(),
        "/agents" => print_agents(orchestrator),
        "/status" => {
            let status = orchestrator.get_all_status().await?;
            print_reply("Status", &status);
        }
        "/reset" => {
            orchestrator.reset_all_threads().await;
            println!("{}", style("Conversation reset.").dim());
        }
        _ if input.starts_with("/reset ") => {
            let key = input["/reset ".len()..].trim();
            orchestrator.reset_thread(key).await;
            println!("{}", style(format!("Conversation with {key} reset.")).dim());
        }
        _ if input.starts_with("/broadcast ") => {
            let message = input["/broadcast ".len()..].trim();
            for (key, content) in orchestrator.broadcast(message).await {
                print_reply(&key, &content);
            }
        }
        _ => {
            if let Some(rest) = input.strip_prefix("/ask ") {
                let Some((key, message)) = rest.trim().split_once(' ') else {
                    println!("Usage: /ask <agent> <message>");
                    return Ok(Flow::Continue);
                };
                let content = orchestrator.ask_specialist(key, message.trim()).await?;
                print_reply(key, &content);
            } else if let Some(message) = input.strip_prefix("/auto ") {
                let reply = orchestrator.ask_with_auto_routing(message.trim()).await?;
                if let Some(key) = &reply.delegated_to {
                    println!("{}", style(format!("→ routed to {key}")).dim());
                }
                print_reply(&reply.persona_name, &reply.content);
            } else if input.starts_with('/') {
                println!("Unknown command. Type /help for the list.");
            } else {
                let reply = orchestrator.ask(input, None).await?;
                print_reply(&reply.persona_name, &reply.content);
            }
        }
    }
    Ok(Flow::Continue)
}

/// Run a single request and print the reply, for `attache ask "..."`.
pub async fn run_once(orchestrator: Arc<Orchestrator>, message: &str) -> Result<()> {
    let reply = orchestrator.ask(message, None).await?;
    println!("{}", reply.content);
    Ok(())
}

fn print_reply(from: &str, content: &str) {
    println!();
    println!("{}", style(format!("{from} ›")).green().bold());
    println!("{content}");
    println!();
}

fn print_banner(orchestrator: &Orchestrator) {
    println!();
    println!("{}", style("attache — persona orchestrator").bold());
    println!(
        "{}",
        style(format!(
            "coordinator: {} · {} specialists · /help for commands",
            orchestrator.registry().coordinator().name,
            orchestrator.registry().specialists().count()
        ))
        .dim()
    );
    println!();
}

fn print_help() {
    println!(
        "
Commands:
  /help           Show this help
  /status         Cross-project status from the coordinator
  /agents         List the persona roster
  /ask <agent> <message>
                  Talk directly to a specialist
  /auto <message> Route by topic keyword
  /broadcast <message>
                  Send to every specialist
  /reset [agent]  Reset all conversations, or one persona's
  /quit           Exit

Anything else is sent to the coordinator.
"
    );
}

fn print_agents(orchestrator: &Orchestrator) {
    println!();
    for persona in orchestrator.registry().iter() {
        let marker = match persona.role {
            PersonaRole::Coordinator => style("coordinator").yellow(),
            PersonaRole::Specialist => style("specialist ").dim(),
        };
        println!("  {marker}  {}  {}", style(&persona.key).bold(), persona.name);
        if !persona.description.is_empty() {
            println!("               {}", style(&persona.description).dim());
        }
    }
    println!();
}
