mod bootstrap;
mod reports;
mod setup_db;
mod sync_tools;
mod tasks;

use anyhow::Result;
use console::style;

use crate::config::Settings;
use crate::interfaces;
use crate::interfaces::telegram::TelegramInterface;

fn print_help() {
    println!();
    println!(
        " {} {} <command>",
        style("Usage:").bold(),
        style("attache").green()
    );
    println!();
    println!(" {}", style("Chat").bold());
    println!("   chat                Interactive chat (default)");
    println!("   ask <message>       One-shot request to the coordinator");
    println!("   telegram            Run the Telegram bot");
    println!();
    println!(" {}", style("Database").bold());
    println!("   setup-db [--config <path>]");
    println!("                       Seed/sync projects from the YAML config");
    println!("   drop-table <name>   Drop a custom table");
    println!("   summary [date]      Show a stored daily summary");
    println!("   progress [project] [--days N]");
    println!("                       Show recent progress-log entries");
    println!("   tasks [project]     List pending tasks");
    println!("   task add <project> <title>");
    println!("   task done <id>      Mark a task completed");
    println!();
    println!(" {}", style("Assistants").bold());
    println!("   sync-tools          Publish tool schemas to every assistant");
    println!();
}

pub async fn run_main() -> Result<()> {
    crate::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("chat");

    match command {
        "chat" => {
            let services = bootstrap::services()?;
            interfaces::cli::run_repl(services.orchestrator()).await
        }
        "ask" => {
            let message = args[2..].join(" ");
            if message.trim().is_empty() {
                println!("Usage: attache ask <message>");
                return Ok(());
            }
            let services = bootstrap::services()?;
            interfaces::cli::run_once(services.orchestrator(), &message).await
        }
        "telegram" => {
            let token = Settings::telegram_token()?;
            let services = bootstrap::services()?;
            let bot = TelegramInterface::new(
                token,
                services.registry.clone(),
                services.router.clone(),
                services.api.clone(),
                services.gateway.clone(),
                services.settings.poll_interval,
            );
            bot.run().await
        }
        "setup-db" => setup_db::run(&args).await,
        "drop-table" => {
            let Some(name) = args.get(2) else {
                println!("Usage: attache drop-table <custom_table>");
                return Ok(());
            };
            let services = bootstrap::services()?;
            let result = services.gateway.drop_table(name).await;
            if result["status"] == "success" {
                println!("{} {}", style("ok").green(), result["message"].as_str().unwrap_or(""));
            } else {
                println!(
                    "{} {}",
                    style("error:").red().bold(),
                    result["message"].as_str().unwrap_or("drop failed")
                );
            }
            Ok(())
        }
        "sync-tools" => sync_tools::run().await,
        "summary" => reports::summary(&args).await,
        "progress" => reports::progress(&args).await,
        "tasks" => tasks::list(&args).await,
        "task" => tasks::run(&args).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            println!(
                "{} unknown command: {other}",
                style("error:").red().bold()
            );
            print_help();
            Ok(())
        }
    }
}
