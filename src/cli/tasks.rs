use anyhow::Result;
use console::style;

use crate::cli::bootstrap;
use crate::core::projects::NewTask;

/// `attache tasks [project]` lists pending tasks, optionally scoped to one
/// project.
pub async fn list(args: &[String]) -> Result<()> {
    let project = args.get(2).map(String::as_str);
    let services = bootstrap::services()?;
    let tasks = services.projects().get_pending_tasks(project).await?;

    if tasks.is_empty() {
        println!("No pending tasks.");
        return Ok(());
    }

    println!("{}", style(format!("Pending tasks ({}):", tasks.len())).bold());
    for task in tasks {
        let id = task["id"].as_str().unwrap_or("?");
        let title = task["title"].as_str().unwrap_or("?");
        let priority = task["priority"].as_str().unwrap_or("-");
        println!("  [{}] {} {}", style(priority).cyan(), title, style(id).dim());
    }
    Ok(())
}

/// `attache task add <project> <title...>` / `attache task done <id>`.
pub async fn run(args: &[String]) -> Result<()> {
    let sub = args.get(2).map(String::as_str).unwrap_or("");
    match sub {
        "add" => {
            let (Some(project), title) = (args.get(3), args[4.min(args.len())..].join(" ")) else {
                println!("Usage: attache task add <project> <title>");
                return Ok(());
            };
            if title.trim().is_empty() {
                println!("Usage: attache task add <project> <title>");
                return Ok(());
            }
            let services = bootstrap::services()?;
            match services
                .projects()
                .create_task(NewTask::new(project, title.trim()))
                .await?
            {
                Some(task) => println!(
                    "{} task created: {}",
                    style("ok").green(),
                    task["id"].as_str().unwrap_or("?")
                ),
                None => println!(
                    "{} unknown project: {project}",
                    style("error:").red().bold()
                ),
            }
        }
        "done" => {
            let Some(id) = args.get(3) else {
                println!("Usage: attache task done <id>");
                return Ok(());
            };
            let services = bootstrap::services()?;
            match services.projects().complete_task(id).await? {
                Some(_) => println!("{} task completed", style("ok").green()),
                None => println!("{} no task with id {id}", style("error:").red().bold()),
            }
        }
        _ => {
            println!("Usage: attache task <add|done> ...");
        }
    }
    Ok(())
}
