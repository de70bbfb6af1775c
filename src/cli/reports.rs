use anyhow::Result;
use console::style;

use crate::cli::bootstrap;

/// `attache summary [date]` prints a stored daily summary;
/// `attache summary write <text...>` stores today's.
pub async fn summary(args: &[String]) -> Result<()> {
    if args.get(2).map(String::as_str) == Some("write") {
        let text = args[3..].join(" ");
        if text.trim().is_empty() {
            println!("Usage: attache summary write <text>");
            return Ok(());
        }
        let services = bootstrap::services()?;
        let projects = services.projects();
        let mut status = serde_json::Map::new();
        for row in projects.get_all_projects().await? {
            if let (Some(key), Some(state)) = (row["project_key"].as_str(), row["status"].as_str())
            {
                status.insert(key.to_string(), state.into());
            }
        }
        projects
            .upsert_daily_summary(text.trim(), status.into(), 0, 0)
            .await?;
        println!("{} summary stored", style("ok").green());
        return Ok(());
    }

    let date = args.get(2).map(String::as_str);
    let services = bootstrap::services()?;

    match services.projects().get_daily_summary(date).await? {
        Some(row) => {
            let day = row["date"].as_str().unwrap_or("?");
            println!("{}", style(format!("Summary for {day}")).bold());
            println!("{}", row["summary"].as_str().unwrap_or(""));
            println!(
                "\n{}",
                style(format!(
                    "tasks completed: {}  tasks created: {}",
                    row["tasks_completed"].as_u64().unwrap_or(0),
                    row["tasks_created"].as_u64().unwrap_or(0)
                ))
                .dim()
            );
        }
        None => println!("No summary stored for that day."),
    }
    Ok(())
}

/// `attache progress [project] [--days N]` lists recent entries;
/// `attache progress log <project> <event> <description...>` records one.
pub async fn progress(args: &[String]) -> Result<()> {
    if args.get(2).map(String::as_str) == Some("log") {
        let (Some(project), Some(event)) = (args.get(3), args.get(4)) else {
            println!("Usage: attache progress log <project> <event> <description>");
            return Ok(());
        };
        let description = args[5.min(args.len())..].join(" ");
        let services = bootstrap::services()?;
        match services
            .projects()
            .log_progress(project, event, description.trim(), None)
            .await?
        {
            Some(_) => println!("{} progress logged", style("ok").green()),
            None => println!(
                "{} unknown project: {project}",
                style("error:").red().bold()
            ),
        }
        return Ok(());
    }

    let project = args
        .get(2)
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str);
    let days = args
        .iter()
        .position(|a| a == "--days")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(7);

    let services = bootstrap::services()?;
    let entries = services.projects().get_progress(project, days).await?;

    if entries.is_empty() {
        println!("No progress logged in the last {days} days.");
        return Ok(());
    }

    println!(
        "{}",
        style(format!("Progress, last {days} days ({}):", entries.len())).bold()
    );
    for entry in entries {
        let when = entry["created_at"].as_str().unwrap_or("?");
        let event = entry["event_type"].as_str().unwrap_or("?");
        let description = entry["description"].as_str().unwrap_or("");
        println!("  {} {} — {description}", style(when).dim(), style(event).cyan());
    }
    Ok(())
}
