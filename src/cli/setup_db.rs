use anyhow::Result;
use console::style;

use crate::cli::bootstrap;
use crate::config;

const DEFAULT_PROJECTS_PATH: &str = "config/projects.yaml";

/// Seed or refresh the projects table from the YAML config, then show what
/// the database now holds.
pub async fn run(args: &[String]) -> Result<()> {
    let path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or(DEFAULT_PROJECTS_PATH);

    println!("{}", style("Setting up database...").bold());

    let services = bootstrap::services()?;
    let projects = services.projects();

    let config = config::load_projects_config(path)?;
    let synced = projects.sync_projects_from_config(&config).await?;
    println!("Synced {synced} projects from {path}");

    let rows = projects.get_all_projects().await?;
    println!("\n{} projects in database:", rows.len());
    for row in rows {
        let name = row["name"].as_str().unwrap_or("?");
        let status = row["status"].as_str().unwrap_or("?");
        println!("  - {name} ({status})");
    }

    if !config.focus_this_week.is_empty() {
        println!(
            "\nFocus this week: {}",
            config.focus_this_week.join(", ")
        );
    }

    println!("\n{}", style("Database setup complete.").green());
    Ok(())
}
