use anyhow::Result;
use console::style;
use serde_json::Value;

use crate::cli::bootstrap;
use crate::core::personas::PersonaRole;
use crate::core::tools::{MANAGED_TOOL_NAMES, coordinator_tools, shared_tools};

/// Publish the current tool schemas to every assistant. Tools this process
/// does not own (code interpreter, file search, foreign functions) are kept
/// as-is; ours are replaced wholesale so stale schemas never linger.
pub async fn run() -> Result<()> {
    let services = bootstrap::services()?;

    println!("{}", style("Syncing assistant tools...").bold());

    for persona in services.registry.iter() {
        let existing = services.api.assistant_tools(&persona.assistant_id).await?;
        let mut tools: Vec<Value> = existing
            .into_iter()
            .filter(|t| !is_managed_function(t))
            .collect();

        tools.extend(shared_tools());
        let added = if persona.role == PersonaRole::Coordinator {
            tools.extend(coordinator_tools());
            shared_tools().len() + coordinator_tools().len()
        } else {
            shared_tools().len()
        };

        services
            .api
            .set_assistant_tools(&persona.assistant_id, tools)
            .await?;
        println!(
            "  {} {}: {added} functions published",
            style("ok").green(),
            persona.key
        );
    }

    println!("{}", style("All assistants updated.").green());
    Ok(())
}

fn is_managed_function(tool: &Value) -> bool {
    tool["type"] == "function"
        && tool["function"]["name"]
            .as_str()
            .is_some_and(|name| MANAGED_TOOL_NAMES.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn foreign_tools_are_not_managed() {
        assert!(!is_managed_function(&json!({"type": "file_search"})));
        assert!(!is_managed_function(&json!({
            "type": "function",
            "function": {"name": "get_weather"}
        })));
    }

    #[test]
    fn our_functions_are_managed() {
        assert!(is_managed_function(&json!({
            "type": "function",
            "function": {"name": "insert_row"}
        })));
        assert!(is_managed_function(&json!({
            "type": "function",
            "function": {"name": "delegate_to_specialist"}
        })));
    }
}
