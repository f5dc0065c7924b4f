//! Voice template registry commands.

use anyhow::Result;
use colored::Colorize;
use tether_core::types::RegisteredTemplate;
use tether_core::MappingStore;

use crate::cli::{TemplatesAction, TemplatesCommand};
use crate::config::Config;
use crate::error::TetherError;

use super::{format_time, open_store};

pub async fn execute(cmd: TemplatesCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    match cmd.action {
        TemplatesAction::Add { id, name, parent } => add(&store, id, name, parent),
        TemplatesAction::List { json } => list(&store, json),
        TemplatesAction::Remove { id } => remove(&store, &id),
    }
}

fn add(
    store: &dyn MappingStore,
    id: String,
    name: String,
    parent: Option<String>,
) -> Result<()> {
    if id.trim().is_empty() || name.trim().is_empty() {
        anyhow::bail!("Template id and name must not be empty");
    }

    let template = RegisteredTemplate {
        id,
        display_name: name,
        parent_group_id: parent,
        created_at: chrono::Utc::now().timestamp_millis(),
    };
    store.register_template(&template)?;

    println!(
        "{} Registered {} ({})",
        "✓".green(),
        template.display_name.cyan().bold(),
        template.id
    );
    println!("  Rooms will be named \"{} #<n>\"", template.display_name);
    Ok(())
}

fn list(store: &dyn MappingStore, json: bool) -> Result<()> {
    let templates = store.list_templates()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    println!("{} ({})", "Registered templates:".cyan().bold(), templates.len());
    if templates.is_empty() {
        println!("  None. Register one with: tether templates add <id> <name>");
        return Ok(());
    }

    for template in &templates {
        let active = store
            .get(&template.id)?
            .map(|m| format!("→ {}", m.companion_name).green().to_string())
            .unwrap_or_default();
        println!(
            "  {} {} ({}) {}",
            "•".green(),
            template.display_name,
            template.id,
            active
        );
        if let Some(parent) = &template.parent_group_id {
            println!("      parent: {}", parent);
        }
        println!("      since:  {}", format_time(template.created_at));
    }
    Ok(())
}

fn remove(store: &dyn MappingStore, id: &str) -> Result<()> {
    if !store.unregister_template(id)? {
        return Err(TetherError::TemplateNotFound(id.to_string()).into());
    }

    println!("{} Unregistered {}", "✓".green(), id);
    if let Some(mapping) = store.get(id)? {
        println!(
            "  {} {} stays until it empties",
            "⚠".yellow(),
            mapping.companion_name
        );
    }
    Ok(())
}
