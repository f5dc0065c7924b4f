//! Mapping inspection commands.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tether_core::types::{ArchivedEntry, LifecycleState, MappingEntry};
use tether_core::MappingStore;

use crate::cli::{MappingsAction, MappingsCommand};
use crate::config::Config;

use super::{format_time, open_store};

/// Everything the store knows about one template.
#[derive(Debug, Serialize)]
pub struct MappingReport {
    pub template_id: String,
    pub state: LifecycleState,
    pub mapping: Option<MappingEntry>,
    pub archived: Option<ArchivedEntry>,
}

pub async fn execute(cmd: MappingsCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    match cmd.action {
        MappingsAction::List { archived: false, json } => list_active(&store, json),
        MappingsAction::List { archived: true, json } => list_archived(&store, json),
        MappingsAction::Show { template_id } => {
            let report = report(&store, &template_id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

/// Stored state of a template; in-flight states only exist in the daemon.
pub fn report(store: &dyn MappingStore, template_id: &str) -> Result<MappingReport> {
    let mapping = store.get(template_id)?;
    let archived = store.get_archived(template_id)?;
    let state = match (&mapping, &archived) {
        (Some(_), _) => LifecycleState::Active,
        (None, Some(_)) => LifecycleState::Locked,
        (None, None) => LifecycleState::Idle,
    };
    Ok(MappingReport {
        template_id: template_id.to_string(),
        state,
        mapping,
        archived,
    })
}

fn list_active(store: &dyn MappingStore, json: bool) -> Result<()> {
    let mappings = store.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&mappings)?);
        return Ok(());
    }

    println!("{} ({})", "Active companions:".cyan().bold(), mappings.len());
    if mappings.is_empty() {
        println!("  None");
    }
    for entry in &mappings {
        let kind = format!("[{}]", entry.kind);
        println!(
            "  {} {} {} ← {}",
            "•".green(),
            kind.dimmed(),
            entry.companion_name.bold(),
            entry.template_id
        );
        println!("      companion: {}", entry.companion_id);
        println!("      created:   {}", format_time(entry.created_at));
        if let Some(ends_at) = entry.ends_at {
            println!("      ends:      {}", format_time(ends_at));
        }
    }
    Ok(())
}

fn list_archived(store: &dyn MappingStore, json: bool) -> Result<()> {
    let archived = store.list_archived()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&archived)?);
        return Ok(());
    }

    println!("{} ({})", "Locked companions:".cyan().bold(), archived.len());
    if archived.is_empty() {
        println!("  None");
    }
    for entry in &archived {
        println!(
            "  {} {} ← {}",
            "🔒".yellow(),
            entry.companion_name.bold(),
            entry.template_id
        );
        println!("      locked: {} ({})", format_time(entry.archived_at), entry.reason);
    }
    Ok(())
}
