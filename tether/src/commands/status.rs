//! Status dashboard command.
//!
//! Combines daemon health (when reachable) with counts read straight
//! from the mapping store. Supports JSON output for programmatic use.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use tether_core::MappingStore;

use crate::api::{Health, ServerClient};
use crate::config::Config;

use super::{format_time, open_store};

/// Full status for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub timestamp: String,
    pub server_url: String,
    pub daemon: Option<Health>,
    pub store: StoreStats,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub path: String,
    pub readable: bool,
    pub active_mappings: usize,
    pub archived_mappings: usize,
    pub registered_templates: usize,
}

pub async fn execute(json: bool, config: &Config) -> Result<()> {
    let status = gather_status(config).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_dashboard(&status);
    }
    Ok(())
}

async fn gather_status(config: &Config) -> SystemStatus {
    let mut issues = Vec::new();

    let daemon = match ServerClient::new(config) {
        Ok(client) => match client.health().await {
            Ok(health) => Some(health),
            Err(e) => {
                issues.push(e.to_string());
                None
            }
        },
        Err(e) => {
            issues.push(e.to_string());
            None
        }
    };

    let mut store = StoreStats {
        path: config.database_path.display().to_string(),
        ..Default::default()
    };
    match open_store(config) {
        Ok(db) => {
            store.readable = db.ping().is_ok();
            store.active_mappings = db.list().map(|m| m.len()).unwrap_or(0);
            store.archived_mappings = db.list_archived().map(|m| m.len()).unwrap_or(0);
            store.registered_templates = db.list_templates().map(|t| t.len()).unwrap_or(0);
        }
        Err(e) => issues.push(format!("{:#}", e)),
    }

    if let Some(health) = &daemon {
        if !health.components.sweeper {
            issues.push("Sweeper is not running".to_string());
        }
    }

    SystemStatus {
        timestamp: Utc::now().to_rfc3339(),
        server_url: config.server_url.clone(),
        daemon,
        store,
        issues,
    }
}

fn print_dashboard(status: &SystemStatus) {
    println!();
    println!("  {}", "Tether Status".cyan().bold());
    println!();

    print!("  {} ", "Daemon:".cyan().bold());
    match &status.daemon {
        Some(health) => {
            let label = if health.status == "healthy" {
                "HEALTHY".green().bold()
            } else {
                health.status.to_uppercase().yellow().bold()
            };
            println!("{} v{} (up {}s)", label, health.version, health.uptime_seconds);
            let sweep = health
                .metrics
                .last_sweep_at
                .map(format_time)
                .unwrap_or_else(|| "never".to_string());
            println!("    Last sweep: {}", sweep);
        }
        None => {
            println!("{}", "UNREACHABLE".red());
            println!("    Start with: tether-server");
        }
    }

    println!();
    println!("  {}", "Mapping store:".cyan().bold());
    println!("    Path:       {}", status.store.path);
    println!("    Active:     {}", status.store.active_mappings);
    println!("    Locked:     {}", status.store.archived_mappings);
    println!("    Templates:  {}", status.store.registered_templates);

    println!();
    let db = if status.store.readable { "✓".green() } else { "✗".red() };
    let daemon = if status.daemon.is_some() { "✓".green() } else { "✗".red() };
    println!("    {} store   {} daemon", db, daemon);

    if !status.issues.is_empty() {
        println!();
        println!("    {}", "Issues:".red());
        for issue in &status.issues {
            println!("      • {}", issue);
        }
    }
    println!();
}
