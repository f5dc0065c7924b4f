//! Commands executed by the running daemon.

use anyhow::Result;
use colored::Colorize;
use tether_core::SweepReport;

use crate::api::ServerClient;
use crate::config::Config;

use super::format_time;

pub async fn sweep(json: bool, config: &Config) -> Result<()> {
    let client = ServerClient::new(config)?;
    let report = client.sweep().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_sweep(&report);
    }
    Ok(())
}

fn print_sweep(report: &SweepReport) {
    let mark = if report.failures == 0 {
        "✓".green()
    } else {
        "⚠".yellow()
    };
    println!(
        "{} Sweep finished at {} ({} examined)",
        mark,
        format_time(report.finished_at),
        report.examined
    );
    if report.is_quiet() {
        println!("  Nothing to converge");
        return;
    }
    println!("    Locked:        {}", report.locked);
    println!("    Reclaimed:     {}", report.reclaimed);
    println!("    Stale dropped: {}", report.stale_dropped);
    println!("    Members added: {}", report.members_added);
    println!("    Orphans:       {}", report.orphans_deleted);
    if report.failures > 0 {
        println!(
            "    {}      {}",
            "Failures:".red(),
            report.failures.to_string().red().bold()
        );
    }
}

pub async fn reclaim(template_id: &str, config: &Config) -> Result<()> {
    let client = ServerClient::new(config)?;
    let outcome = client.reclaim(template_id).await?;

    match outcome.get("outcome").and_then(|o| o.as_str()) {
        Some("reclaimed") => println!("{} Reclaimed companion of {}", "✓".green(), template_id),
        Some("skipped") => println!(
            "{} Not reclaimed: {}",
            "•".yellow(),
            outcome
                .get("reason")
                .and_then(|r| r.as_str())
                .unwrap_or("no reason given")
        ),
        _ => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}
