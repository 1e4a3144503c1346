//! Database management commands.

use console::style;
use serde_json::json;

use crawlgate::clock::system_clock;
use crawlgate::config::Settings;
use crawlgate::repository::{connect, migrations};

use crate::cli::helpers::{open_repositories, print_json};

/// Merge duplicate sites.
pub async fn cmd_db_dedupe(settings: &Settings, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let report = repos.sites.dedupe(dry_run)?;

    if json {
        return print_json(&report);
    }

    if dry_run {
        println!("{} Dry run, nothing written", style("→").cyan());
    }
    println!("  Sites scanned: {}", report.sites_scanned);
    println!("  Duplicate groups: {}", report.groups.len());
    for group in &report.groups {
        println!(
            "  {} {} keeps {} ({} duplicate(s))",
            style("•").dim(),
            group.canonical_key,
            style(&group.kept_id).bold(),
            group.duplicate_ids.len()
        );
        for duplicate in &group.duplicate_ids {
            println!("      {} {}", style("✗").red(), duplicate);
        }
    }
    if report.urls_normalized > 0 {
        println!("  URLs normalized: {}", report.urls_normalized);
    }
    if report.names_backfilled > 0 {
        println!("  Names backfilled: {}", report.names_backfilled);
    }

    let verb = if dry_run { "Would disable" } else { "Disabled" };
    println!(
        "{} {} {} duplicate site(s)",
        style("✓").green(),
        verb,
        report.disabled.len()
    );
    Ok(())
}

/// Show migration status and apply pending migrations.
pub async fn cmd_migrate(settings: &Settings, check: bool, json: bool) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let db_path = settings.database_path();
    let conn = connect(&db_path)?;

    let applied = migrations::applied(&conn)?;
    let pending: Vec<String> = migrations::ordered_names()?
        .into_iter()
        .filter(|name| !applied.contains(name))
        .collect();

    if check {
        if json {
            return print_json(&json!({ "applied": applied, "pending": pending }));
        }
        println!("{} Database migration", style("→").cyan());
        println!("  Database: {}", db_path.display());
        println!("  Applied: {}", applied.len());
        if pending.is_empty() {
            println!("\n{} Schema is up to date.", style("✓").green());
        } else {
            for name in &pending {
                println!("  {} pending: {}", style("!").yellow(), name);
            }
            println!(
                "\n{} Run 'crawlgate db migrate' to apply.",
                style("!").yellow()
            );
        }
        return Ok(());
    }

    let ran = migrations::run_pending(&conn, system_clock().now_ms())?;
    if json {
        return print_json(&json!({ "applied": ran }));
    }
    println!("{} Database migration", style("→").cyan());
    println!("  Database: {}", db_path.display());
    for name in &ran {
        println!("  {} {}", style("✓").green(), name);
    }
    if ran.is_empty() {
        println!("{} Schema is up to date.", style("✓").green());
    } else {
        println!("{} Applied {} migration(s)", style("✓").green(), ran.len());
    }
    Ok(())
}
