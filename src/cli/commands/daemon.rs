//! Maintenance daemon loop.

use std::time::Duration;

use console::style;

use crawlgate::config::Settings;
use crawlgate::maintenance::{run_cycle, CycleOptions, CycleReport};

use crate::cli::helpers::open_repositories;

fn print_cycle(cycle: u64, report: &CycleReport) {
    if report.is_quiet() {
        println!("{} Cycle {}: nothing to do", style("→").dim(), cycle);
        return;
    }
    println!(
        "{} Cycle {}: {} requeued, {} locks released, {} purged",
        style("✓").green(),
        cycle,
        report.requeued,
        report.locks_released,
        report.purged
    );
    if let Some(dedupe) = &report.dedupe {
        if !dedupe.disabled.is_empty() {
            println!("  Disabled {} duplicate site(s)", dedupe.disabled.len());
        }
    }
}

/// Run maintenance cycles until Ctrl-C.
pub async fn cmd_daemon(
    settings: &Settings,
    interval: Option<u64>,
    dedupe_every: Option<u32>,
    once: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let interval = interval.unwrap_or(settings.daemon.interval_secs).max(1);
    let dedupe_every = u64::from(dedupe_every.unwrap_or(settings.daemon.dedupe_every));

    println!(
        "{} Maintenance daemon on {} (every {}s)",
        style("→").cyan(),
        repos.db_path.display(),
        interval
    );

    let mut cycle: u64 = 0;
    loop {
        cycle += 1;
        let options = CycleOptions {
            processing_expiry_ms: settings.processing_expiry_ms(),
            purge_batch: settings.daemon.purge_batch,
            dedupe: dedupe_every > 0 && cycle % dedupe_every == 0,
        };

        let cycle_repos = repos.clone();
        let result =
            tokio::task::spawn_blocking(move || run_cycle(&cycle_repos, &options)).await?;
        match result {
            Ok(report) => print_cycle(cycle, &report),
            // Retried next cycle.
            Err(e) => {
                tracing::warn!("Maintenance cycle {} failed: {}", cycle, e);
                eprintln!("{} Cycle {} failed: {}", style("✗").red(), cycle, e);
            }
        }

        if once {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("{} Shutting down", style("↻").cyan());
                return Ok(());
            }
        }
    }
}
