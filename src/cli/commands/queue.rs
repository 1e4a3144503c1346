//! Scrape queue commands.

use console::style;
use serde_json::json;

use crawlgate::clock::system_clock;
use crawlgate::config::Settings;
use crawlgate::models::{
    CompletionStatus, EnqueueRequest, IgnoreReason, LeaseBatchRequest, QueueStatus,
};

use crate::cli::helpers::{format_age, format_ts, open_repositories, print_json, truncate};

fn parse_queue_status(value: &str) -> anyhow::Result<QueueStatus> {
    QueueStatus::from_str(value).ok_or_else(|| anyhow::anyhow!("unknown queue status '{}'", value))
}

/// Add URLs to the queue.
#[allow(clippy::too_many_arguments)]
pub async fn cmd_queue_enqueue(
    settings: &Settings,
    urls: Vec<String>,
    source_url: String,
    provider: String,
    site_id: Option<String>,
    pattern: Option<String>,
    delay_secs: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let scheduled_at =
        delay_secs.map(|d| system_clock().now_ms() + d.saturating_mul(1000) as i64);

    let summary = repos.queue.enqueue(&EnqueueRequest {
        urls,
        source_url,
        provider,
        site_id,
        pattern,
        scheduled_at,
    })?;

    if json {
        return print_json(&summary);
    }
    println!(
        "{} Enqueued {} URL(s)",
        style("✓").green(),
        summary.inserted
    );
    if summary.duplicates > 0 {
        println!("  {} already queued", summary.duplicates);
    }
    if summary.stale > 0 {
        println!(
            "  {} {} stale row(s) marked failed; re-enqueue after purge",
            style("!").yellow(),
            summary.stale
        );
    }
    Ok(())
}

/// Lease a batch of URLs.
pub async fn cmd_queue_lease(
    settings: &Settings,
    provider: Option<String>,
    limit: Option<usize>,
    max_per_minute: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let leased = repos.queue.lease_batch(&LeaseBatchRequest {
        provider,
        limit: limit.unwrap_or(settings.queue.batch_size),
        max_per_minute_default: max_per_minute.unwrap_or(settings.queue.default_max_per_minute),
        processing_expiry_ms: settings.processing_expiry_ms(),
    })?;

    if json {
        return print_json(&leased);
    }
    if leased.is_empty() {
        println!("{} Nothing to lease", style("→").dim());
        return Ok(());
    }
    for entry in &leased {
        println!(
            "  {} {} (attempt {})",
            style("→").cyan(),
            entry.url,
            entry.attempts
        );
    }
    println!("{} Leased {} URL(s)", style("✓").green(), leased.len());
    Ok(())
}

/// Report outcomes for leased URLs.
pub async fn cmd_queue_complete(
    settings: &Settings,
    urls: &[String],
    status: &str,
    error: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let status = CompletionStatus::from_str(status)
        .ok_or_else(|| anyhow::anyhow!("status must be 'completed' or 'failed', got '{}'", status))?;
    let repos = open_repositories(settings)?;
    let summary = repos.queue.complete(urls, status, error)?;

    if json {
        return print_json(&summary);
    }
    println!("{} Updated {} URL(s)", style("✓").green(), summary.updated);
    if summary.ejected > 0 {
        println!("  {} {} ejected", style("✗").red(), summary.ejected);
    }
    if summary.missing > 0 {
        println!("  {} not in queue", summary.missing);
    }
    if summary.unchanged > 0 {
        println!("  {} already completed", summary.unchanged);
    }
    Ok(())
}

pub async fn cmd_queue_requeue_stale(
    settings: &Settings,
    provider: Option<&str>,
    expiry_secs: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let expiry_ms = expiry_secs
        .map(|s| s.saturating_mul(1000) as i64)
        .unwrap_or_else(|| settings.processing_expiry_ms());
    let requeued = repos.queue.requeue_stale(provider, expiry_ms)?;

    if json {
        return print_json(&json!({ "requeued": requeued }));
    }
    println!(
        "{} Requeued {} processing row(s)",
        style("✓").green(),
        requeued
    );
    Ok(())
}

pub async fn cmd_queue_reset(
    settings: &Settings,
    status: &str,
    provider: Option<&str>,
    site_id: Option<&str>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let status = parse_queue_status(status)?;
    if status == QueueStatus::Pending {
        anyhow::bail!("pending rows are already pending");
    }
    let repos = open_repositories(settings)?;
    let reset = repos.queue.reset_by_status(status, provider, site_id, limit)?;

    if json {
        return print_json(&json!({ "reset": reset, "status": status }));
    }
    println!(
        "{} Reset {} {} row(s) to pending",
        style("✓").green(),
        reset,
        status.as_str()
    );
    Ok(())
}

/// List queue rows.
pub async fn cmd_queue_list(
    settings: &Settings,
    status: Option<&str>,
    provider: Option<&str>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let status = status.map(parse_queue_status).transpose()?;
    let repos = open_repositories(settings)?;
    let entries = repos.queue.list(status, provider, limit)?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("{} Queue is empty", style("→").dim());
        return Ok(());
    }

    let now = system_clock().now_ms();
    println!("\n{}", style("Scrape Queue").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<60} {:<12} {:<10} {:<4} Age",
        "URL", "Provider", "Status", "Try"
    );
    println!("{}", "-".repeat(100));
    for entry in &entries {
        println!(
            "{:<60} {:<12} {:<10} {:<4} {}",
            truncate(&entry.url, 59),
            truncate(&entry.provider, 11),
            entry.status.as_str(),
            entry.attempts,
            format_age(entry.age_ms(now))
        );
        if let Some(error) = &entry.last_error {
            println!("    {}", style(truncate(error, 90)).red());
        }
    }
    Ok(())
}

/// Show queue counts.
pub async fn cmd_queue_stats(
    settings: &Settings,
    provider: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let stats = repos.queue.stats(provider)?;

    if json {
        return print_json(&stats);
    }
    let title = match provider {
        Some(p) => format!("Queue ({})", p),
        None => "Queue".to_string(),
    };
    println!("\n{}", style(title).bold());
    println!("{}", "-".repeat(40));
    println!("  {:<12} {}", "Pending", stats.pending);
    println!("  {:<12} {}", "Processing", stats.processing);
    println!("  {:<12} {}", "Completed", stats.completed);
    println!("  {:<12} {}", "Failed", stats.failed);
    println!("  {:<12} {}", "Total", stats.total());
    if let Some(oldest) = stats.oldest_pending_at {
        let age = system_clock().now_ms() - oldest;
        println!(
            "  Oldest pending: {} ({} ago)",
            format_ts(oldest),
            format_age(age)
        );
    }
    Ok(())
}

/// Show recently ejected or evicted URLs.
pub async fn cmd_queue_ignored(
    settings: &Settings,
    reason: Option<&str>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let reason = reason
        .map(|r| IgnoreReason::from_str(r).ok_or_else(|| anyhow::anyhow!("unknown reason '{}'", r)))
        .transpose()?;
    let repos = open_repositories(settings)?;
    let ignored = repos.ignored.list_recent(reason, limit)?;

    if json {
        return print_json(&ignored);
    }
    if ignored.is_empty() {
        println!("{} No ignored URLs", style("→").dim());
        return Ok(());
    }

    println!("\n{}", style("Ignored URLs").bold());
    println!("{}", "-".repeat(100));
    println!("{:<60} {:<26} When", "URL", "Reason");
    println!("{}", "-".repeat(100));
    for entry in &ignored {
        println!(
            "{:<60} {:<26} {}",
            truncate(&entry.url, 59),
            entry.reason.as_str(),
            format_ts(entry.created_at)
        );
    }
    Ok(())
}
