//! Domain rate limit commands.

use console::style;

use crawlgate::clock::system_clock;
use crawlgate::config::Settings;

use crate::cli::helpers::{format_ts, open_repositories, print_json};

pub async fn cmd_limits_set(
    settings: &Settings,
    domain: &str,
    max_per_minute: u32,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let state = repos.limits.set_limit(domain, max_per_minute)?;

    if json {
        return print_json(&state);
    }
    println!(
        "{} {} limited to {}/min",
        style("✓").green(),
        state.domain,
        state.max_per_minute
    );
    if max_per_minute == 0 {
        println!("  {} Domain is now blocked", style("!").yellow());
    }
    Ok(())
}

/// List known domains with their current window usage.
pub async fn cmd_limits_list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let states = repos.limits.list()?;

    if json {
        return print_json(&states);
    }
    if states.is_empty() {
        println!(
            "{} No domains seen yet; unseen domains get {}/min",
            style("→").dim(),
            settings.queue.default_max_per_minute
        );
        return Ok(());
    }

    let now = system_clock().now_ms();
    println!("\n{}", style("Domain Rate Limits").bold());
    println!("{}", "-".repeat(80));
    println!(
        "{:<36} {:<8} {:<10} {:<10} Window Start",
        "Domain", "Max/min", "Used", "Remaining"
    );
    println!("{}", "-".repeat(80));
    for state in &states {
        let used = if state.window_expired(now) {
            0
        } else {
            state.sent_in_window
        };
        println!(
            "{:<36} {:<8} {:<10} {:<10} {}",
            state.domain,
            state.max_per_minute,
            used,
            state.remaining(now),
            format_ts(state.window_start)
        );
    }
    Ok(())
}
