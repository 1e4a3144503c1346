//! Shared helper functions for CLI commands.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crawlgate::clock::system_clock;
use crawlgate::config::Settings;
use crawlgate::repository::Repositories;

/// Open every repository over the configured database, migrating it first.
pub fn open_repositories(settings: &Settings) -> anyhow::Result<Repositories> {
    settings.ensure_directories()?;
    let repos = Repositories::open(
        &settings.database_path(),
        system_clock(),
        settings.queue_policy(),
    )?
    .with_manual_trigger_window_ms(settings.manual_trigger_window_ms());
    Ok(repos)
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate a string for table display.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format epoch milliseconds as a UTC timestamp.
pub fn format_ts(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

pub fn format_opt_ts(ms: Option<i64>) -> String {
    ms.map(format_ts).unwrap_or_else(|| "Never".to_string())
}

/// Format a duration in milliseconds as a short human string.
pub fn format_age(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    if secs >= 86_400 {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    } else if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
