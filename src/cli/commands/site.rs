//! Site management and leasing commands.

use console::style;
use serde_json::json;

use crawlgate::canonical::detect_site_type;
use crawlgate::clock::system_clock;
use crawlgate::config::Settings;
use crawlgate::models::{LeaseFilter, NewSite, Site, SiteState, SiteType};
use crawlgate::repository::site::eligibility;
use crawlgate::repository::SiteListFilter;

use crate::cli::helpers::{format_opt_ts, format_ts, open_repositories, print_json, truncate};

fn parse_site_type(value: Option<&str>) -> anyhow::Result<Option<SiteType>> {
    match value {
        None => Ok(None),
        Some(s) => SiteType::from_str(s)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("unknown site type '{}'", s)),
    }
}

fn state_label(site: &Site, now_ms: i64) -> String {
    let state = site.state(now_ms);
    let label = state.as_str();
    match state {
        SiteState::Idle => style(label).green().to_string(),
        SiteState::Locked { .. } => style(label).cyan().to_string(),
        SiteState::Completed => style(label).dim().to_string(),
        SiteState::Failed => style(label).red().to_string(),
        SiteState::Disabled => style(label).yellow().to_string(),
    }
}

fn print_site_change(site: &Site, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(site);
    }
    println!("{} {} {}", style("✓").green(), verb, site.display_name());
    Ok(())
}

/// Register a new site.
pub async fn cmd_site_add(
    settings: &Settings,
    url: &str,
    site_type: Option<&str>,
    name: Option<String>,
    scrape_provider: Option<String>,
    schedule_id: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let site_type = parse_site_type(site_type)?.unwrap_or_else(|| detect_site_type(url));

    let site = repos.sites.create(&NewSite {
        url: url.to_string(),
        site_type,
        name,
        scrape_provider,
        schedule_id,
    })?;

    if json {
        return print_json(&site);
    }
    println!(
        "{} Added {} site {}",
        style("✓").green(),
        site.site_type.as_str(),
        style(&site.id).bold()
    );
    println!("  URL:  {}", site.url);
    println!("  Name: {}", site.display_name());
    Ok(())
}

/// List sites.
pub async fn cmd_site_list(
    settings: &Settings,
    site_type: Option<&str>,
    enabled: Option<bool>,
    schedule_id: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let sites = repos.sites.list(&SiteListFilter {
        site_type: parse_site_type(site_type)?,
        enabled,
        schedule_id,
        limit,
    })?;

    if json {
        return print_json(&sites);
    }
    if sites.is_empty() {
        println!(
            "{} No sites registered. Add one with 'crawlgate site add <url>'.",
            style("!").yellow()
        );
        return Ok(());
    }

    let now = system_clock().now_ms();
    println!("\n{}", style("Sites").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<36} {:<28} {:<10} {:<10} Last Run",
        "ID", "Name", "Type", "State"
    );
    println!("{}", "-".repeat(100));
    for site in &sites {
        println!(
            "{:<36} {:<28} {:<10} {:<10} {}",
            site.id,
            truncate(site.display_name(), 27),
            site.site_type.as_str(),
            state_label(site, now),
            format_opt_ts(site.last_run_at)
        );
    }
    println!("\n{} site(s)", sites.len());
    Ok(())
}

/// Show a site, its lease state and when it is next eligible.
pub async fn cmd_site_show(settings: &Settings, id: &str, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let Some(site) = repos.sites.get(id)? else {
        anyhow::bail!("site '{}' not found", id);
    };
    let schedule = match &site.schedule_id {
        Some(schedule_id) => repos.schedules.get(schedule_id)?,
        None => None,
    };

    let clock = system_clock();
    let now = clock.now_ms();
    let eligible = eligibility(
        clock.as_ref(),
        &site,
        schedule.as_ref(),
        now,
        settings.manual_trigger_window_ms(),
    );

    if json {
        return print_json(&json!({
            "site": site,
            "state": site.state(now),
            "eligible_at": eligible.map(|e| e.eligible_at()),
            "manual": eligible.is_some_and(|e| e.is_manual()),
        }));
    }

    println!("\n{}", style(site.display_name()).bold());
    println!("{}", "-".repeat(60));
    println!("  ID:        {}", site.id);
    println!("  URL:       {}", site.url);
    println!("  Type:      {}", site.site_type.as_str());
    println!(
        "  Provider:  {}",
        site.scrape_provider.as_deref().unwrap_or("-")
    );
    println!("  State:     {}", state_label(&site, now));
    match (&site.schedule_id, &schedule) {
        (Some(_), Some(schedule)) => println!("  Schedule:  {} ({})", schedule.name, schedule.id),
        (Some(schedule_id), None) => println!(
            "  Schedule:  {} {}",
            schedule_id,
            style("(missing)").red()
        ),
        (None, _) => println!("  Schedule:  -"),
    }
    if let (Some(owner), Some(expires)) = (&site.lock_owner, site.lock_expires_at) {
        println!("  Lock:      {} until {}", owner, format_ts(expires));
    }
    println!("  Last run:  {}", format_opt_ts(site.last_run_at));
    if site.fail_count > 0 {
        println!(
            "  Failures:  {} (last {})",
            site.fail_count,
            format_opt_ts(site.last_failure_at)
        );
    }
    if let Some(error) = &site.last_error {
        println!("  Error:     {}", style(error).red());
    }
    match eligible {
        Some(e) if e.is_manual() => println!(
            "  Eligible:  {} (manual trigger)",
            style("now").green()
        ),
        Some(e) => println!(
            "  Eligible:  {} (since {})",
            style("now").green(),
            format_ts(e.eligible_at())
        ),
        None => println!("  Eligible:  {}", style("no").dim()),
    }
    Ok(())
}

pub async fn cmd_site_set_enabled(
    settings: &Settings,
    id: &str,
    enabled: bool,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let site = repos.sites.set_enabled(id, enabled)?;
    print_site_change(&site, if enabled { "Enabled" } else { "Disabled" }, json)
}

pub async fn cmd_site_trigger(settings: &Settings, id: &str, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let site = repos.sites.trigger(id)?;
    print_site_change(&site, "Triggered", json)?;
    if !json {
        println!(
            "  Leasable for the next {} minutes",
            settings.lease.manual_trigger_window_secs / 60
        );
    }
    Ok(())
}

pub async fn cmd_site_reset(settings: &Settings, id: &str, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let site = repos.sites.reset(id)?;
    print_site_change(&site, "Reset", json)
}

/// Attach or detach a schedule.
pub async fn cmd_site_schedule(
    settings: &Settings,
    id: &str,
    schedule_id: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let site = repos.sites.attach_schedule(id, schedule_id)?;
    let verb = if schedule_id.is_some() {
        "Attached schedule to"
    } else {
        "Detached schedule from"
    };
    print_site_change(&site, verb, json)
}

/// Lease one site for a worker.
pub async fn cmd_site_lease(
    settings: &Settings,
    worker: &str,
    ttl_secs: Option<u64>,
    site_type: Option<&str>,
    provider: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let ttl_ms = ttl_secs
        .map(|s| s.saturating_mul(1000) as i64)
        .unwrap_or_else(|| settings.lease_ttl_ms());
    let filter = LeaseFilter {
        site_type: parse_site_type(site_type)?,
        provider,
    };

    let lease = repos.sites.lease(worker, ttl_ms, &filter)?;
    if json {
        return print_json(&lease);
    }
    match lease {
        Some(lease) => {
            println!(
                "{} Leased {} to {}",
                style("✓").green(),
                style(&lease.site_id).bold(),
                lease.owner
            );
            println!("  URL:     {}", lease.url);
            println!("  Expires: {}", format_ts(lease.lock_expires_at));
            if lease.manual {
                println!("  Reason:  manual trigger");
            }
        }
        None => println!("{} No eligible site", style("→").dim()),
    }
    Ok(())
}

pub async fn cmd_site_complete(settings: &Settings, id: &str, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let site = repos.sites.complete(id)?;
    print_site_change(&site, "Completed", json)
}

pub async fn cmd_site_fail(
    settings: &Settings,
    id: &str,
    error: &str,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let site = repos.sites.fail(id, error)?;
    if json {
        return print_json(&site);
    }
    println!(
        "{} Marked {} failed ({} failure(s))",
        style("✗").red(),
        site.display_name(),
        site.fail_count
    );
    Ok(())
}
