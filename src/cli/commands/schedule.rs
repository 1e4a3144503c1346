//! Schedule management commands.

use console::style;
use serde_json::json;

use crawlgate::clock::{system_clock, Clock};
use crawlgate::config::Settings;
use crawlgate::models::{encode_days, weekday_code, ScheduleSpec, ScrapeSchedule};
use crawlgate::schedule::{latest_eligible_slot, next_eligible_slot};

use crate::cli::helpers::{format_ts, open_repositories, print_json, truncate};

/// Fields to change on `schedule update`; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct ScheduleChanges {
    pub name: Option<String>,
    pub days: Option<Vec<String>>,
    pub start_time: Option<String>,
    pub interval_minutes: Option<i64>,
    pub timezone: Option<String>,
}

impl ScheduleChanges {
    fn apply(self, current: &ScrapeSchedule) -> ScheduleSpec {
        ScheduleSpec {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            days: self.days.unwrap_or_else(|| {
                current
                    .days
                    .iter()
                    .map(|d| weekday_code(*d).to_string())
                    .collect()
            }),
            start_time: self
                .start_time
                .unwrap_or_else(|| current.start_time.to_string()),
            interval_minutes: self
                .interval_minutes
                .unwrap_or(i64::from(current.interval_minutes)),
            timezone: self.timezone.unwrap_or_else(|| current.timezone.clone()),
        }
    }
}

fn print_schedule_detail(schedule: &ScrapeSchedule, clock: &dyn Clock) {
    let now_ms = clock.now_ms();
    println!("\n{}", style(&schedule.name).bold());
    println!("{}", "-".repeat(60));
    println!("  ID:        {}", schedule.id);
    println!("  Days:      {}", encode_days(&schedule.days));
    println!("  Start:     {}", schedule.start_time);
    println!("  Interval:  {} min", schedule.interval_minutes);
    println!("  Timezone:  {}", schedule.timezone);
    match latest_eligible_slot(clock, schedule, now_ms) {
        Some(slot) => println!("  Latest:    {} UTC", format_ts(slot)),
        None => println!("  Latest:    {}", style("no slot today").dim()),
    }
    match next_eligible_slot(clock, schedule, now_ms) {
        Some(slot) => println!("  Next:      {} UTC", format_ts(slot)),
        None => println!("  Next:      {}", style("none within a week").dim()),
    }
}

/// Create a schedule.
pub async fn cmd_schedule_add(
    settings: &Settings,
    name: String,
    days: Vec<String>,
    start_time: String,
    interval_minutes: i64,
    timezone: String,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let schedule = repos.schedules.create(&ScheduleSpec {
        name,
        days,
        start_time,
        interval_minutes,
        timezone,
    })?;

    if json {
        return print_json(&schedule);
    }
    println!(
        "{} Created schedule {}",
        style("✓").green(),
        style(&schedule.id).bold()
    );
    print_schedule_detail(&schedule, system_clock().as_ref());
    Ok(())
}

/// Update a schedule, keeping fields that were not given.
pub async fn cmd_schedule_update(
    settings: &Settings,
    id: &str,
    changes: ScheduleChanges,
    json: bool,
) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let Some(current) = repos.schedules.get(id)? else {
        anyhow::bail!("schedule '{}' not found", id);
    };
    let schedule = repos.schedules.update(id, &changes.apply(&current))?;

    if json {
        return print_json(&schedule);
    }
    println!("{} Updated schedule {}", style("✓").green(), schedule.name);
    print_schedule_detail(&schedule, system_clock().as_ref());
    Ok(())
}

/// List schedules.
pub async fn cmd_schedule_list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let schedules = repos.schedules.list()?;

    if json {
        return print_json(&schedules);
    }
    if schedules.is_empty() {
        println!("{} No schedules defined", style("!").yellow());
        return Ok(());
    }

    let clock = system_clock();
    let now = clock.now_ms();
    println!("\n{}", style("Schedules").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<36} {:<20} {:<28} {:<6} {:<6} Next Slot",
        "ID", "Name", "Days", "Start", "Every"
    );
    println!("{}", "-".repeat(100));
    for schedule in &schedules {
        let next = next_eligible_slot(clock.as_ref(), schedule, now)
            .map(format_ts)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36} {:<20} {:<28} {:<6} {:<6} {}",
            schedule.id,
            truncate(&schedule.name, 19),
            encode_days(&schedule.days),
            schedule.start_time.to_string(),
            format!("{}m", schedule.interval_minutes),
            next
        );
    }
    Ok(())
}

/// Show one schedule with its latest and next slots.
pub async fn cmd_schedule_show(settings: &Settings, id: &str, json: bool) -> anyhow::Result<()> {
    let repos = open_repositories(settings)?;
    let Some(schedule) = repos.schedules.get(id)? else {
        anyhow::bail!("schedule '{}' not found", id);
    };
    let clock = system_clock();
    let now = clock.now_ms();

    if json {
        return print_json(&json!({
            "schedule": schedule,
            "latest_slot": latest_eligible_slot(clock.as_ref(), &schedule, now),
            "next_slot": next_eligible_slot(clock.as_ref(), &schedule, now),
        }));
    }
    print_schedule_detail(&schedule, clock.as_ref());
    Ok(())
}
