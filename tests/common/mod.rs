//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use crawlgate::clock::ManualClock;
use crawlgate::models::{NewSite, ScheduleSpec, Site, SiteType};
use crawlgate::repository::{QueuePolicy, Repositories};

/// 2024-01-01T00:00:00Z, a Monday.
pub const MONDAY: i64 = 1_704_067_200_000;
pub const MINUTE: i64 = 60_000;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;

/// A migrated database in a temp directory, driven by a manual clock.
pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub repos: Repositories,
}

impl Harness {
    pub fn new() -> Self {
        Self::at(MONDAY)
    }

    pub fn at(now_ms: i64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(now_ms));
        let repos = Repositories::open(
            &dir.path().join("crawlgate.db"),
            clock.clone(),
            QueuePolicy::default(),
        )
        .unwrap();
        Self { dir, clock, repos }
    }

    pub fn advance(&self, ms: i64) {
        self.clock.advance_ms(ms);
    }

    pub fn add_site(&self, url: &str) -> Site {
        self.repos
            .sites
            .create(&NewSite {
                url: url.to_string(),
                site_type: SiteType::Generic,
                name: None,
                scrape_provider: None,
                schedule_id: None,
            })
            .unwrap()
    }

    pub fn add_schedule(&self, days: &[&str], start: &str, interval: i64) -> String {
        self.repos
            .schedules
            .create(&ScheduleSpec {
                name: format!("{} {}", days.join(","), start),
                days: days.iter().map(|d| d.to_string()).collect(),
                start_time: start.to_string(),
                interval_minutes: interval,
                timezone: "UTC".to_string(),
            })
            .unwrap()
            .id
    }
}
