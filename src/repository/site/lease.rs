//! Site leasing: exclusive, TTL-bounded claims on one site at a time.

use std::collections::HashMap;

use rusqlite::params;
use tracing::{debug, info, warn};

use super::helpers::{require, row_to_site, store};
use super::SiteRepository;
use crate::clock::Clock;
use crate::models::{LeaseFilter, ScrapeSchedule, Site, SiteLease, SiteState};
use crate::repository::schedule::row_to_schedule;
use crate::repository::{immediate, RepositoryError, Result};
use crate::schedule::{due_slot, latest_eligible_slot};

/// Why a site is eligible, and the instant it became so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Triggered by an operator within the manual-trigger window.
    Manual(i64),
    /// A schedule slot opened after the last run.
    Slot(i64),
    /// No schedule; idle sites wait since their last run.
    Unscheduled(i64),
}

impl Eligibility {
    pub fn eligible_at(&self) -> i64 {
        match *self {
            Self::Manual(t) | Self::Slot(t) | Self::Unscheduled(t) => t,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual(_))
    }
}

/// Decide whether `site` may be leased at `now_ms`.
///
/// `schedule` is the site's attached schedule, if it resolved. Disabled,
/// failed and live-locked sites are never eligible. A trigger only counts
/// while inside `trigger_window_ms` and if no run finished after it.
pub fn eligibility(
    clock: &dyn Clock,
    site: &Site,
    schedule: Option<&ScrapeSchedule>,
    now_ms: i64,
    trigger_window_ms: i64,
) -> Option<Eligibility> {
    let state = site.state(now_ms);
    if !matches!(state, SiteState::Idle | SiteState::Completed) {
        return None;
    }

    if let Some(triggered) = site.manual_trigger_at {
        let in_window = now_ms - triggered <= trigger_window_ms;
        let not_yet_run = site.last_run_at.map_or(true, |last| triggered > last);
        if in_window && not_yet_run {
            return Some(Eligibility::Manual(triggered));
        }
    }

    match (&site.schedule_id, schedule) {
        (Some(_), Some(schedule)) => due_slot(clock, schedule, site.last_run_at, now_ms).map(Eligibility::Slot),
        // Dangling schedule reference: wait for an operator to fix it.
        (Some(_), None) => None,
        (None, _) if state == SiteState::Completed => None,
        (None, _) => Some(Eligibility::Unscheduled(site.last_run_at.unwrap_or(0))),
    }
}

impl SiteRepository {
    /// Claim the most overdue eligible site for `worker_id`.
    ///
    /// Returns `Ok(None)` when nothing is eligible.
    pub fn lease(
        &self,
        worker_id: &str,
        ttl_ms: i64,
        filter: &LeaseFilter,
    ) -> Result<Option<SiteLease>> {
        let worker_id = worker_id.trim();
        if worker_id.is_empty() {
            return Err(RepositoryError::InvalidInput("worker id must not be empty".into()));
        }
        if ttl_ms <= 0 {
            return Err(RepositoryError::InvalidInput(format!(
                "lease ttl must be positive, got {}ms",
                ttl_ms
            )));
        }

        let now = self.clock.now_ms();
        let window = self.manual_trigger_window_ms;
        let conn = self.connect()?;

        immediate(&conn, |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM sites
                WHERE enabled = 1 AND failed = 0
                  AND (?1 IS NULL OR site_type = ?1)
                  AND (?2 IS NULL OR scrape_provider IS NULL OR scrape_provider = ?2)
                "#,
            )?;
            let sites = stmt
                .query_map(
                    params![
                        filter.site_type.map(|t| t.as_str()),
                        filter.provider.as_deref()
                    ],
                    row_to_site,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare("SELECT * FROM scrape_schedules")?;
            let schedules: HashMap<String, ScrapeSchedule> = stmt
                .query_map([], row_to_schedule)?
                .map(|r| r.map(|s| (s.id.clone(), s)))
                .collect::<std::result::Result<_, _>>()?;

            let mut candidates: Vec<(Eligibility, Site)> = sites
                .into_iter()
                .filter_map(|site| {
                    let schedule = site.schedule_id.as_ref().and_then(|id| schedules.get(id));
                    if site.schedule_id.is_some() && schedule.is_none() {
                        warn!(
                            "Site {} references missing schedule {:?}",
                            site.id, site.schedule_id
                        );
                    }
                    eligibility(self.clock.as_ref(), &site, schedule, now, window).map(|e| (e, site))
                })
                .collect();

            candidates.sort_by(|(a, sa), (b, sb)| {
                a.eligible_at()
                    .cmp(&b.eligible_at())
                    .then(sa.created_at.cmp(&sb.created_at))
                    .then(sa.id.cmp(&sb.id))
            });

            let Some((eligible, mut site)) = candidates.into_iter().next() else {
                debug!("No eligible site for worker {}", worker_id);
                return Ok(None);
            };

            let expires_at = now + ttl_ms;
            site.lock_owner = Some(worker_id.to_string());
            site.lock_expires_at = Some(expires_at);
            site.updated_at = now;
            store(conn, &site)?;

            info!(
                "Leased site {} to {} until {} (eligible at {}{})",
                site.id,
                worker_id,
                expires_at,
                eligible.eligible_at(),
                if eligible.is_manual() { ", manual" } else { "" }
            );

            Ok(Some(SiteLease {
                site_id: site.id,
                url: site.url,
                site_type: site.site_type,
                scrape_provider: site.scrape_provider,
                schedule_id: site.schedule_id,
                owner: worker_id.to_string(),
                lock_expires_at: expires_at,
                eligible_at: eligible.eligible_at(),
                manual: eligible.is_manual(),
            }))
        })
    }

    /// Record a successful crawl and release the lock.
    pub fn complete(&self, site_id: &str) -> Result<Site> {
        let site = self.modify(site_id, |site, now| {
            site.lock_owner = None;
            site.lock_expires_at = None;
            site.completed = true;
            site.last_run_at = Some(now);
            site.manual_trigger_at = None;
        })?;
        info!("Site {} completed", site.id);
        Ok(site)
    }

    /// Record a failed crawl and release the lock.
    pub fn fail(&self, site_id: &str, error: &str) -> Result<Site> {
        let site = self.modify(site_id, |site, now| {
            site.lock_owner = None;
            site.lock_expires_at = None;
            site.failed = true;
            site.fail_count = site.fail_count.saturating_add(1);
            site.last_failure_at = Some(now);
            site.last_run_at = Some(now);
            site.last_error = Some(error.to_string());
        })?;
        warn!(
            "Site {} failed ({} total): {}",
            site.id, site.fail_count, error
        );
        Ok(site)
    }

    /// Attach (or with `None`, detach) a schedule.
    ///
    /// If the new schedule already has an open slot today, `last_run_at` is
    /// moved to just before that slot, but only when that lowers it, so the
    /// site becomes leasable without recording a run that never happened.
    pub fn attach_schedule(&self, site_id: &str, schedule_id: Option<&str>) -> Result<Site> {
        let now = self.clock.now_ms();
        let conn = self.connect()?;

        let site = immediate(&conn, |conn| {
            let mut site = require(conn, site_id)?;

            match schedule_id {
                Some(id) => {
                    let schedule = crate::repository::schedule::load(conn, id)?
                        .ok_or_else(|| RepositoryError::NotFound(format!("schedule {}", id)))?;
                    if let Some(slot) = latest_eligible_slot(self.clock.as_ref(), &schedule, now) {
                        let backdated = slot - 1;
                        if site.last_run_at.is_some_and(|last| backdated < last) {
                            debug!(
                                "Backdating last run of site {} to {} for slot {}",
                                site.id, backdated, slot
                            );
                            site.last_run_at = Some(backdated);
                        }
                    }
                    site.schedule_id = Some(schedule.id);
                }
                None => site.schedule_id = None,
            }

            site.updated_at = now;
            store(conn, &site)?;
            Ok(site)
        })?;

        info!("Site {} schedule set to {:?}", site.id, site.schedule_id);
        Ok(site)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::clock::SystemClock;
    use crate::models::{SiteType, StartTime};

    const MONDAY: i64 = 1_704_067_200_000;
    const HOUR: i64 = 3_600_000;
    const WINDOW: i64 = 15 * 60 * 1000;

    fn site() -> Site {
        Site {
            id: "s1".into(),
            url: "https://jobs.lever.co/acme".into(),
            site_type: SiteType::Lever,
            name: None,
            scrape_provider: None,
            enabled: true,
            schedule_id: None,
            lock_owner: None,
            lock_expires_at: None,
            completed: false,
            failed: false,
            fail_count: 0,
            last_run_at: None,
            last_failure_at: None,
            last_error: None,
            manual_trigger_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn monday_schedule() -> ScrapeSchedule {
        ScrapeSchedule {
            id: "mon".into(),
            name: "mondays".into(),
            days: vec![Weekday::Mon],
            start_time: StartTime { hour: 9, minute: 30 },
            interval_minutes: 1440,
            timezone: "UTC".into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn unscheduled_idle_site_is_eligible_at_last_run() {
        let mut s = site();
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), Some(Eligibility::Unscheduled(0)));
        s.last_run_at = Some(42);
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), Some(Eligibility::Unscheduled(42)));
    }

    #[test]
    fn completed_unscheduled_site_waits_for_trigger() {
        let mut s = site();
        s.completed = true;
        s.last_run_at = Some(MONDAY - HOUR);
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), None);

        s.manual_trigger_at = Some(MONDAY - 60_000);
        assert_eq!(
            eligibility(&SystemClock, &s, None, MONDAY, WINDOW),
            Some(Eligibility::Manual(MONDAY - 60_000))
        );

        // Outside the window the trigger no longer counts.
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY + WINDOW, WINDOW), None);
    }

    #[test]
    fn trigger_older_than_last_run_is_ignored() {
        let mut s = site();
        s.completed = true;
        s.manual_trigger_at = Some(MONDAY - 60_000);
        s.last_run_at = Some(MONDAY - 30_000);
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), None);
    }

    #[test]
    fn scheduled_site_follows_slots() {
        let schedule = monday_schedule();
        let mut s = site();
        s.schedule_id = Some(schedule.id.clone());
        s.completed = true;
        s.last_run_at = Some(MONDAY - 24 * HOUR);

        assert_eq!(eligibility(&SystemClock, &s, Some(&schedule), MONDAY + 7 * HOUR, WINDOW), None);
        let slot = MONDAY + 9 * HOUR + 30 * 60_000;
        assert_eq!(
            eligibility(&SystemClock, &s, Some(&schedule), MONDAY + 15 * HOUR, WINDOW),
            Some(Eligibility::Slot(slot))
        );

        s.last_run_at = Some(slot);
        assert_eq!(eligibility(&SystemClock, &s, Some(&schedule), MONDAY + 15 * HOUR, WINDOW), None);
    }

    #[test]
    fn missing_schedule_blocks_lease() {
        let mut s = site();
        s.schedule_id = Some("gone".into());
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), None);
    }

    #[test]
    fn failed_disabled_and_locked_sites_are_never_eligible() {
        let mut s = site();
        s.manual_trigger_at = Some(MONDAY);
        s.failed = true;
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), None);

        let mut s = site();
        s.enabled = false;
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), None);

        let mut s = site();
        s.lock_owner = Some("w".into());
        s.lock_expires_at = Some(MONDAY + 1);
        assert_eq!(eligibility(&SystemClock, &s, None, MONDAY, WINDOW), None);
        assert!(eligibility(&SystemClock, &s, None, MONDAY + 1, WINDOW).is_some());
    }
}
