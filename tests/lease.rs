//! Site leasing against a real database.

mod common;

use std::collections::HashSet;
use std::thread;

use common::{Harness, DAY, HOUR, MINUTE, MONDAY};
use crawlgate::models::{LeaseFilter, NewSite, SiteState, SiteType};
use crawlgate::repository::RepositoryError;

const TTL: i64 = 10 * MINUTE;

fn any() -> LeaseFilter {
    LeaseFilter::default()
}

#[test]
fn concurrent_leases_never_share_a_site() {
    let h = Harness::new();
    for i in 0..4 {
        h.add_site(&format!("https://site{}.example.com/jobs", i));
    }

    let handles: Vec<_> = (0..8)
        .map(|w| {
            let sites = h.repos.sites.clone();
            thread::spawn(move || sites.lease(&format!("worker-{}", w), TTL, &any()).unwrap())
        })
        .collect();

    let leases: Vec<_> = handles
        .into_iter()
        .filter_map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(leases.len(), 4);
    let ids: HashSet<_> = leases.iter().map(|l| l.site_id.clone()).collect();
    assert_eq!(ids.len(), 4, "a site was leased twice: {:?}", leases);
}

#[test]
fn lock_is_reclaimable_after_ttl() {
    let h = Harness::new();
    let site = h.add_site("https://example.com/careers");

    let first = h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    assert_eq!(first.site_id, site.id);
    assert_eq!(first.lock_expires_at, MONDAY + TTL);
    assert!(h.repos.sites.lease("w2", TTL, &any()).unwrap().is_none());

    h.advance(TTL - 1);
    assert!(h.repos.sites.lease("w2", TTL, &any()).unwrap().is_none());

    h.advance(1);
    let second = h.repos.sites.lease("w2", TTL, &any()).unwrap().unwrap();
    assert_eq!(second.site_id, site.id);
    assert_eq!(second.owner, "w2");
}

#[test]
fn invalid_lease_arguments_are_rejected() {
    let h = Harness::new();
    assert!(matches!(
        h.repos.sites.lease("  ", TTL, &any()),
        Err(RepositoryError::InvalidInput(_))
    ));
    assert!(matches!(
        h.repos.sites.lease("w1", 0, &any()),
        Err(RepositoryError::InvalidInput(_))
    ));
}

#[test]
fn most_overdue_site_is_leased_first() {
    let h = Harness::new();
    let older = h.add_site("https://a.example.com");
    h.advance(MINUTE);
    let newer = h.add_site("https://b.example.com");

    // Never-run sites tie on eligibility; creation order breaks the tie.
    let first = h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    assert_eq!(first.site_id, older.id);

    // Once `older` has run, `newer` is the more overdue of the two.
    h.repos.sites.complete(&older.id).unwrap();
    h.repos.sites.reset(&older.id).unwrap();
    h.advance(MINUTE);

    let lease = h.repos.sites.lease("w2", TTL, &any()).unwrap().unwrap();
    assert_eq!(lease.site_id, newer.id);
    assert_eq!(lease.eligible_at, 0);
}

#[test]
fn monday_schedule_opens_at_its_slot() {
    let h = Harness::at(MONDAY + 7 * HOUR);
    let schedule = h.add_schedule(&["mon"], "09:30", 1440);
    let site = h
        .repos
        .sites
        .create(&NewSite {
            url: "https://example.com/jobs".into(),
            site_type: SiteType::Generic,
            name: None,
            scrape_provider: None,
            schedule_id: Some(schedule),
        })
        .unwrap();

    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());

    h.clock.set(MONDAY + 15 * HOUR);
    let lease = h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    assert_eq!(lease.site_id, site.id);
    assert_eq!(lease.eligible_at, MONDAY + 9 * HOUR + 30 * MINUTE);
    assert!(!lease.manual);

    let done = h.repos.sites.complete(&site.id).unwrap();
    assert_eq!(done.state(MONDAY + 15 * HOUR), SiteState::Completed);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());

    // Tuesday is not a scheduled day.
    h.clock.set(MONDAY + DAY + 12 * HOUR);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());

    // The next Monday's slot re-opens a completed site.
    h.clock.set(MONDAY + 7 * DAY + 10 * HOUR);
    let lease = h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    assert_eq!(lease.eligible_at, MONDAY + 7 * DAY + 9 * HOUR + 30 * MINUTE);
}

#[test]
fn completed_unscheduled_site_needs_a_trigger() {
    let h = Harness::new();
    let site = h.add_site("https://example.com/jobs");

    h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    h.repos.sites.complete(&site.id).unwrap();
    h.advance(HOUR);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());

    let triggered = h.repos.sites.trigger(&site.id).unwrap();
    let lease = h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    assert!(lease.manual);
    assert_eq!(Some(lease.eligible_at), triggered.manual_trigger_at);

    // Completing consumes the trigger.
    let done = h.repos.sites.complete(&site.id).unwrap();
    assert_eq!(done.manual_trigger_at, None);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());
}

#[test]
fn manual_trigger_expires_after_window() {
    let h = Harness::new();
    let site = h.add_site("https://example.com/jobs");
    h.repos.sites.lease("w1", TTL, &any()).unwrap();
    h.repos.sites.complete(&site.id).unwrap();
    h.advance(MINUTE);

    h.repos.sites.trigger(&site.id).unwrap();
    h.advance(16 * MINUTE);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());

    h.repos.sites.trigger(&site.id).unwrap();
    h.advance(14 * MINUTE);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_some());
}

#[test]
fn trigger_revives_a_failed_site() {
    let h = Harness::new();
    let site = h.add_site("https://example.com/jobs");
    h.repos.sites.lease("w1", TTL, &any()).unwrap();

    let failed = h.repos.sites.fail(&site.id, "HTTP 500").unwrap();
    assert!(failed.failed);
    assert_eq!(failed.fail_count, 1);
    assert_eq!(failed.last_failure_at, Some(MONDAY));
    assert_eq!(failed.last_run_at, Some(MONDAY));
    assert_eq!(failed.lock_owner, None);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());

    h.advance(MINUTE);
    h.repos.sites.trigger(&site.id).unwrap();
    let lease = h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    assert_eq!(lease.site_id, site.id);
    assert!(lease.manual);
}

#[test]
fn reset_clears_failure_history() {
    let h = Harness::new();
    let site = h.add_site("https://example.com/jobs");
    h.repos.sites.fail(&site.id, "boom").unwrap();

    let reset = h.repos.sites.reset(&site.id).unwrap();
    assert!(!reset.failed);
    assert_eq!(reset.fail_count, 0);
    assert_eq!(reset.last_error, None);
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_some());
}

#[test]
fn disabled_sites_are_skipped() {
    let h = Harness::new();
    let site = h.add_site("https://example.com/jobs");
    h.repos.sites.set_enabled(&site.id, false).unwrap();
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_none());

    h.repos.sites.set_enabled(&site.id, true).unwrap();
    assert!(h.repos.sites.lease("w1", TTL, &any()).unwrap().is_some());
}

#[test]
fn filters_narrow_candidates() {
    let h = Harness::new();
    let board = h
        .repos
        .sites
        .create(&NewSite {
            url: "https://boards.greenhouse.io/acme".into(),
            site_type: SiteType::Greenhouse,
            name: None,
            scrape_provider: Some("firecrawl".into()),
            schedule_id: None,
        })
        .unwrap();
    h.add_site("https://example.com/jobs");

    let lever_only = LeaseFilter {
        site_type: Some(SiteType::Lever),
        provider: None,
    };
    assert!(h.repos.sites.lease("w1", TTL, &lever_only).unwrap().is_none());

    let other_provider = LeaseFilter {
        site_type: Some(SiteType::Greenhouse),
        provider: Some("apify".into()),
    };
    assert!(h.repos.sites.lease("w1", TTL, &other_provider).unwrap().is_none());

    let matching = LeaseFilter {
        site_type: Some(SiteType::Greenhouse),
        provider: Some("firecrawl".into()),
    };
    let lease = h.repos.sites.lease("w1", TTL, &matching).unwrap().unwrap();
    assert_eq!(lease.site_id, board.id);
}

#[test]
fn attach_schedule_backdates_only_downwards() {
    let h = Harness::at(MONDAY + 15 * HOUR);
    let schedule = h.add_schedule(&["mon"], "09:30", 1440);
    let slot = MONDAY + 9 * HOUR + 30 * MINUTE;

    // Ran after today's slot: backdated so the slot is open.
    let recent = h.add_site("https://recent.example.com");
    h.repos.sites.complete(&recent.id).unwrap();
    let attached = h
        .repos
        .sites
        .attach_schedule(&recent.id, Some(&schedule))
        .unwrap();
    assert_eq!(attached.last_run_at, Some(slot - 1));
    assert_eq!(attached.schedule_id.as_deref(), Some(schedule.as_str()));

    // Ran long ago: never raised.
    h.clock.set(MONDAY - 3 * DAY);
    let old = h.add_site("https://old.example.com");
    h.repos.sites.complete(&old.id).unwrap();
    h.clock.set(MONDAY + 15 * HOUR);
    let attached = h
        .repos
        .sites
        .attach_schedule(&old.id, Some(&schedule))
        .unwrap();
    assert_eq!(attached.last_run_at, Some(MONDAY - 3 * DAY));

    let lease = h.repos.sites.lease("w1", TTL, &any()).unwrap().unwrap();
    assert_eq!(lease.eligible_at, slot);

    let detached = h.repos.sites.attach_schedule(&old.id, None).unwrap();
    assert_eq!(detached.schedule_id, None);
}

#[test]
fn attach_unknown_schedule_fails() {
    let h = Harness::new();
    let site = h.add_site("https://example.com/jobs");
    let err = h
        .repos
        .sites
        .attach_schedule(&site.id, Some("missing"))
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound(_)));
}

#[test]
fn release_expired_locks_only_touches_expired_rows() {
    let h = Harness::new();
    h.add_site("https://a.example.com");
    h.add_site("https://b.example.com");

    h.repos.sites.lease("w1", MINUTE, &any()).unwrap().unwrap();
    h.repos.sites.lease("w2", HOUR, &any()).unwrap().unwrap();
    h.advance(2 * MINUTE);

    assert_eq!(h.repos.sites.release_expired_locks().unwrap(), 1);
    assert_eq!(h.repos.sites.release_expired_locks().unwrap(), 0);
}
