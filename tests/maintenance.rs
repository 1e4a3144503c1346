//! The daemon's per-cycle housekeeping.

mod common;

use common::{Harness, HOUR, MINUTE};
use crawlgate::maintenance::{run_cycle, CycleOptions};
use crawlgate::models::{EnqueueRequest, LeaseBatchRequest, LeaseFilter, NewSite, SiteType};

fn options(dedupe: bool) -> CycleOptions {
    CycleOptions {
        processing_expiry_ms: 10 * MINUTE,
        purge_batch: 100,
        dedupe,
    }
}

#[test]
fn idle_database_is_quiet() {
    let h = Harness::new();
    let report = run_cycle(&h.repos, &options(true)).unwrap();
    assert!(report.is_quiet());
    assert_eq!(report.dedupe.map(|d| d.sites_scanned), Some(0));
}

#[test]
fn cycle_reclaims_locks_rows_and_stale_entries() {
    let h = Harness::new();
    h.add_site("https://example.com/jobs");
    h.repos
        .sites
        .lease("w1", 5 * MINUTE, &LeaseFilter::default())
        .unwrap()
        .unwrap();

    h.repos
        .queue
        .enqueue(&EnqueueRequest {
            urls: vec!["https://a.com/1".into(), "https://a.com/2".into()],
            source_url: "https://example.com/jobs".into(),
            provider: "firecrawl".into(),
            ..Default::default()
        })
        .unwrap();
    h.repos
        .queue
        .lease_batch(&LeaseBatchRequest {
            provider: None,
            limit: 1,
            max_per_minute_default: 30,
            processing_expiry_ms: 10 * MINUTE,
        })
        .unwrap();

    h.advance(20 * MINUTE);
    let report = run_cycle(&h.repos, &options(false)).unwrap();
    assert_eq!(report.locks_released, 1);
    assert_eq!(report.requeued, 1);
    assert_eq!(report.purged, 0);
    assert!(report.dedupe.is_none());

    // a.com/2 goes stale and is marked by a later enqueue, then purged.
    h.advance(48 * HOUR);
    h.repos
        .queue
        .enqueue(&EnqueueRequest {
            urls: vec!["https://a.com/2".into()],
            source_url: "https://example.com/jobs".into(),
            provider: "firecrawl".into(),
            ..Default::default()
        })
        .unwrap();
    let report = run_cycle(&h.repos, &options(false)).unwrap();
    assert_eq!(report.purged, 1);
    assert!(h.repos.queue.get("https://a.com/2").unwrap().is_none());
}

#[test]
fn cycle_can_dedupe() {
    let h = Harness::new();
    for _ in 0..2 {
        h.repos
            .sites
            .create(&NewSite {
                url: "https://jobs.lever.co/acme".into(),
                site_type: SiteType::Lever,
                name: None,
                scrape_provider: None,
                schedule_id: None,
            })
            .unwrap();
    }

    let report = run_cycle(&h.repos, &options(true)).unwrap();
    assert!(!report.is_quiet());
    assert_eq!(report.dedupe.unwrap().disabled.len(), 1);
}
