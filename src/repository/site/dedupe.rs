//! Duplicate site reconciliation.
//!
//! Sites are grouped by canonical key. In each group with more than one
//! member the best-ranked site survives and the rest are switched off and
//! pointed at it. Nothing is deleted, because queue rows and external
//! tables reference sites by id.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rusqlite::params;
use serde::Serialize;
use tracing::info;

use super::helpers::{row_to_site, store};
use super::SiteRepository;
use crate::canonical;
use crate::models::Site;
use crate::repository::{immediate, Result};

const DUPLICATE_PREFIX: &str = "duplicate_of:";

/// A loser folded into a surviving site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateLink {
    pub duplicate_id: String,
    pub kept_id: String,
    pub canonical_key: String,
}

/// One set of sites sharing a canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupeGroup {
    pub canonical_key: String,
    pub kept_id: String,
    /// Losers in rank order.
    pub duplicate_ids: Vec<String>,
}

/// Outcome of a dedupe pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupeReport {
    pub dry_run: bool,
    pub sites_scanned: usize,
    pub groups: Vec<DedupeGroup>,
    /// Losers disabled by this pass. Sites already merged into the same
    /// winner by an earlier pass are not repeated here.
    pub disabled: Vec<DuplicateLink>,
    pub urls_normalized: usize,
    pub names_backfilled: usize,
}

/// Sort key: enabled, not failed, not completed, latest run, newest. Higher wins.
fn rank(site: &Site) -> (bool, bool, bool, Option<i64>, i64) {
    (
        site.enabled,
        !site.failed,
        !site.completed,
        site.last_run_at,
        site.created_at,
    )
}

fn duplicate_marker(kept_id: &str) -> String {
    format!("{}{}", DUPLICATE_PREFIX, kept_id)
}

/// Group sites by canonical key and pick each group's survivor.
///
/// Only groups with two or more members are returned, ordered by key.
pub fn plan_dedupe(sites: &[Site]) -> Vec<DedupeGroup> {
    let mut by_key: BTreeMap<String, Vec<&Site>> = BTreeMap::new();
    for site in sites {
        let normalized = canonical::normalize(&site.url, site.site_type);
        let key = canonical::canonical_key(&normalized, site.site_type);
        by_key.entry(key).or_default().push(site);
    }

    by_key
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, mut members)| {
            // Ties fall back to id so the plan is stable across runs.
            members.sort_by(|a, b| {
                Reverse(rank(a))
                    .cmp(&Reverse(rank(b)))
                    .then_with(|| a.id.cmp(&b.id))
            });
            DedupeGroup {
                canonical_key: key,
                kept_id: members[0].id.clone(),
                duplicate_ids: members[1..].iter().map(|s| s.id.clone()).collect(),
            }
        })
        .collect()
}

impl SiteRepository {
    /// Merge sites that share a canonical key.
    ///
    /// With `dry_run` the plan is computed and reported but nothing is
    /// written.
    pub fn dedupe(&self, dry_run: bool) -> Result<DedupeReport> {
        let now = self.clock.now_ms();
        let conn = self.connect()?;

        let report = immediate(&conn, |conn| {
            let mut stmt = conn.prepare("SELECT * FROM sites ORDER BY created_at ASC, id ASC")?;
            let sites: Vec<Site> = stmt
                .query_map(params![], row_to_site)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let by_id: BTreeMap<&str, &Site> = sites.iter().map(|s| (s.id.as_str(), s)).collect();

            let groups = plan_dedupe(&sites);
            let mut report = DedupeReport {
                dry_run,
                sites_scanned: sites.len(),
                ..Default::default()
            };

            for group in &groups {
                let Some(&winner) = by_id.get(group.kept_id.as_str()) else {
                    continue;
                };

                let mut kept = winner.clone();
                let normalized = canonical::normalize(&kept.url, kept.site_type);
                let mut touched = false;
                if kept.url != normalized {
                    kept.url = normalized;
                    report.urls_normalized += 1;
                    touched = true;
                }
                if kept.name.is_none() {
                    kept.name = Some(canonical::default_name(&kept.url, kept.site_type));
                    report.names_backfilled += 1;
                    touched = true;
                }
                if touched && !dry_run {
                    kept.updated_at = now;
                    store(conn, &kept)?;
                }

                let marker = duplicate_marker(&kept.id);
                for dup_id in &group.duplicate_ids {
                    let Some(&dup) = by_id.get(dup_id.as_str()) else {
                        continue;
                    };
                    let already_merged =
                        !dup.enabled && dup.last_error.as_deref() == Some(marker.as_str());
                    if already_merged {
                        continue;
                    }

                    report.disabled.push(DuplicateLink {
                        duplicate_id: dup.id.clone(),
                        kept_id: kept.id.clone(),
                        canonical_key: group.canonical_key.clone(),
                    });

                    if dry_run {
                        continue;
                    }
                    let mut loser = dup.clone();
                    loser.enabled = false;
                    loser.completed = true;
                    loser.failed = true;
                    loser.lock_owner = None;
                    loser.lock_expires_at = None;
                    loser.schedule_id = None;
                    loser.manual_trigger_at = None;
                    loser.last_error = Some(marker.clone());
                    loser.updated_at = now;
                    store(conn, &loser)?;
                }
            }

            report.groups = groups;
            Ok(report)
        })?;

        for link in &report.disabled {
            info!(
                "{} duplicate site {} of {} ({})",
                if dry_run { "Would disable" } else { "Disabled" },
                link.duplicate_id,
                link.kept_id,
                link.canonical_key
            );
        }
        info!(
            "Dedupe scanned {} sites: {} groups, {} duplicates{}",
            report.sites_scanned,
            report.groups.len(),
            report.disabled.len(),
            if dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }
}
