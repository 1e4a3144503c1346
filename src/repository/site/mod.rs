//! Site repository: registration, administrative state changes, leasing,
//! and duplicate reconciliation.

mod dedupe;
mod helpers;
mod lease;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

use super::{connect, immediate, RepositoryError, Result};
use crate::canonical;
use crate::clock::SharedClock;
use crate::models::{NewSite, Site, SiteType};

pub use dedupe::{plan_dedupe, DedupeGroup, DedupeReport, DuplicateLink};
pub use lease::{eligibility, Eligibility};

use helpers::{require, row_to_site, store};

/// A manual trigger keeps a site leasable for this long.
pub const DEFAULT_MANUAL_TRIGGER_WINDOW_MS: i64 = 15 * 60 * 1000;

/// Narrowing options for [`SiteRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct SiteListFilter {
    pub site_type: Option<SiteType>,
    pub enabled: Option<bool>,
    pub schedule_id: Option<String>,
    pub limit: Option<usize>,
}

/// SQLite-backed site repository.
#[derive(Debug, Clone)]
pub struct SiteRepository {
    db_path: PathBuf,
    clock: SharedClock,
    manual_trigger_window_ms: i64,
}

impl SiteRepository {
    pub fn new(db_path: &Path, clock: SharedClock) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            clock,
            manual_trigger_window_ms: DEFAULT_MANUAL_TRIGGER_WINDOW_MS,
        }
    }

    pub fn with_manual_trigger_window_ms(mut self, window_ms: i64) -> Self {
        self.manual_trigger_window_ms = window_ms.max(0);
        self
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }

    /// Register a site. The URL is stored in canonical form.
    pub fn create(&self, new_site: &NewSite) -> Result<Site> {
        let raw = new_site.url.trim();
        if raw.is_empty() {
            return Err(RepositoryError::InvalidInput("site url must not be empty".into()));
        }

        let now = self.clock.now_ms();
        let site = Site {
            id: Uuid::new_v4().to_string(),
            url: canonical::normalize(raw, new_site.site_type),
            site_type: new_site.site_type,
            name: new_site
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
            scrape_provider: new_site
                .scrape_provider
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
            enabled: true,
            schedule_id: new_site.schedule_id.clone(),
            lock_owner: None,
            lock_expires_at: None,
            completed: false,
            failed: false,
            fail_count: 0,
            last_run_at: None,
            last_failure_at: None,
            last_error: None,
            manual_trigger_at: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.connect()?;
        immediate(&conn, |conn| {
            if let Some(ref schedule_id) = site.schedule_id {
                if super::schedule::load(conn, schedule_id)?.is_none() {
                    return Err(RepositoryError::NotFound(format!("schedule {}", schedule_id)));
                }
            }
            conn.execute(
                r#"
                INSERT INTO sites
                    (id, url, site_type, name, scrape_provider, enabled, schedule_id,
                     completed, failed, fail_count, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 1, ?, 0, 0, 0, ?, ?)
                "#,
                params![
                    site.id,
                    site.url,
                    site.site_type.as_str(),
                    site.name,
                    site.scrape_provider,
                    site.schedule_id,
                    site.created_at,
                    site.updated_at,
                ],
            )?;
            Ok(())
        })?;

        info!("Registered site {} ({})", site.url, site.id);
        Ok(site)
    }

    pub fn get(&self, id: &str) -> Result<Option<Site>> {
        let conn = self.connect()?;
        helpers::load(&conn, id)
    }

    pub fn list(&self, filter: &SiteListFilter) -> Result<Vec<Site>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM sites
            WHERE (?1 IS NULL OR site_type = ?1)
              AND (?2 IS NULL OR enabled = ?2)
              AND (?3 IS NULL OR schedule_id = ?3)
            ORDER BY created_at ASC, id ASC
            LIMIT ?4
            "#,
        )?;
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let sites = stmt
            .query_map(
                params![
                    filter.site_type.map(|t| t.as_str()),
                    filter.enabled,
                    filter.schedule_id,
                    limit
                ],
                row_to_site,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    /// Apply `change` to one site under the write lock and persist it.
    fn modify(&self, id: &str, change: impl FnOnce(&mut Site, i64)) -> Result<Site> {
        let now = self.clock.now_ms();
        let conn = self.connect()?;
        immediate(&conn, |conn| {
            let mut site = require(conn, id)?;
            change(&mut site, now);
            site.updated_at = now;
            store(conn, &site)?;
            Ok(site)
        })
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Site> {
        let site = self.modify(id, |site, _| site.enabled = enabled)?;
        info!(
            "Site {} {}",
            site.id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(site)
    }

    /// Request an out-of-schedule run.
    ///
    /// The site stays leasable for the manual-trigger window even if it is
    /// completed or its schedule has no open slot. A failed flag is cleared
    /// so the trigger can take effect.
    pub fn trigger(&self, id: &str) -> Result<Site> {
        let site = self.modify(id, |site, now| {
            site.manual_trigger_at = Some(now);
            site.failed = false;
        })?;
        info!("Manual trigger for site {}", site.id);
        Ok(site)
    }

    /// Operator recovery: clear outcome flags, failure history and lock.
    pub fn reset(&self, id: &str) -> Result<Site> {
        let site = self.modify(id, |site, _| {
            site.failed = false;
            site.completed = false;
            site.fail_count = 0;
            site.last_error = None;
            site.lock_owner = None;
            site.lock_expires_at = None;
        })?;
        info!("Reset site {}", site.id);
        Ok(site)
    }

    /// Clear lock columns whose expiry has passed. Returns rows touched.
    pub fn release_expired_locks(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let conn = self.connect()?;
        let released = conn.execute(
            r#"
            UPDATE sites
            SET lock_owner = NULL, lock_expires_at = NULL, updated_at = ?1
            WHERE lock_expires_at IS NOT NULL AND lock_expires_at <= ?1
            "#,
            params![now],
        )?;
        if released > 0 {
            info!("Released {} expired site locks", released);
        }
        Ok(released)
    }
}
