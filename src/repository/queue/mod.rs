//! Scrape URL queue.
//!
//! One row per URL, keyed by the URL itself. Rows cycle through
//! `pending -> processing -> completed | failed` in place and leave the
//! table only by ejection (terminal failure) or staleness eviction, each of
//! which writes an `ignored_urls` audit row.

mod claim;
mod complete;
mod enqueue;
mod helpers;
mod sweep;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use super::{connect, Result};
use crate::clock::SharedClock;
use crate::models::{QueueEntry, QueueStats, QueueStatus};

use helpers::row_to_entry;

/// Error recorded on rows evicted for age.
pub const STALE_ERROR: &str = "stale_scrape_queue_entry";
/// Error recorded on rows whose URL has no host.
pub const INVALID_URL_ERROR: &str = "invalid_url";

/// Retry and eviction thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Failed completions at or beyond this many attempts eject the row.
    pub max_attempts: u32,
    /// Rows older than this (by `created_at`) are stale.
    pub stale_after_ms: i64,
    /// `lease_batch` examines up to `limit * lookahead_factor` pending rows.
    pub lookahead_factor: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stale_after_ms: 48 * 60 * 60 * 1000,
            lookahead_factor: 3,
        }
    }
}

impl QueuePolicy {
    pub fn is_stale(&self, entry: &QueueEntry, now_ms: i64) -> bool {
        entry.age_ms(now_ms) > self.stale_after_ms
    }
}

/// SQLite-backed scrape queue.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    db_path: PathBuf,
    clock: SharedClock,
    policy: QueuePolicy,
}

impl QueueRepository {
    pub fn new(db_path: &Path, clock: SharedClock) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            clock,
            policy: QueuePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: QueuePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }

    pub fn get(&self, url: &str) -> Result<Option<QueueEntry>> {
        let conn = self.connect()?;
        helpers::load_by_url(&conn, url.trim())
    }

    /// Rows in creation order, optionally filtered.
    pub fn list(
        &self,
        status: Option<QueueStatus>,
        provider: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM scrape_queue
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR provider = ?2)
            ORDER BY created_at ASC, id ASC
            LIMIT ?3
            "#,
        )?;
        let entries = stmt
            .query_map(
                params![status.map(|s| s.as_str()), provider, limit as i64],
                row_to_entry,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Per-status counts, plus the creation time of the oldest pending row.
    pub fn stats(&self, provider: Option<&str>) -> Result<QueueStats> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT status, COUNT(*) AS n, MIN(created_at) AS oldest
            FROM scrape_queue
            WHERE (?1 IS NULL OR provider = ?1)
            GROUP BY status
            "#,
        )?;
        let mut rows = stmt.query(params![provider])?;

        let mut stats = QueueStats::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get("status")?;
            let count = row.get::<_, i64>("n")?.max(0) as u64;
            match QueueStatus::from_str(&status) {
                Some(QueueStatus::Pending) => {
                    stats.pending = count;
                    stats.oldest_pending_at = row.get("oldest")?;
                }
                Some(QueueStatus::Processing) => stats.processing = count,
                Some(QueueStatus::Completed) => stats.completed = count,
                Some(QueueStatus::Failed) => stats.failed = count,
                None => {}
            }
        }
        Ok(stats)
    }
}
