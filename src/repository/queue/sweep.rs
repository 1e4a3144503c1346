//! Administrative sweeps run outside the lease path.

use rusqlite::params;
use tracing::info;

use super::claim::{check_processing_expiry, evict_stale, reclaim_processing};
use super::helpers::row_to_entry;
use super::{QueueRepository, STALE_ERROR};
use crate::models::QueueStatus;
use crate::repository::{immediate, Result};

impl QueueRepository {
    /// Return orphaned `processing` rows to `pending`.
    pub fn requeue_stale(&self, provider: Option<&str>, processing_expiry_ms: i64) -> Result<usize> {
        check_processing_expiry(processing_expiry_ms)?;
        let now = self.clock.now_ms();
        let conn = self.connect()?;
        let requeued = immediate(&conn, |conn| {
            reclaim_processing(conn, provider, now - processing_expiry_ms, now)
        })?;
        if requeued > 0 {
            info!("Requeued {} stale processing rows", requeued);
        }
        Ok(requeued)
    }

    /// Put up to `limit` rows with `status` back to `pending` with a clean
    /// attempt count, oldest update first.
    pub fn reset_by_status(
        &self,
        status: QueueStatus,
        provider: Option<&str>,
        site_id: Option<&str>,
        limit: usize,
    ) -> Result<usize> {
        let now = self.clock.now_ms();
        let conn = self.connect()?;
        let reset = immediate(&conn, |conn| {
            Ok(conn.execute(
                r#"
                UPDATE scrape_queue
                SET status = 'pending', attempts = 0, last_error = NULL,
                    completed_at = NULL, updated_at = ?1
                WHERE id IN (
                    SELECT id FROM scrape_queue
                    WHERE status = ?2
                      AND (?3 IS NULL OR provider = ?3)
                      AND (?4 IS NULL OR site_id = ?4)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT ?5
                )
                "#,
                params![now, status.as_str(), provider, site_id, limit as i64],
            )?)
        })?;
        info!("Reset {} {} rows to pending", reset, status.as_str());
        Ok(reset)
    }

    /// Remove rows previously marked stale, with an audit record each, so
    /// their URLs can be enqueued fresh.
    pub fn purge_stale(&self, limit: usize) -> Result<usize> {
        let now = self.clock.now_ms();
        let conn = self.connect()?;
        let purged = immediate(&conn, |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM scrape_queue
                WHERE status = 'failed' AND last_error = ?1
                ORDER BY updated_at ASC, id ASC
                LIMIT ?2
                "#,
            )?;
            let entries = stmt
                .query_map(params![STALE_ERROR, limit as i64], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for entry in &entries {
                evict_stale(conn, entry, now)?;
            }
            Ok(entries.len())
        })?;
        if purged > 0 {
            info!("Purged {} stale queue rows", purged);
        }
        Ok(purged)
    }
}
