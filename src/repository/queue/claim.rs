//! Leasing batches of URLs to workers.

use rusqlite::{params, Connection};
use serde_json::json;
use tracing::{debug, info, warn};

use super::helpers::{delete, mark_failed, row_to_entry};
use super::{QueueRepository, INVALID_URL_ERROR};
use crate::canonical::extract_domain;
use crate::models::{IgnoreReason, LeaseBatchRequest, LeasedUrl, QueueEntry};
use crate::rate_limit;
use crate::repository::{ignored, immediate, RepositoryError, Result};

/// Reject expiry windows that would reclaim rows leased this instant.
pub(super) fn check_processing_expiry(processing_expiry_ms: i64) -> Result<()> {
    if processing_expiry_ms <= 0 {
        return Err(RepositoryError::InvalidInput(format!(
            "processing expiry must be positive, got {}ms",
            processing_expiry_ms
        )));
    }
    Ok(())
}

/// Move `processing` rows untouched since `cutoff_ms` back to `pending`.
pub(super) fn reclaim_processing(
    conn: &Connection,
    provider: Option<&str>,
    cutoff_ms: i64,
    now_ms: i64,
) -> Result<usize> {
    let reclaimed = conn.execute(
        r#"
        UPDATE scrape_queue
        SET status = 'pending', updated_at = ?1
        WHERE status = 'processing'
          AND updated_at < ?2
          AND (?3 IS NULL OR provider = ?3)
        "#,
        params![now_ms, cutoff_ms, provider],
    )?;
    Ok(reclaimed)
}

/// Audit and delete a row that outlived the staleness TTL.
pub(super) fn evict_stale(conn: &Connection, entry: &QueueEntry, now_ms: i64) -> Result<()> {
    ignored::record(
        conn,
        entry,
        IgnoreReason::StaleScrapeQueueEntry,
        &json!({
            "age_ms": entry.age_ms(now_ms),
            "attempts": entry.attempts,
            "status": entry.status.as_str(),
            "last_error": entry.last_error,
        }),
        now_ms,
    )?;
    delete(conn, entry.id)
}

impl QueueRepository {
    /// Lease up to `request.limit` pending URLs.
    ///
    /// Orphaned `processing` rows are reclaimed first. Pending rows are then
    /// scanned oldest first within a bounded lookahead; stale rows are
    /// evicted and rate-limited domains skipped without blocking later rows.
    /// Leased rows move to `processing` with `attempts + 1`.
    pub fn lease_batch(&self, request: &LeaseBatchRequest) -> Result<Vec<LeasedUrl>> {
        check_processing_expiry(request.processing_expiry_ms)?;
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now_ms();
        let policy = self.policy;
        let provider = request.provider.as_deref();
        let lookahead = request.limit.saturating_mul(policy.lookahead_factor.max(1));
        let conn = self.connect()?;

        let leased = immediate(&conn, |conn| {
            let reclaimed =
                reclaim_processing(conn, provider, now - request.processing_expiry_ms, now)?;
            if reclaimed > 0 {
                info!("Reclaimed {} orphaned processing rows", reclaimed);
            }

            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM scrape_queue
                WHERE status = 'pending'
                  AND (?1 IS NULL OR provider = ?1)
                  AND (scheduled_at IS NULL OR scheduled_at <= ?2)
                ORDER BY created_at ASC, id ASC
                LIMIT ?3
                "#,
            )?;
            let candidates = stmt
                .query_map(params![provider, now, lookahead as i64], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut batch = Vec::new();
            for mut entry in candidates {
                if batch.len() >= request.limit {
                    break;
                }

                if policy.is_stale(&entry, now) {
                    warn!("Evicting stale queue row {}", entry.url);
                    evict_stale(conn, &entry, now)?;
                    continue;
                }

                let Some(domain) = extract_domain(&entry.url) else {
                    warn!("Queue row {} has no host, marking failed", entry.url);
                    mark_failed(conn, entry.id, INVALID_URL_ERROR, now)?;
                    continue;
                };

                if !rate_limit::apply(conn, &domain, request.max_per_minute_default, now)? {
                    continue;
                }

                conn.execute(
                    r#"
                    UPDATE scrape_queue
                    SET status = 'processing', attempts = attempts + 1, updated_at = ?
                    WHERE id = ?
                    "#,
                    params![now, entry.id],
                )?;
                entry.attempts += 1;
                batch.push(LeasedUrl::from(&entry));
            }

            Ok(batch)
        })?;

        debug!(
            "Leased {} URLs (provider {:?}, limit {})",
            leased.len(),
            provider,
            request.limit
        );
        Ok(leased)
    }
}
