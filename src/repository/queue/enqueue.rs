//! Adding URLs to the queue.

use std::collections::HashSet;

use rusqlite::params;
use tracing::{debug, info};

use super::helpers::{load_by_url, mark_failed};
use super::{QueueRepository, STALE_ERROR};
use crate::models::{EnqueueRequest, EnqueueSummary};
use crate::repository::{immediate, RepositoryError, Result};

impl QueueRepository {
    /// Queue URLs discovered on `source_url`.
    ///
    /// A URL already in the queue is left alone. If its row is past the
    /// staleness TTL the row is marked failed instead, and the URL is still
    /// not requeued.
    pub fn enqueue(&self, request: &EnqueueRequest) -> Result<EnqueueSummary> {
        let provider = request.provider.trim();
        if provider.is_empty() {
            return Err(RepositoryError::InvalidInput("provider must not be empty".into()));
        }

        let mut seen = HashSet::new();
        let urls: Vec<&str> = request
            .urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty() && seen.insert(*u))
            .collect();
        if urls.is_empty() {
            return Ok(EnqueueSummary::default());
        }

        let now = self.clock.now_ms();
        let policy = self.policy;
        let conn = self.connect()?;

        let summary = immediate(&conn, |conn| {
            let mut summary = EnqueueSummary::default();

            for url in &urls {
                if let Some(existing) = load_by_url(conn, url)? {
                    if policy.is_stale(&existing, now) {
                        debug!(
                            "Existing queue row for {} is {}ms old, marking stale",
                            url,
                            existing.age_ms(now)
                        );
                        mark_failed(conn, existing.id, STALE_ERROR, now)?;
                        summary.stale += 1;
                    } else {
                        summary.duplicates += 1;
                    }
                    continue;
                }

                conn.execute(
                    r#"
                    INSERT INTO scrape_queue
                        (url, source_url, provider, site_id, pattern, status, attempts,
                         created_at, updated_at, scheduled_at)
                    VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)
                    "#,
                    params![
                        url,
                        request.source_url,
                        provider,
                        request.site_id,
                        request.pattern,
                        now,
                        now,
                        request.scheduled_at,
                    ],
                )?;
                summary.inserted += 1;
            }

            Ok(summary)
        })?;

        info!(
            "Enqueued {} URLs from {} ({} duplicates, {} stale)",
            summary.inserted, request.source_url, summary.duplicates, summary.stale
        );
        Ok(summary)
    }
}
