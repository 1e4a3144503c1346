//! Recording worker outcomes for leased URLs.

use std::collections::HashSet;

use rusqlite::params;
use serde_json::json;
use tracing::{debug, info};

use super::helpers::{delete, load_by_url};
use super::QueueRepository;
use crate::models::{CompletionStatus, CompletionSummary, IgnoreReason, QueueStatus};
use crate::repository::{ignored, immediate, Result};

/// Ejection reason for a failed completion, if the failure is terminal.
pub fn ejection_reason(
    attempts_after: u32,
    max_attempts: u32,
    error: Option<&str>,
) -> Option<IgnoreReason> {
    if error.is_some_and(|e| e.contains("404")) {
        Some(IgnoreReason::Http404)
    } else if attempts_after >= max_attempts {
        Some(IgnoreReason::MaxAttempts)
    } else {
        None
    }
}

impl QueueRepository {
    /// Report the outcome for each URL.
    ///
    /// Every call counts as an attempt. A failure that reaches the attempt
    /// cap, or whose error mentions a 404, ejects the row with an audit
    /// record. Completing an absent row, or one already completed, is a
    /// no-op.
    pub fn complete(
        &self,
        urls: &[String],
        status: CompletionStatus,
        error: Option<&str>,
    ) -> Result<CompletionSummary> {
        let mut seen = HashSet::new();
        let urls: Vec<&str> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty() && seen.insert(*u))
            .collect();
        if urls.is_empty() {
            return Ok(CompletionSummary::default());
        }

        let now = self.clock.now_ms();
        let max_attempts = self.policy.max_attempts;
        let conn = self.connect()?;

        let summary = immediate(&conn, |conn| {
            let mut summary = CompletionSummary::default();

            for url in &urls {
                let Some(entry) = load_by_url(conn, url)? else {
                    debug!("Completion for unknown URL {}", url);
                    summary.missing += 1;
                    continue;
                };

                if status == CompletionStatus::Completed && entry.status == QueueStatus::Completed
                {
                    summary.unchanged += 1;
                    continue;
                }

                let attempts = entry.attempts.saturating_add(1);

                if status == CompletionStatus::Failed {
                    if let Some(reason) = ejection_reason(attempts, max_attempts, error) {
                        info!(
                            "Ejecting {} after {} attempts ({})",
                            entry.url,
                            attempts,
                            reason.as_str()
                        );
                        ignored::record(
                            conn,
                            &entry,
                            reason,
                            &json!({
                                "attempts": attempts,
                                "error": error,
                                "site_id": entry.site_id,
                                "pattern": entry.pattern,
                            }),
                            now,
                        )?;
                        delete(conn, entry.id)?;
                        summary.ejected += 1;
                        continue;
                    }
                }

                let completed_at = (status == CompletionStatus::Completed).then_some(now);
                conn.execute(
                    r#"
                    UPDATE scrape_queue
                    SET status = ?, attempts = ?, last_error = ?, updated_at = ?, completed_at = ?
                    WHERE id = ?
                    "#,
                    params![
                        status.as_status().as_str(),
                        i64::from(attempts),
                        error,
                        now,
                        completed_at,
                        entry.id,
                    ],
                )?;
                summary.updated += 1;
            }

            Ok(summary)
        })?;

        debug!(
            "Completion batch: {} updated, {} ejected, {} missing, {} unchanged",
            summary.updated, summary.ejected, summary.missing, summary.unchanged
        );
        Ok(summary)
    }
}
