//! Audit log of URLs dropped from the scrape queue.
//!
//! Written by the queue inside its own transactions; read by dashboards and
//! the CLI.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use super::{connect, Result};
use crate::models::{IgnoreReason, IgnoredUrl, QueueEntry};

/// Append an audit row for `entry` on the caller's connection.
pub(crate) fn record(
    conn: &Connection,
    entry: &QueueEntry,
    reason: IgnoreReason,
    details: &serde_json::Value,
    now_ms: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO ignored_urls (url, source_url, provider, reason, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            entry.url,
            entry.source_url,
            entry.provider,
            reason.as_str(),
            serde_json::to_string(details)?,
            now_ms,
        ],
    )?;
    Ok(())
}

fn row_to_ignored(row: &rusqlite::Row) -> rusqlite::Result<IgnoredUrl> {
    let reason: String = row.get("reason")?;
    let details: String = row.get("details")?;
    Ok(IgnoredUrl {
        id: row.get("id")?,
        url: row.get("url")?,
        source_url: row.get("source_url")?,
        provider: row.get("provider")?,
        reason: IgnoreReason::from_str(&reason).unwrap_or(IgnoreReason::MaxAttempts),
        details: serde_json::from_str(&details).unwrap_or_default(),
        created_at: row.get("created_at")?,
    })
}

/// Read access to the ignored-URL log.
#[derive(Debug, Clone)]
pub struct IgnoredUrlRepository {
    db_path: PathBuf,
}

impl IgnoredUrlRepository {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    /// Most recent entries first, optionally narrowed to one reason.
    pub fn list_recent(&self, reason: Option<IgnoreReason>, limit: usize) -> Result<Vec<IgnoredUrl>> {
        let conn = connect(&self.db_path)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM ignored_urls
            WHERE (?1 IS NULL OR reason = ?1)
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![reason.map(|r| r.as_str()), limit as i64],
                row_to_ignored,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Entries recorded for one URL, newest first.
    pub fn for_url(&self, url: &str) -> Result<Vec<IgnoredUrl>> {
        let conn = connect(&self.db_path)?;
        let mut stmt =
            conn.prepare("SELECT * FROM ignored_urls WHERE url = ? ORDER BY created_at DESC, id DESC")?;
        let rows = stmt
            .query_map(params![url], row_to_ignored)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
