//! Row parsing helpers for the scrape queue.

use rusqlite::{params, Connection};

use crate::models::{QueueEntry, QueueStatus};
use crate::repository::{to_option, Result};

/// Parse a database row into a QueueEntry.
pub fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get("id")?,
        url: row.get("url")?,
        source_url: row.get("source_url")?,
        provider: row.get("provider")?,
        site_id: row.get("site_id")?,
        pattern: row.get("pattern")?,
        status: QueueStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(QueueStatus::Pending),
        attempts: row.get::<_, i64>("attempts")?.max(0) as u32,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
        scheduled_at: row.get("scheduled_at")?,
        last_error: row.get("last_error")?,
    })
}

pub fn load_by_url(conn: &Connection, url: &str) -> Result<Option<QueueEntry>> {
    to_option(conn.query_row(
        "SELECT * FROM scrape_queue WHERE url = ?",
        params![url],
        row_to_entry,
    ))
}

/// Mark a row failed with a reason, leaving it in place.
pub fn mark_failed(conn: &Connection, id: i64, error: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE scrape_queue SET status = 'failed', last_error = ?, updated_at = ? WHERE id = ?",
        params![error, now_ms, id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM scrape_queue WHERE id = ?", params![id])?;
    Ok(())
}
