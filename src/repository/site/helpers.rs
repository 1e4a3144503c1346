//! Row parsing helpers for the site repository.

use rusqlite::{params, Connection};

use crate::models::{Site, SiteType};
use crate::repository::{to_option, RepositoryError, Result};

/// Parse a database row into a Site.
pub fn row_to_site(row: &rusqlite::Row) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get("id")?,
        url: row.get("url")?,
        site_type: SiteType::from_str(&row.get::<_, String>("site_type")?)
            .unwrap_or(SiteType::Generic),
        name: row.get("name")?,
        scrape_provider: row.get("scrape_provider")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        schedule_id: row.get("schedule_id")?,
        lock_owner: row.get("lock_owner")?,
        lock_expires_at: row.get("lock_expires_at")?,
        completed: row.get::<_, i64>("completed")? != 0,
        failed: row.get::<_, i64>("failed")? != 0,
        fail_count: row.get::<_, i64>("fail_count")?.max(0) as u32,
        last_run_at: row.get("last_run_at")?,
        last_failure_at: row.get("last_failure_at")?,
        last_error: row.get("last_error")?,
        manual_trigger_at: row.get("manual_trigger_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn load(conn: &Connection, id: &str) -> Result<Option<Site>> {
    to_option(conn.query_row(
        "SELECT * FROM sites WHERE id = ?",
        params![id],
        row_to_site,
    ))
}

/// Load a site or fail with `NotFound`.
pub fn require(conn: &Connection, id: &str) -> Result<Site> {
    load(conn, id)?.ok_or_else(|| RepositoryError::NotFound(format!("site {}", id)))
}

/// Write every mutable column of `site` back to its row.
pub fn store(conn: &Connection, site: &Site) -> Result<()> {
    conn.execute(
        r#"
        UPDATE sites SET
            url = ?2,
            site_type = ?3,
            name = ?4,
            scrape_provider = ?5,
            enabled = ?6,
            schedule_id = ?7,
            lock_owner = ?8,
            lock_expires_at = ?9,
            completed = ?10,
            failed = ?11,
            fail_count = ?12,
            last_run_at = ?13,
            last_failure_at = ?14,
            last_error = ?15,
            manual_trigger_at = ?16,
            updated_at = ?17
        WHERE id = ?1
        "#,
        params![
            site.id,
            site.url,
            site.site_type.as_str(),
            site.name,
            site.scrape_provider,
            site.enabled,
            site.schedule_id,
            site.lock_owner,
            site.lock_expires_at,
            site.completed,
            site.failed,
            i64::from(site.fail_count),
            site.last_run_at,
            site.last_failure_at,
            site.last_error,
            site.manual_trigger_at,
            site.updated_at,
        ],
    )?;
    Ok(())
}
