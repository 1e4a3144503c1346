//! Schedule repository.
//!
//! Definitions are validated before they touch the database; a malformed
//! schedule is never persisted. Schedules are never deleted, since sites
//! reference them by id.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

use super::{connect, to_option, RepositoryError, Result};
use crate::clock::SharedClock;
use crate::models::{decode_days, encode_days, ScheduleSpec, ScrapeSchedule, StartTime};

pub(crate) fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<ScrapeSchedule> {
    let start: String = row.get("start_time")?;
    Ok(ScrapeSchedule {
        id: row.get("id")?,
        name: row.get("name")?,
        days: decode_days(&row.get::<_, String>("days")?),
        // Written only after validation, so a parse failure means a hand-edited row.
        start_time: StartTime::parse(&start).unwrap_or(StartTime { hour: 0, minute: 0 }),
        interval_minutes: row.get::<_, i64>("interval_minutes")?.max(1) as u32,
        timezone: row.get("timezone")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Load one schedule on an existing connection.
pub(crate) fn load(conn: &Connection, id: &str) -> Result<Option<ScrapeSchedule>> {
    to_option(conn.query_row(
        "SELECT * FROM scrape_schedules WHERE id = ?",
        params![id],
        row_to_schedule,
    ))
}

/// SQLite-backed schedule repository.
#[derive(Debug, Clone)]
pub struct ScheduleRepository {
    db_path: PathBuf,
    clock: SharedClock,
}

impl ScheduleRepository {
    pub fn new(db_path: &Path, clock: SharedClock) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            clock,
        }
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }

    /// Validate and store a new schedule.
    pub fn create(&self, spec: &ScheduleSpec) -> Result<ScrapeSchedule> {
        let valid = spec.validate()?;
        let now = self.clock.now_ms();
        let schedule = ScrapeSchedule {
            id: Uuid::new_v4().to_string(),
            name: valid.name,
            days: valid.days,
            start_time: valid.start_time,
            interval_minutes: valid.interval_minutes,
            timezone: valid.timezone,
            created_at: now,
            updated_at: now,
        };

        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO scrape_schedules
                (id, name, days, start_time, interval_minutes, timezone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                schedule.id,
                schedule.name,
                encode_days(&schedule.days),
                schedule.start_time.to_string(),
                i64::from(schedule.interval_minutes),
                schedule.timezone,
                schedule.created_at,
                schedule.updated_at,
            ],
        )?;

        info!(
            "Created schedule {} ({}) {} at {} every {}m {}",
            schedule.name,
            schedule.id,
            encode_days(&schedule.days),
            schedule.start_time,
            schedule.interval_minutes,
            schedule.timezone
        );
        Ok(schedule)
    }

    /// Replace a schedule's definition, keeping its id.
    pub fn update(&self, id: &str, spec: &ScheduleSpec) -> Result<ScrapeSchedule> {
        let valid = spec.validate()?;
        let now = self.clock.now_ms();
        let conn = self.connect()?;

        let changed = conn.execute(
            r#"
            UPDATE scrape_schedules
            SET name = ?, days = ?, start_time = ?, interval_minutes = ?, timezone = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![
                valid.name,
                encode_days(&valid.days),
                valid.start_time.to_string(),
                i64::from(valid.interval_minutes),
                valid.timezone,
                now,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("schedule {}", id)));
        }

        load(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(format!("schedule {}", id)))
    }

    pub fn get(&self, id: &str) -> Result<Option<ScrapeSchedule>> {
        let conn = self.connect()?;
        load(&conn, id)
    }

    pub fn list(&self) -> Result<Vec<ScrapeSchedule>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM scrape_schedules ORDER BY name, id")?;
        let schedules = stmt
            .query_map([], row_to_schedule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(schedules)
    }
}
