//! Repository layer for database persistence.
//!
//! Every repository holds the database path and opens a short-lived
//! connection per call. Operations that read and then write run inside a
//! single `BEGIN IMMEDIATE` transaction, which takes SQLite's write lock up
//! front and serializes competing workers across processes.

pub mod ignored;
pub mod migrations;
pub mod queue;
pub mod schedule;
pub mod site;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use crate::clock::SharedClock;
use crate::models::ScheduleError;

pub use crate::rate_limit::RateLimitRepository;
pub use ignored::IgnoredUrlRepository;
pub use queue::{QueuePolicy, QueueRepository};
pub use schedule::ScheduleRepository;
pub use site::{DedupeReport, DuplicateLink, SiteListFilter, SiteRepository};

/// How long a connection waits on another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Open a connection configured for multi-process access.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

/// Run `f` inside one `BEGIN IMMEDIATE` transaction.
///
/// Commits when `f` succeeds, rolls back otherwise.
pub(crate) fn immediate<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = f(conn);

    if result.is_ok() {
        conn.execute_batch("COMMIT")?;
    } else {
        let _ = conn.execute_batch("ROLLBACK");
    }

    result
}

/// Map `QueryReturnedNoRows` to `None`.
pub(crate) fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    Ok(result.optional()?)
}

/// Open (creating if needed) the database file and apply pending migrations.
///
/// Returns the names of migrations applied by this call.
pub fn init_database(db_path: &Path, now_ms: i64) -> Result<Vec<String>> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = connect(db_path)?;
    migrations::run_pending(&conn, now_ms)
}

/// All repositories over one database, sharing one clock.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub db_path: PathBuf,
    pub sites: SiteRepository,
    pub schedules: ScheduleRepository,
    pub queue: QueueRepository,
    pub limits: RateLimitRepository,
    pub ignored: IgnoredUrlRepository,
}

impl Repositories {
    /// Open the database at `db_path`, migrating it first.
    pub fn open(db_path: &Path, clock: SharedClock, policy: QueuePolicy) -> Result<Self> {
        init_database(db_path, clock.now_ms())?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            sites: SiteRepository::new(db_path, clock.clone()),
            schedules: ScheduleRepository::new(db_path, clock.clone()),
            queue: QueueRepository::new(db_path, clock.clone()).with_policy(policy),
            limits: RateLimitRepository::new(db_path, clock.clone()),
            ignored: IgnoredUrlRepository::new(db_path),
        })
    }

    /// Apply the manual-trigger window to the site repository.
    pub fn with_manual_trigger_window_ms(mut self, window_ms: i64) -> Self {
        self.sites = self.sites.with_manual_trigger_window_ms(window_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_rolls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("t.db")).unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();

        let result: Result<()> = immediate(&conn, |c| {
            c.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Err(RepositoryError::InvalidInput("boom".into()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);

        immediate(&conn, |c| {
            c.execute("INSERT INTO t (v) VALUES (2)", [])?;
            Ok(())
        })
        .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
