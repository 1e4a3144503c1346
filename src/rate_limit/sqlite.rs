//! SQLite-backed domain limiter shared by every worker process.
//!
//! State lives in `domain_rate_limits`, one row per hostname. The queue
//! calls [`apply`] on its own transaction's connection while leasing; the
//! repository wraps the same logic for administrative use.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::debug;

use super::window::DomainRateState;
use crate::clock::SharedClock;
use crate::repository::{connect, immediate, to_option, RepositoryError, Result};

fn row_to_state(row: &rusqlite::Row) -> rusqlite::Result<DomainRateState> {
    Ok(DomainRateState {
        domain: row.get("domain")?,
        max_per_minute: row.get::<_, i64>("max_per_minute")?.max(0) as u32,
        window_start: row.get("window_start")?,
        sent_in_window: row.get::<_, i64>("sent_in_window")?.max(0) as u32,
    })
}

fn load(conn: &Connection, domain: &str) -> Result<Option<DomainRateState>> {
    to_option(conn.query_row(
        "SELECT * FROM domain_rate_limits WHERE domain = ?",
        params![domain],
        row_to_state,
    ))
}

fn save(conn: &Connection, state: &DomainRateState, now_ms: i64) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO domain_rate_limits (domain, max_per_minute, window_start, sent_in_window, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(domain) DO UPDATE SET
            max_per_minute = excluded.max_per_minute,
            window_start = excluded.window_start,
            sent_in_window = excluded.sent_in_window,
            updated_at = excluded.updated_at
        "#,
        params![
            state.domain,
            i64::from(state.max_per_minute),
            state.window_start,
            i64::from(state.sent_in_window),
            now_ms
        ],
    )?;
    Ok(())
}

/// Consume one request slot for `domain` if its window allows.
///
/// Domains seen for the first time adopt `default_max_per_minute`. Runs on
/// the caller's connection so it joins any open transaction.
pub fn apply(
    conn: &Connection,
    domain: &str,
    default_max_per_minute: u32,
    now_ms: i64,
) -> Result<bool> {
    let mut state = load(conn, domain)?.unwrap_or_else(|| {
        DomainRateState::new(domain.to_string(), default_max_per_minute, now_ms)
    });

    let admitted = state.try_admit(now_ms);
    save(conn, &state, now_ms)?;

    if !admitted {
        debug!(
            "Rate limited {}: {}/{} in current window",
            domain, state.sent_in_window, state.max_per_minute
        );
    }
    Ok(admitted)
}

/// Repository for per-domain request caps.
#[derive(Debug, Clone)]
pub struct RateLimitRepository {
    db_path: PathBuf,
    clock: SharedClock,
}

impl RateLimitRepository {
    pub fn new(db_path: &Path, clock: SharedClock) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            clock,
        }
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }

    /// Set the cap for a domain, keeping its current window.
    pub fn set_limit(&self, domain: &str, max_per_minute: u32) -> Result<DomainRateState> {
        let domain = domain.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return Err(RepositoryError::InvalidInput("domain must not be empty".into()));
        }
        let now = self.clock.now_ms();
        let conn = self.connect()?;

        immediate(&conn, |conn| {
            let mut state = load(conn, &domain)?
                .unwrap_or_else(|| DomainRateState::new(domain.clone(), max_per_minute, now));
            state.max_per_minute = max_per_minute;
            save(conn, &state, now)?;
            Ok(state)
        })
    }

    /// Take a slot for `domain` in its own transaction.
    pub fn apply(&self, domain: &str, default_max_per_minute: u32) -> Result<bool> {
        let now = self.clock.now_ms();
        let conn = self.connect()?;
        immediate(&conn, |conn| apply(conn, domain, default_max_per_minute, now))
    }

    pub fn get(&self, domain: &str) -> Result<Option<DomainRateState>> {
        let conn = self.connect()?;
        load(&conn, &domain.trim().to_ascii_lowercase())
    }

    pub fn list(&self) -> Result<Vec<DomainRateState>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM domain_rate_limits ORDER BY domain")?;
        let states = stmt
            .query_map([], row_to_state)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }
}
