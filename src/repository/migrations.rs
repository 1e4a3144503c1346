//! Database migrations using cetane.
//!
//! The whole run happens under one `BEGIN IMMEDIATE` transaction, so
//! concurrent processes opening the same database never apply a migration
//! twice.

use cetane::backend::Sqlite;
use cetane::migrator::{MigrationStateStore, Migrator};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{immediate, RepositoryError, Result};

fn migration_error(msg: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Migration(msg.to_string())
}

/// Migration names in the order they apply.
pub fn ordered_names() -> Result<Vec<String>> {
    let registry = crate::migrations::registry();
    let order = registry.resolve_order().map_err(migration_error)?;
    Ok(order.into_iter().map(|name| name.to_string()).collect())
}

/// Names of migrations already recorded as applied.
pub fn applied(conn: &Connection) -> Result<Vec<String>> {
    let mut state = SqliteState::new(conn, 0)?;
    state.applied_migrations().map_err(migration_error)
}

/// Apply every migration not yet recorded.
///
/// Returns the names applied by this call.
pub fn run_pending(conn: &Connection, now_ms: i64) -> Result<Vec<String>> {
    let ran = immediate(conn, |conn| {
        let backend = Sqlite;
        let registry = crate::migrations::registry();
        let state = SqliteState::new(conn, now_ms)?;

        let mut migrator = Migrator::new(&registry, &backend, state);
        let applied = migrator
            .migrate_forward(|sql| conn.execute_batch(sql).map_err(|e| e.to_string()))
            .map_err(migration_error)?;

        Ok(applied
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>())
    })?;

    for name in &ran {
        info!("Applied migration: {}", name);
    }
    if ran.is_empty() {
        debug!("No pending migrations");
    }
    Ok(ran)
}

struct SqliteState<'a> {
    conn: &'a Connection,
    now_ms: i64,
}

impl<'a> SqliteState<'a> {
    fn new(conn: &'a Connection, now_ms: i64) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS __cetane_migrations (
                name TEXT PRIMARY KEY NOT NULL,
                applied_at INTEGER NOT NULL
            )",
        )?;

        Ok(Self { conn, now_ms })
    }
}

impl MigrationStateStore for SqliteState<'_> {
    fn applied_migrations(&mut self) -> std::result::Result<Vec<String>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM __cetane_migrations ORDER BY name")
            .map_err(|e| e.to_string())?;

        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| e.to_string())?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| e.to_string())?;

        Ok(names)
    }

    fn mark_applied(&mut self, name: &str) -> std::result::Result<(), String> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO __cetane_migrations (name, applied_at) VALUES (?1, ?2)",
                params![name, self.now_ms],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn mark_unapplied(&mut self, name: &str) -> std::result::Result<(), String> {
        self.conn
            .execute("DELETE FROM __cetane_migrations WHERE name = ?1", [name])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
