//! Schema migrations.
//!
//! Verifies the migrated schema has the tables and constraints the
//! repositories rely on, and that migrating is idempotent.

use std::collections::BTreeSet;

use rusqlite::{Connection, Result as SqliteResult};

use crawlgate::repository::{init_database, migrations};

fn table_names(conn: &Connection) -> SqliteResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<SqliteResult<BTreeSet<String>>>()?;
    Ok(names)
}

fn column_names(conn: &Connection, table: &str) -> SqliteResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let names = stmt
        .query_map([], |row| row.get(1))?
        .collect::<SqliteResult<BTreeSet<String>>>()?;
    Ok(names)
}

#[test]
fn migrations_create_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawlgate.db");

    let applied = init_database(&path, 1).unwrap();
    assert_eq!(applied, migrations::ordered_names().unwrap());

    let conn = Connection::open(&path).unwrap();
    let tables = table_names(&conn).unwrap();
    for table in [
        "sites",
        "scrape_schedules",
        "scrape_queue",
        "domain_rate_limits",
        "ignored_urls",
        "__cetane_migrations",
    ] {
        assert!(tables.contains(table), "missing table {}", table);
    }

    let site_columns = column_names(&conn, "sites").unwrap();
    for column in [
        "lock_owner",
        "lock_expires_at",
        "manual_trigger_at",
        "last_run_at",
        "scrape_provider",
    ] {
        assert!(site_columns.contains(column), "sites.{} missing", column);
    }
    let queue_columns = column_names(&conn, "scrape_queue").unwrap();
    assert!(queue_columns.contains("scheduled_at"));
    assert!(queue_columns.contains("attempts"));
}

#[test]
fn migrating_twice_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawlgate.db");

    init_database(&path, 1).unwrap();
    assert!(init_database(&path, 2).unwrap().is_empty());

    let conn = Connection::open(&path).unwrap();
    let recorded = migrations::applied(&conn).unwrap();
    assert_eq!(recorded, migrations::ordered_names().unwrap());
}

#[test]
fn queue_urls_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawlgate.db");
    init_database(&path, 1).unwrap();

    let conn = Connection::open(&path).unwrap();
    let insert = "INSERT INTO scrape_queue (url, source_url, provider, status, attempts, created_at, updated_at) \
                  VALUES ('https://a.com/1', 's', 'p', 'pending', 0, 1, 1)";
    conn.execute(insert, []).unwrap();
    assert!(conn.execute(insert, []).is_err());
}
