use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_sites_and_schedules")
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE scrape_schedules (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    days TEXT NOT NULL,
    start_time TEXT NOT NULL,
    interval_minutes INTEGER NOT NULL CHECK (interval_minutes >= 1),
    timezone TEXT NOT NULL DEFAULT 'UTC',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE sites (
    id TEXT PRIMARY KEY NOT NULL,
    url TEXT NOT NULL,
    site_type TEXT NOT NULL DEFAULT 'generic',
    name TEXT,
    scrape_provider TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    schedule_id TEXT REFERENCES scrape_schedules(id),
    lock_owner TEXT,
    lock_expires_at INTEGER,
    completed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    fail_count INTEGER NOT NULL DEFAULT 0,
    last_run_at INTEGER,
    last_failure_at INTEGER,
    last_error TEXT,
    manual_trigger_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_sites_enabled_type ON sites(enabled, site_type)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_sites_schedule ON sites(schedule_id)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_sites_url ON sites(url)",
        ))
}
