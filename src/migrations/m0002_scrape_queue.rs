use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_scrape_queue")
        .depends_on(&["0001_sites_and_schedules"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE scrape_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    source_url TEXT NOT NULL,
    provider TEXT NOT NULL,
    site_id TEXT,
    pattern TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER,
    scheduled_at INTEGER,
    last_error TEXT
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_scrape_queue_pending ON scrape_queue(status, created_at, id)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_scrape_queue_provider ON scrape_queue(provider, status, updated_at)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_scrape_queue_site ON scrape_queue(site_id)",
        ))
        // Audit log of URLs dropped from the queue
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE ignored_urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    source_url TEXT NOT NULL,
    provider TEXT NOT NULL,
    reason TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_ignored_urls_created ON ignored_urls(created_at)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_ignored_urls_reason ON ignored_urls(reason)",
        ))
}
