use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0003_domain_rate_limits")
        .depends_on(&["0002_scrape_queue"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE domain_rate_limits (
    domain TEXT PRIMARY KEY NOT NULL,
    max_per_minute INTEGER NOT NULL,
    window_start INTEGER NOT NULL,
    sent_in_window INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
)"#,
        ))
}
