//! crawlgate - coordination layer for distributed crawl workers.
//!
//! Decides which site is due for a crawl, hands out individual URLs under
//! per-domain rate limits, and folds duplicate site records together. All
//! coordination happens through atomic transactions against a shared SQLite
//! database, so any number of worker processes can poll concurrently.

// Model enums use `from_str` methods that return Option<Self>,
// not Result<Self, Error> as std::str::FromStr requires.
#![allow(clippy::should_implement_trait)]

pub mod canonical;
pub mod clock;
pub mod config;
pub mod maintenance;
pub mod migrations;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod schedule;
