//! Audit records for URLs dropped from the queue.

use serde::{Deserialize, Serialize};

/// Why a URL left the queue without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    MaxAttempts,
    #[serde(rename = "http_404")]
    Http404,
    StaleScrapeQueueEntry,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxAttempts => "max_attempts",
            Self::Http404 => "http_404",
            Self::StaleScrapeQueueEntry => "stale_scrape_queue_entry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "max_attempts" => Some(Self::MaxAttempts),
            "http_404" => Some(Self::Http404),
            "stale_scrape_queue_entry" => Some(Self::StaleScrapeQueueEntry),
            _ => None,
        }
    }
}

/// A row in the `ignored_urls` audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoredUrl {
    pub id: i64,
    pub url: String,
    pub source_url: String,
    pub provider: String,
    pub reason: IgnoreReason,
    pub details: serde_json::Value,
    pub created_at: i64,
}
