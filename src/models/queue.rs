//! Scrape queue entries: one row per URL a worker should fetch.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Outcome a worker reports for a leased URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Failed,
}

impl CompletionStatus {
    pub fn as_status(&self) -> QueueStatus {
        match self {
            Self::Completed => QueueStatus::Completed,
            Self::Failed => QueueStatus::Failed,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A persisted queue row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    /// Unique identity of the row.
    pub url: String,
    /// Page the URL was discovered on.
    pub source_url: String,
    pub provider: String,
    pub site_id: Option<String>,
    pub pattern: Option<String>,
    pub status: QueueStatus,
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
    /// Not leasable before this instant, when set.
    pub scheduled_at: Option<i64>,
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.created_at
    }
}

/// Public view of a leased row returned to workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeasedUrl {
    pub id: i64,
    pub url: String,
    pub source_url: String,
    pub provider: String,
    pub site_id: Option<String>,
    pub pattern: Option<String>,
    pub attempts: u32,
}

impl From<&QueueEntry> for LeasedUrl {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            id: entry.id,
            url: entry.url.clone(),
            source_url: entry.source_url.clone(),
            provider: entry.provider.clone(),
            site_id: entry.site_id.clone(),
            pattern: entry.pattern.clone(),
            attempts: entry.attempts,
        }
    }
}

/// URLs to add to the queue, all sharing one origin.
#[derive(Debug, Clone, Default)]
pub struct EnqueueRequest {
    pub urls: Vec<String>,
    pub source_url: String,
    pub provider: String,
    pub site_id: Option<String>,
    pub pattern: Option<String>,
    pub scheduled_at: Option<i64>,
}

/// What happened to each URL in an enqueue call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueSummary {
    pub inserted: usize,
    /// Already queued and still fresh.
    pub duplicates: usize,
    /// Already queued but past the staleness TTL; marked failed, not requeued.
    pub stale: usize,
}

/// Parameters for leasing a batch of URLs.
#[derive(Debug, Clone)]
pub struct LeaseBatchRequest {
    pub provider: Option<String>,
    pub limit: usize,
    /// Per-minute cap adopted by domains seen for the first time.
    pub max_per_minute_default: u32,
    /// `processing` rows untouched for this long are reclaimed first.
    pub processing_expiry_ms: i64,
}

/// Counts from a `complete` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub updated: usize,
    pub ejected: usize,
    /// URLs with no queue row.
    pub missing: usize,
    /// Completions repeated against an already completed row.
    pub unchanged: usize,
}

/// Per-status counts for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub oldest_pending_at: Option<i64>,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}
