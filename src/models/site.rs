//! Crawl target sites and their lease state.

use serde::{Deserialize, Serialize};

/// Provider category of a site, which decides how its URL is canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteType {
    Greenhouse,
    Lever,
    Ashby,
    Generic,
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greenhouse => "greenhouse",
            Self::Lever => "lever",
            Self::Ashby => "ashby",
            Self::Generic => "generic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "greenhouse" => Some(Self::Greenhouse),
            "lever" => Some(Self::Lever),
            "ashby" => Some(Self::Ashby),
            "generic" | "general" | "custom" => Some(Self::Generic),
            _ => None,
        }
    }

    /// True for hosted job-board providers with a stable board slug.
    pub fn is_known_provider(&self) -> bool {
        !matches!(self, Self::Generic)
    }
}

/// A crawl target.
///
/// The raw flags mirror what is persisted; lease decisions go through
/// [`Site::state`] instead of reading them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub url: String,
    pub site_type: SiteType,
    pub name: Option<String>,
    /// External crawl backend responsible for this site, if pinned.
    pub scrape_provider: Option<String>,
    pub enabled: bool,
    pub schedule_id: Option<String>,
    pub lock_owner: Option<String>,
    pub lock_expires_at: Option<i64>,
    pub completed: bool,
    pub failed: bool,
    pub fail_count: u32,
    pub last_run_at: Option<i64>,
    pub last_failure_at: Option<i64>,
    pub last_error: Option<String>,
    pub manual_trigger_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Lease state derived from the stored flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SiteState {
    /// Switched off by an operator or folded into a duplicate.
    Disabled,
    /// Last crawl failed; needs an operator reset or manual trigger.
    Failed,
    /// Held by a worker until `expires_at`.
    Locked { owner: String, expires_at: i64 },
    /// Finished; only a schedule slot or manual trigger re-opens it.
    Completed,
    /// Waiting for its first (or next unscheduled) crawl.
    Idle,
}

impl SiteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Failed => "failed",
            Self::Locked { .. } => "locked",
            Self::Completed => "completed",
            Self::Idle => "idle",
        }
    }
}

impl Site {
    /// True when a lock is held and its expiry is still in the future.
    pub fn has_live_lock(&self, now_ms: i64) -> bool {
        self.lock_owner.is_some() && self.lock_expires_at.is_some_and(|exp| exp > now_ms)
    }

    /// Resolve the stored flags into one state.
    ///
    /// Precedence: disabled, failed, live lock, completed, idle. An expired
    /// lock counts as no lock at all.
    pub fn state(&self, now_ms: i64) -> SiteState {
        if !self.enabled {
            return SiteState::Disabled;
        }
        if self.failed {
            return SiteState::Failed;
        }
        if self.has_live_lock(now_ms) {
            return SiteState::Locked {
                owner: self.lock_owner.clone().unwrap_or_default(),
                expires_at: self.lock_expires_at.unwrap_or_default(),
            };
        }
        if self.completed {
            return SiteState::Completed;
        }
        SiteState::Idle
    }

    /// Display name, falling back to the URL.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

/// Input for registering a new site.
#[derive(Debug, Clone)]
pub struct NewSite {
    pub url: String,
    pub site_type: SiteType,
    pub name: Option<String>,
    pub scrape_provider: Option<String>,
    pub schedule_id: Option<String>,
}

/// Filters applied when a worker asks for a site lease.
#[derive(Debug, Clone, Default)]
pub struct LeaseFilter {
    pub site_type: Option<SiteType>,
    /// Matches sites pinned to this provider and sites with no pin.
    pub provider: Option<String>,
}

/// Exclusive claim handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteLease {
    pub site_id: String,
    pub url: String,
    pub site_type: SiteType,
    pub scrape_provider: Option<String>,
    pub schedule_id: Option<String>,
    pub owner: String,
    pub lock_expires_at: i64,
    /// Slot that made the site eligible; lower means more overdue.
    pub eligible_at: i64,
    /// Granted because of a recent manual trigger.
    pub manual: bool,
}
