//! Data models for crawlgate.

mod ignored;
mod queue;
mod schedule;
mod site;

pub use ignored::{IgnoreReason, IgnoredUrl};
pub use queue::{
    CompletionStatus, CompletionSummary, EnqueueRequest, EnqueueSummary, LeaseBatchRequest,
    LeasedUrl, QueueEntry, QueueStats, QueueStatus,
};
pub use schedule::{
    decode_days, encode_days, parse_weekday, weekday_code, ScheduleError, ScheduleSpec,
    ScrapeSchedule, StartTime, ValidSchedule,
};
pub use site::{LeaseFilter, NewSite, Site, SiteLease, SiteState, SiteType};
