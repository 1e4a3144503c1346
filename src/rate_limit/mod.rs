//! Per-domain request caps for the scrape queue.
//!
//! A fixed 60-second window keyed by full hostname. Counters are stored in
//! the shared database rather than in memory, because the processes that
//! lease URLs for the same domain do not share an address space.
//!
//! The limit is soft. It caps how many URLs are handed out per window, not
//! how many requests workers actually send, and slots taken by URLs that
//! later fail are not refunded.

mod sqlite;
mod window;

pub use sqlite::{apply, RateLimitRepository};
pub use window::{DomainRateState, WINDOW_MS};
