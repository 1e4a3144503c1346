//! Periodic housekeeping shared by the daemon and one-off CLI runs.
//!
//! Nothing here is required for correctness: leasing already ignores
//! expired locks and reclaims orphaned rows inline. A cycle keeps the
//! tables tidy for dashboards and frees URLs that were marked stale.

use serde::Serialize;
use tracing::info;

use crate::repository::{DedupeReport, Repositories, Result};

/// What one maintenance cycle should do.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub processing_expiry_ms: i64,
    /// Maximum stale-marked queue rows to purge.
    pub purge_batch: usize,
    pub dedupe: bool,
}

/// Counts from one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub requeued: usize,
    pub locks_released: usize,
    pub purged: usize,
    pub dedupe: Option<DedupeReport>,
}

impl CycleReport {
    pub fn is_quiet(&self) -> bool {
        self.requeued == 0
            && self.locks_released == 0
            && self.purged == 0
            && self.dedupe.as_ref().map_or(true, |d| d.disabled.is_empty())
    }
}

/// Run one maintenance cycle against every repository.
pub fn run_cycle(repos: &Repositories, options: &CycleOptions) -> Result<CycleReport> {
    let requeued = repos
        .queue
        .requeue_stale(None, options.processing_expiry_ms)?;
    let locks_released = repos.sites.release_expired_locks()?;
    let purged = if options.purge_batch > 0 {
        repos.queue.purge_stale(options.purge_batch)?
    } else {
        0
    };
    let dedupe = if options.dedupe {
        Some(repos.sites.dedupe(false)?)
    } else {
        None
    };

    let report = CycleReport {
        requeued,
        locks_released,
        purged,
        dedupe,
    };
    if !report.is_quiet() {
        info!(
            "Maintenance: {} requeued, {} locks released, {} purged",
            report.requeued, report.locks_released, report.purged
        );
    }
    Ok(report)
}
