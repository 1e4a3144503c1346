//! Schedule evaluation: is a run due, and which slot made it due?
//!
//! Pure functions of `(schedule, now)`. Local calendar fields and the UTC
//! offset come from the [`Clock`] for the exact instant being evaluated, so
//! DST transitions are handled per call rather than cached.

use chrono::{
    DateTime, Datelike, Days, NaiveDate, Offset, TimeZone, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

use crate::clock::Clock;
use crate::models::ScrapeSchedule;

/// Zone used when a schedule names a timezone the database doesn't know.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::UTC;

const MINUTES_PER_DAY: u32 = 24 * 60;
const MS_PER_MINUTE: i64 = 60_000;

/// Calendar breakdown of an instant in some timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub weekday: Weekday,
    /// Offset of local time from UTC at this instant.
    pub utc_offset_ms: i64,
}

impl LocalParts {
    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// Look up an IANA zone name, falling back to [`DEFAULT_TIMEZONE`].
pub fn resolve_timezone(name: &str) -> Tz {
    match name.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(
                "Unknown timezone '{}', evaluating schedule in {}",
                name, DEFAULT_TIMEZONE
            );
            DEFAULT_TIMEZONE
        }
    }
}

/// Decompose `timestamp_ms` into local calendar fields for `tz`.
pub fn local_parts(timestamp_ms: i64, tz: Tz) -> LocalParts {
    let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or(DateTime::UNIX_EPOCH);
    let local = utc.with_timezone(&tz);
    let offset_secs = local.offset().fix().local_minus_utc();

    LocalParts {
        year: local.year(),
        month: local.month(),
        day: local.day(),
        hour: local.hour(),
        minute: local.minute(),
        weekday: local.weekday(),
        utc_offset_ms: i64::from(offset_secs) * 1000,
    }
}

/// Absolute time of `minutes` past local midnight on `date`.
///
/// The conversion uses the UTC offset in force at that midnight. If midnight
/// itself falls in a DST gap, `fallback_offset_ms` is used instead.
fn slot_timestamp(tz: Tz, date: NaiveDate, minutes: u32, fallback_offset_ms: i64) -> Option<i64> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let offset_ms = tz
        .offset_from_local_datetime(&midnight)
        .earliest()
        .map(|o| i64::from(o.fix().local_minus_utc()) * 1000)
        .unwrap_or(fallback_offset_ms);
    let midnight_utc_ms = midnight.and_utc().timestamp_millis() - offset_ms;
    Some(midnight_utc_ms + i64::from(minutes) * MS_PER_MINUTE)
}

/// Most recent slot at or before `now_ms` on the current local day.
///
/// Returns `None` when today is not a scheduled weekday or the local time is
/// still before the schedule's start time. Slots never carry over from a
/// previous day.
pub fn latest_eligible_slot(
    clock: &dyn Clock,
    schedule: &ScrapeSchedule,
    now_ms: i64,
) -> Option<i64> {
    let tz = resolve_timezone(&schedule.timezone);
    let parts = clock.to_local_parts(now_ms, &schedule.timezone);

    if !schedule.runs_on(parts.weekday) {
        return None;
    }

    let minutes_now = parts.minutes_since_midnight();
    let start = schedule.start_time.minutes_since_midnight();
    if minutes_now < start {
        return None;
    }

    let interval = schedule.interval_minutes.max(1);
    let steps = (minutes_now - start) / interval;
    let slot_minutes = start + steps * interval;

    slot_timestamp(tz, parts.date()?, slot_minutes, parts.utc_offset_ms)
}

/// First slot strictly after `now_ms`, looking up to a week ahead.
pub fn next_eligible_slot(
    clock: &dyn Clock,
    schedule: &ScrapeSchedule,
    now_ms: i64,
) -> Option<i64> {
    let tz = resolve_timezone(&schedule.timezone);
    let parts = clock.to_local_parts(now_ms, &schedule.timezone);
    let today = parts.date()?;
    let start = schedule.start_time.minutes_since_midnight();
    let interval = schedule.interval_minutes.max(1);

    for offset in 0..=7u64 {
        let date = today.checked_add_days(Days::new(offset))?;
        if !schedule.runs_on(date.weekday()) {
            continue;
        }
        let mut minutes = start;
        while minutes < MINUTES_PER_DAY {
            let ts = slot_timestamp(tz, date, minutes, parts.utc_offset_ms)?;
            if ts > now_ms {
                return Some(ts);
            }
            minutes += interval;
        }
    }
    None
}

/// Whether a site that last ran at `last_run_at` is due under `schedule`.
///
/// Returns the slot that makes it due.
pub fn due_slot(
    clock: &dyn Clock,
    schedule: &ScrapeSchedule,
    last_run_at: Option<i64>,
    now_ms: i64,
) -> Option<i64> {
    let slot = latest_eligible_slot(clock, schedule, now_ms)?;
    match last_run_at {
        Some(last) if last >= slot => None,
        _ => Some(slot),
    }
}
