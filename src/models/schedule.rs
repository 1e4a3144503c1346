//! Crawl schedules: which weekdays, from what local time, how often.

use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Errors raised when a schedule definition is rejected at write time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule must run on at least one weekday")]
    NoDays,
    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),
    #[error("start time '{0}' is not HH:MM (00:00-23:59)")]
    BadStartTime(String),
    #[error("interval must be at least 1 minute, got {0}")]
    BadInterval(i64),
    #[error("schedule name must not be empty")]
    EmptyName,
}

/// Local wall-clock time of day a schedule starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StartTime {
    pub hour: u8,
    pub minute: u8,
}

impl StartTime {
    /// Parse a strict `HH:MM` string.
    pub fn parse(s: &str) -> Result<Self, ScheduleError> {
        let bad = || ScheduleError::BadStartTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(bad());
        }
        let hour: u8 = h.parse().map_err(|_| bad())?;
        let minute: u8 = m.parse().map_err(|_| bad())?;
        if hour > 23 || minute > 59 {
            return Err(bad());
        }
        Ok(Self { hour, minute })
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for StartTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StartTime::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a weekday name (`mon`, `Monday`, `TUE`, ...).
pub fn parse_weekday(s: &str) -> Result<Weekday, ScheduleError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(ScheduleError::UnknownWeekday(other.to_string())),
    }
}

/// Three-letter lowercase code used for storage.
pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Encode weekdays as a comma-separated list (`mon,wed,fri`).
pub fn encode_days(days: &[Weekday]) -> String {
    days.iter()
        .map(|d| weekday_code(*d))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a comma-separated weekday list, silently dropping unknown codes.
pub fn decode_days(s: &str) -> Vec<Weekday> {
    s.split(',')
        .filter(|p| !p.trim().is_empty())
        .filter_map(|p| parse_weekday(p).ok())
        .collect()
}

/// A named, operator-defined crawl schedule.
///
/// Referenced by sites, never owned by them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeSchedule {
    pub id: String,
    pub name: String,
    pub days: Vec<Weekday>,
    pub start_time: StartTime,
    pub interval_minutes: u32,
    /// IANA timezone name; unknown names are evaluated as UTC.
    pub timezone: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScrapeSchedule {
    pub fn runs_on(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }
}

/// Unvalidated schedule definition, as entered by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub name: String,
    pub days: Vec<String>,
    pub start_time: String,
    pub interval_minutes: i64,
    pub timezone: String,
}

/// A schedule definition that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSchedule {
    pub name: String,
    pub days: Vec<Weekday>,
    pub start_time: StartTime,
    pub interval_minutes: u32,
    pub timezone: String,
}

impl ScheduleSpec {
    /// Reject definitions that could never be evaluated.
    pub fn validate(&self) -> Result<ValidSchedule, ScheduleError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ScheduleError::EmptyName);
        }

        let mut days = Vec::new();
        for raw in &self.days {
            let day = parse_weekday(raw)?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        if days.is_empty() {
            return Err(ScheduleError::NoDays);
        }

        let start_time = StartTime::parse(&self.start_time)?;

        if self.interval_minutes < 1 || self.interval_minutes > i64::from(u32::MAX) {
            return Err(ScheduleError::BadInterval(self.interval_minutes));
        }

        let timezone = if self.timezone.trim().is_empty() {
            "UTC".to_string()
        } else {
            self.timezone.trim().to_string()
        };

        Ok(ValidSchedule {
            name: name.to_string(),
            days,
            start_time,
            interval_minutes: self.interval_minutes as u32,
            timezone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(days: &[&str], start: &str, interval: i64) -> ScheduleSpec {
        ScheduleSpec {
            name: "weekday mornings".into(),
            days: days.iter().map(|d| d.to_string()).collect(),
            start_time: start.into(),
            interval_minutes: interval,
            timezone: "America/Chicago".into(),
        }
    }

    #[test]
    fn start_time_parsing() {
        assert_eq!(
            StartTime::parse("09:30").unwrap().minutes_since_midnight(),
            570
        );
        assert_eq!(StartTime::parse("00:00").unwrap().to_string(), "00:00");
        assert!(StartTime::parse("9:30").is_err());
        assert!(StartTime::parse("24:00").is_err());
        assert!(StartTime::parse("12:60").is_err());
        assert!(StartTime::parse("noon").is_err());
    }

    #[test]
    fn validate_rejects_bad_definitions() {
        assert_eq!(
            spec(&[], "09:00", 60).validate(),
            Err(ScheduleError::NoDays)
        );
        assert!(matches!(
            spec(&["mon"], "9am", 60).validate(),
            Err(ScheduleError::BadStartTime(_))
        ));
        assert_eq!(
            spec(&["mon"], "09:00", 0).validate(),
            Err(ScheduleError::BadInterval(0))
        );
        assert!(matches!(
            spec(&["funday"], "09:00", 60).validate(),
            Err(ScheduleError::UnknownWeekday(_))
        ));
    }

    #[test]
    fn validate_dedupes_days() {
        let valid = spec(&["mon", "Monday", "fri"], "09:00", 60)
            .validate()
            .unwrap();
        assert_eq!(valid.days, vec![Weekday::Mon, Weekday::Fri]);
    }

    #[test]
    fn day_encoding_round_trips_through_storage_form() {
        let days = vec![Weekday::Mon, Weekday::Wed, Weekday::Sun];
        assert_eq!(encode_days(&days), "mon,wed,sun");
        assert_eq!(decode_days("mon,wed,sun"), days);
        assert_eq!(decode_days(""), Vec::<Weekday>::new());
    }
}
