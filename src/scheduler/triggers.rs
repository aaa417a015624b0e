//! Trigger definitions for scheduled jobs.
//!
//! A [`TriggerSpec`] answers one question: given a point in local
//! wall-clock time, when does the job fire next?

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskminderError};

/// Upper bound on the days scanned for a cron match. Covers a Feb 29
/// yearly trigger across a century-year gap.
const MAX_SCAN_DAYS: i64 = 366 * 9;

/// Calendar-based recurring trigger at a fixed hour and minute.
///
/// Optional fields narrow the matching days; all set fields must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSpec {
    /// Hour of day (0-23, local).
    pub hour: u32,
    /// Minute of hour (0-59).
    pub minute: u32,
    /// Restrict to one weekday.
    #[serde(default)]
    pub day_of_week: Option<Weekday>,
    /// Restrict to one day of month (1-31).
    #[serde(default)]
    pub day: Option<u32>,
    /// Restrict to one month (1-12).
    #[serde(default)]
    pub month: Option<u32>,
    /// No fire time before this instant.
    pub start: NaiveDateTime,
}

impl CronSpec {
    /// Every day at `hour:minute`, starting at `start`.
    pub fn daily(hour: u32, minute: u32, start: NaiveDateTime) -> Self {
        Self {
            hour,
            minute,
            day_of_week: None,
            day: None,
            month: None,
            start,
        }
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        self.day_of_week.is_none_or(|wd| date.weekday() == wd)
            && self.day.is_none_or(|d| date.day() == d)
            && self.month.is_none_or(|m| date.month() == m)
    }

    /// First fire time at or after `from` (strictly after when `inclusive` is false).
    fn next_from(&self, from: NaiveDateTime, inclusive: bool) -> Option<NaiveDateTime> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let lower = from.max(self.start);
        let lower_is_inclusive = inclusive || self.start > from;

        let mut date = lower.date();
        for _ in 0..MAX_SCAN_DAYS {
            if self.matches_date(date) {
                let candidate = date.and_time(time);
                let after_lower = if lower_is_inclusive {
                    candidate >= lower
                } else {
                    candidate > lower
                };
                if after_lower {
                    return Some(candidate);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    fn validate(&self) -> Result<()> {
        if self.hour > 23 || self.minute > 59 {
            return Err(TaskminderError::JobRegistration(format!(
                "invalid time {:02}:{:02}",
                self.hour, self.minute
            )));
        }
        if self.day.is_some_and(|d| !(1..=31).contains(&d)) {
            return Err(TaskminderError::JobRegistration(format!(
                "day of month out of range: {:?}",
                self.day
            )));
        }
        if self.month.is_some_and(|m| !(1..=12).contains(&m)) {
            return Err(TaskminderError::JobRegistration(format!(
                "month out of range: {:?}",
                self.month
            )));
        }
        Ok(())
    }
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fire once at a fixed instant.
    Once {
        /// Fire time.
        at: NaiveDateTime,
    },
    /// Calendar-based recurrence.
    Cron(CronSpec),
    /// Fire every N seconds, first fire N seconds after registration.
    Interval {
        /// Interval in seconds between runs.
        secs: u64,
    },
}

impl TriggerSpec {
    /// Reject malformed triggers before registration.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Once { .. } => Ok(()),
            Self::Cron(spec) => spec.validate(),
            Self::Interval { secs: 0 } => Err(TaskminderError::JobRegistration(
                "interval must be at least one second".into(),
            )),
            Self::Interval { .. } => Ok(()),
        }
    }

    /// First fire time for a job registered at `now`.
    ///
    /// `None` means the trigger can never fire (e.g. a one-shot in the past
    /// or a cron day that does not exist).
    pub fn first_fire(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Once { at } => (*at >= now).then_some(*at),
            Self::Cron(spec) => spec.next_from(now, true),
            Self::Interval { secs } => Some(now + interval(*secs)),
        }
    }

    /// Next fire time after the job fired at `fired_at`. One-shots return `None`.
    pub fn fire_after(&self, fired_at: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Once { .. } => None,
            Self::Cron(spec) => spec.next_from(fired_at, false),
            Self::Interval { secs } => Some(fired_at + interval(*secs)),
        }
    }

    /// Equality that ignores a cron trigger's start instant.
    ///
    /// Two registrations of the same daily reminder made a minute apart
    /// describe the same schedule.
    pub fn same_schedule(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Cron(a), Self::Cron(b)) => {
                a.hour == b.hour
                    && a.minute == b.minute
                    && a.day_of_week == b.day_of_week
                    && a.day == b.day
                    && a.month == b.month
            }
            _ => self == other,
        }
    }
}

fn interval(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
}

impl std::fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once { at } => write!(f, "once at {}", at.format("%Y-%m-%d %H:%M")),
            Self::Cron(spec) => {
                let (h, m) = (spec.hour, spec.minute);
                match (spec.month, spec.day, spec.day_of_week) {
                    (Some(month), Some(day), _) => {
                        write!(f, "yearly on {month:02}-{day:02} at {h:02}:{m:02}")
                    }
                    (None, Some(day), _) => write!(f, "monthly on day {day} at {h:02}:{m:02}"),
                    (_, None, Some(wd)) => write!(f, "every {wd} at {h:02}:{m:02}"),
                    _ => write!(f, "daily at {h:02}:{m:02}"),
                }
            }
            Self::Interval { secs } => {
                if *secs >= 3600 && secs % 3600 == 0 {
                    write!(f, "every {} hours", secs / 3600)
                } else if *secs >= 60 && secs % 60 == 0 {
                    write!(f, "every {} minutes", secs / 60)
                } else {
                    write!(f, "every {secs} seconds")
                }
            }
        }
    }
}
