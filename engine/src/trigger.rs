//! Trigger arithmetic for scheduled jobs.
//!
//! All times are local wall-clock `NaiveDateTime`s. A trigger "ticks" at
//! regular moments; a tick "fires" when the job should actually run. Only
//! monthly triggers have ticks that do not fire: they tick daily and fire on
//! the matching day of month.

use crate::error::EngineError;
use crate::model::Schedule;
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};

/// Longest gap between two fires of a monthly trigger, with margin.
const MONTHLY_SEARCH_DAYS: i64 = 400;

/// A validated, ready-to-evaluate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Daily { at: NaiveTime },
    Weekly { day: chrono::Weekday, at: NaiveTime },
    Monthly { day_of_month: u32, at: NaiveTime },
    Interval { period: Duration },
}

impl Trigger {
    /// Build the trigger for a schedule. Manual schedules have none.
    ///
    /// # Errors
    /// Returns EngineError for an unparsable time, a zero interval, or a day
    /// of month outside 1..=31
    pub fn from_schedule(schedule: &Schedule) -> Result<Option<Trigger>, EngineError> {
        let trigger = match schedule {
            Schedule::Manual => return Ok(None),
            Schedule::Daily { time } => Trigger::Daily {
                at: parse_time(time)?,
            },
            Schedule::Weekly { day, time } => Trigger::Weekly {
                day: day.to_chrono(),
                at: parse_time(time)?,
            },
            Schedule::Monthly { day_of_month, time } => {
                if !(1..=31).contains(day_of_month) {
                    return Err(EngineError::InvalidSchedule {
                        reason: format!("Day of month {} is out of range", day_of_month),
                    });
                }
                Trigger::Monthly {
                    day_of_month: *day_of_month,
                    at: parse_time(time)?,
                }
            }
            Schedule::Interval { interval, unit } => {
                if *interval == 0 {
                    return Err(EngineError::InvalidSchedule {
                        reason: "Interval must be at least 1".to_string(),
                    });
                }
                Trigger::Interval {
                    period: unit.span(*interval),
                }
            }
        };
        Ok(Some(trigger))
    }

    /// First tick after scheduling at `now`.
    ///
    /// # Errors
    /// Returns EngineError if the tick falls outside the representable
    /// calendar, for example an interval of millions of days
    pub fn first_tick(&self, now: NaiveDateTime) -> Result<NaiveDateTime, EngineError> {
        let tick = match self {
            Trigger::Interval { period } => now.checked_add_signed(*period),
            _ => self.tick_after(now),
        };
        tick.ok_or_else(|| EngineError::InvalidSchedule {
            reason: format!("No tick after {} is representable", now),
        })
    }

    /// The tick following one that was due at `tick` and handled at `now`.
    /// None once the next tick would fall outside the calendar.
    pub fn advance(&self, tick: NaiveDateTime, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Trigger::Interval { period } => {
                let next = tick.checked_add_signed(*period)?;
                // Missed several periods: resume from now instead of catching up
                if next <= now {
                    now.checked_add_signed(*period)
                } else {
                    Some(next)
                }
            }
            _ => self.tick_after(now),
        }
    }

    /// Whether the tick at `tick` runs the job.
    pub fn fires_on(&self, tick: NaiveDateTime) -> bool {
        match self {
            Trigger::Monthly { day_of_month, .. } => tick.day() == *day_of_month,
            _ => true,
        }
    }

    /// The first firing tick at or after `tick`, for reporting `next_run`.
    pub fn next_fire(&self, tick: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Trigger::Monthly { .. } => {
                let mut candidate = tick;
                for _ in 0..MONTHLY_SEARCH_DAYS {
                    if self.fires_on(candidate) {
                        return Some(candidate);
                    }
                    candidate = candidate.checked_add_signed(Duration::days(1))?;
                }
                None
            }
            _ => Some(tick),
        }
    }

    /// Next calendar tick strictly after `after`.
    fn tick_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Trigger::Daily { at } | Trigger::Monthly { at, .. } => {
                let candidate = after.date().and_time(*at);
                if candidate > after {
                    Some(candidate)
                } else {
                    candidate.checked_add_signed(Duration::days(1))
                }
            }
            Trigger::Weekly { day, at } => {
                let days_ahead = (i64::from(day.num_days_from_monday())
                    - i64::from(after.weekday().num_days_from_monday()))
                .rem_euclid(7);
                let candidate = after
                    .date()
                    .checked_add_signed(Duration::days(days_ahead))?
                    .and_time(*at);
                if candidate > after {
                    Some(candidate)
                } else {
                    candidate.checked_add_signed(Duration::days(7))
                }
            }
            Trigger::Interval { period } => after.checked_add_signed(*period),
        }
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
fn parse_time(time: &str) -> Result<NaiveTime, EngineError> {
    let time = time.trim();
    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .map_err(|_| EngineError::InvalidSchedule {
            reason: format!("Invalid time '{}', expected HH:MM", time),
        })
}
