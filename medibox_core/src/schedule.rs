//! Medication schedules and wall-clock matching.

use crate::error::ConfigurationError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 24 * 60;
const HALF_DAY: u16 = MINUTES_PER_DAY / 2;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Frequency {
    #[default]
    Daily,
    /// ISO weekdays, 0 = Monday .. 6 = Sunday.
    SpecificWeekdays(BTreeSet<u8>),
}

/// Read-only snapshot of one schedule owned by the external store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationSchedule {
    pub id: String,
    pub patient_id: String,
    pub name: String,
    pub dosage: String,
    /// Raw time-of-day strings; parsed when matched.
    pub scheduled_times: Vec<String>,
    pub frequency: Frequency,
    pub is_active: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl MedicationSchedule {
    /// Active daily schedule with no validity window.
    pub fn daily(id: impl Into<String>, name: impl Into<String>, times: &[&str]) -> Self {
        Self {
            id: id.into(),
            patient_id: String::new(),
            name: name.into(),
            dosage: String::new(),
            scheduled_times: times.iter().map(|t| (*t).to_owned()).collect(),
            frequency: Frequency::Daily,
            is_active: true,
            start_date: None,
            end_date: None,
        }
    }

    pub fn in_validity_window(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|s| date >= s) && self.end_date.is_none_or(|e| date <= e)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid time of day {0:?}")]
pub struct InvalidTimeOfDay(pub String);

/// Minute of day, `0..1440`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then(|| Self(u16::from(hour) * 60 + u16::from(minute)))
    }

    pub fn minute_of_day(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u8 {
        // < 24 by construction
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }

    /// The occurrence of this time closest to `now`, which may fall on the
    /// previous or next calendar day. `23:58` seen at `00:02` is yesterday's.
    pub fn occurrence_near(self, now: NaiveDateTime) -> NaiveDateTime {
        let current = TimeOfDay::from(now.time());
        let midnight = now.date().and_time(NaiveTime::MIN);
        midnight
            + TimeDelta::minutes(i64::from(current.0) + i64::from(minute_offset(current, self)))
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        // hour() < 24 and minute() < 60
        Self((t.hour() * 60 + t.minute()) as u16)
    }
}

fn parse_hm(s: &str) -> Option<(u8, u8)> {
    let (h, m) = s.split_once(':')?;
    let (h, m) = (h.trim(), m.trim());
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    Some((h.parse().ok()?, m.parse().ok()?))
}

impl FromStr for TimeOfDay {
    type Err = InvalidTimeOfDay;

    /// Accepts 12-hour `h:mm AM/PM` (space optional, any case) and 24-hour
    /// `HH:MM`. `12:xx AM` is just after midnight, `12:xx PM` just after noon.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || InvalidTimeOfDay(s.to_owned());
        let t = s.trim();
        let upper = t.to_ascii_uppercase();
        let (clock, pm) = if let Some(rest) = upper.strip_suffix("AM") {
            (rest, Some(false))
        } else if let Some(rest) = upper.strip_suffix("PM") {
            (rest, Some(true))
        } else {
            (upper.as_str(), None)
        };
        let (h, m) = parse_hm(clock).ok_or_else(bad)?;
        let hour = match pm {
            None => h,
            Some(_) if !(1..=12).contains(&h) => return Err(bad()),
            Some(false) => h % 12,
            Some(true) => h % 12 + 12,
        };
        Self::from_hm(hour, m).ok_or_else(bad)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Distance in minutes between two times of day, going the short way round
/// midnight. `23:58` vs `00:02` is 4.
pub fn minute_gap(a: TimeOfDay, b: TimeOfDay) -> u16 {
    let d = a.0.abs_diff(b.0);
    if d > HALF_DAY { MINUTES_PER_DAY - d } else { d }
}

/// Signed distance from `now` to `t` going the short way round midnight, in
/// `(-720, 720]`. Negative when `t` has already passed.
pub fn minute_offset(now: TimeOfDay, t: TimeOfDay) -> i16 {
    let half = HALF_DAY as i16;
    let day = MINUTES_PER_DAY as i16;
    let mut d = t.0 as i16 - now.0 as i16;
    if d > half {
        d -= day;
    } else if d <= -half {
        d += day;
    }
    d
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Motor {
    /// Precision stepper, morning doses.
    Stepper,
    /// Quick-action servo, everything else.
    Servo,
}

impl Motor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stepper => "stepper",
            Self::Servo => "servo",
        }
    }
}

impl fmt::Display for Motor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local hours `[start_hour, end_hour)` that count as morning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorningWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for MorningWindow {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 12,
        }
    }
}

impl MorningWindow {
    pub fn contains(&self, t: TimeOfDay) -> bool {
        (self.start_hour..self.end_hour).contains(&t.hour())
    }

    pub fn motor_for(&self, t: TimeOfDay) -> Motor {
        if self.contains(t) {
            Motor::Stepper
        } else {
            Motor::Servo
        }
    }
}

/// Decides which schedules are due at a wall-clock instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleMatcher {
    tolerance_min: u16,
}

impl Default for ScheduleMatcher {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ScheduleMatcher {
    pub fn new(tolerance_min: u16) -> Self {
        Self { tolerance_min }
    }

    /// Configured times of `schedule` within tolerance of `now`, earliest
    /// occurrence first and de-duplicated. Empty when not due. Order is by
    /// signed offset from `now`, so at `00:00` a `23:58` entry comes before
    /// `00:02`.
    ///
    /// Every time string is validated, so a bad entry is reported even when
    /// another entry would have matched.
    pub fn matching_times(
        &self,
        schedule: &MedicationSchedule,
        now: NaiveDateTime,
    ) -> Result<Vec<TimeOfDay>, ConfigurationError> {
        if !schedule.is_active || !schedule.in_validity_window(now.date()) {
            return Ok(Vec::new());
        }
        if let Frequency::SpecificWeekdays(days) = &schedule.frequency {
            if let Some(&day) = days.iter().find(|d| **d > 6) {
                return Err(ConfigurationError::InvalidWeekday {
                    schedule_id: schedule.id.clone(),
                    day,
                });
            }
            let today = now.weekday().num_days_from_monday() as u8;
            if !days.contains(&today) {
                return Ok(Vec::new());
            }
        }
        let times = schedule
            .scheduled_times
            .iter()
            .map(|raw| {
                raw.parse::<TimeOfDay>()
                    .map_err(|_| ConfigurationError::InvalidTime {
                        schedule_id: schedule.id.clone(),
                        value: raw.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let current = TimeOfDay::from(now.time());
        let mut hits: Vec<TimeOfDay> = times
            .into_iter()
            .filter(|t| minute_gap(*t, current) <= self.tolerance_min)
            .collect();
        hits.sort_unstable_by_key(|t| minute_offset(current, *t));
        hits.dedup();
        Ok(hits)
    }

    pub fn is_due(
        &self,
        schedule: &MedicationSchedule,
        now: NaiveDateTime,
    ) -> Result<bool, ConfigurationError> {
        self.matching_times(schedule, now).map(|hits| !hits.is_empty())
    }
}
