//! Schedule wall-clock times.
//!
//! GTFS expresses post-midnight service as hours past 23 (`25:10:00`), while
//! live sources use plain `01:10:00`. [`happened_at_or_before`] reconciles the
//! two forms.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("'{0}' is not a valid time; H:MM:SS format is expected")]
    Invalid(String),
}

/// A service-day time. `hour` may exceed 23.
/// GTFS times stay within two service days.
const MAX_HOUR: u32 = 47;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self::new(time.hour(), time.minute(), time.second())
    }

    /// The same clock time expressed on the previous service day.
    pub fn plus_day(self) -> Self {
        Self::new(self.hour.saturating_add(24), self.minute, self.second)
    }
}

impl FromStr for ScheduleTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeError::Invalid(s.to_string());
        let mut parts = s.trim().split(':');

        let mut field = |max: u32| -> Result<u32, TimeError> {
            let value: u32 = parts
                .next()
                .ok_or_else(|| invalid())?
                .parse()
                .map_err(|_| invalid())?;
            if value > max { Err(invalid()) } else { Ok(value) }
        };

        let hour = field(MAX_HOUR)?;
        let minute = field(59)?;
        let second = field(59)?;

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self::new(hour, minute, second))
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// True if `t1` is at or before `t2`.
///
/// When one side is written past midnight (hour >= 24) and the other is an
/// early-morning clock time (hour <= 3), the early side is shifted by a day.
pub fn happened_at_or_before(t1: ScheduleTime, t2: ScheduleTime) -> bool {
    let (mut a, mut b) = (t1, t2);
    if b.hour >= 24 && a.hour <= 3 {
        a = a.plus_day();
    } else if a.hour >= 24 && b.hour <= 3 {
        b = b.plus_day();
    }
    a <= b
}
