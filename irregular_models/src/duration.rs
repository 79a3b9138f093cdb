use std::{fmt, str::FromStr};

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const SECONDS_PER_DAY: i64 = 86_400;

/// Unit suffixes in match order. `mo` has to be tried before `m`.
const UNITS: [(&str, i64); 6] = [
    ("y", 365 * SECONDS_PER_DAY),
    ("mo", 30 * SECONDS_PER_DAY),
    ("d", SECONDS_PER_DAY),
    ("h", 3_600),
    ("m", 60),
    ("s", 1),
];

/// A thousand years. Anything longer is not a reminder.
const MAX_SECONDS: i64 = 1_000 * 365 * SECONDS_PER_DAY;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,
    #[error("expected a number at position {0}")]
    MissingNumber(usize),
    #[error("unknown unit at position {0}")]
    UnknownUnit(usize),
    #[error("unit '{0}' is used more than once")]
    DuplicateUnit(&'static str),
    #[error("duration is too large")]
    Overflow,
}

/// Whole-second duration written in the compact `1d 2h 3m 4s` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderDuration(TimeDelta);

impl ReminderDuration {
    pub fn from_seconds(seconds: i64) -> Option<Self> {
        if !(0..=MAX_SECONDS).contains(&seconds) {
            return None;
        }

        TimeDelta::try_seconds(seconds).map(Self)
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.0
    }

    pub fn num_seconds(&self) -> i64 {
        self.0.num_seconds()
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.num_seconds() as f64
    }
}

impl FromStr for ReminderDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        if compact.is_empty() {
            return Err(DurationParseError::Empty);
        }

        let bytes = compact.as_bytes();
        let mut pos = 0;
        let mut seen: Vec<&'static str> = Vec::with_capacity(UNITS.len());
        let mut total: i64 = 0;

        while pos < bytes.len() {
            let number_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }

            if pos == number_start {
                return Err(DurationParseError::MissingNumber(number_start));
            }

            let number: i64 = compact[number_start..pos]
                .parse()
                .map_err(|_| DurationParseError::Overflow)?;

            let (unit, unit_seconds) = UNITS
                .iter()
                .find(|(unit, _)| compact[pos..].starts_with(unit))
                .copied()
                .ok_or(DurationParseError::UnknownUnit(pos))?;

            if seen.contains(&unit) {
                return Err(DurationParseError::DuplicateUnit(unit));
            }
            seen.push(unit);
            pos += unit.len();

            total = number
                .checked_mul(unit_seconds)
                .and_then(|seconds| total.checked_add(seconds))
                .ok_or(DurationParseError::Overflow)?;
        }

        Self::from_seconds(total).ok_or(DurationParseError::Overflow)
    }
}

impl fmt::Display for ReminderDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.num_seconds();
        if total == 0 {
            return f.write_str("0s");
        }

        let parts = [
            (total / SECONDS_PER_DAY, "d"),
            (total % SECONDS_PER_DAY / 3_600, "h"),
            (total % 3_600 / 60, "m"),
            (total % 60, "s"),
        ];

        let mut first = true;
        for (value, unit) in parts.into_iter().filter(|(value, _)| *value != 0) {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{value}{unit}")?;
            first = false;
        }

        Ok(())
    }
}

impl Serialize for ReminderDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReminderDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
