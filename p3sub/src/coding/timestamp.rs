use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Wire format for timestamps: six-digit fractional seconds, literal `Z`,
/// always UTC.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Error type for timestamp parse failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("invalid timestamp {0:?}: {1}")]
    Invalid(String, chrono::format::ParseError),
}

/// A UTC instant with microsecond precision.
///
/// This is the timestamp that appears in query strings, link headers and
/// derived filenames, always as `YYYY-MM-DDTHH:MM:SS.ffffffZ`. Feed
/// elements are ordered by it, and each subscription's high-water mark is
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current time, truncated to microseconds.
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Parses the strict wire form; shorter fractions are rejected.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        let dt = chrono::NaiveDateTime::parse_from_str(s, TS_FORMAT)
            .map_err(|err| TimestampError::Invalid(s.to_string(), err))?;
        Ok(Self(dt.and_utc()))
    }
}

impl From<SystemTime> for Timestamp {
    /// Truncates to microseconds so that formatting and re-parsing yields
    /// the same instant.
    fn from(t: SystemTime) -> Self {
        let dt: DateTime<Utc> = t.into();
        let micros = dt.timestamp_micros();
        Self(DateTime::from_timestamp_micros(micros).unwrap())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TS_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
