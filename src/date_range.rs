use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Day-month-year, the only date format the search form accepts.
pub const FORM_DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("range start {start} is after its end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },

    #[error("could not parse date range from {0:?}")]
    Unparseable(String),
}

/// An inclusive span of days submitted as one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = DateRangeError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive length in days; a single-day range is 1.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The `(from, to)` strings typed into the search form.
    pub fn form_values(&self) -> (String, String) {
        (
            self.start.format(FORM_DATE_FORMAT).to_string(),
            self.end.format(FORM_DATE_FORMAT).to_string(),
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to) = self.form_values();
        write!(f, "{from} to {to}")
    }
}

impl FromStr for DateRange {
    type Err = DateRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparseable = || DateRangeError::Unparseable(s.to_string());
        let (from, to) = s.split_once(" to ").ok_or_else(unparseable)?;
        let start =
            NaiveDate::parse_from_str(from.trim(), FORM_DATE_FORMAT).map_err(|_| unparseable())?;
        let end =
            NaiveDate::parse_from_str(to.trim(), FORM_DATE_FORMAT).map_err(|_| unparseable())?;
        DateRange::new(start, end)
    }
}
